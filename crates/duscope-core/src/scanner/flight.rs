/// Single-flight deduplication of concurrent scans.
///
/// At most one computation per key runs at a time. Callers arriving while
/// it runs block until it finishes and receive a clone of its value. If the
/// leader unwinds without producing a value, one waiter takes over.
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

enum FlightState<V> {
    Running,
    Done(V),
    Abandoned,
}

struct Flight<V> {
    state: Mutex<FlightState<V>>,
    done: Condvar,
}

pub struct SingleFlight<K, V> {
    inflight: Mutex<HashMap<K, Arc<Flight<V>>>>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }
}

/// Marks the flight abandoned if the leader unwinds before publishing.
struct LeaderGuard<'a, K: Hash + Eq + Clone, V> {
    group: &'a SingleFlight<K, V>,
    key: K,
    flight: Arc<Flight<V>>,
}

impl<K: Hash + Eq + Clone, V> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        {
            let mut state = self.flight.state.lock();
            if matches!(*state, FlightState::Running) {
                *state = FlightState::Abandoned;
            }
        }
        self.flight.done.notify_all();
        let mut inflight = self.group.inflight.lock();
        if inflight
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.flight))
        {
            inflight.remove(&self.key);
        }
    }
}

impl<K: Hash + Eq + Clone, V: Clone> SingleFlight<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless a run is already in flight, in which case
    /// wait for it and return its value.
    pub fn run(&self, key: K, work: impl FnOnce() -> V) -> V {
        let mut work = Some(work);
        loop {
            let (flight, leader) = {
                let mut inflight = self.inflight.lock();
                match inflight.get(&key) {
                    Some(existing) => (Arc::clone(existing), false),
                    None => {
                        let flight = Arc::new(Flight {
                            state: Mutex::new(FlightState::Running),
                            done: Condvar::new(),
                        });
                        inflight.insert(key.clone(), Arc::clone(&flight));
                        (flight, true)
                    }
                }
            };

            if leader {
                let guard = LeaderGuard {
                    group: self,
                    key: key.clone(),
                    flight,
                };
                // Only a leader consumes `work`, and a leader always returns.
                let Some(work) = work.take() else {
                    unreachable!("single-flight leader ran twice");
                };
                let value = work();
                *guard.flight.state.lock() = FlightState::Done(value.clone());
                drop(guard);
                return value;
            }

            let mut state = flight.state.lock();
            loop {
                if let FlightState::Done(value) = &*state {
                    return value.clone();
                }
                if matches!(*state, FlightState::Abandoned) {
                    break;
                }
                flight.done.wait(&mut state);
            }
        }
    }

    /// Number of keys currently being computed.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn concurrent_callers_share_one_run() {
        let group = Arc::new(SingleFlight::<&'static str, u64>::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let group = Arc::clone(&group);
                let runs = Arc::clone(&runs);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    group.run("/data", || {
                        runs.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(200));
                        42
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[test]
    fn sequential_calls_run_again() {
        let group = SingleFlight::<u8, u8>::new();
        assert_eq!(group.run(1, || 1), 1);
        assert_eq!(group.run(1, || 2), 2);
    }

    #[test]
    fn different_keys_do_not_wait_on_each_other() {
        let group = SingleFlight::<u8, u8>::new();
        let inner = group.run(1, || group.run(2, || 7));
        assert_eq!(inner, 7);
    }

    #[test]
    fn panicking_leader_hands_over_to_a_waiter() {
        let group = Arc::new(SingleFlight::<u8, u8>::new());
        let leader = {
            let group = Arc::clone(&group);
            std::thread::spawn(move || {
                group.run(1, || {
                    std::thread::sleep(Duration::from_millis(100));
                    panic!("leader failed");
                })
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        let value = group.run(1, || 9);
        assert_eq!(value, 9);
        assert!(leader.join().is_err());
        assert_eq!(group.in_flight(), 0);
    }
}
