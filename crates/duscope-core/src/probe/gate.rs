/// Admission control for external tool invocations.
///
/// Two independent bounds: at most `max_running` tools execute at once,
/// and at most `max_waiting` callers may queue for a slot. A caller that
/// finds the queue full fails fast with [`ProbeError::Saturated`] so it can
/// fall back to walking the directory itself instead of piling up behind
/// process spawns.
///
/// Running slots are tokens in a bounded channel: acquiring receives a
/// token, dropping the [`Permit`] sends it back.
use crate::error::ProbeError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// How often a waiting caller re-checks the cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(50);

pub struct ProbeGate {
    tokens_tx: Sender<()>,
    tokens_rx: Receiver<()>,
    waiting: AtomicUsize,
    max_running: usize,
    max_waiting: usize,
}

/// A held running slot. Released on drop.
pub struct Permit<'a> {
    gate: &'a ProbeGate,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        let _ = self.gate.tokens_tx.send(());
    }
}

impl ProbeGate {
    pub fn new(max_running: usize, max_waiting: usize) -> Self {
        let max_running = max_running.max(1);
        let (tokens_tx, tokens_rx) = crossbeam_channel::bounded(max_running);
        for _ in 0..max_running {
            let _ = tokens_tx.send(());
        }
        Self {
            tokens_tx,
            tokens_rx,
            waiting: AtomicUsize::new(0),
            max_running,
            max_waiting,
        }
    }

    /// Take a running slot, waiting if necessary.
    pub fn acquire(&self, cancel: &AtomicBool) -> Result<Permit<'_>, ProbeError> {
        if self.tokens_rx.try_recv().is_ok() {
            return Ok(Permit { gate: self });
        }

        let queued = self.waiting.fetch_add(1, Ordering::AcqRel);
        if queued >= self.max_waiting {
            self.waiting.fetch_sub(1, Ordering::AcqRel);
            return Err(ProbeError::Saturated);
        }

        let result = loop {
            if cancel.load(Ordering::Relaxed) {
                break Err(ProbeError::Cancelled);
            }
            match self.tokens_rx.recv_timeout(CANCEL_POLL) {
                Ok(()) => break Ok(Permit { gate: self }),
                Err(RecvTimeoutError::Timeout) => continue,
                // The gate owns a sender, so this cannot happen while `self` lives.
                Err(RecvTimeoutError::Disconnected) => break Err(ProbeError::Cancelled),
            }
        };
        self.waiting.fetch_sub(1, Ordering::AcqRel);
        result
    }

    /// Slots currently held.
    pub fn running(&self) -> usize {
        self.max_running - self.tokens_rx.len()
    }

    /// Callers currently queued.
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn permits_are_returned_on_drop() {
        let gate = ProbeGate::new(2, 4);
        let cancel = AtomicBool::new(false);
        let a = gate.acquire(&cancel).unwrap();
        let b = gate.acquire(&cancel).unwrap();
        assert_eq!(gate.running(), 2);
        drop(a);
        assert_eq!(gate.running(), 1);
        drop(b);
        assert_eq!(gate.running(), 0);
    }

    #[test]
    fn full_queue_fails_fast() {
        let gate = ProbeGate::new(1, 0);
        let cancel = AtomicBool::new(false);
        let _held = gate.acquire(&cancel).unwrap();
        assert!(matches!(gate.acquire(&cancel), Err(ProbeError::Saturated)));
        assert_eq!(gate.waiting(), 0);
    }

    #[test]
    fn waiter_gets_slot_when_released() {
        let gate = Arc::new(ProbeGate::new(1, 4));
        let cancel = Arc::new(AtomicBool::new(false));
        let held = gate.acquire(&cancel).unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            let cancel = Arc::clone(&cancel);
            std::thread::spawn(move || gate.acquire(&cancel).map(|_| ()).is_ok())
        };
        std::thread::sleep(Duration::from_millis(100));
        drop(held);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn cancelled_waiter_gives_up() {
        let gate = ProbeGate::new(1, 4);
        let cancel = AtomicBool::new(false);
        let _held = gate.acquire(&cancel).unwrap();
        cancel.store(true, Ordering::Relaxed);
        assert!(matches!(gate.acquire(&cancel), Err(ProbeError::Cancelled)));
        assert_eq!(gate.waiting(), 0);
    }
}
