/// Bounded top-K collector.
///
/// Keeps the K largest items seen so far in a min-heap keyed on
/// [`HasSize::size`]. The smallest retained item sits at the top of the
/// heap, so deciding whether a new item belongs costs O(1) and an insert or
/// eviction costs O(log K).
use crate::model::HasSize;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Heap slot that inverts the size ordering so `BinaryHeap` (a max-heap)
/// behaves as a min-heap.
struct Smallest<T>(T);

impl<T: HasSize> PartialEq for Smallest<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.size() == other.0.size()
    }
}

impl<T: HasSize> Eq for Smallest<T> {}

impl<T: HasSize> PartialOrd for Smallest<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: HasSize> Ord for Smallest<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.size().cmp(&self.0.size())
    }
}

/// Capacity-bounded collection of the K largest items.
pub struct TopK<T> {
    heap: BinaryHeap<Smallest<T>>,
    capacity: usize,
}

impl<T: HasSize> TopK<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity.min(1_024)),
            capacity,
        }
    }

    /// Offer an item. Below capacity it is always kept; at capacity it
    /// replaces the current minimum only if strictly larger.
    pub fn push(&mut self, item: T) {
        if self.capacity == 0 {
            return;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(Smallest(item));
            return;
        }
        let evict = self
            .heap
            .peek()
            .is_some_and(|min| item.size() > min.0.size());
        if evict {
            self.heap.pop();
            self.heap.push(Smallest(item));
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of the smallest retained item.
    pub fn min_size(&self) -> Option<u64> {
        self.heap.peek().map(|slot| slot.0.size())
    }

    /// Drain into a vector sorted descending by size.
    ///
    /// Pops in ascending order, then reverses. Equal sizes come out in no
    /// particular order.
    pub fn into_sorted_desc(mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(Smallest(item)) = self.heap.pop() {
            out.push(item);
        }
        out.reverse();
        out
    }
}

impl<T: HasSize> Extend<T> for TopK<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.push(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item(u64);

    impl HasSize for Item {
        fn size(&self) -> u64 {
            self.0
        }
    }

    /// Deterministic pseudo-random sizes so the tests stay reproducible.
    fn sizes(n: usize, seed: u64) -> Vec<u64> {
        let mut x = seed;
        (0..n)
            .map(|_| {
                x = x.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
                x >> 40
            })
            .collect()
    }

    #[test]
    fn length_is_min_of_capacity_and_pushes() {
        for capacity in [0usize, 1, 5, 30] {
            for pushes in [0usize, 1, 4, 5, 6, 100] {
                let mut top = TopK::new(capacity);
                top.extend(sizes(pushes, 7).into_iter().map(Item));
                assert_eq!(
                    top.len(),
                    capacity.min(pushes),
                    "capacity={capacity} pushes={pushes}"
                );
            }
        }
    }

    #[test]
    fn drain_is_descending_and_keeps_the_largest() {
        let input = sizes(500, 42);
        let mut top = TopK::new(10);
        top.extend(input.iter().copied().map(Item));

        let drained: Vec<u64> = top.into_sorted_desc().into_iter().map(|i| i.0).collect();
        assert!(drained.windows(2).all(|w| w[0] >= w[1]), "must be descending");

        let mut expected = input.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        expected.truncate(10);
        assert_eq!(drained, expected);

        let mut ascending = drained.clone();
        ascending.reverse();
        assert!(ascending.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn smaller_item_at_capacity_is_discarded() {
        let mut top = TopK::new(2);
        top.push(Item(10));
        top.push(Item(20));
        top.push(Item(5));
        assert_eq!(top.min_size(), Some(10));

        top.push(Item(10));
        assert_eq!(top.min_size(), Some(10), "equal size does not evict");

        top.push(Item(15));
        assert_eq!(top.into_sorted_desc(), vec![Item(20), Item(15)]);
    }
}
