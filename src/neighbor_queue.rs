//! Priority queue utilities: float ordering for BinaryHeap.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A neighbor entry with a distance and a dense storage position.
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<R> {
    pub distance: R,
    pub id: usize,
}

impl<R> Neighbor<R> {
    pub fn new(id: usize, distance: R) -> Self {
        Self { distance, id }
    }
}

impl<R: PartialOrd> PartialEq for Neighbor<R> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<R: PartialOrd> Eq for Neighbor<R> {}

// Default ordering: max-heap (largest distance on top), ties broken by id so
// that equal distances always come out in the same order.
impl<R: PartialOrd> PartialOrd for Neighbor<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R: PartialOrd> Ord for Neighbor<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .partial_cmp(&other.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// A wrapper that reverses Neighbor ordering to create a min-heap.
#[derive(Debug, Clone, Copy)]
pub struct Reversed<R: PartialOrd>(pub Neighbor<R>);

impl<R: PartialOrd> PartialEq for Reversed<R> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<R: PartialOrd> Eq for Reversed<R> {}

impl<R: PartialOrd> PartialOrd for Reversed<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R: PartialOrd> Ord for Reversed<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}

/// Max-heap of neighbors (largest distance on top). Used as a bounded result set.
#[derive(Debug, Clone)]
pub struct MaxHeap<R: PartialOrd> {
    heap: BinaryHeap<Neighbor<R>>,
}

impl<R: PartialOrd> MaxHeap<R> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, n: Neighbor<R>) {
        self.heap.push(n);
    }

    /// Push and pop the max if size exceeds limit, keeping only the closest `limit` neighbors.
    pub fn push_bounded(&mut self, n: Neighbor<R>, limit: usize) {
        self.heap.push(n);
        if self.heap.len() > limit {
            self.heap.pop();
        }
    }

    pub fn peek(&self) -> Option<&Neighbor<R>> {
        self.heap.peek()
    }

    pub fn pop(&mut self) -> Option<Neighbor<R>> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain into a sorted Vec (ascending by distance, then id).
    pub fn into_sorted_vec(self) -> Vec<Neighbor<R>> {
        self.heap.into_sorted_vec()
    }
}

impl<R: PartialOrd> Default for MaxHeap<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Min-heap of neighbors (smallest distance on top). Used as the candidate set.
#[derive(Debug, Clone)]
pub struct MinHeap<R: PartialOrd> {
    heap: BinaryHeap<Reversed<R>>,
}

impl<R: PartialOrd> MinHeap<R> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, n: Neighbor<R>) {
        self.heap.push(Reversed(n));
    }

    pub fn peek(&self) -> Option<&Neighbor<R>> {
        self.heap.peek().map(|r| &r.0)
    }

    pub fn pop(&mut self) -> Option<Neighbor<R>> {
        self.heap.pop().map(|r| r.0)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<R: PartialOrd> Default for MinHeap<R> {
    fn default() -> Self {
        Self::new()
    }
}
