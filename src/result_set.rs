//! Per-query result collectors fed by the algorithms' search loops.

use crate::distance::DistanceValue;
use crate::neighbor_queue::{MaxHeap, Neighbor};

/// Sink for candidate neighbors of one query.
///
/// Algorithms report every candidate they evaluate; the set decides what to
/// keep. `index` is the candidate's dense storage position.
pub trait ResultSet<R> {
    fn add_point(&mut self, distance: R, index: usize);

    /// A candidate must be closer than this to be accepted.
    fn worst_dist(&self) -> R;

    fn is_full(&self) -> bool;

    /// Maximum number of neighbors kept, if bounded.
    fn capacity(&self) -> Option<usize>;
}

/// Keeps the `k` closest candidates, ordered by (distance, position).
#[derive(Debug, Clone)]
pub struct KnnResultSet<R: DistanceValue> {
    k: usize,
    heap: MaxHeap<R>,
}

impl<R: DistanceValue> KnnResultSet<R> {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            heap: MaxHeap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn into_sorted(self) -> Vec<Neighbor<R>> {
        self.heap.into_sorted_vec()
    }
}

impl<R: DistanceValue> ResultSet<R> for KnnResultSet<R> {
    fn add_point(&mut self, distance: R, index: usize) {
        if self.k == 0 {
            return;
        }
        let candidate = Neighbor::new(index, distance);
        if self.heap.len() < self.k {
            self.heap.push(candidate);
        } else if self.heap.peek().map_or(false, |worst| candidate < *worst) {
            self.heap.push_bounded(candidate, self.k);
        }
    }

    fn worst_dist(&self) -> R {
        if self.is_full() {
            self.heap.peek().map_or(R::MAX, |n| n.distance)
        } else {
            R::MAX
        }
    }

    fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.k)
    }
}

/// Keeps every candidate strictly inside `radius`.
#[derive(Debug, Clone)]
pub struct RadiusResultSet<R: DistanceValue> {
    radius: R,
    hits: Vec<Neighbor<R>>,
}

impl<R: DistanceValue> RadiusResultSet<R> {
    pub fn new(radius: R) -> Self {
        Self {
            radius,
            hits: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Hits in discovery order, or sorted by (distance, position).
    pub fn into_neighbors(mut self, sorted: bool) -> Vec<Neighbor<R>> {
        if sorted {
            self.hits.sort();
        }
        self.hits
    }
}

impl<R: DistanceValue> ResultSet<R> for RadiusResultSet<R> {
    fn add_point(&mut self, distance: R, index: usize) {
        if distance < self.radius {
            self.hits.push(Neighbor::new(index, distance));
        }
    }

    fn worst_dist(&self) -> R {
        self.radius
    }

    fn is_full(&self) -> bool {
        true
    }

    fn capacity(&self) -> Option<usize> {
        None
    }
}

/// Keeps at most `k` of the candidates strictly inside `radius`.
#[derive(Debug, Clone)]
pub struct KnnRadiusResultSet<R: DistanceValue> {
    radius: R,
    inner: KnnResultSet<R>,
}

impl<R: DistanceValue> KnnRadiusResultSet<R> {
    pub fn new(k: usize, radius: R) -> Self {
        Self {
            radius,
            inner: KnnResultSet::new(k),
        }
    }

    pub fn into_sorted(self) -> Vec<Neighbor<R>> {
        self.inner.into_sorted()
    }
}

impl<R: DistanceValue> ResultSet<R> for KnnRadiusResultSet<R> {
    fn add_point(&mut self, distance: R, index: usize) {
        if distance < self.radius {
            self.inner.add_point(distance, index);
        }
    }

    fn worst_dist(&self) -> R {
        let worst = self.inner.worst_dist();
        if worst < self.radius {
            worst
        } else {
            self.radius
        }
    }

    fn is_full(&self) -> bool {
        true
    }

    fn capacity(&self) -> Option<usize> {
        self.inner.capacity()
    }
}

/// Counts candidates strictly inside `radius` without keeping them.
#[derive(Debug, Clone)]
pub struct CountRadiusResultSet<R: DistanceValue> {
    radius: R,
    count: usize,
}

impl<R: DistanceValue> CountRadiusResultSet<R> {
    pub fn new(radius: R) -> Self {
        Self { radius, count: 0 }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl<R: DistanceValue> ResultSet<R> for CountRadiusResultSet<R> {
    fn add_point(&mut self, distance: R, _index: usize) {
        if distance < self.radius {
            self.count += 1;
        }
    }

    fn worst_dist(&self) -> R {
        self.radius
    }

    fn is_full(&self) -> bool {
        true
    }

    fn capacity(&self) -> Option<usize> {
        None
    }
}
