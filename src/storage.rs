//! In-memory point storage shared by every index algorithm

use std::collections::HashMap;
use std::mem;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::datatype::Element;
use crate::error::{NnError, Result};

/// Dense row-major point storage with stable ids.
///
/// Points live in slots. A slot's position changes only when the store is
/// compacted; its stable id never changes. Removed points stay in their slot
/// as tombstones until the next full build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointStore<T> {
    veclen: usize,
    data: Vec<T>,
    /// slot -> stable id
    ids: Vec<usize>,
    removed: Vec<bool>,
    removed_count: usize,
    /// Next stable id to assign
    next_id: usize,
    /// Live points when the structure was last built from scratch
    size_at_build: usize,
    built: bool,
    /// stable id -> slot, live points only
    #[serde(skip)]
    slots: HashMap<usize, usize>,
}

impl<T: Element> PointStore<T> {
    pub fn new(veclen: usize) -> Self {
        Self {
            veclen,
            data: Vec::new(),
            ids: Vec::new(),
            removed: Vec::new(),
            removed_count: 0,
            next_id: 0,
            size_at_build: 0,
            built: false,
            slots: HashMap::new(),
        }
    }

    /// Create a store holding `points`, stable ids `0..points.nrows()`.
    pub fn from_points(points: ArrayView2<'_, T>) -> Self {
        let mut store = Self::new(points.ncols());
        store.push_rows(points);
        store
    }

    /// Append points, assigning fresh stable ids. Returns the first new slot.
    pub fn append(&mut self, points: ArrayView2<'_, T>) -> Result<usize> {
        if self.ids.is_empty() {
            self.veclen = points.ncols();
        } else if points.ncols() != self.veclen {
            return Err(NnError::DimensionMismatch {
                expected: self.veclen,
                actual: points.ncols(),
            });
        }

        let first = self.ids.len();
        self.push_rows(points);
        Ok(first)
    }

    /// Drop every point and take `points` as the new dataset. Ids restart at 0.
    pub fn replace(&mut self, points: ArrayView2<'_, T>) {
        *self = Self::from_points(points);
    }

    fn push_rows(&mut self, points: ArrayView2<'_, T>) {
        self.data.reserve(points.len());
        for row in points.outer_iter() {
            let id = self.next_id;
            self.next_id += 1;
            self.slots.insert(id, self.ids.len());
            self.data.extend(row.iter().copied());
            self.ids.push(id);
            self.removed.push(false);
        }
    }

    /// Tombstone the point with the given stable id.
    pub fn remove(&mut self, id: usize) -> Result<()> {
        let slot = self
            .slots
            .remove(&id)
            .ok_or(NnError::PointNotFound { id })?;
        self.removed[slot] = true;
        self.removed_count += 1;
        Ok(())
    }

    /// Coordinates of a live point by stable id.
    pub fn get(&self, id: usize) -> Option<&[T]> {
        self.slots.get(&id).map(|&slot| self.point(slot))
    }

    /// Coordinates stored in `slot`, live or not.
    #[inline]
    pub fn point(&self, slot: usize) -> &[T] {
        let start = slot * self.veclen;
        &self.data[start..start + self.veclen]
    }

    #[inline]
    pub fn id_of(&self, slot: usize) -> usize {
        self.ids[slot]
    }

    pub fn slot_of(&self, id: usize) -> Option<usize> {
        self.slots.get(&id).copied()
    }

    #[inline]
    pub fn is_removed(&self, slot: usize) -> bool {
        self.removed[slot]
    }

    /// Slots holding live points, in storage order.
    pub fn live_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.ids.len()).filter(move |&slot| !self.removed[slot])
    }

    /// Number of live points.
    pub fn len(&self) -> usize {
        self.ids.len() - self.removed_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slots, tombstones included.
    pub fn slot_count(&self) -> usize {
        self.ids.len()
    }

    pub fn veclen(&self) -> usize {
        self.veclen
    }

    pub fn next_id(&self) -> usize {
        self.next_id
    }

    pub fn size_at_build(&self) -> usize {
        self.size_at_build
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Drop tombstoned slots. Stable ids are kept, slot positions shift.
    /// Returns whether anything was removed.
    pub fn compact(&mut self) -> bool {
        if self.removed_count == 0 {
            return false;
        }

        let live = self.len();
        let mut data = Vec::with_capacity(live * self.veclen);
        let mut ids = Vec::with_capacity(live);
        for slot in self.live_slots() {
            data.extend_from_slice(self.point(slot));
            ids.push(self.ids[slot]);
        }

        self.data = data;
        self.ids = ids;
        self.removed = vec![false; live];
        self.removed_count = 0;
        self.reindex();
        true
    }

    /// Record that the structure was just rebuilt over the current points.
    pub fn mark_built(&mut self) {
        self.size_at_build = self.len();
        self.built = true;
    }

    /// Whether an insertion should trigger a full rebuild.
    ///
    /// A structure that was never built is always rebuilt. Otherwise a
    /// rebuild happens once the live size exceeds `threshold` times the size
    /// at the last build; thresholds at or below 1 disable it.
    pub fn needs_rebuild(&self, threshold: f32) -> bool {
        if !self.built {
            return true;
        }
        threshold > 1.0 && (self.size_at_build as f64) * (threshold as f64) < self.len() as f64
    }

    /// Restore the id -> slot map after deserialization.
    pub fn reindex(&mut self) {
        self.slots = self
            .ids
            .iter()
            .enumerate()
            .filter(|&(slot, _)| !self.removed[slot])
            .map(|(slot, &id)| (id, slot))
            .collect();
    }

    /// Check internal consistency after loading untrusted bytes.
    pub fn validate(&self) -> Result<()> {
        let slots = self.ids.len();
        if self.data.len() != slots * self.veclen || self.removed.len() != slots {
            return Err(NnError::InvalidFormat(
                "point storage lengths do not agree".to_string(),
            ));
        }
        let removed = self.removed.iter().filter(|&&r| r).count();
        if removed != self.removed_count {
            return Err(NnError::InvalidFormat(
                "tombstone count does not agree".to_string(),
            ));
        }
        Ok(())
    }

    /// Approximate heap bytes held by the store.
    pub fn memory(&self) -> usize {
        self.data.capacity() * mem::size_of::<T>()
            + self.ids.capacity() * mem::size_of::<usize>()
            + self.removed.capacity()
            + self.slots.len() * 2 * mem::size_of::<usize>()
    }
}
