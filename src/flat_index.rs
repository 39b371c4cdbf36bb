//! Brute-force linear index, O(n) exact search

use std::io::{Read, Write};

use ndarray::ArrayView2;

use crate::distance::Distance;
use crate::error::Result;
use crate::index::NnIndex;
use crate::params::{Algorithm, IndexParams, SearchParams};
use crate::result_set::ResultSet;
use crate::storage::PointStore;

/// A linear index that computes the distance to every stored point.
#[derive(Debug, Clone)]
pub struct LinearIndex<D: Distance> {
    store: PointStore<D::Element>,
    distance: D,
}

impl<D: Distance> LinearIndex<D> {
    /// Create an empty linear index.
    pub fn new(distance: D) -> Self {
        Self {
            store: PointStore::new(0),
            distance,
        }
    }

    /// Create a linear index over `points`. The index still has to be built.
    pub fn with_points(points: ArrayView2<'_, D::Element>, distance: D) -> Self {
        Self {
            store: PointStore::from_points(points),
            distance,
        }
    }
}

impl<D: Distance> NnIndex<D> for LinearIndex<D> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Linear
    }

    fn store(&self) -> &PointStore<D::Element> {
        &self.store
    }

    fn store_mut(&mut self) -> &mut PointStore<D::Element> {
        &mut self.store
    }

    fn clone_index(&self) -> Box<dyn NnIndex<D>> {
        Box::new(self.clone())
    }

    fn build_structure(&mut self) -> Result<()> {
        Ok(())
    }

    fn insert_points(&mut self, _first_slot: usize) -> Result<()> {
        Ok(())
    }

    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet<D::Result>,
        query: &[D::Element],
        _params: &SearchParams,
    ) -> Result<()> {
        for slot in self.store.live_slots() {
            let distance = self.distance.distance(query, self.store.point(slot));
            result.add_point(distance, slot);
        }
        Ok(())
    }

    fn structure_memory(&self) -> usize {
        0
    }

    fn save_structure(&self, _writer: &mut dyn Write) -> Result<()> {
        Ok(())
    }

    fn load_structure(&mut self, _reader: &mut dyn Read) -> Result<()> {
        Ok(())
    }

    fn parameters(&self) -> IndexParams {
        IndexParams::linear()
    }
}
