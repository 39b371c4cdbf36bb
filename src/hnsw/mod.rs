//! HNSW (Hierarchical Navigable Small World) index module.

pub mod graph;

pub use graph::{HnswGraph, HnswParams};

use std::io::{Read, Write};

use ndarray::ArrayView2;

use crate::distance::Distance;
use crate::error::Result;
use crate::index::NnIndex;
use crate::params::{Algorithm, Checks, IndexParams, SearchParams};
use crate::persistence::serialization::{read_bincode, write_bincode};
use crate::result_set::ResultSet;
use crate::storage::PointStore;

/// An HNSW-based approximate nearest neighbor index.
///
/// Removed points stay in the graph so routing through them keeps working;
/// they are filtered out of every result and dropped on the next full build.
#[derive(Debug, Clone)]
pub struct HnswIndex<D: Distance> {
    store: PointStore<D::Element>,
    distance: D,
    graph: HnswGraph,
}

impl<D: Distance> HnswIndex<D> {
    pub fn new(distance: D, params: &IndexParams) -> Result<Self> {
        Ok(Self::with_params(distance, HnswParams::from_index_params(params)?))
    }

    pub fn with_params(distance: D, params: HnswParams) -> Self {
        Self {
            store: PointStore::new(0),
            distance,
            graph: HnswGraph::new(params),
        }
    }

    pub fn with_points(
        points: ArrayView2<'_, D::Element>,
        distance: D,
        params: &IndexParams,
    ) -> Result<Self> {
        let mut index = Self::new(distance, params)?;
        index.store = PointStore::from_points(points);
        Ok(index)
    }

    pub fn graph(&self) -> &HnswGraph {
        &self.graph
    }

    /// Beam width for a query: `ef_search`, widened by the check budget and
    /// by the number of neighbors requested. Exhaustive queries widen it to
    /// the whole store.
    fn beam_width(&self, params: &SearchParams, wanted: Option<usize>) -> usize {
        let base = match params.checks {
            Checks::Unlimited => self.store.slot_count(),
            Checks::Limited(checks) => self.graph.params().ef_search.max(checks),
        };
        base.max(wanted.unwrap_or(0))
    }
}

impl<D: Distance> NnIndex<D> for HnswIndex<D> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Hnsw
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
        self.graph = HnswGraph::new(*self.graph.params());
        for slot in 0..self.store.slot_count() {
            if !self.store.is_removed(slot) {
                self.graph.insert(&self.store, &self.distance, slot);
            }
        }
        Ok(())
    }

    fn insert_points(&mut self, first_slot: usize) -> Result<()> {
        for slot in first_slot..self.store.slot_count() {
            self.graph.insert(&self.store, &self.distance, slot);
        }
        Ok(())
    }

    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet<D::Result>,
        query: &[D::Element],
        params: &SearchParams,
    ) -> Result<()> {
        let ef = self.beam_width(params, result.capacity());
        for n in self.graph.search(&self.store, &self.distance, query, ef) {
            result.add_point(n.distance, n.id);
        }
        Ok(())
    }

    fn structure_memory(&self) -> usize {
        self.graph.memory()
    }

    fn save_structure(&self, writer: &mut dyn Write) -> Result<()> {
        write_bincode(writer, &self.graph)
    }

    fn load_structure(&mut self, reader: &mut dyn Read) -> Result<()> {
        let mut graph: HnswGraph = read_bincode(reader)?;
        graph.validate(self.store.slot_count())?;
        graph.reseed();
        self.graph = graph;
        Ok(())
    }

    fn parameters(&self) -> IndexParams {
        self.graph.params().to_index_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::L2;
    use crate::layout::{DenseNeighbors, RaggedNeighbors};
    use ndarray::{array, Array2};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_index() -> Box<dyn NnIndex<L2<f32>>> {
        let points = array![[1.0f32, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0]];
        let mut index =
            HnswIndex::with_points(points.view(), L2::default(), &IndexParams::hnsw(4, 32)).unwrap();
        index.build_index().unwrap();
        Box::new(index)
    }

    #[test]
    fn test_hnsw_index_via_trait() {
        let index = small_index();
        let results = index
            .knn_search::<RaggedNeighbors<usize, f32>>(
                array![[1.0f32, 0.0, 0.0]].view(),
                2,
                &SearchParams::default(),
            )
            .unwrap();
        assert_eq!(results.found, 2);
        assert_eq!(results.neighbors.indices[0][0], 0); // exact match
        assert!(results.neighbors.distances[0][0] < 1e-5);
    }

    #[test]
    fn test_hnsw_get_point() {
        let index = small_index();
        assert_eq!(index.get_point(2), Some(&[1.0f32, 1.0, 0.0][..]));
        assert_eq!(index.get_point(99), None);
    }

    #[test]
    fn test_hnsw_removed_point_not_reported() {
        let mut index = small_index();
        index.remove_point(0).unwrap();
        assert_eq!(index.size(), 2);

        let results = index
            .knn_search::<RaggedNeighbors<usize, f32>>(
                array![[1.0f32, 0.0, 0.0]].view(),
                3,
                &SearchParams::default(),
            )
            .unwrap();
        assert_eq!(results.found, 2);
        assert!(!results.neighbors.indices[0].contains(&0));
    }

    #[test]
    fn test_mostly_removed_still_fills_k() {
        let mut rng = StdRng::seed_from_u64(5);
        let points = Array2::random_using((400, 8), Uniform::new(0.0f32, 1.0), &mut rng);
        let queries = Array2::random_using((20, 8), Uniform::new(0.0f32, 1.0), &mut rng);
        let mut index =
            HnswIndex::with_points(points.view(), L2::default(), &IndexParams::hnsw(8, 64)).unwrap();
        index.build_index().unwrap();
        let mut index: Box<dyn NnIndex<L2<f32>>> = Box::new(index);
        for id in 0..360 {
            index.remove_point(id).unwrap();
        }
        assert_eq!(index.size(), 40);

        let results = index
            .knn_search::<DenseNeighbors<usize, f32>>(queries.view(), 10, &SearchParams::default())
            .unwrap();
        assert_eq!(results.found, 200);
        assert!(results.neighbors.indices.iter().all(|&id| id >= 360 && id < 400));
    }

    #[test]
    fn test_beam_width() {
        let index = HnswIndex::new(L2::<f32>::default(), &IndexParams::hnsw(8, 64)).unwrap();
        assert_eq!(index.beam_width(&SearchParams::default(), Some(10)), 50);
        assert_eq!(index.beam_width(&SearchParams::new(Checks::Limited(128)), Some(10)), 128);
        assert_eq!(index.beam_width(&SearchParams::default(), Some(80)), 80);
    }
}
