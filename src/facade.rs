//! The algorithm-agnostic index facade.

use std::fmt;
use std::mem;
use std::path::Path;

use ndarray::ArrayView2;
use tracing::debug;

use crate::distance::Distance;
use crate::error::Result;
use crate::index::NnIndex;
use crate::layout::{NeighborLayout, SearchResults};
use crate::params::{Algorithm, IndexParams, SearchParams};
use crate::persistence;
use crate::registry::create_index_by_type;

/// Growth factor over the last build size that triggers a full rebuild.
pub const DEFAULT_REBUILD_THRESHOLD: f32 = 2.0;

/// A nearest-neighbor index whose algorithm is chosen at runtime.
///
/// The facade owns one concrete algorithm and forwards every operation to
/// it. Indices restored from disk remember that they were loaded, so a plain
/// [`Index::build_index`] does not discard the restored structure.
pub struct Index<D: Distance> {
    algorithm: Box<dyn NnIndex<D>>,
    loaded: bool,
    params: IndexParams,
}

impl<D: Distance> Index<D> {
    /// Create an empty index, or restore one when `params` asks for `saved`.
    pub fn new(params: IndexParams, distance: D) -> Result<Self> {
        Self::create(None, params, distance)
    }

    /// Create an index over `points`. The points are handed to the algorithm
    /// unbuilt; call [`Index::build_index`] before querying. When `params`
    /// asks for `saved`, the points are ignored and the file is restored.
    pub fn with_points(
        points: ArrayView2<'_, D::Element>,
        params: IndexParams,
        distance: D,
    ) -> Result<Self> {
        Self::create(Some(points), params, distance)
    }

    fn create(
        points: Option<ArrayView2<'_, D::Element>>,
        params: IndexParams,
        distance: D,
    ) -> Result<Self> {
        let algorithm = params.algorithm()?;
        if algorithm == Algorithm::Saved {
            let filename = params.filename()?;
            let index = persistence::load_saved_index(&filename, distance)?;
            return Ok(Self {
                algorithm: index,
                loaded: true,
                params,
            });
        }

        let index = create_index_by_type(algorithm, points, &params, distance)?;
        Ok(Self {
            algorithm: index,
            loaded: false,
            params,
        })
    }

    /// Build the structure over the current points. A freshly loaded index
    /// is already built and is left untouched.
    pub fn build_index(&mut self) -> Result<()> {
        if self.loaded {
            debug!("index was loaded from disk, skipping build");
            return Ok(());
        }
        self.algorithm.build_index()
    }

    /// Replace the dataset with `points` and build over it.
    pub fn build_index_with(&mut self, points: ArrayView2<'_, D::Element>) -> Result<()> {
        self.algorithm.build_index_with(points)
    }

    /// Insert points, rebuilding once the index has doubled since its last build.
    pub fn add_points(&mut self, points: ArrayView2<'_, D::Element>) -> Result<()> {
        self.add_points_with_threshold(points, DEFAULT_REBUILD_THRESHOLD)
    }

    pub fn add_points_with_threshold(
        &mut self,
        points: ArrayView2<'_, D::Element>,
        rebuild_threshold: f32,
    ) -> Result<()> {
        self.algorithm.add_points(points, rebuild_threshold)
    }

    pub fn remove_point(&mut self, id: usize) -> Result<()> {
        self.algorithm.remove_point(id)
    }

    pub fn get_point(&self, id: usize) -> Option<&[D::Element]> {
        self.algorithm.get_point(id)
    }

    pub fn veclen(&self) -> usize {
        self.algorithm.veclen()
    }

    /// Number of live points.
    pub fn size(&self) -> usize {
        self.algorithm.size()
    }

    pub fn index_type(&self) -> Algorithm {
        self.algorithm.algorithm()
    }

    /// Approximate bytes held by points and structure.
    pub fn used_memory(&self) -> usize {
        self.algorithm.used_memory()
    }

    /// Parameters reported by the algorithm, defaults included.
    pub fn parameters(&self) -> IndexParams {
        self.algorithm.parameters()
    }

    /// Parameters this facade was constructed with.
    pub fn construction_params(&self) -> &IndexParams {
        &self.params
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        persistence::save_index(self.algorithm.as_ref(), path.as_ref())
    }

    /// k nearest neighbors of every row of `queries`.
    ///
    /// The layout type picks the result shape and id kind, e.g.
    /// `DenseNeighbors<usize, f32>` for a matrix of stable ids.
    pub fn knn_search<L>(
        &self,
        queries: ArrayView2<'_, D::Element>,
        k: usize,
        params: &SearchParams,
    ) -> Result<SearchResults<L>>
    where
        L: NeighborLayout<D::Result>,
    {
        self.algorithm.knn_search(queries, k, params)
    }

    /// Neighbors strictly closer than `radius` to every row of `queries`.
    pub fn radius_search<L>(
        &self,
        queries: ArrayView2<'_, D::Element>,
        radius: D::Result,
        params: &SearchParams,
    ) -> Result<SearchResults<L>>
    where
        L: NeighborLayout<D::Result>,
    {
        self.algorithm.radius_search(queries, radius, params)
    }

    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }
}

impl<D: Distance> Clone for Index<D> {
    fn clone(&self) -> Self {
        Self {
            algorithm: self.algorithm.clone_index(),
            loaded: self.loaded,
            params: self.params.clone(),
        }
    }
}

impl<D: Distance> fmt::Debug for Index<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("algorithm", &self.algorithm.algorithm())
            .field("size", &self.size())
            .field("veclen", &self.veclen())
            .field("loaded", &self.loaded)
            .finish()
    }
}
