//! Mapping from algorithm tag to a concrete index instance.

use ndarray::ArrayView2;
use tracing::debug;

use crate::distance::Distance;
use crate::error::{NnError, Result};
use crate::flat_index::LinearIndex;
use crate::hnsw::HnswIndex;
use crate::index::NnIndex;
use crate::kdtree::KdTreeIndex;
use crate::lsh::LshIndex;
use crate::params::{Algorithm, IndexParams};

/// Create an unbuilt index of the given algorithm, optionally holding
/// `points`. Algorithm-specific options are read from `params`.
pub fn create_index_by_type<D: Distance>(
    algorithm: Algorithm,
    points: Option<ArrayView2<'_, D::Element>>,
    params: &IndexParams,
    distance: D,
) -> Result<Box<dyn NnIndex<D>>> {
    debug!(%algorithm, points = points.map_or(0, |p| p.nrows()), "creating index");

    let index: Box<dyn NnIndex<D>> = match (algorithm, points) {
        (Algorithm::Linear, None) => Box::new(LinearIndex::new(distance)),
        (Algorithm::Linear, Some(points)) => Box::new(LinearIndex::with_points(points, distance)),
        (Algorithm::KdTree, None) => Box::new(KdTreeIndex::new(distance, params)?),
        (Algorithm::KdTree, Some(points)) => {
            Box::new(KdTreeIndex::with_points(points, distance, params)?)
        }
        (Algorithm::Lsh, None) => Box::new(LshIndex::new(distance, params)?),
        (Algorithm::Lsh, Some(points)) => Box::new(LshIndex::with_points(points, distance, params)?),
        (Algorithm::Hnsw, None) => Box::new(HnswIndex::new(distance, params)?),
        (Algorithm::Hnsw, Some(points)) => {
            Box::new(HnswIndex::with_points(points, distance, params)?)
        }
        (Algorithm::Saved, _) => {
            return Err(NnError::UnsupportedAlgorithm(
                "saved does not name a concrete algorithm".to_string(),
            ))
        }
    };
    Ok(index)
}
