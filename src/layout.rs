//! Result containers returned by k-NN and radius searches.
//!
//! A search is generic over its output layout: the caller picks dense or
//! ragged rows and wide or narrow identifiers via the type parameter, e.g.
//! `DenseNeighbors<usize, f32>` or `RaggedNeighbors<i32, f32>`.

use std::fmt;

use ndarray::Array2;

use crate::distance::DistanceValue;
use crate::error::{NnError, Result};

/// Identifier type written into search results.
pub trait NeighborId: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Filler for dense cells that received no neighbor.
    const NONE: Self;

    /// `true` when the layout reports stable point ids, `false` when it
    /// reports positions in the current dense storage.
    const STABLE: bool;

    fn from_usize(value: usize) -> Result<Self>;
}

/// Wide identifiers: stable across insertions and removals.
impl NeighborId for usize {
    const NONE: Self = usize::MAX;
    const STABLE: bool = true;

    #[inline]
    fn from_usize(value: usize) -> Result<Self> {
        Ok(value)
    }
}

/// Narrow identifiers: positions in current dense storage.
impl NeighborId for i32 {
    const NONE: Self = -1;
    const STABLE: bool = false;

    fn from_usize(value: usize) -> Result<Self> {
        i32::try_from(value).map_err(|_| {
            NnError::invalid_param(
                "indices",
                format!("position {} does not fit a narrow identifier", value),
            )
        })
    }
}

/// A way of arranging per-query neighbor lists.
pub trait NeighborLayout<R: DistanceValue>: Sized {
    type Id: NeighborId;

    /// Assemble the layout from per-query rows. `width` fixes the number of
    /// columns for dense layouts; `None` sizes them to the longest row.
    fn from_rows(rows: Vec<Vec<(Self::Id, R)>>, width: Option<usize>) -> Self;

    /// Reject a fixed width this layout cannot hold for `queries` rows.
    fn check_width(_queries: usize, _width: usize) -> Result<()> {
        Ok(())
    }

    /// Number of queries represented.
    fn num_queries(&self) -> usize;
}

/// One row per query, fixed width. Missing neighbors are padded with
/// `NeighborId::NONE` and `DistanceValue::MAX`.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseNeighbors<I, R> {
    pub indices: Array2<I>,
    pub distances: Array2<R>,
}

impl<I: NeighborId, R: DistanceValue> NeighborLayout<R> for DenseNeighbors<I, R> {
    type Id = I;

    fn from_rows(rows: Vec<Vec<(I, R)>>, width: Option<usize>) -> Self {
        let width = width.unwrap_or_else(|| rows.iter().map(Vec::len).max().unwrap_or(0));
        let mut indices = Array2::from_elem((rows.len(), width), I::NONE);
        let mut distances = Array2::from_elem((rows.len(), width), R::MAX);

        for (r, row) in rows.into_iter().enumerate() {
            for (c, (id, distance)) in row.into_iter().take(width).enumerate() {
                indices[[r, c]] = id;
                distances[[r, c]] = distance;
            }
        }

        Self { indices, distances }
    }

    fn check_width(queries: usize, width: usize) -> Result<()> {
        let cell = std::mem::size_of::<I>().max(std::mem::size_of::<R>());
        let fits = queries
            .checked_mul(width)
            .and_then(|cells| cells.checked_mul(cell))
            .map_or(false, |bytes| bytes <= isize::MAX as usize);
        if fits {
            Ok(())
        } else {
            Err(NnError::invalid_param(
                "k",
                format!("{} x {} dense result matrix is too large", queries, width),
            ))
        }
    }

    fn num_queries(&self) -> usize {
        self.indices.nrows()
    }
}

/// One variable-length row per query.
#[derive(Debug, Clone, PartialEq)]
pub struct RaggedNeighbors<I, R> {
    pub indices: Vec<Vec<I>>,
    pub distances: Vec<Vec<R>>,
}

impl<I: NeighborId, R: DistanceValue> NeighborLayout<R> for RaggedNeighbors<I, R> {
    type Id = I;

    fn from_rows(rows: Vec<Vec<(I, R)>>, _width: Option<usize>) -> Self {
        let (indices, distances) = rows
            .into_iter()
            .map(|row| row.into_iter().unzip::<I, R, Vec<I>, Vec<R>>())
            .unzip();
        Self { indices, distances }
    }

    fn num_queries(&self) -> usize {
        self.indices.len()
    }
}

/// Result of one search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults<L> {
    pub neighbors: L,
    /// Neighbors found across all queries.
    pub found: usize,
}
