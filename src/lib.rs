//! # nnsearch
//!
//! A lifecycle and dispatch layer for nearest-neighbor indices.
//!
//! This library provides:
//! - One [`Index`] facade over linear, kd-tree, LSH and HNSW algorithms
//! - Incremental insertion with amortized rebuilds, and point removal
//! - A versioned binary file format with element-type validation
//! - k-nearest and radius queries returning dense or ragged results
//!
//! ## Example
//!
//! ```rust
//! use ndarray::array;
//! use nnsearch::{DenseNeighbors, Index, IndexParams, SearchParams, SearchResults, L2};
//!
//! let points = array![[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0], [5.0, 5.0]];
//! let mut index = Index::with_points(points.view(), IndexParams::kdtree(4), L2::default())?;
//! index.build_index()?;
//!
//! let query = array![[0.0f32, 0.0]];
//! let results: SearchResults<DenseNeighbors<usize, f32>> =
//!     index.knn_search(query.view(), 2, &SearchParams::exact())?;
//! assert_eq!(results.neighbors.indices[[0, 0]], 0);
//! # Ok::<(), nnsearch::NnError>(())
//! ```

pub mod dataset;
pub mod datatype;
pub mod distance;
pub mod error;
pub mod facade;
pub mod flat_index;
pub mod hnsw;
pub mod index;
pub mod kdtree;
pub mod layout;
pub mod logging;
pub mod lsh;
pub mod neighbor_queue;
pub mod params;
pub mod persistence;
pub mod registry;
pub mod result_set;
pub mod storage;

pub use datatype::{DataType, Element};
pub use distance::{Cosine, Distance, DistanceValue, L1, L2};
pub use error::{NnError, Result};
pub use facade::{Index, DEFAULT_REBUILD_THRESHOLD};
pub use flat_index::LinearIndex;
pub use hnsw::{HnswIndex, HnswParams};
pub use index::NnIndex;
pub use kdtree::{KdTreeIndex, KdTreeParams};
pub use layout::{DenseNeighbors, NeighborId, NeighborLayout, RaggedNeighbors, SearchResults};
pub use logging::{init_logging, LogLevel};
pub use lsh::{LshIndex, LshParams};
pub use params::{Algorithm, Checks, IndexParams, ParamValue, SearchParams};
pub use registry::create_index_by_type;
pub use storage::PointStore;
