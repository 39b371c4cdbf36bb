//! Index trait for pluggable search backends

use std::fmt;
use std::io::{Read, Write};

use ndarray::{ArrayView1, ArrayView2};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::datatype::Element;
use crate::distance::Distance;
use crate::error::{NnError, Result};
use crate::layout::{NeighborId, NeighborLayout, SearchResults};
use crate::neighbor_queue::Neighbor;
use crate::params::{Algorithm, IndexParams, SearchParams};
use crate::persistence::header::IndexHeader;
use crate::persistence::serialization::{read_bincode, write_bincode};
use crate::result_set::{
    CountRadiusResultSet, KnnRadiusResultSet, KnnResultSet, RadiusResultSet, ResultSet,
};
use crate::storage::PointStore;

/// A nearest-neighbor algorithm over points stored in a [`PointStore`].
///
/// Algorithms work in storage slots. Stable ids, tombstones and the rebuild
/// policy are handled by the provided methods, so an implementation only
/// has to build, extend, search and (de)serialize its own structure.
pub trait NnIndex<D: Distance>: Send + Sync + fmt::Debug {
    fn algorithm(&self) -> Algorithm;

    fn store(&self) -> &PointStore<D::Element>;

    fn store_mut(&mut self) -> &mut PointStore<D::Element>;

    /// Deep copy behind a fresh box.
    fn clone_index(&self) -> Box<dyn NnIndex<D>>;

    /// Build the search structure from scratch over every slot in the store.
    /// The store has no tombstones when this is called.
    fn build_structure(&mut self) -> Result<()>;

    /// Extend the structure with the slots from `first_slot` onwards.
    fn insert_points(&mut self, first_slot: usize) -> Result<()>;

    /// Report candidates for `query` into `result`. Tombstoned slots must not
    /// be reported.
    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet<D::Result>,
        query: &[D::Element],
        params: &SearchParams,
    ) -> Result<()>;

    /// Bytes held by the structure, excluding the store.
    fn structure_memory(&self) -> usize;

    fn save_structure(&self, writer: &mut dyn Write) -> Result<()>;

    fn load_structure(&mut self, reader: &mut dyn Read) -> Result<()>;

    /// Effective construction parameters, defaults filled in.
    fn parameters(&self) -> IndexParams;

    fn build_index(&mut self) -> Result<()> {
        let compacted = self.store_mut().compact();
        self.build_structure()?;
        self.store_mut().mark_built();
        info!(
            algorithm = %self.algorithm(),
            points = self.store().len(),
            compacted,
            "built index"
        );
        Ok(())
    }

    /// Replace the dataset with `points` and build over it.
    fn build_index_with(&mut self, points: ArrayView2<'_, D::Element>) -> Result<()> {
        self.store_mut().replace(points);
        self.build_index()
    }

    /// Append points, then either rebuild from scratch or insert them
    /// incrementally depending on how much the index has grown.
    fn add_points(
        &mut self,
        points: ArrayView2<'_, D::Element>,
        rebuild_threshold: f32,
    ) -> Result<()> {
        let first = self.store_mut().append(points)?;
        if points.nrows() == 0 {
            return Ok(());
        }

        if self.store().needs_rebuild(rebuild_threshold) {
            debug!(
                added = points.nrows(),
                size_at_build = self.store().size_at_build(),
                "rebuilding after insert"
            );
            self.build_index()
        } else {
            debug!(added = points.nrows(), "inserting incrementally");
            self.insert_points(first)
        }
    }

    fn remove_point(&mut self, id: usize) -> Result<()> {
        self.store_mut().remove(id)
    }

    fn get_point(&self, id: usize) -> Option<&[D::Element]> {
        self.store().get(id)
    }

    fn veclen(&self) -> usize {
        self.store().veclen()
    }

    fn size(&self) -> usize {
        self.store().len()
    }

    fn used_memory(&self) -> usize {
        self.store().memory() + self.structure_memory()
    }

    /// Write header, point store and structure.
    fn save_index(&self, writer: &mut dyn Write) -> Result<()> {
        let header = IndexHeader::new(
            <D::Element as Element>::DATA_TYPE,
            self.algorithm(),
            self.size(),
            self.veclen(),
        );
        header.write_to(writer)?;
        write_bincode(writer, self.store())?;
        self.save_structure(writer)
    }

    /// Read a stream written by [`NnIndex::save_index`], header included.
    fn load_index(&mut self, reader: &mut dyn Read) -> Result<()> {
        let header = IndexHeader::read_from(reader)?;
        let expected = <D::Element as Element>::DATA_TYPE;
        if header.data_type != expected {
            return Err(NnError::IncompatibleIndex {
                expected,
                found: header.data_type,
            });
        }
        if header.algorithm != self.algorithm() {
            return Err(NnError::InvalidFormat(format!(
                "file holds a {} index, expected {}",
                header.algorithm,
                self.algorithm()
            )));
        }

        let mut store: PointStore<D::Element> = read_bincode(reader)?;
        store.reindex();
        store.validate()?;
        if store.len() as u64 != header.rows || store.veclen() as u64 != header.cols {
            return Err(NnError::InvalidFormat(format!(
                "header describes {}x{} points, payload holds {}x{}",
                header.rows,
                header.cols,
                store.len(),
                store.veclen()
            )));
        }

        *self.store_mut() = store;
        self.load_structure(reader)
    }
}

// Shape adaptation shared by every algorithm.
impl<D: Distance> dyn NnIndex<D> {
    /// k nearest neighbors of every query row.
    pub fn knn_search<L>(
        &self,
        queries: ArrayView2<'_, D::Element>,
        k: usize,
        params: &SearchParams,
    ) -> Result<SearchResults<L>>
    where
        L: NeighborLayout<D::Result>,
    {
        self.check_queries(&queries)?;
        if k == 0 {
            return Err(NnError::invalid_param("k", "must be at least 1"));
        }
        L::check_width(queries.nrows(), k)?;

        let rows = self.run_queries(queries, params, |query| {
            let mut result = KnnResultSet::new(k);
            self.find_neighbors(&mut result, query, params)?;
            Ok(result.into_sorted())
        })?;

        self.assemble(rows, Some(k))
    }

    /// Every neighbor strictly closer than `radius`, honoring
    /// `params.max_neighbors` and `params.sorted`.
    pub fn radius_search<L>(
        &self,
        queries: ArrayView2<'_, D::Element>,
        radius: D::Result,
        params: &SearchParams,
    ) -> Result<SearchResults<L>>
    where
        L: NeighborLayout<D::Result>,
    {
        self.check_queries(&queries)?;

        match params.max_neighbors {
            Some(0) => {
                let counts = self.run_queries(queries, params, |query| {
                    let mut result = CountRadiusResultSet::new(radius);
                    self.find_neighbors(&mut result, query, params)?;
                    Ok(result.count())
                })?;
                let rows = counts.iter().map(|_| Vec::new()).collect();
                Ok(SearchResults {
                    neighbors: L::from_rows(rows, Some(0)),
                    found: counts.iter().sum(),
                })
            }
            Some(max) => {
                L::check_width(queries.nrows(), max)?;
                let rows = self.run_queries(queries, params, |query| {
                    let mut result = KnnRadiusResultSet::new(max, radius);
                    self.find_neighbors(&mut result, query, params)?;
                    Ok(result.into_sorted())
                })?;
                self.assemble(rows, Some(max))
            }
            None => {
                let rows = self.run_queries(queries, params, |query| {
                    let mut result = RadiusResultSet::new(radius);
                    self.find_neighbors(&mut result, query, params)?;
                    Ok(result.into_neighbors(params.sorted))
                })?;
                self.assemble(rows, None)
            }
        }
    }

    fn check_queries(&self, queries: &ArrayView2<'_, D::Element>) -> Result<()> {
        let veclen = self.veclen();
        if veclen != 0 && queries.ncols() != veclen {
            return Err(NnError::DimensionMismatch {
                expected: veclen,
                actual: queries.ncols(),
            });
        }
        Ok(())
    }

    /// Run `search` for every query row, in parallel when `params.cores != 1`.
    /// `cores > 1` builds a dedicated pool for each call; use `0` to share
    /// the global rayon pool across calls.
    fn run_queries<O, F>(
        &self,
        queries: ArrayView2<'_, D::Element>,
        params: &SearchParams,
        search: F,
    ) -> Result<Vec<O>>
    where
        O: Send,
        F: Fn(&[D::Element]) -> Result<O> + Sync,
    {
        let search_row = |row: &ArrayView1<'_, D::Element>| match row.as_slice() {
            Some(query) => search(query),
            None => search(&row.to_vec()),
        };

        let rows: Vec<ArrayView1<'_, D::Element>> = queries.outer_iter().collect();
        debug!(queries = rows.len(), cores = params.cores, "dispatching search");

        match params.cores {
            1 => rows.iter().map(search_row).collect(),
            0 => rows.par_iter().map(search_row).collect(),
            threads => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| NnError::IndexError(e.to_string()))?;
                pool.install(|| rows.par_iter().map(search_row).collect())
            }
        }
    }

    /// Map slots to the layout's id kind and build the container.
    fn assemble<L>(
        &self,
        rows: Vec<Vec<Neighbor<D::Result>>>,
        width: Option<usize>,
    ) -> Result<SearchResults<L>>
    where
        L: NeighborLayout<D::Result>,
    {
        let store = self.store();
        let mut found = 0;
        let mut mapped = Vec::with_capacity(rows.len());
        for row in rows {
            found += row.len();
            let row = row
                .into_iter()
                .map(|n| {
                    let raw = if L::Id::STABLE { store.id_of(n.id) } else { n.id };
                    Ok((L::Id::from_usize(raw)?, n.distance))
                })
                .collect::<Result<Vec<_>>>()?;
            mapped.push(row);
        }

        Ok(SearchResults {
            neighbors: L::from_rows(mapped, width),
            found,
        })
    }
}
