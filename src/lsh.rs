//! Random-hyperplane locality sensitive hashing with multi-probe lookup.
//!
//! Every table draws `key_size` Gaussian hyperplanes through the centroid of
//! the data seen at build time. A point's key holds one bit per hyperplane,
//! set when the point lies on the positive side. Queries visit their own
//! bucket plus every bucket within Hamming distance `multi_probe_level`, and
//! rank the union of candidates with the real metric.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::mem;

use ndarray::{Array2, ArrayView2};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::datatype::Element;
use crate::distance::Distance;
use crate::error::{NnError, Result};
use crate::index::NnIndex;
use crate::params::{Algorithm, IndexParams, SearchParams};
use crate::persistence::serialization::{read_bincode, write_bincode};
use crate::result_set::ResultSet;
use crate::storage::PointStore;

/// Bits in a bucket key.
pub const MAX_KEY_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LshParams {
    pub table_number: usize,
    pub key_size: usize,
    pub multi_probe_level: usize,
    pub random_seed: u64,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            table_number: 12,
            key_size: 20,
            multi_probe_level: 2,
            random_seed: 42,
        }
    }
}

impl LshParams {
    pub fn from_index_params(params: &IndexParams) -> Result<Self> {
        let defaults = Self::default();
        let table_number = params.get_usize("table_number", defaults.table_number)?;
        if table_number == 0 {
            return Err(NnError::invalid_param("table_number", "must be at least 1"));
        }
        let key_size = params.get_usize("key_size", defaults.key_size)?;
        if key_size == 0 || key_size > MAX_KEY_SIZE {
            return Err(NnError::invalid_param(
                "key_size",
                format!("must be within 1..={}, got {}", MAX_KEY_SIZE, key_size),
            ));
        }
        let multi_probe_level = params.get_usize("multi_probe_level", defaults.multi_probe_level)?;

        Ok(Self {
            table_number,
            key_size,
            multi_probe_level: multi_probe_level.min(key_size),
            random_seed: params.get_u64("random_seed", defaults.random_seed)?,
        })
    }

    pub fn to_index_params(&self) -> IndexParams {
        IndexParams::lsh(self.table_number, self.key_size, self.multi_probe_level)
            .with("random_seed", self.random_seed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LshTable {
    /// `key_size` rows of `veclen` coefficients, row-major
    planes: Vec<f64>,
    buckets: HashMap<u64, Vec<usize>>,
}

impl LshTable {
    fn key(&self, point: &[f64], key_size: usize) -> u64 {
        let veclen = point.len();
        let mut key = 0u64;
        for bit in 0..key_size {
            let plane = &self.planes[bit * veclen..(bit + 1) * veclen];
            let side: f64 = plane.iter().zip(point).map(|(a, b)| a * b).sum();
            if side >= 0.0 {
                key |= 1u64 << bit;
            }
        }
        key
    }
}

#[derive(Debug, Clone)]
pub struct LshIndex<D: Distance> {
    store: PointStore<D::Element>,
    distance: D,
    params: LshParams,
    centroid: Vec<f64>,
    tables: Vec<LshTable>,
}

impl<D: Distance> LshIndex<D> {
    pub fn new(distance: D, params: &IndexParams) -> Result<Self> {
        Ok(Self {
            store: PointStore::new(0),
            distance,
            params: LshParams::from_index_params(params)?,
            centroid: Vec::new(),
            tables: Vec::new(),
        })
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

    pub fn lsh_params(&self) -> &LshParams {
        &self.params
    }

    /// Coordinates relative to the build centroid.
    fn centered(&self, point: &[D::Element]) -> Vec<f64> {
        point
            .iter()
            .zip(&self.centroid)
            .map(|(v, c)| v.to_f64() - c)
            .collect()
    }

    fn hash_slot(&mut self, slot: usize) {
        let centered = self.centered(self.store.point(slot));
        let key_size = self.params.key_size;
        for table in self.tables.iter_mut() {
            let key = table.key(&centered, key_size);
            table.buckets.entry(key).or_default().push(slot);
        }
    }
}

/// Call `visit` on `key` and on every key within `level` bit flips of it.
fn for_each_probe(key: u64, key_size: usize, level: usize, visit: &mut dyn FnMut(u64)) {
    visit(key);
    flip_from(key, 0, key_size, level, visit);
}

fn flip_from(key: u64, from: usize, key_size: usize, level: usize, visit: &mut dyn FnMut(u64)) {
    if level == 0 {
        return;
    }
    for bit in from..key_size {
        let probe = key ^ (1u64 << bit);
        visit(probe);
        flip_from(probe, bit + 1, key_size, level - 1, visit);
    }
}

impl<D: Distance> NnIndex<D> for LshIndex<D> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Lsh
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
        let veclen = self.store.veclen();
        let live = self.store.len();

        let mut centroid = vec![0.0f64; veclen];
        for slot in self.store.live_slots() {
            for (c, v) in centroid.iter_mut().zip(self.store.point(slot)) {
                *c += v.to_f64();
            }
        }
        if live > 0 {
            for c in centroid.iter_mut() {
                *c /= live as f64;
            }
        }
        self.centroid = centroid;

        let mut rng = StdRng::seed_from_u64(self.params.random_seed);
        self.tables = (0..self.params.table_number)
            .map(|_| {
                let planes: Array2<f64> =
                    Array2::random_using((self.params.key_size, veclen), StandardNormal, &mut rng);
                LshTable {
                    planes: planes.into_raw_vec(),
                    buckets: HashMap::new(),
                }
            })
            .collect();

        let slots: Vec<usize> = self.store.live_slots().collect();
        for slot in slots {
            self.hash_slot(slot);
        }
        Ok(())
    }

    fn insert_points(&mut self, first_slot: usize) -> Result<()> {
        if self.tables.is_empty() || self.centroid.len() != self.store.veclen() {
            return self.build_structure();
        }
        for slot in first_slot..self.store.slot_count() {
            self.hash_slot(slot);
        }
        Ok(())
    }

    /// Checks and eps are ignored: the probe set alone bounds the work.
    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet<D::Result>,
        query: &[D::Element],
        _params: &SearchParams,
    ) -> Result<()> {
        if self.tables.is_empty() {
            return Ok(());
        }

        let centered = self.centered(query);
        let mut seen = vec![false; self.store.slot_count()];
        for table in &self.tables {
            let key = table.key(&centered, self.params.key_size);
            for_each_probe(
                key,
                self.params.key_size,
                self.params.multi_probe_level,
                &mut |probe| {
                    let Some(bucket) = table.buckets.get(&probe) else {
                        return;
                    };
                    for &slot in bucket {
                        if seen[slot] || self.store.is_removed(slot) {
                            continue;
                        }
                        seen[slot] = true;
                        let dist = self.distance.distance(query, self.store.point(slot));
                        result.add_point(dist, slot);
                    }
                },
            );
        }
        Ok(())
    }

    fn structure_memory(&self) -> usize {
        let tables: usize = self
            .tables
            .iter()
            .map(|table| {
                let buckets: usize = table
                    .buckets
                    .values()
                    .map(|b| mem::size_of::<u64>() + b.capacity() * mem::size_of::<usize>())
                    .sum();
                table.planes.capacity() * mem::size_of::<f64>() + buckets
            })
            .sum();
        self.centroid.capacity() * mem::size_of::<f64>() + tables
    }

    fn save_structure(&self, writer: &mut dyn Write) -> Result<()> {
        write_bincode(writer, &(&self.params, &self.centroid, &self.tables))
    }

    fn load_structure(&mut self, reader: &mut dyn Read) -> Result<()> {
        let (params, centroid, tables): (LshParams, Vec<f64>, Vec<LshTable>) =
            read_bincode(reader)?;

        let veclen = self.store.veclen();
        let slot_count = self.store.slot_count();
        let valid = params.key_size <= MAX_KEY_SIZE
            && centroid.len() == veclen
            && tables.iter().all(|table| {
                table.planes.len() == params.key_size * veclen
                    && table.buckets.values().flatten().all(|&s| s < slot_count)
            });
        if !valid {
            return Err(NnError::InvalidFormat(
                "hash tables do not match the stored points".to_string(),
            ));
        }

        self.params = params;
        self.centroid = centroid;
        self.tables = tables;
        Ok(())
    }

    fn parameters(&self) -> IndexParams {
        self.params.to_index_params()
    }
}
