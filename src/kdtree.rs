//! Randomized kd-tree forest.
//!
//! Each tree splits on an axis drawn at random from the few axes with the
//! highest variance, cutting at the mean. Approximate queries descend every
//! tree and then explore the closest unexplored branches across the whole
//! forest until the check budget is spent. Exhaustive queries run an exact
//! branch-and-bound on the first tree.

use std::io::{Read, Write};
use std::mem;

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::datatype::Element;
use crate::distance::{Distance, DistanceValue};
use crate::error::{NnError, Result};
use crate::index::NnIndex;
use crate::neighbor_queue::{MinHeap, Neighbor};
use crate::params::{Algorithm, Checks, IndexParams, SearchParams};
use crate::persistence::serialization::{read_bincode, write_bincode};
use crate::result_set::ResultSet;
use crate::storage::PointStore;

/// Points sampled when estimating per-axis mean and variance.
const SAMPLE_MEAN: usize = 100;

/// Number of highest-variance axes a split is drawn from.
const RAND_DIM: usize = 5;

/// Parameters controlling forest construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdTreeParams {
    /// Number of randomized trees
    pub trees: usize,
    /// A leaf is split once it holds more than this many points
    pub leaf_max_size: usize,
    pub random_seed: u64,
}

impl Default for KdTreeParams {
    fn default() -> Self {
        Self {
            trees: 4,
            leaf_max_size: 8,
            random_seed: 42,
        }
    }
}

impl KdTreeParams {
    pub fn from_index_params(params: &IndexParams) -> Result<Self> {
        let defaults = Self::default();
        let trees = params.get_usize("trees", defaults.trees)?;
        if trees == 0 {
            return Err(NnError::invalid_param("trees", "must be at least 1"));
        }
        let leaf_max_size = params.get_usize("leaf_max_size", defaults.leaf_max_size)?;
        if leaf_max_size == 0 {
            return Err(NnError::invalid_param("leaf_max_size", "must be at least 1"));
        }

        Ok(Self {
            trees,
            leaf_max_size,
            random_seed: params.get_u64("random_seed", defaults.random_seed)?,
        })
    }

    pub fn to_index_params(&self) -> IndexParams {
        IndexParams::kdtree(self.trees)
            .with("leaf_max_size", self.leaf_max_size)
            .with("random_seed", self.random_seed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum KdNode {
    Leaf {
        slots: Vec<usize>,
    },
    Split {
        dim: usize,
        cut: f64,
        left: usize,
        right: usize,
    },
}

/// Forest of randomized kd-trees. Requires an axis-decomposable metric.
#[derive(Debug, Clone)]
pub struct KdTreeIndex<D: Distance> {
    store: PointStore<D::Element>,
    distance: D,
    params: KdTreeParams,
    /// Arena shared by every tree
    nodes: Vec<KdNode>,
    roots: Vec<usize>,
    rng: StdRng,
}

impl<D: Distance> KdTreeIndex<D> {
    pub fn new(distance: D, params: &IndexParams) -> Result<Self> {
        if !D::AXIS_DECOMPOSABLE {
            return Err(NnError::invalid_param(
                "distance",
                format!("kd-tree needs an axis-decomposable metric, got {}", distance.name()),
            ));
        }
        let params = KdTreeParams::from_index_params(params)?;

        Ok(Self {
            store: PointStore::new(0),
            distance,
            params,
            nodes: Vec::new(),
            roots: Vec::new(),
            rng: StdRng::seed_from_u64(params.random_seed),
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

    pub fn kdtree_params(&self) -> &KdTreeParams {
        &self.params
    }

    /// Turn the node at `at` into a subtree over `slots`.
    fn grow(&mut self, at: usize, slots: Vec<usize>) {
        let mut pending = vec![(at, slots)];
        while let Some((at, slots)) = pending.pop() {
            match choose_split(&self.store, &mut self.rng, self.params.leaf_max_size, &slots) {
                Some((dim, cut, left_slots, right_slots)) => {
                    let left = self.nodes.len();
                    let right = left + 1;
                    self.nodes.push(KdNode::Leaf { slots: Vec::new() });
                    self.nodes.push(KdNode::Leaf { slots: Vec::new() });
                    self.nodes[at] = KdNode::Split {
                        dim,
                        cut,
                        left,
                        right,
                    };
                    pending.push((left, left_slots));
                    pending.push((right, right_slots));
                }
                None => self.nodes[at] = KdNode::Leaf { slots },
            }
        }
    }

    fn add_to_tree(&mut self, root: usize, slot: usize) {
        let point = self.store.point(slot);
        let mut at = root;
        loop {
            match &mut self.nodes[at] {
                KdNode::Split {
                    dim,
                    cut,
                    left,
                    right,
                } => {
                    at = if point[*dim].to_f64() < *cut { *left } else { *right };
                }
                KdNode::Leaf { slots } => {
                    slots.push(slot);
                    if slots.len() > self.params.leaf_max_size {
                        let slots = mem::take(slots);
                        self.grow(at, slots);
                    }
                    return;
                }
            }
        }
    }

    fn report_leaf(
        &self,
        slots: &[usize],
        result: &mut dyn ResultSet<D::Result>,
        query: &[D::Element],
    ) {
        for &slot in slots {
            if self.store.is_removed(slot) {
                continue;
            }
            let dist = self.distance.distance(query, self.store.point(slot));
            result.add_point(dist, slot);
        }
    }

    /// Exact search. `offsets` holds, per axis, the contribution of that axis
    /// to `mindist`, the lower bound on the distance to the current cell.
    fn search_exact(
        &self,
        result: &mut dyn ResultSet<D::Result>,
        query: &[D::Element],
        node: usize,
        mindist: f64,
        offsets: &mut [f64],
        eps_error: f64,
    ) {
        match &self.nodes[node] {
            KdNode::Leaf { slots } => self.report_leaf(slots, result, query),
            KdNode::Split {
                dim,
                cut,
                left,
                right,
            } => {
                let val = query[*dim].to_f64();
                let (best, other) = if val < *cut { (*left, *right) } else { (*right, *left) };

                self.search_exact(result, query, best, mindist, offsets, eps_error);

                let cut_dist = self.distance.axis_distance(val, *cut);
                let new_dist = mindist + cut_dist - offsets[*dim];
                if D::Result::from_f64(new_dist * eps_error) <= result.worst_dist() {
                    let saved = offsets[*dim];
                    offsets[*dim] = cut_dist;
                    self.search_exact(result, query, other, new_dist, offsets, eps_error);
                    offsets[*dim] = saved;
                }
            }
        }
    }

    /// Descend to a leaf, queueing the branches not taken.
    #[allow(clippy::too_many_arguments)]
    fn search_level(
        &self,
        result: &mut dyn ResultSet<D::Result>,
        query: &[D::Element],
        mut node: usize,
        mindist: f64,
        budget: &mut Budget,
        eps_error: f64,
        branches: &mut MinHeap<f64>,
    ) {
        if D::Result::from_f64(mindist) > result.worst_dist() {
            return;
        }
        loop {
            match &self.nodes[node] {
                KdNode::Leaf { slots } => {
                    if budget.spent() && result.is_full() {
                        return;
                    }
                    for &slot in slots {
                        if budget.visited[slot] || self.store.is_removed(slot) {
                            continue;
                        }
                        budget.visited[slot] = true;
                        budget.checks += 1;
                        let dist = self.distance.distance(query, self.store.point(slot));
                        result.add_point(dist, slot);
                    }
                    return;
                }
                KdNode::Split {
                    dim,
                    cut,
                    left,
                    right,
                } => {
                    let val = query[*dim].to_f64();
                    let (best, other) = if val < *cut { (*left, *right) } else { (*right, *left) };
                    let new_dist = mindist + self.distance.axis_distance(val, *cut);
                    if D::Result::from_f64(new_dist * eps_error) < result.worst_dist()
                        || !result.is_full()
                    {
                        branches.push(Neighbor::new(other, new_dist));
                    }
                    node = best;
                }
            }
        }
    }
}

struct Budget {
    checks: usize,
    max_checks: usize,
    visited: Vec<bool>,
}

impl Budget {
    fn spent(&self) -> bool {
        self.checks >= self.max_checks
    }
}

/// Pick a split for `slots`, or `None` if they should stay a leaf.
fn choose_split<T: Element>(
    store: &PointStore<T>,
    rng: &mut StdRng,
    leaf_max_size: usize,
    slots: &[usize],
) -> Option<(usize, f64, Vec<usize>, Vec<usize>)> {
    if slots.len() <= leaf_max_size {
        return None;
    }

    let veclen = store.veclen();
    let sample = &slots[..slots.len().min(SAMPLE_MEAN)];
    let mut mean = vec![0.0f64; veclen];
    for &slot in sample {
        for (m, v) in mean.iter_mut().zip(store.point(slot)) {
            *m += v.to_f64();
        }
    }
    for m in mean.iter_mut() {
        *m /= sample.len() as f64;
    }

    let mut var = vec![0.0f64; veclen];
    for &slot in sample {
        for ((acc, v), m) in var.iter_mut().zip(store.point(slot)).zip(&mean) {
            let d = v.to_f64() - m;
            *acc += d * d;
        }
    }

    let mut axes: Vec<(f64, usize)> = var
        .into_iter()
        .enumerate()
        .filter(|&(_, v)| v > 0.0)
        .map(|(dim, v)| (v, dim))
        .collect();
    if axes.is_empty() {
        return None;
    }
    axes.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    axes.truncate(RAND_DIM);

    let dim = axes[rng.gen_range(0..axes.len())].1;
    let cut = mean[dim];
    let (left, right): (Vec<usize>, Vec<usize>) = slots
        .iter()
        .partition(|&&slot| store.point(slot)[dim].to_f64() < cut);
    if left.is_empty() || right.is_empty() {
        return None;
    }
    Some((dim, cut, left, right))
}

impl<D: Distance> NnIndex<D> for KdTreeIndex<D> {
    fn algorithm(&self) -> Algorithm {
        Algorithm::KdTree
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
        self.nodes.clear();
        self.roots.clear();
        self.rng = StdRng::seed_from_u64(self.params.random_seed);

        for _ in 0..self.params.trees {
            let root = self.nodes.len();
            self.nodes.push(KdNode::Leaf { slots: Vec::new() });
            let slots: Vec<usize> = self.store.live_slots().collect();
            self.grow(root, slots);
            self.roots.push(root);
        }
        Ok(())
    }

    fn insert_points(&mut self, first_slot: usize) -> Result<()> {
        if self.roots.is_empty() {
            return self.build_structure();
        }
        let roots = self.roots.clone();
        for slot in first_slot..self.store.slot_count() {
            for &root in &roots {
                self.add_to_tree(root, slot);
            }
        }
        Ok(())
    }

    fn find_neighbors(
        &self,
        result: &mut dyn ResultSet<D::Result>,
        query: &[D::Element],
        params: &SearchParams,
    ) -> Result<()> {
        let Some(&first_root) = self.roots.first() else {
            return Ok(());
        };
        let eps_error = 1.0 + params.eps as f64;

        match params.checks {
            Checks::Unlimited => {
                let mut offsets = vec![0.0f64; self.store.veclen()];
                self.search_exact(result, query, first_root, 0.0, &mut offsets, eps_error);
            }
            Checks::Limited(max_checks) => {
                let mut budget = Budget {
                    checks: 0,
                    max_checks,
                    visited: vec![false; self.store.slot_count()],
                };
                let mut branches = MinHeap::new();
                for &root in &self.roots {
                    self.search_level(result, query, root, 0.0, &mut budget, eps_error, &mut branches);
                }
                while let Some(branch) = branches.pop() {
                    if budget.spent() && result.is_full() {
                        break;
                    }
                    self.search_level(
                        result,
                        query,
                        branch.id,
                        branch.distance,
                        &mut budget,
                        eps_error,
                        &mut branches,
                    );
                }
            }
        }
        Ok(())
    }

    fn structure_memory(&self) -> usize {
        let leaves: usize = self
            .nodes
            .iter()
            .map(|node| match node {
                KdNode::Leaf { slots } => slots.capacity() * mem::size_of::<usize>(),
                KdNode::Split { .. } => 0,
            })
            .sum();
        self.nodes.capacity() * mem::size_of::<KdNode>()
            + self.roots.capacity() * mem::size_of::<usize>()
            + leaves
    }

    fn save_structure(&self, writer: &mut dyn Write) -> Result<()> {
        write_bincode(writer, &(&self.params, &self.nodes, &self.roots))
    }

    fn load_structure(&mut self, reader: &mut dyn Read) -> Result<()> {
        let (params, nodes, roots): (KdTreeParams, Vec<KdNode>, Vec<usize>) = read_bincode(reader)?;

        let slot_count = self.store.slot_count();
        let valid = roots.iter().all(|&r| r < nodes.len())
            && nodes.iter().all(|node| match node {
                KdNode::Leaf { slots } => slots.iter().all(|&s| s < slot_count),
                KdNode::Split {
                    dim, left, right, ..
                } => *dim < self.store.veclen() && *left < nodes.len() && *right < nodes.len(),
            });
        if !valid {
            return Err(NnError::InvalidFormat(
                "kd-tree references out of range".to_string(),
            ));
        }

        self.params = params;
        self.nodes = nodes;
        self.roots = roots;
        self.rng = StdRng::seed_from_u64(params.random_seed);
        Ok(())
    }

    fn parameters(&self) -> IndexParams {
        self.params.to_index_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::{Cosine, L2};
    use crate::flat_index::LinearIndex;
    use crate::layout::RaggedNeighbors;
    use ndarray::Array2;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn random_points(n: usize, dim: usize, seed: u64) -> Array2<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        Array2::random_using((n, dim), Uniform::new(-1.0f32, 1.0), &mut rng)
    }

    fn build(points: &Array2<f32>, params: IndexParams) -> Box<dyn NnIndex<L2<f32>>> {
        let mut index = KdTreeIndex::with_points(points.view(), L2::default(), &params).unwrap();
        index.build_index().unwrap();
        Box::new(index)
    }

    #[test]
    fn test_requires_decomposable_metric() {
        let result = KdTreeIndex::new(Cosine::<f32>::default(), &IndexParams::kdtree(2));
        assert!(matches!(result, Err(NnError::InvalidParameter { .. })));
    }

    #[test]
    fn test_rejects_zero_trees() {
        let result = KdTreeIndex::new(L2::<f32>::default(), &IndexParams::kdtree(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_exact_search_matches_linear() {
        let points = random_points(300, 4, 7);
        let queries = random_points(20, 4, 8);
        let kdtree = build(&points, IndexParams::kdtree(2).with("leaf_max_size", 4));
        let linear: Box<dyn NnIndex<L2<f32>>> = {
            let mut index = LinearIndex::with_points(points.view(), L2::default());
            index.build_index().unwrap();
            Box::new(index)
        };

        let params = SearchParams::exact();
        let expected = linear
            .knn_search::<RaggedNeighbors<usize, f32>>(queries.view(), 5, &params)
            .unwrap();
        let actual = kdtree
            .knn_search::<RaggedNeighbors<usize, f32>>(queries.view(), 5, &params)
            .unwrap();
        assert_eq!(actual.neighbors.indices, expected.neighbors.indices);
    }

    #[test]
    fn test_self_query_limited_checks() {
        let points = random_points(200, 3, 11);
        let index = build(&points, IndexParams::kdtree(4));
        let results = index
            .knn_search::<RaggedNeighbors<usize, f32>>(points.view(), 1, &SearchParams::default())
            .unwrap();
        for (i, row) in results.neighbors.indices.iter().enumerate() {
            assert_eq!(row[0], i);
        }
    }

    #[test]
    fn test_incremental_insert_splits_leaves() {
        let points = random_points(50, 2, 3);
        let mut index = KdTreeIndex::with_points(points.view(), L2::default(), &IndexParams::kdtree(1))
            .unwrap();
        index.build_index().unwrap();
        let nodes_before = index.nodes.len();

        let extra = random_points(40, 2, 4);
        index.add_points(extra.view(), 0.0).unwrap();
        assert!(index.nodes.len() > nodes_before);
        assert_eq!(index.size(), 90);

        let index: Box<dyn NnIndex<L2<f32>>> = Box::new(index);
        let results = index
            .knn_search::<RaggedNeighbors<usize, f32>>(extra.view(), 1, &SearchParams::exact())
            .unwrap();
        for (i, row) in results.neighbors.indices.iter().enumerate() {
            assert_eq!(row[0], 50 + i);
        }
    }

    #[test]
    fn test_constant_points_stay_in_one_leaf() {
        let points = Array2::from_elem((20, 3), 1.0f32);
        let index = build(&points, IndexParams::kdtree(1).with("leaf_max_size", 2));
        let results = index
            .knn_search::<RaggedNeighbors<usize, f32>>(points.slice(ndarray::s![0..1, ..]), 3, &SearchParams::exact())
            .unwrap();
        assert_eq!(results.neighbors.indices[0], vec![0, 1, 2]);
    }

    #[test]
    fn test_parameters_report_defaults() {
        let index = KdTreeIndex::new(L2::<f32>::default(), &IndexParams::kdtree(3)).unwrap();
        let params = index.parameters();
        assert_eq!(params.get_usize("trees", 0).unwrap(), 3);
        assert_eq!(params.get_usize("leaf_max_size", 0).unwrap(), 8);
        assert_eq!(
            index.kdtree_params(),
            &KdTreeParams {
                trees: 3,
                ..KdTreeParams::default()
            }
        );
    }
}
