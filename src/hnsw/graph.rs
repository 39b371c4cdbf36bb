//! HNSW graph: core data structures and algorithms.
//!
//! Implements the Hierarchical Navigable Small World graph from:
//! "Efficient and robust approximate nearest neighbor search using
//!  Hierarchical Navigable Small World graphs" (Malkov & Yashunin, 2016/2018).
//!
//! Nodes are keyed by storage slot and hold only adjacency; coordinates are
//! read from the [`PointStore`] passed into every call.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::distance::Distance;
use crate::error::{NnError, Result};
use crate::neighbor_queue::{MaxHeap, MinHeap, Neighbor};
use crate::params::IndexParams;
use crate::storage::PointStore;

/// Configuration parameters for the HNSW index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Max number of connections per node (layers > 0).
    pub m: usize,
    /// Max connections at layer 0 (typically 2 * m).
    pub m_max0: usize,
    /// Number of candidates during construction.
    pub ef_construction: usize,
    /// Number of candidates during search.
    pub ef_search: usize,
    /// Level generation factor: 1 / ln(m).
    pub ml: f64,
    /// Maximum number of layers.
    pub max_layers: usize,
    pub random_seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self::new(16, 200, 50)
    }
}

impl HnswParams {
    pub fn new(m: usize, ef_construction: usize, ef_search: usize) -> Self {
        Self {
            m,
            m_max0: 2 * m,
            ef_construction,
            ef_search,
            ml: 1.0 / (m as f64).ln(),
            max_layers: 16,
            random_seed: 42,
        }
    }

    pub fn from_index_params(params: &IndexParams) -> Result<Self> {
        let defaults = Self::default();
        let m = params.get_usize("m", defaults.m)?;
        if m < 2 {
            return Err(NnError::invalid_param("m", "must be at least 2"));
        }
        let ef_construction = params.get_usize("ef_construction", defaults.ef_construction)?;
        if ef_construction == 0 {
            return Err(NnError::invalid_param("ef_construction", "must be at least 1"));
        }
        let ef_search = params.get_usize("ef_search", defaults.ef_search)?;
        let max_layers = params.get_usize("max_layers", defaults.max_layers)?;
        if max_layers == 0 {
            return Err(NnError::invalid_param("max_layers", "must be at least 1"));
        }

        Ok(Self {
            max_layers,
            random_seed: params.get_u64("random_seed", defaults.random_seed)?,
            ..Self::new(m, ef_construction, ef_search)
        })
    }

    pub fn to_index_params(&self) -> IndexParams {
        IndexParams::hnsw(self.m, self.ef_construction)
            .with("ef_search", self.ef_search)
            .with("max_layers", self.max_layers)
            .with("random_seed", self.random_seed)
    }
}

/// A node in the HNSW graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct HnswNode {
    /// Neighbors per layer. neighbors[l] is the list of neighbor slots at layer l.
    neighbors: Vec<Vec<usize>>,
    /// The maximum layer this node was inserted into.
    level: usize,
}

fn unseeded() -> StdRng {
    StdRng::seed_from_u64(0)
}

/// The HNSW graph structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswGraph {
    /// Nodes indexed by storage slot. `None` for slots never inserted.
    nodes: Vec<Option<HnswNode>>,
    /// Entry point node slot (highest-level node).
    entry_point: Option<usize>,
    /// Current maximum level in the graph.
    max_level: usize,
    /// HNSW parameters.
    params: HnswParams,
    /// RNG for level generation.
    #[serde(skip, default = "unseeded")]
    rng: StdRng,
}

impl HnswGraph {
    pub fn new(params: HnswParams) -> Self {
        Self {
            nodes: Vec::new(),
            entry_point: None,
            max_level: 0,
            params,
            rng: StdRng::seed_from_u64(params.random_seed),
        }
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    /// Number of nodes in the graph, tombstoned slots included.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_point.is_none()
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    /// Continue level generation deterministically after a reload.
    pub fn reseed(&mut self) {
        let offset = self.nodes.len() as u64;
        self.rng = StdRng::seed_from_u64(self.params.random_seed.wrapping_add(offset));
    }

    /// Generate a random level for a new node.
    fn random_level(&mut self) -> usize {
        let r: f64 = self.rng.gen();
        let level = (-r.ln() * self.params.ml).floor() as usize;
        level.min(self.params.max_layers - 1)
    }

    /// SEARCH-LAYER: Algorithm 2 from the HNSW paper.
    ///
    /// Search a single layer of the graph for the ef closest neighbors to query.
    /// `ep` is the set of entry points (their slots).
    /// With `live_only`, tombstoned slots are still expanded but never take
    /// one of the `ef` result slots.
    /// Returns the ef closest neighbors found, closest first.
    #[allow(clippy::too_many_arguments)]
    fn search_layer<D: Distance>(
        &self,
        store: &PointStore<D::Element>,
        distance: &D,
        query: &[D::Element],
        ep: &[usize],
        ef: usize,
        layer: usize,
        live_only: bool,
    ) -> Vec<Neighbor<D::Result>> {
        let mut visited = HashSet::new();
        let mut candidates = MinHeap::new(); // closest candidate on top
        let mut results = MaxHeap::new(); // furthest result on top
        let counts = |slot: usize| !live_only || !store.is_removed(slot);

        for &ep_id in ep {
            let dist = distance.distance(query, store.point(ep_id));
            visited.insert(ep_id);
            candidates.push(Neighbor::new(ep_id, dist));
            if counts(ep_id) {
                results.push(Neighbor::new(ep_id, dist));
            }
        }

        while let Some(c) = candidates.pop() {
            // Stop once the beam is full and the closest candidate is further
            // than its furthest result
            if results.len() >= ef {
                if let Some(furthest) = results.peek() {
                    if c.distance > furthest.distance {
                        break;
                    }
                }
            }

            // Explore neighbors of c at this layer
            let Some(node) = &self.nodes[c.id] else {
                continue;
            };
            let Some(links) = node.neighbors.get(layer) else {
                continue;
            };
            for &neighbor_id in links {
                if !visited.insert(neighbor_id) {
                    continue;
                }

                let dist = distance.distance(query, store.point(neighbor_id));
                let closer = results.peek().map_or(true, |f| dist < f.distance);
                if closer || results.len() < ef {
                    candidates.push(Neighbor::new(neighbor_id, dist));
                    if counts(neighbor_id) {
                        results.push_bounded(Neighbor::new(neighbor_id, dist), ef);
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Select the M closest neighbors from candidates (simple selection, Algorithm 3).
    fn select_neighbors_simple<R: PartialOrd>(candidates: &[Neighbor<R>], m: usize) -> Vec<usize> {
        candidates.iter().take(m).map(|n| n.id).collect()
    }

    /// Prune a node's neighbor list at a given layer to at most `m` neighbors.
    fn prune_neighbors<D: Distance>(
        &mut self,
        store: &PointStore<D::Element>,
        distance: &D,
        slot: usize,
        layer: usize,
        m: usize,
    ) {
        let Some(Some(node)) = self.nodes.get_mut(slot) else {
            return;
        };
        let Some(links) = node.neighbors.get_mut(layer) else {
            return;
        };

        // Score each neighbor by distance
        let origin = store.point(slot);
        let mut scored: Vec<Neighbor<D::Result>> = links
            .iter()
            .map(|&nid| Neighbor::new(nid, distance.distance(origin, store.point(nid))))
            .collect();
        scored.sort();
        scored.truncate(m);

        *links = scored.into_iter().map(|n| n.id).collect();
    }

    /// INSERT: Algorithm 1 from the HNSW paper.
    pub fn insert<D: Distance>(&mut self, store: &PointStore<D::Element>, distance: &D, slot: usize) {
        let level = self.random_level();

        // Ensure the nodes Vec is large enough
        if slot >= self.nodes.len() {
            self.nodes.resize_with(slot + 1, || None);
        }

        self.nodes[slot] = Some(HnswNode {
            neighbors: vec![Vec::new(); level + 1],
            level,
        });

        // If this is the first node, set it as entry point
        let entry_point = match self.entry_point {
            None => {
                self.entry_point = Some(slot);
                self.max_level = level;
                return;
            }
            Some(ep) => ep,
        };

        let query = store.point(slot);
        let mut ep_id = entry_point;
        let current_max_level = self.max_level;

        // Phase 1: Greedy descent from top layer down to level+1 (ef=1)
        if current_max_level > level {
            for l in (level + 1..=current_max_level).rev() {
                let nearest = self.search_layer(store, distance, query, &[ep_id], 1, l, false);
                if let Some(n) = nearest.first() {
                    ep_id = n.id;
                }
            }
        }

        // Phase 2: Insert at layers min(level, current_max_level) down to 0
        let insert_from = level.min(current_max_level);
        for l in (0..=insert_from).rev() {
            let m = if l == 0 {
                self.params.m_max0
            } else {
                self.params.m
            };

            let nearest = self.search_layer(
                store,
                distance,
                query,
                &[ep_id],
                self.params.ef_construction,
                l,
                false,
            );

            // Select M closest neighbors
            let neighbors = Self::select_neighbors_simple(&nearest, m);

            if let Some(node) = &mut self.nodes[slot] {
                node.neighbors[l] = neighbors.clone();
            }

            // Add bidirectional connections
            for &neighbor_id in &neighbors {
                let needs_pruning = match &mut self.nodes[neighbor_id] {
                    Some(neighbor_node) if l < neighbor_node.neighbors.len() => {
                        neighbor_node.neighbors[l].push(slot);
                        neighbor_node.neighbors[l].len() > m
                    }
                    _ => false,
                };

                // If over capacity, prune in a separate step to avoid borrow conflicts
                if needs_pruning {
                    self.prune_neighbors(store, distance, neighbor_id, l, m);
                }
            }

            // Update ep for next layer
            if let Some(n) = nearest.first() {
                ep_id = n.id;
            }
        }

        // Update entry point if new node has a higher level
        if level > self.max_level {
            self.entry_point = Some(slot);
            self.max_level = level;
        }
    }

    /// SEARCH: Algorithm 5 from the HNSW paper.
    ///
    /// Returns up to `ef` live candidates closest first. Tombstoned slots
    /// still route the descent but are left out of the layer-0 beam.
    pub fn search<D: Distance>(
        &self,
        store: &PointStore<D::Element>,
        distance: &D,
        query: &[D::Element],
        ef: usize,
    ) -> Vec<Neighbor<D::Result>> {
        let Some(entry_point) = self.entry_point else {
            return Vec::new();
        };

        let mut ep_id = entry_point;

        // Phase 1: Greedy descent from top layer to layer 1 (ef=1)
        for l in (1..=self.max_level).rev() {
            let nearest = self.search_layer(store, distance, query, &[ep_id], 1, l, false);
            if let Some(n) = nearest.first() {
                ep_id = n.id;
            }
        }

        // Phase 2: Search layer 0 with ef candidates
        self.search_layer(store, distance, query, &[ep_id], ef.max(1), 0, true)
    }

    /// Reject graphs whose links point outside `slot_count` slots.
    pub fn validate(&self, slot_count: usize) -> Result<()> {
        let in_range = self.nodes.len() <= slot_count
            && self.entry_point.map_or(true, |ep| {
                matches!(self.nodes.get(ep), Some(Some(node)) if node.level == self.max_level)
            })
            && self.nodes.iter().flatten().all(|node| {
                node.neighbors.len() == node.level + 1
                    && node.neighbors.iter().flatten().all(|&n| {
                        matches!(self.nodes.get(n), Some(Some(_)))
                    })
            });
        if in_range {
            Ok(())
        } else {
            Err(NnError::InvalidFormat(
                "graph references out of range".to_string(),
            ))
        }
    }

    /// Approximate heap bytes held by adjacency lists.
    pub fn memory(&self) -> usize {
        let links: usize = self
            .nodes
            .iter()
            .flatten()
            .map(|node| {
                node.neighbors
                    .iter()
                    .map(|l| l.capacity() * std::mem::size_of::<usize>())
                    .sum::<usize>()
                    + node.neighbors.capacity() * std::mem::size_of::<Vec<usize>>()
            })
            .sum();
        self.nodes.capacity() * std::mem::size_of::<Option<HnswNode>>() + links
    }
}
