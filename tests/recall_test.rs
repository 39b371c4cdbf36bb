//! Recall tests: approximate algorithms against linear ground truth.

use std::collections::HashSet;

use ndarray::{s, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;

use nnsearch::{Checks, Index, IndexParams, RaggedNeighbors, SearchParams, SearchResults, L2};

fn random_points(n: usize, dim: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::random_using((n, dim), Uniform::new(0.0f32, 1.0), &mut rng)
}

fn search(
    index: &Index<L2<f32>>,
    queries: &Array2<f32>,
    k: usize,
    params: &SearchParams,
) -> Vec<Vec<usize>> {
    let results: SearchResults<RaggedNeighbors<usize, f32>> =
        index.knn_search(queries.view(), k, params).unwrap();
    results.neighbors.indices
}

fn recall_at_k(truth: &[Vec<usize>], found: &[Vec<usize>]) -> f64 {
    let mut total = 0.0;
    for (expected, actual) in truth.iter().zip(found) {
        let ground_truth: HashSet<usize> = expected.iter().copied().collect();
        let hits = actual.iter().filter(|id| ground_truth.contains(id)).count();
        total += hits as f64 / expected.len() as f64;
    }
    total / truth.len() as f64
}

fn test_recall(params: IndexParams, search_params: SearchParams, n: usize, dim: usize, min_recall: f64) {
    let points = random_points(n, dim, 42);
    let queries = random_points(50, dim, 43);
    let k = 10;

    let mut linear = Index::with_points(points.view(), IndexParams::linear(), L2::default()).unwrap();
    linear.build_index().unwrap();
    let mut index = Index::with_points(points.view(), params, L2::default()).unwrap();
    index.build_index().unwrap();

    let truth = search(&linear, &queries, k, &SearchParams::exact());
    let found = search(&index, &queries, k, &search_params);
    let recall = recall_at_k(&truth, &found);
    assert!(
        recall >= min_recall,
        "{} recall {:.3} is below threshold {:.3} for n={}, dim={}",
        index.index_type(),
        recall,
        min_recall,
        n,
        dim
    );
}

#[test]
fn test_kdtree_exact_recall() {
    test_recall(IndexParams::kdtree(4), SearchParams::exact(), 1000, 8, 1.0);
}

#[test]
fn test_kdtree_approximate_recall() {
    test_recall(
        IndexParams::kdtree(8),
        SearchParams::new(Checks::Limited(512)),
        1000,
        8,
        0.85,
    );
}

#[test]
fn test_hnsw_recall() {
    test_recall(
        IndexParams::hnsw(16, 200),
        SearchParams::new(Checks::Limited(100)),
        1000,
        32,
        0.90,
    );
}

#[test]
fn test_lsh_recall() {
    test_recall(IndexParams::lsh(10, 8, 2), SearchParams::default(), 1000, 8, 0.6);
}

#[test]
fn test_incremental_kdtree_matches_fresh_build() {
    let points = random_points(800, 6, 7);
    let queries = random_points(30, 6, 8);

    let mut fresh = Index::with_points(points.view(), IndexParams::kdtree(4), L2::default()).unwrap();
    fresh.build_index().unwrap();

    let mut grown = Index::new(IndexParams::kdtree(4), L2::<f32>::default()).unwrap();
    for start in (0..800).step_by(100) {
        grown.add_points(points.slice(s![start..start + 100, ..])).unwrap();
    }
    assert_eq!(grown.size(), 800);

    let exact = SearchParams::exact();
    assert_eq!(
        search(&grown, &queries, 5, &exact),
        search(&fresh, &queries, 5, &exact)
    );
}

#[test]
fn test_incremental_hnsw_recall() {
    let points = random_points(1000, 16, 9);
    let queries = random_points(30, 16, 10);

    let mut linear = Index::with_points(points.view(), IndexParams::linear(), L2::default()).unwrap();
    linear.build_index().unwrap();

    let mut grown = Index::new(IndexParams::hnsw(16, 100), L2::<f32>::default()).unwrap();
    for start in (0..1000).step_by(250) {
        grown.add_points(points.slice(s![start..start + 250, ..])).unwrap();
    }

    let truth = search(&linear, &queries, 10, &SearchParams::exact());
    let found = search(&grown, &queries, 10, &SearchParams::new(Checks::Limited(100)));
    let recall = recall_at_k(&truth, &found);
    assert!(recall >= 0.85, "incremental hnsw recall {:.3}", recall);
}
