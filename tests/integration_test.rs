//! Integration tests for the index facade

use approx::assert_relative_eq;
use ndarray::{array, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

use nnsearch::{
    Algorithm, DenseNeighbors, Index, IndexParams, NnError, RaggedNeighbors, SearchParams,
    SearchResults, L2,
};

fn random_points(n: usize, dim: usize, seed: u64) -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::random_using((n, dim), Uniform::new(0.0f32, 1.0), &mut rng)
}

fn built(points: &Array2<f32>, params: IndexParams) -> Index<L2<f32>> {
    let mut index = Index::with_points(points.view(), params, L2::default()).unwrap();
    index.build_index().unwrap();
    index
}

fn all_algorithms() -> Vec<IndexParams> {
    vec![
        IndexParams::linear(),
        IndexParams::kdtree(4),
        IndexParams::lsh(8, 12, 2),
        IndexParams::hnsw(8, 64),
    ]
}

#[test]
fn test_basic_workflow() {
    let points = array![[0.0f32, 0.0], [1.0, 0.0], [0.0, 1.0], [5.0, 5.0]];
    let mut index = built(&points, IndexParams::kdtree(2));
    assert_eq!(index.size(), 4);
    assert_eq!(index.veclen(), 2);
    assert_eq!(index.index_type(), Algorithm::KdTree);

    let results: SearchResults<DenseNeighbors<usize, f32>> = index
        .knn_search(array![[4.0f32, 4.0]].view(), 1, &SearchParams::exact())
        .unwrap();
    assert_eq!(results.neighbors.indices[[0, 0]], 3);
    assert_relative_eq!(results.neighbors.distances[[0, 0]], 2.0);

    index.add_points(array![[4.0f32, 4.0]].view()).unwrap();
    assert_eq!(index.size(), 5);
    let results: SearchResults<DenseNeighbors<usize, f32>> = index
        .knn_search(array![[4.0f32, 4.0]].view(), 1, &SearchParams::exact())
        .unwrap();
    assert_eq!(results.neighbors.indices[[0, 0]], 4);
    assert_eq!(results.neighbors.distances[[0, 0]], 0.0);
}

#[test]
fn test_save_load_round_trip_every_algorithm() {
    let dir = tempdir().unwrap();
    let points = random_points(300, 8, 7);
    let queries = random_points(10, 8, 8);

    for params in all_algorithms() {
        let index = built(&points, params);
        let path = dir.path().join(format!("{}.idx", index.index_type()));
        index.save(&path).unwrap();

        let loaded = Index::new(IndexParams::saved(&path), L2::<f32>::default()).unwrap();
        assert!(loaded.is_loaded());
        assert_eq!(loaded.index_type(), index.index_type());
        assert_eq!(loaded.size(), index.size());
        assert_eq!(loaded.veclen(), index.veclen());
        assert_eq!(loaded.parameters(), index.parameters());

        let search = SearchParams::default();
        let before: SearchResults<DenseNeighbors<usize, f32>> =
            index.knn_search(queries.view(), 5, &search).unwrap();
        let after: SearchResults<DenseNeighbors<usize, f32>> =
            loaded.knn_search(queries.view(), 5, &search).unwrap();
        assert_eq!(before, after, "{} results changed after reload", index.index_type());
    }
}

#[test]
fn test_load_with_wrong_element_type() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("f32.idx");
    built(&random_points(20, 3, 1), IndexParams::linear())
        .save(&path)
        .unwrap();

    let result = Index::new(IndexParams::saved(&path), L2::<f64>::default());
    assert!(matches!(result, Err(NnError::IncompatibleIndex { .. })));
}

#[test]
fn test_load_missing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nope.idx");
    let result = Index::new(IndexParams::saved(&path), L2::<f32>::default());
    assert!(matches!(result, Err(NnError::CannotOpenFile { .. })));
}

#[test]
fn test_load_garbage_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.idx");
    std::fs::write(&path, b"definitely not an index file at all").unwrap();
    let result = Index::new(IndexParams::saved(&path), L2::<f32>::default());
    assert!(matches!(result, Err(NnError::InvalidFormat(_))));
}

#[test]
fn test_build_after_load_keeps_structure() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kd.idx");
    let points = random_points(100, 4, 3);
    built(&points, IndexParams::kdtree(2)).save(&path).unwrap();

    let mut loaded = Index::new(IndexParams::saved(&path), L2::<f32>::default()).unwrap();
    let memory = loaded.used_memory();
    loaded.build_index().unwrap();
    assert_eq!(loaded.size(), 100);
    assert_eq!(loaded.used_memory(), memory);

    // Replacing the data is still honored
    loaded.build_index_with(points.slice(ndarray::s![..10, ..])).unwrap();
    assert_eq!(loaded.size(), 10);
}

#[test]
fn test_clone_is_deep() {
    let points = random_points(50, 4, 5);
    let index = built(&points, IndexParams::hnsw(8, 32));
    let mut copy = index.clone();
    copy.add_points(random_points(25, 4, 6).view()).unwrap();
    copy.remove_point(0).unwrap();

    assert_eq!(index.size(), 50);
    assert_eq!(copy.size(), 74);
    assert!(index.get_point(0).is_some());
    assert!(copy.get_point(0).is_none());
}

#[test]
fn test_removed_point_never_returned() {
    let points = random_points(120, 5, 11);
    for params in all_algorithms() {
        let mut index = built(&points, params);
        let algorithm = index.index_type();
        let target = 17;
        let query = points.slice(ndarray::s![target..target + 1, ..]).to_owned();

        index.remove_point(target).unwrap();
        assert_eq!(index.size(), 119);
        assert!(matches!(
            index.remove_point(target),
            Err(NnError::PointNotFound { id: 17 })
        ));

        let results: SearchResults<RaggedNeighbors<usize, f32>> = index
            .knn_search(query.view(), 10, &SearchParams::exact())
            .unwrap();
        assert!(
            !results.neighbors.indices[0].contains(&target),
            "{} returned a removed point",
            algorithm
        );

        // And not after a rebuild either
        index.build_index().unwrap();
        let results: SearchResults<RaggedNeighbors<usize, f32>> = index
            .knn_search(query.view(), 10, &SearchParams::exact())
            .unwrap();
        assert!(!results.neighbors.indices[0].contains(&target));
        assert_eq!(index.size(), 119);
    }
}

#[test]
fn test_ids_stable_across_rebuild() {
    let points = random_points(40, 3, 13);
    let mut index = built(&points, IndexParams::linear());
    index.remove_point(0).unwrap();
    index.build_index().unwrap();

    let query = points.slice(ndarray::s![39..40, ..]).to_owned();
    let stable: SearchResults<DenseNeighbors<usize, f32>> = index
        .knn_search(query.view(), 1, &SearchParams::exact())
        .unwrap();
    assert_eq!(stable.neighbors.indices[[0, 0]], 39);

    // Narrow ids are dense positions, shifted by the compaction
    let narrow: SearchResults<DenseNeighbors<i32, f32>> = index
        .knn_search(query.view(), 1, &SearchParams::exact())
        .unwrap();
    assert_eq!(narrow.neighbors.indices[[0, 0]], 38);
}

#[test]
fn test_parallel_queries_match_sequential() {
    let points = random_points(500, 6, 17);
    let queries = random_points(40, 6, 18);
    let index = built(&points, IndexParams::kdtree(4));

    let sequential: SearchResults<DenseNeighbors<usize, f32>> = index
        .knn_search(queries.view(), 8, &SearchParams::default())
        .unwrap();
    // 0 shares the global pool; 2 and 3 each build their own
    for cores in [0, 2, 3] {
        let parallel: SearchResults<DenseNeighbors<usize, f32>> = index
            .knn_search(queries.view(), 8, &SearchParams::default().with_cores(cores))
            .unwrap();
        assert_eq!(parallel, sequential);
    }
}

#[test]
fn test_radius_layouts() {
    let points = array![[0.0f32], [1.0], [2.0], [3.0], [10.0]];
    let index = built(&points, IndexParams::linear());
    let queries = array![[0.0f32], [10.0]];

    let ragged: SearchResults<RaggedNeighbors<usize, f32>> = index
        .radius_search(queries.view(), 5.0, &SearchParams::exact())
        .unwrap();
    // Squared L2: 0, 1, 4 are below 5; 9 is not
    assert_eq!(ragged.neighbors.indices, vec![vec![0, 1, 2], vec![4]]);
    assert_eq!(ragged.found, 4);

    let dense: SearchResults<DenseNeighbors<usize, f32>> = index
        .radius_search(queries.view(), 5.0, &SearchParams::exact())
        .unwrap();
    assert_eq!(dense.neighbors.indices.dim(), (2, 3));
    assert_eq!(dense.neighbors.indices[[1, 1]], usize::MAX);
    assert!(dense.neighbors.distances[[1, 1]].is_infinite());

    let capped: SearchResults<DenseNeighbors<usize, f32>> = index
        .radius_search(
            queries.view(),
            5.0,
            &SearchParams::exact().with_max_neighbors(2),
        )
        .unwrap();
    assert_eq!(capped.neighbors.indices.dim(), (2, 2));
    assert_eq!(capped.found, 3);
}

#[test]
fn test_incremental_growth_from_empty() {
    let mut index = Index::new(IndexParams::kdtree(2), L2::<f32>::default()).unwrap();
    assert_eq!(index.size(), 0);
    assert_eq!(index.veclen(), 0);

    for batch in 0..5 {
        index
            .add_points(random_points(20, 3, 100 + batch).view())
            .unwrap();
    }
    assert_eq!(index.size(), 100);
    assert_eq!(index.veclen(), 3);

    let wrong = index.add_points(random_points(1, 4, 0).view());
    assert!(matches!(
        wrong,
        Err(NnError::DimensionMismatch { expected: 3, actual: 4 })
    ));
}

#[test]
fn test_self_query_every_algorithm() {
    let points = random_points(200, 8, 21);
    for params in all_algorithms() {
        let index = built(&points, params);
        let results: SearchResults<DenseNeighbors<usize, f32>> = index
            .knn_search(points.view(), 1, &SearchParams::default())
            .unwrap();
        assert_eq!(results.found, 200);
        for i in 0..points.nrows() {
            assert_eq!(
                results.neighbors.indices[[i, 0]],
                i,
                "{} missed point {}",
                index.index_type(),
                i
            );
            assert_eq!(results.neighbors.distances[[i, 0]], 0.0);
        }
    }
}

#[test]
fn test_four_points_repeatable_narrow() {
    let points = array![[0.0f32, 0.0], [1.0, 0.0], [0.0, 2.0], [5.0, 5.0]];
    let index = built(&points, IndexParams::linear());
    let query = array![[0.0f32, 0.0]];
    let params = SearchParams::default();

    let first: SearchResults<DenseNeighbors<i32, f32>> =
        index.knn_search(query.view(), 2, &params).unwrap();
    let second: SearchResults<DenseNeighbors<i32, f32>> =
        index.knn_search(query.view(), 2, &params).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.neighbors.indices, array![[0, 1]]);
    assert_eq!(first.neighbors.distances, array![[0.0f32, 1.0]]);

    let first: SearchResults<RaggedNeighbors<i32, f32>> =
        index.knn_search(query.view(), 2, &params).unwrap();
    let second: SearchResults<RaggedNeighbors<i32, f32>> =
        index.knn_search(query.view(), 2, &params).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.neighbors.indices, vec![vec![0, 1]]);
    assert_eq!(first.neighbors.distances, vec![vec![0.0f32, 1.0]]);
}

#[test]
fn test_unbounded_k() {
    let points = array![[0.0f32, 0.0], [1.0, 0.0], [0.0, 2.0], [5.0, 5.0]];
    let index = built(&points, IndexParams::linear());
    let query = array![[0.0f32, 0.0]];

    let ragged: SearchResults<RaggedNeighbors<usize, f32>> = index
        .knn_search(query.view(), usize::MAX, &SearchParams::default())
        .unwrap();
    assert_eq!(ragged.found, 4);
    assert_eq!(ragged.neighbors.indices, vec![vec![0, 1, 2, 3]]);

    let dense = index.knn_search::<DenseNeighbors<usize, f32>>(
        query.view(),
        usize::MAX,
        &SearchParams::default(),
    );
    assert!(matches!(dense, Err(NnError::InvalidParameter { .. })));
}
