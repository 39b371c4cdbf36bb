//! Index construction options and per-query search options

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NnError, Result};

/// Identifier of a concrete indexing strategy.
///
/// `Saved` is not an algorithm: it asks the facade to restore whatever
/// algorithm a saved file contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Linear,
    KdTree,
    Lsh,
    Hnsw,
    Saved,
}

impl Algorithm {
    /// Stable numeric code used in the file header.
    pub fn code(self) -> u32 {
        match self {
            Algorithm::Linear => 0,
            Algorithm::KdTree => 1,
            Algorithm::Lsh => 6,
            Algorithm::Hnsw => 7,
            Algorithm::Saved => 254,
        }
    }

    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(Algorithm::Linear),
            1 => Ok(Algorithm::KdTree),
            6 => Ok(Algorithm::Lsh),
            7 => Ok(Algorithm::Hnsw),
            254 => Ok(Algorithm::Saved),
            other => Err(NnError::UnsupportedAlgorithm(format!("code {}", other))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Linear => "linear",
            Algorithm::KdTree => "kdtree",
            Algorithm::Lsh => "lsh",
            Algorithm::Hnsw => "hnsw",
            Algorithm::Saved => "saved",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = NnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Algorithm::Linear),
            "kdtree" => Ok(Algorithm::KdTree),
            "lsh" => Ok(Algorithm::Lsh),
            "hnsw" => Ok(Algorithm::Hnsw),
            "saved" => Ok(Algorithm::Saved),
            other => Err(NnError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// A single option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v as f64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<Algorithm> for ParamValue {
    fn from(v: Algorithm) -> Self {
        ParamValue::Str(v.name().to_string())
    }
}

/// Option bag describing how to construct an index.
///
/// Always holds an `algorithm` entry; `saved` configurations also hold a
/// `filename`. Everything else is interpreted by the selected algorithm and
/// ignored by the facade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexParams {
    values: BTreeMap<String, ParamValue>,
}

impl IndexParams {
    pub fn new(algorithm: Algorithm) -> Self {
        let mut params = Self::default();
        params.insert("algorithm", algorithm);
        params
    }

    /// Brute-force exact search.
    pub fn linear() -> Self {
        Self::new(Algorithm::Linear)
    }

    /// Forest of `trees` randomized kd-trees.
    pub fn kdtree(trees: usize) -> Self {
        Self::new(Algorithm::KdTree).with("trees", trees)
    }

    pub fn lsh(table_number: usize, key_size: usize, multi_probe_level: usize) -> Self {
        Self::new(Algorithm::Lsh)
            .with("table_number", table_number)
            .with("key_size", key_size)
            .with("multi_probe_level", multi_probe_level)
    }

    pub fn hnsw(m: usize, ef_construction: usize) -> Self {
        Self::new(Algorithm::Hnsw)
            .with("m", m)
            .with("ef_construction", ef_construction)
    }

    /// Restore an index previously written with `save`.
    pub fn saved(filename: impl AsRef<Path>) -> Self {
        Self::new(Algorithm::Saved).with(
            "filename",
            filename.as_ref().to_string_lossy().into_owned(),
        )
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The requested algorithm, by name or numeric code.
    pub fn algorithm(&self) -> Result<Algorithm> {
        match self.get("algorithm") {
            None => Err(NnError::invalid_param("algorithm", "missing")),
            Some(ParamValue::Str(name)) => name.parse(),
            Some(ParamValue::Int(code)) => u32::try_from(*code)
                .map_err(|_| NnError::UnsupportedAlgorithm(format!("code {}", code)))
                .and_then(Algorithm::from_code),
            Some(other) => Err(NnError::invalid_param(
                "algorithm",
                format!("expected a name, got {}", other),
            )),
        }
    }

    pub fn filename(&self) -> Result<PathBuf> {
        match self.get("filename") {
            Some(ParamValue::Str(path)) => Ok(PathBuf::from(path)),
            Some(other) => Err(NnError::invalid_param(
                "filename",
                format!("expected a path, got {}", other),
            )),
            None => Err(NnError::invalid_param("filename", "missing")),
        }
    }

    pub fn get_usize(&self, key: &str, default: usize) -> Result<usize> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Int(v)) => usize::try_from(*v)
                .map_err(|_| NnError::invalid_param(key, format!("must be non-negative, got {}", v))),
            Some(other) => Err(NnError::invalid_param(
                key,
                format!("expected an integer, got {}", other),
            )),
        }
    }

    pub fn get_u64(&self, key: &str, default: u64) -> Result<u64> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Int(v)) => Ok(*v as u64),
            Some(other) => Err(NnError::invalid_param(
                key,
                format!("expected an integer, got {}", other),
            )),
        }
    }

    pub fn get_f64(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            None => Ok(default),
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f64),
            Some(other) => Err(NnError::invalid_param(
                key,
                format!("expected a number, got {}", other),
            )),
        }
    }

    /// Parse a flat JSON object such as `{"algorithm": "kdtree", "trees": 8}`.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| NnError::SerializationError(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| NnError::SerializationError(e.to_string()))
    }
}

/// How much work an approximate search may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Checks {
    /// Search exhaustively; exact for algorithms that support it.
    Unlimited,
    /// Examine at most this many candidates (or use it as the beam width).
    Limited(usize),
}

/// Per-query search options.
///
/// The facade passes these through untouched; each algorithm reads the
/// fields it understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    pub checks: Checks,
    /// Relative slack when pruning tree branches.
    pub eps: f32,
    /// Sort radius results by distance.
    pub sorted: bool,
    /// Cap on neighbors per query for radius search. `Some(0)` only counts.
    pub max_neighbors: Option<usize>,
    /// Worker threads for multi-query searches. 0 means one per core on the
    /// global rayon pool; values above 1 build a pool for each search call.
    pub cores: usize,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            checks: Checks::Limited(32),
            eps: 0.0,
            sorted: true,
            max_neighbors: None,
            cores: 1,
        }
    }
}

impl SearchParams {
    pub fn new(checks: Checks) -> Self {
        Self {
            checks,
            ..Self::default()
        }
    }

    /// Exhaustive search.
    pub fn exact() -> Self {
        Self::new(Checks::Unlimited)
    }

    pub fn with_eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_sorted(mut self, sorted: bool) -> Self {
        self.sorted = sorted;
        self
    }

    pub fn with_max_neighbors(mut self, max_neighbors: usize) -> Self {
        self.max_neighbors = Some(max_neighbors);
        self
    }

    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_from_name() {
        assert_eq!("kdtree".parse::<Algorithm>().unwrap(), Algorithm::KdTree);
        assert_eq!("HNSW".parse::<Algorithm>().unwrap(), Algorithm::Hnsw);
        assert!(matches!(
            "kmeans".parse::<Algorithm>(),
            Err(NnError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_algorithm_codes() {
        for algo in [
            Algorithm::Linear,
            Algorithm::KdTree,
            Algorithm::Lsh,
            Algorithm::Hnsw,
            Algorithm::Saved,
        ] {
            assert_eq!(Algorithm::from_code(algo.code()).unwrap(), algo);
        }
        assert!(Algorithm::from_code(3).is_err());
    }

    #[test]
    fn test_params_builders() {
        let params = IndexParams::kdtree(8);
        assert_eq!(params.algorithm().unwrap(), Algorithm::KdTree);
        assert_eq!(params.get_usize("trees", 4).unwrap(), 8);
        assert_eq!(params.get_usize("leaf_max_size", 10).unwrap(), 10);
    }

    #[test]
    fn test_saved_params() {
        let params = IndexParams::saved("/tmp/index.bin");
        assert_eq!(params.algorithm().unwrap(), Algorithm::Saved);
        assert_eq!(params.filename().unwrap(), PathBuf::from("/tmp/index.bin"));
    }

    #[test]
    fn test_missing_algorithm() {
        let params = IndexParams::default();
        assert!(matches!(
            params.algorithm(),
            Err(NnError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_numeric_algorithm_code() {
        let params = IndexParams::default().with("algorithm", 1);
        assert_eq!(params.algorithm().unwrap(), Algorithm::KdTree);
    }

    #[test]
    fn test_negative_usize_rejected() {
        let params = IndexParams::linear().with("trees", -2);
        assert!(params.get_usize("trees", 4).is_err());
    }

    #[test]
    fn test_json_roundtrip() {
        let params = IndexParams::from_json(r#"{"algorithm": "lsh", "key_size": 16, "eps": 0.5}"#)
            .unwrap();
        assert_eq!(params.algorithm().unwrap(), Algorithm::Lsh);
        assert_eq!(params.get_usize("key_size", 20).unwrap(), 16);
        assert_eq!(params.get_f64("eps", 0.0).unwrap(), 0.5);

        let decoded = IndexParams::from_json(&params.to_json().unwrap()).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn test_search_params_builders() {
        let params = SearchParams::exact().with_max_neighbors(5).with_cores(0);
        assert_eq!(params.checks, Checks::Unlimited);
        assert_eq!(params.max_neighbors, Some(5));
        assert_eq!(params.cores, 0);
        assert!(params.sorted);
    }
}
