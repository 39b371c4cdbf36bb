//! Distance metrics for point similarity

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::datatype::Element;

/// Scalar type a distance evaluates to.
pub trait DistanceValue:
    Copy
    + PartialOrd
    + Default
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    const ZERO: Self;
    /// Sentinel for "no distance yet"; also used to pad dense result rows.
    const MAX: Self;

    fn from_f64(value: f64) -> Self;

    fn to_f64(self) -> f64;
}

impl DistanceValue for f32 {
    const ZERO: Self = 0.0;
    const MAX: Self = f32::INFINITY;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl DistanceValue for f64 {
    const ZERO: Self = 0.0;
    const MAX: Self = f64::INFINITY;

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }
}

/// A dissimilarity function between two fixed-length vectors.
///
/// Metrics whose value is a sum of independent per-axis terms set
/// `AXIS_DECOMPOSABLE` and implement [`Distance::axis_distance`]; tree
/// indices rely on that to bound the distance to a splitting plane.
pub trait Distance: Clone + Default + fmt::Debug + Send + Sync + 'static {
    type Element: Element;
    type Result: DistanceValue;

    const AXIS_DECOMPOSABLE: bool = false;

    fn distance(&self, a: &[Self::Element], b: &[Self::Element]) -> Self::Result;

    /// Contribution of a single axis where one side sits at `a` and the other at `b`.
    fn axis_distance(&self, _a: f64, _b: f64) -> f64 {
        f64::INFINITY
    }

    fn name(&self) -> &'static str;
}

/// Squared Euclidean distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct L2<T>(PhantomData<T>);

impl<T: Element> Distance for L2<T> {
    type Element = T;
    type Result = T::Accumulator;

    const AXIS_DECOMPOSABLE: bool = true;

    fn distance(&self, a: &[T], b: &[T]) -> Self::Result {
        let sum: f64 = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| {
                let d = x.to_f64() - y.to_f64();
                d * d
            })
            .sum();
        Self::Result::from_f64(sum)
    }

    #[inline]
    fn axis_distance(&self, a: f64, b: f64) -> f64 {
        (a - b) * (a - b)
    }

    fn name(&self) -> &'static str {
        "l2"
    }
}

/// Manhattan (L1) distance.
#[derive(Debug, Clone, Copy, Default)]
pub struct L1<T>(PhantomData<T>);

impl<T: Element> Distance for L1<T> {
    type Element = T;
    type Result = T::Accumulator;

    const AXIS_DECOMPOSABLE: bool = true;

    fn distance(&self, a: &[T], b: &[T]) -> Self::Result {
        let sum: f64 = a
            .iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x.to_f64() - y.to_f64()).abs())
            .sum();
        Self::Result::from_f64(sum)
    }

    #[inline]
    fn axis_distance(&self, a: f64, b: f64) -> f64 {
        (a - b).abs()
    }

    fn name(&self) -> &'static str {
        "l1"
    }
}

/// Cosine distance (1 - cosine similarity).
///
/// A zero vector has no direction; it is treated as orthogonal to everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cosine<T>(PhantomData<T>);

impl<T: Element> Distance for Cosine<T> {
    type Element = T;
    type Result = T::Accumulator;

    fn distance(&self, a: &[T], b: &[T]) -> Self::Result {
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;
        for (&x, &y) in a.iter().zip(b.iter()) {
            let (x, y) = (x.to_f64(), y.to_f64());
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }

        if norm_a == 0.0 || norm_b == 0.0 {
            return Self::Result::from_f64(1.0);
        }

        // Clamp to [-1, 1] to handle floating point errors
        let similarity = (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0);
        Self::Result::from_f64(1.0 - similarity)
    }

    fn name(&self) -> &'static str {
        "cosine"
    }
}
