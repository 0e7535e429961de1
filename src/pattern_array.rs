//! Step arrays and the pure constructors exposed to patches
//!
//! A `PatternArray` is an ordered run of integer steps: 0/1 gates from a
//! Euclidean generator, or raw step values. Every transform returns a new
//! array, so arrays can be shared between voices freely.

use crate::error::ConfigError;
use crate::euclid;
use serde::{Deserialize, Serialize};
use std::ops::Deref;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatternArray {
    values: Vec<i64>,
}

/// How `range` steps between its bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RangeStep {
    /// Explicit step; the end bound is excluded
    Step(i64),
    /// Unit step towards `end`, including `end` when `true`
    Inclusive(bool),
}

impl Default for RangeStep {
    fn default() -> Self {
        RangeStep::Step(1)
    }
}

impl PatternArray {
    pub fn new(values: Vec<i64>) -> Self {
        Self { values }
    }

    /// Euclidean gates, see [`euclid::euclid`]
    pub fn euclid(pulses: usize, steps: usize, rotation: i64) -> Self {
        Self::new(euclid::euclid(pulses, steps, rotation))
    }

    /// Integer range with Python-like bounds.
    ///
    /// With `end == None` the range runs from 0 up to `start`.
    pub fn range(start: i64, end: Option<i64>, step: RangeStep) -> Result<Self, ConfigError> {
        let (from, to) = match end {
            Some(end) => (start, end),
            None => (0, start),
        };

        let (step, inclusive) = match step {
            RangeStep::Step(0) => return Err(ConfigError::ZeroRangeStep),
            RangeStep::Step(step) => (step, false),
            RangeStep::Inclusive(inclusive) => (if to < from { -1 } else { 1 }, inclusive),
        };

        let mut values = Vec::new();
        let mut current = from;
        let within = |v: i64| match (step > 0, inclusive) {
            (true, false) => v < to,
            (true, true) => v <= to,
            (false, false) => v > to,
            (false, true) => v >= to,
        };
        while within(current) {
            values.push(current);
            current += step;
        }

        Ok(Self::new(values))
    }

    /// Repeat each step `factor` times in place: `out[i] = in[i / factor]`
    pub fn stretch(&self, factor: usize) -> Self {
        let values = self
            .values
            .iter()
            .flat_map(|&v| std::iter::repeat(v).take(factor))
            .collect();
        Self::new(values)
    }

    /// Rotate right by `n` steps (left when negative)
    pub fn rotate(&self, n: i64) -> Self {
        let mut values = self.values.clone();
        euclid::rotate(&mut values, n);
        Self::new(values)
    }

    /// Number of non-zero steps
    pub fn onsets(&self) -> usize {
        self.values.iter().filter(|&&v| v != 0).count()
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn into_vec(self) -> Vec<i64> {
        self.values
    }
}

impl Deref for PatternArray {
    type Target = [i64];

    fn deref(&self) -> &[i64] {
        &self.values
    }
}

impl From<Vec<i64>> for PatternArray {
    fn from(values: Vec<i64>) -> Self {
        Self::new(values)
    }
}

impl std::fmt::Display for PatternArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &v in &self.values {
            match v {
                0 => write!(f, ".")?,
                1 => write!(f, "x")?,
                other => write!(f, "[{}]", other)?,
            }
        }
        Ok(())
    }
}

/// `euclid(pulses, steps, rotation)` as bound for patches
pub fn euclid(pulses: usize, steps: usize, rotation: i64) -> PatternArray {
    PatternArray::euclid(pulses, steps, rotation)
}

/// `range(start, end, stepOrInclusive)` as bound for patches
pub fn range(start: i64, end: Option<i64>, step: RangeStep) -> Result<PatternArray, ConfigError> {
    PatternArray::range(start, end, step)
}

/// `stretch(array, factor)` as bound for patches
pub fn stretch(values: &[i64], factor: usize) -> PatternArray {
    PatternArray::new(values.to_vec()).stretch(factor)
}
