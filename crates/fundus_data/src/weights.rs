//! Inverse-frequency class weighting for imbalanced grade distributions.

use crate::types::Grade;
use std::collections::BTreeMap;

/// Per-grade inverse-frequency weights: `weight[g] = total / count[g]`.
///
/// Grades that never occur are absent from the table; `weight` returns
/// `None` for them rather than a zero or infinite weight. The weights are
/// not normalized — weighted samplers only care about relative magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassWeights {
    counts: BTreeMap<Grade, usize>,
    weights: BTreeMap<Grade, f64>,
    total: usize,
}

impl ClassWeights {
    pub fn compute(grades: impl IntoIterator<Item = Grade>) -> Self {
        let mut counts: BTreeMap<Grade, usize> = BTreeMap::new();
        let mut total = 0usize;
        for grade in grades {
            *counts.entry(grade).or_insert(0) += 1;
            total += 1;
        }
        let weights = counts
            .iter()
            .map(|(&grade, &count)| (grade, total as f64 / count as f64))
            .collect();
        Self {
            counts,
            weights,
            total,
        }
    }

    /// `None` for grades absent from the data the table was computed from.
    pub fn weight(&self, grade: Grade) -> Option<f64> {
        self.weights.get(&grade).copied()
    }

    pub fn count(&self, grade: Grade) -> usize {
        self.counts.get(&grade).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &BTreeMap<Grade, usize> {
        &self.counts
    }

    /// Total samples counted, across all grades.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Present grades and their weights, in grade order.
    pub fn iter(&self) -> impl Iterator<Item = (Grade, f64)> + '_ {
        self.weights.iter().map(|(&grade, &weight)| (grade, weight))
    }

    /// Per-sample weights aligned with the given grade sequence:
    /// `sample_weight[i] = weight(grades[i])`.
    ///
    /// A grade absent from the table maps to 0.0; when the sequence is the
    /// one the table was computed from, that cannot happen.
    pub fn sample_weights(&self, grades: impl IntoIterator<Item = Grade>) -> Vec<f64> {
        grades
            .into_iter()
            .map(|g| self.weight(g).unwrap_or(0.0))
            .collect()
    }
}
