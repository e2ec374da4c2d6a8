//! Evaluation helpers over host logits.

use crate::error::{InceptionError, Result};
use crate::tensor::Tensor;

/// Row-wise softmax of `[N, classes]` logits.
///
/// Each row is shifted by its maximum before exponentiation, so large logits do not
/// overflow.
pub fn softmax(logits: &Tensor<f32, 2>) -> Result<Tensor<f32, 2>> {
    let [rows, cols] = *logits.shape();
    let mut out = Vec::with_capacity(rows * cols);
    for row in logits.data().chunks(cols.max(1)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = row.iter().map(|v| (v - max).exp()).collect();
        let sum: f32 = exps.iter().sum();
        out.extend(exps.into_iter().map(|e| e / sum));
    }
    Ok(Tensor::new(out, [rows, cols])?)
}

/// Indices of the `k` largest values, best first. Ties keep the lower index first.
pub fn top_k(row: &[f32], k: usize) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..row.len()).collect();
    idx.sort_by(|&a, &b| row[b].total_cmp(&row[a]).then(a.cmp(&b)));
    idx.truncate(k);
    idx
}

/// Running top-k accuracy.
///
/// A sample counts as correct when its label is among the `k` highest-scoring classes.
#[derive(Debug, Clone, PartialEq)]
pub struct TopKAccuracy {
    k: usize,
    correct: usize,
    total: usize,
}

impl TopKAccuracy {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            correct: 0,
            total: 0,
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Adds a batch of `[N, classes]` scores with one label per row.
    pub fn update(&mut self, scores: &Tensor<f32, 2>, labels: &[usize]) -> Result<()> {
        let [rows, cols] = *scores.shape();
        if labels.len() != rows {
            return Err(InceptionError::InvalidInput(format!(
                "{} labels for {rows} score rows",
                labels.len()
            )));
        }
        if let Some(&label) = labels.iter().find(|&&l| l >= cols) {
            return Err(InceptionError::InvalidInput(format!(
                "label {label} out of range for {cols} classes"
            )));
        }
        for (row, &label) in scores.data().chunks(cols.max(1)).zip(labels) {
            if top_k(row, self.k).contains(&label) {
                self.correct += 1;
            }
        }
        self.total += rows;
        Ok(())
    }

    pub fn correct(&self) -> usize {
        self.correct
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Fraction of correct samples so far; zero before any update.
    pub fn value(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f32 / self.total as f32
        }
    }

    pub fn reset(&mut self) {
        self.correct = 0;
        self.total = 0;
    }
}
