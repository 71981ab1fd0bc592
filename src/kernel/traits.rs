//! Kernel trait definition

use crate::core::SparseVector;

/// Kernel function trait
///
/// Every variant evaluates over two sparse vectors and over two dense slices.
/// The dense form treats the shorter slice as zero-padded.
pub trait KernelFunction: Send + Sync {
    /// Compute kernel value K(x, y) for sparse inputs
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64;

    /// Compute kernel value K(x, y) for dense inputs
    fn compute_dense(&self, x: &[f64], y: &[f64]) -> f64;
}

/// Inner product over the common prefix of two dense slices
pub fn dot_dense(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

/// Squared distance between two dense slices
///
/// When the lengths differ, the tail of the longer slice counts as a
/// difference against zero.
pub fn squared_distance_dense(x: &[f64], y: &[f64]) -> f64 {
    let common = x.len().min(y.len());
    let overlap: f64 = x[..common]
        .iter()
        .zip(&y[..common])
        .map(|(a, b)| (a - b) * (a - b))
        .sum();
    let tail = if x.len() > common { &x[common..] } else { &y[common..] };
    overlap + tail.iter().map(|v| v * v).sum::<f64>()
}
