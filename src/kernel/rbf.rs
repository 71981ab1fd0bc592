//! RBF (Radial Basis Function) kernel implementation
//!
//! The RBF kernel is defined as: K(x, y) = exp(-γ * ||x - y||²)
//! where γ (gamma) is a hyperparameter that controls the kernel width.

use crate::core::SparseVector;
use crate::kernel::{squared_distance_dense, KernelFunction};

/// RBF (Radial Basis Function) kernel: K(x, y) = exp(-γ * ||x - y||²)
///
/// The gamma parameter controls the "reach" of each support vector:
/// - High gamma: close points have high influence
/// - Low gamma: distant points have influence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RBFKernel {
    /// Kernel width parameter
    pub gamma: f64,
}

impl RBFKernel {
    /// Create a new RBF kernel with specified gamma parameter
    pub fn new(gamma: f64) -> Self {
        Self { gamma }
    }

    /// Get the gamma parameter
    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl KernelFunction for RBFKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        (-self.gamma * x.squared_distance(y)).exp()
    }

    /// Dense evaluation; when the slices differ in length the surplus entries
    /// of the longer one still contribute to the distance.
    fn compute_dense(&self, x: &[f64], y: &[f64]) -> f64 {
        (-self.gamma * squared_distance_dense(x, y)).exp()
    }
}
