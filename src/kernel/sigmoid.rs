//! Sigmoid (Tanh) Kernel Implementation
//!
//! The Sigmoid kernel is defined as:
//! K(x, y) = tanh(γ * <x, y> + r)
//!
//! where:
//! - γ (gamma) is the scaling parameter for the dot product
//! - r (coef0) is the bias/offset parameter
//!
//! The kernel is not positive semi-definite for every parameter choice; models
//! trained elsewhere with it are still evaluated exactly as stored.

use crate::core::SparseVector;
use crate::kernel::{dot_dense, KernelFunction};

/// Sigmoid (Hyperbolic Tangent) kernel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SigmoidKernel {
    /// Bias/offset parameter
    pub coef0: f64,
    /// Scaling parameter for the dot product
    pub gamma: f64,
}

impl SigmoidKernel {
    /// Creates a new Sigmoid kernel
    ///
    /// # Examples
    /// ```
    /// use ensemble_svm::kernel::SigmoidKernel;
    ///
    /// let kernel = SigmoidKernel::new(-1.0, 0.1);
    /// assert_eq!(kernel.gamma, 0.1);
    /// assert_eq!(kernel.coef0, -1.0);
    /// ```
    pub fn new(coef0: f64, gamma: f64) -> Self {
        Self { coef0, gamma }
    }
}

impl KernelFunction for SigmoidKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        (self.gamma * x.dot(y) + self.coef0).tanh()
    }

    fn compute_dense(&self, x: &[f64], y: &[f64]) -> f64 {
        (self.gamma * dot_dense(x, y) + self.coef0).tanh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sv(entries: &[(u32, f64)]) -> SparseVector {
        SparseVector::new(entries.to_vec()).unwrap()
    }

    #[test]
    fn test_sigmoid_kernel_basic() {
        let kernel = SigmoidKernel::new(0.0, 1.0);
        let x = sv(&[(1, 1.0)]);
        let y = sv(&[(1, 0.5)]);

        assert_relative_eq!(kernel.compute(&x, &y), 0.5f64.tanh());
    }

    #[test]
    fn test_sigmoid_kernel_bounded() {
        let kernel = SigmoidKernel::new(1.0, 2.0);
        let x = sv(&[(1, 100.0), (2, -50.0)]);
        let y = sv(&[(1, 80.0), (2, 10.0)]);

        let value = kernel.compute(&x, &y);
        assert!((-1.0..=1.0).contains(&value));
    }

    #[test]
    fn test_sigmoid_kernel_orthogonal_inputs() {
        let kernel = SigmoidKernel::new(-0.5, 0.7);
        let x = sv(&[(1, 1.0)]);
        let y = sv(&[(2, 1.0)]);

        assert_relative_eq!(kernel.compute(&x, &y), (-0.5f64).tanh());
    }

    #[test]
    fn test_sigmoid_kernel_dense_matches_sparse() {
        let kernel = SigmoidKernel::new(0.25, 0.1);
        let x = [1.0, 2.0, 0.0, -1.0];
        let y = [3.0, 0.0, 1.0];

        assert_relative_eq!(
            kernel.compute_dense(&x, &y),
            kernel.compute(&SparseVector::from_dense(&x), &SparseVector::from_dense(&y))
        );
    }
}
