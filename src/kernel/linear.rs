//! Linear kernel implementation

use crate::core::SparseVector;
use crate::kernel::{dot_dense, KernelFunction};

/// Linear kernel: K(x, y) = x^T * y
///
/// This is the simplest kernel function, computing the dot product between two vectors.
/// For sparse vectors, this is computed efficiently by iterating through non-zero elements.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinearKernel;

impl LinearKernel {
    /// Create a new linear kernel
    pub fn new() -> Self {
        Self
    }
}

impl KernelFunction for LinearKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        x.dot(y)
    }

    fn compute_dense(&self, x: &[f64], y: &[f64]) -> f64 {
        dot_dense(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sv(entries: &[(u32, f64)]) -> SparseVector {
        SparseVector::new(entries.to_vec()).unwrap()
    }

    #[test]
    fn test_linear_kernel_basic() {
        let kernel = LinearKernel::new();

        let x = sv(&[(1, 1.0), (3, 2.0), (5, 3.0)]);
        let y = sv(&[(2, 1.0), (3, 2.0), (4, 3.0)]);

        // Only index 3 overlaps: 2.0 * 2.0 = 4.0
        assert_eq!(kernel.compute(&x, &y), 4.0);
    }

    #[test]
    fn test_linear_kernel_identical() {
        let kernel = LinearKernel::new();
        let x = sv(&[(1, 1.0), (2, 2.0), (3, 3.0)]);

        // x^T * x = 1^2 + 2^2 + 3^2 = 14
        assert_eq!(kernel.compute(&x, &x), 14.0);
    }

    #[test]
    fn test_linear_kernel_no_overlap() {
        let kernel = LinearKernel::new();

        let x = sv(&[(1, 1.0), (3, 2.0)]);
        let y = sv(&[(2, 1.0), (4, 2.0)]);

        assert_eq!(kernel.compute(&x, &y), 0.0);
        assert_eq!(kernel.compute(&x, &SparseVector::empty()), 0.0);
    }

    #[test]
    fn test_linear_kernel_dense_matches_sparse() {
        let kernel = LinearKernel::new();
        let x = [1.0, 0.0, 2.0];
        let y = [0.0, 1.0, 2.0, 5.0];

        let sparse = kernel.compute(&SparseVector::from_dense(&x), &SparseVector::from_dense(&y));
        assert_eq!(kernel.compute_dense(&x, &y), sparse);
        assert_eq!(sparse, 4.0);
    }
}
