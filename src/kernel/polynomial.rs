//! Polynomial Kernel Implementation
//!
//! The polynomial kernel is defined as:
//! K(x, y) = (γ * <x, y> + r)^d
//!
//! Where:
//! - γ (gamma): scaling factor for the dot product
//! - r (coef0): independent term in the polynomial
//! - d (degree): degree of the polynomial
//!
//! The degree is an integer and is persisted as such (`degree 3`).

use crate::core::SparseVector;
use crate::kernel::{dot_dense, KernelFunction};

/// Polynomial kernel with configurable degree, gamma, and coefficient
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolynomialKernel {
    /// Degree of the polynomial
    pub degree: u32,
    /// Independent term in the polynomial
    pub coef0: f64,
    /// Scaling factor for the dot product
    pub gamma: f64,
}

impl PolynomialKernel {
    /// Creates a new polynomial kernel with the specified parameters
    ///
    /// # Examples
    /// ```
    /// use ensemble_svm::kernel::PolynomialKernel;
    ///
    /// // Quadratic kernel: (0.5·x·y + 1)²
    /// let kernel = PolynomialKernel::new(2, 1.0, 0.5);
    /// assert_eq!(kernel.degree, 2);
    /// assert_eq!(kernel.coef0, 1.0);
    /// ```
    pub fn new(degree: u32, coef0: f64, gamma: f64) -> Self {
        Self {
            degree,
            coef0,
            gamma,
        }
    }

    fn apply(&self, dot: f64) -> f64 {
        let base = self.gamma * dot + self.coef0;
        match i32::try_from(self.degree) {
            Ok(degree) => base.powi(degree),
            Err(_) => base.powf(self.degree as f64),
        }
    }
}

impl KernelFunction for PolynomialKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        self.apply(x.dot(y))
    }

    fn compute_dense(&self, x: &[f64], y: &[f64]) -> f64 {
        self.apply(dot_dense(x, y))
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
    fn test_polynomial_kernel_basic() {
        let kernel = PolynomialKernel::new(2, 1.0, 1.0);
        let x = sv(&[(1, 1.0), (2, 2.0)]);
        let y = sv(&[(1, 3.0), (2, 1.0)]);

        // (1 * 5 + 1)^2 = 36
        assert_eq!(kernel.compute(&x, &y), 36.0);
    }

    #[test]
    fn test_polynomial_kernel_gamma_and_coef0() {
        let kernel = PolynomialKernel::new(3, -1.0, 0.5);
        let x = sv(&[(1, 2.0), (4, 1.0)]);
        let y = sv(&[(1, 2.0), (4, 2.0)]);

        // (0.5 * 6 - 1)^3 = 8
        assert_relative_eq!(kernel.compute(&x, &y), 8.0);
    }

    #[test]
    fn test_polynomial_kernel_degree_one_is_affine() {
        let kernel = PolynomialKernel::new(1, 0.0, 1.0);
        let x = sv(&[(1, 1.5), (3, -2.0)]);
        let y = sv(&[(1, 2.0), (2, 7.0), (3, 1.0)]);

        assert_eq!(kernel.compute(&x, &y), x.dot(&y));
    }

    #[test]
    fn test_polynomial_kernel_dense_matches_sparse() {
        let kernel = PolynomialKernel::new(3, 0.5, 0.25);
        let x = [1.0, 0.0, -2.0, 4.0];
        let y = [2.0, 1.0, 1.0];

        assert_relative_eq!(
            kernel.compute_dense(&x, &y),
            kernel.compute(&SparseVector::from_dense(&x), &SparseVector::from_dense(&y))
        );
    }
}
