//! User-defined (precomputed) kernel
//!
//! Kernel values are supplied by the caller instead of computed. The first
//! feature of the left argument is a 0-based column number and the kernel value
//! is read from that column of the right argument, stored at index `column + 1`:
//! K(x, y) = y[x[1] + 1].

use crate::core::SparseVector;
use crate::kernel::KernelFunction;

/// Precomputed kernel lookup
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UserDefinedKernel;

impl UserDefinedKernel {
    pub fn new() -> Self {
        Self
    }
}

fn column(selector: f64) -> Option<usize> {
    if selector >= 0.0 && selector.fract() == 0.0 {
        Some(selector as usize)
    } else {
        None
    }
}

impl KernelFunction for UserDefinedKernel {
    fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        match column(x.get(1)).and_then(|c| u32::try_from(c + 1).ok()) {
            Some(index) => y.get(index),
            None => 0.0,
        }
    }

    fn compute_dense(&self, x: &[f64], y: &[f64]) -> f64 {
        x.first()
            .and_then(|&selector| column(selector))
            .and_then(|c| y.get(c).copied())
            .unwrap_or(0.0)
    }
}
