//! Kernel functions for SVM
//!
//! [`Kernel`] is the closed family of similarity functions a model or ensemble
//! can carry. Each variant is a small struct implementing [`KernelFunction`];
//! the enum dispatches to them and owns the text form:
//!
//! ```text
//! kernel_type 1
//! degree 3
//! coef0 0
//! gamma 0.5
//! ```

pub mod linear;
pub mod polynomial;
pub mod rbf;
pub mod sigmoid;
pub mod traits;
pub mod userdef;

pub use self::linear::*;
pub use self::polynomial::*;
pub use self::rbf::*;
pub use self::sigmoid::*;
pub use self::traits::*;
pub use self::userdef::*;

use crate::core::{Result, SVMError, SparseVector};
use crate::persistence::{Sig16, TextReader};
use log::debug;
use std::fmt;
use std::io::Write;

/// Numeric kernel codes used in the text format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelType {
    Linear = 0,
    Polynomial = 1,
    Rbf = 2,
    Sigmoid = 3,
    UserDefined = 4,
}

impl KernelType {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0 => Ok(KernelType::Linear),
            1 => Ok(KernelType::Polynomial),
            2 => Ok(KernelType::Rbf),
            3 => Ok(KernelType::Sigmoid),
            4 => Ok(KernelType::UserDefined),
            other => Err(SVMError::NotFound(format!("kernel type {other}"))),
        }
    }
}

/// Kernel carried by models and ensembles
///
/// Two kernels are equal when they are the same variant with the same
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Kernel {
    Linear(LinearKernel),
    Polynomial(PolynomialKernel),
    Rbf(RBFKernel),
    Sigmoid(SigmoidKernel),
    UserDefined(UserDefinedKernel),
}

impl Kernel {
    pub fn linear() -> Self {
        Kernel::Linear(LinearKernel::new())
    }

    pub fn polynomial(degree: u32, coef0: f64, gamma: f64) -> Self {
        Kernel::Polynomial(PolynomialKernel::new(degree, coef0, gamma))
    }

    pub fn rbf(gamma: f64) -> Self {
        Kernel::Rbf(RBFKernel::new(gamma))
    }

    pub fn sigmoid(coef0: f64, gamma: f64) -> Self {
        Kernel::Sigmoid(SigmoidKernel::new(coef0, gamma))
    }

    pub fn user_defined() -> Self {
        Kernel::UserDefined(UserDefinedKernel::new())
    }

    /// Build a kernel from its type code and the full parameter set,
    /// ignoring the parameters the variant does not use
    pub fn from_type(code: u32, degree: u32, gamma: f64, coef0: f64) -> Result<Self> {
        Ok(match KernelType::from_code(code)? {
            KernelType::Linear => Kernel::linear(),
            KernelType::Polynomial => Kernel::polynomial(degree, coef0, gamma),
            KernelType::Rbf => Kernel::rbf(gamma),
            KernelType::Sigmoid => Kernel::sigmoid(coef0, gamma),
            KernelType::UserDefined => Kernel::user_defined(),
        })
    }

    pub fn kernel_type(&self) -> KernelType {
        match self {
            Kernel::Linear(_) => KernelType::Linear,
            Kernel::Polynomial(_) => KernelType::Polynomial,
            Kernel::Rbf(_) => KernelType::Rbf,
            Kernel::Sigmoid(_) => KernelType::Sigmoid,
            Kernel::UserDefined(_) => KernelType::UserDefined,
        }
    }

    fn function(&self) -> &dyn KernelFunction {
        match self {
            Kernel::Linear(k) => k,
            Kernel::Polynomial(k) => k,
            Kernel::Rbf(k) => k,
            Kernel::Sigmoid(k) => k,
            Kernel::UserDefined(k) => k,
        }
    }

    /// Evaluate over two sparse vectors
    pub fn compute(&self, x: &SparseVector, y: &SparseVector) -> f64 {
        self.function().compute(x, y)
    }

    /// Evaluate over two dense slices
    pub fn compute_dense(&self, x: &[f64], y: &[f64]) -> f64 {
        self.function().compute_dense(x, y)
    }

    /// Write the `kernel_type` line followed by the variant's parameters
    pub fn serialize(&self, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "kernel_type {}", self.kernel_type().code())?;
        match self {
            Kernel::Linear(_) | Kernel::UserDefined(_) => {}
            Kernel::Polynomial(k) => {
                writeln!(w, "degree {}", k.degree)?;
                writeln!(w, "coef0 {}", Sig16(k.coef0))?;
                writeln!(w, "gamma {}", Sig16(k.gamma))?;
            }
            Kernel::Rbf(k) => {
                writeln!(w, "gamma {}", Sig16(k.gamma))?;
            }
            Kernel::Sigmoid(k) => {
                writeln!(w, "coef0 {}", Sig16(k.coef0))?;
                writeln!(w, "gamma {}", Sig16(k.gamma))?;
            }
        }
        Ok(())
    }

    /// Read a kernel block written by [`Kernel::serialize`]
    pub fn read(reader: &mut TextReader<'_>) -> Result<Self> {
        let code: u32 = reader.keyword_value("kernel_type")?;
        let kernel_type =
            KernelType::from_code(code).map_err(|_| reader.malformed(format!("unknown kernel type {code}")))?;
        let kernel = match kernel_type {
            KernelType::Linear => Kernel::linear(),
            KernelType::Polynomial => {
                let degree = reader.keyword_value("degree")?;
                let coef0 = reader.keyword_value("coef0")?;
                let gamma = reader.keyword_value("gamma")?;
                Kernel::polynomial(degree, coef0, gamma)
            }
            KernelType::Rbf => Kernel::rbf(reader.keyword_value("gamma")?),
            KernelType::Sigmoid => {
                let coef0 = reader.keyword_value("coef0")?;
                let gamma = reader.keyword_value("gamma")?;
                Kernel::sigmoid(coef0, gamma)
            }
            KernelType::UserDefined => Kernel::user_defined(),
        };
        debug!("Read kernel: {kernel}");
        Ok(kernel)
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::linear()
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kernel::Linear(_) => write!(f, "linear"),
            Kernel::Polynomial(k) => write!(
                f,
                "polynomial(degree={}, coef0={}, gamma={})",
                k.degree,
                Sig16(k.coef0),
                Sig16(k.gamma)
            ),
            Kernel::Rbf(k) => write!(f, "rbf(gamma={})", Sig16(k.gamma)),
            Kernel::Sigmoid(k) => {
                write!(f, "sigmoid(coef0={}, gamma={})", Sig16(k.coef0), Sig16(k.gamma))
            }
            Kernel::UserDefined(_) => write!(f, "user-defined"),
        }
    }
}
