//! Ensembles of SVM classifiers with shared support vectors
//!
//! Models trained on overlapping data share many support vectors. An
//! [`SVMEnsemble`] stores every distinct support vector once and evaluates the
//! kernel once per distinct vector for all of its members. Ensembles, single
//! models and numeric [`pipeline`] stages compose into a [`BinaryWorkflow`],
//! which persists as self-describing text.

pub mod core;
pub mod data;
pub mod kernel;
pub mod model;
pub mod persistence;
pub mod pipeline;
pub mod registry;
pub mod workflow;

// Re-export main types for convenience
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::core::{Result, SVMError};
pub use crate::data::{DataFile, DataFormat};
pub use crate::kernel::{Kernel, KernelType};
pub use crate::model::{LabelMap, SVMEnsemble, SVMModel};
pub use crate::pipeline::{MultistagePipeline, Pipeline, Stage, Value};
pub use crate::workflow::{default_binary_workflow, BinaryWorkflow};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
