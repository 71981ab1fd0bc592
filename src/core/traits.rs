//! Core traits shared by every predictor

use crate::core::{Prediction, Result, SparseVector};
use std::any::Any;
use std::fmt;
use std::io::Write;

/// Binary predictor contract
///
/// Implemented by standalone SVM models, ensembles and workflows. Evaluation
/// takes `&self` and never mutates observable state, so a fully built model
/// can be shared across threads.
pub trait BinaryModel: Send + Sync + fmt::Debug {
    /// Type tag written as the first line of the serialized form
    fn tag(&self) -> &'static str;

    /// Predict a sparse instance
    fn predict(&self, x: &SparseVector) -> Result<Prediction>;

    /// Predict a dense instance
    fn predict_dense(&self, x: &[f64]) -> Result<Prediction>;

    /// Raw decision values for a sparse instance
    fn decision_value(&self, x: &SparseVector) -> Result<Vec<f64>>;

    /// Raw decision values for a dense instance
    fn decision_value_dense(&self, x: &[f64]) -> Result<Vec<f64>>;

    /// Label assigned to positive decisions
    fn positive_label(&self) -> String;

    /// Label assigned to negative decisions
    fn negative_label(&self) -> String;

    /// Number of raw decision values produced per instance
    fn num_outputs(&self) -> usize;

    /// Write the full text form, starting with the type tag line
    fn serialize(&self, w: &mut dyn Write) -> Result<()>;

    fn clone_box(&self) -> Box<dyn BinaryModel>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Predict several sparse instances
    fn predict_batch(&self, xs: &[SparseVector]) -> Result<Vec<Prediction>> {
        xs.iter().map(|x| self.predict(x)).collect()
    }
}

impl Clone for Box<dyn BinaryModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
