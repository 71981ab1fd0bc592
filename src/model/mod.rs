//! Kernel machines and ensembles of them
//!
//! Any persisted model is read back through [`deserialize`] or [`load`], which
//! dispatch on the type tag in the first line.

pub mod ensemble;
pub mod svm;

pub use self::ensemble::{LabelMap, SVMEnsemble, SVM_ENSEMBLE_TAG};
pub use self::svm::{SVMModel, SVM_MODEL_TAG};

use crate::core::{BinaryModel, Result, SVMError};
use crate::persistence::TextReader;
use crate::registry;
use log::info;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read one tagged model from `reader`
pub fn read_model(reader: &mut TextReader<'_>) -> Result<Box<dyn BinaryModel>> {
    let tag = reader.next_line("model type")?;
    let read = registry::model_reader(tag.trim())?;
    read(reader)
}

/// Read a model of any registered type from a stream
pub fn deserialize(input: &mut dyn BufRead) -> Result<Box<dyn BinaryModel>> {
    let mut reader = TextReader::new(input);
    read_model(&mut reader)
}

/// Load a model of any registered type from a file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Box<dyn BinaryModel>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut input = BufReader::new(file);
    let model = deserialize(&mut input)?;
    info!("Loaded {} from {path:?}", model.tag());
    Ok(model)
}

/// Recover the concrete type of a loaded model
pub fn downcast<T: BinaryModel + 'static>(model: Box<dyn BinaryModel>) -> Result<T> {
    let tag = model.tag();
    model
        .into_any()
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| SVMError::InvalidParameter(format!("model of type {tag} has an unexpected type")))
}
