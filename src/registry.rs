//! Process-wide reader tables keyed by serialized type tags
//!
//! Deserialization dispatches on the first line of every persisted object. The
//! built-in readers are installed on first use; applications can add their own
//! model, stage and pipeline readers at any time before reading.

use crate::core::{BinaryModel, Result, SVMError};
use crate::model::{ensemble, svm};
use crate::persistence::TextReader;
use crate::pipeline::{blocks, pipelines, MultistagePipeline, Stage};
use crate::workflow;
use lazy_static::lazy_static;
use log::debug;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Reads a model body; the tag line has already been consumed
pub type ModelReader = fn(&mut TextReader<'_>) -> Result<Box<dyn BinaryModel>>;

/// Reads a stage body given its input and output arity
pub type StageReader = fn(&mut TextReader<'_>, usize, usize) -> Result<Box<dyn Stage>>;

/// Reads the stages of a named pipeline; the name line has already been consumed
pub type PipelineReader = fn(&mut TextReader<'_>) -> Result<MultistagePipeline>;

fn list_built_in_models() -> Vec<(String, ModelReader)> {
    vec![
        (svm::SVM_MODEL_TAG.to_string(), svm::read_svm_model as ModelReader),
        (ensemble::SVM_ENSEMBLE_TAG.to_string(), ensemble::read_svm_ensemble as ModelReader),
        (workflow::BINARY_WORKFLOW_TAG.to_string(), workflow::read_binary_workflow as ModelReader),
    ]
}

lazy_static! {
    static ref MODEL_READERS: RwLock<HashMap<String, ModelReader>> =
        RwLock::new(HashMap::from_iter(list_built_in_models()));
    static ref STAGE_READERS: RwLock<HashMap<String, StageReader>> =
        RwLock::new(HashMap::from_iter(blocks::list_built_in_stages()));
    static ref PIPELINE_READERS: RwLock<HashMap<String, PipelineReader>> =
        RwLock::new(HashMap::from_iter(pipelines::list_built_in_pipelines()));
}

fn lookup<R: Copy>(table: &RwLock<HashMap<String, R>>, kind: &str, tag: &str) -> Result<R> {
    table
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(tag)
        .copied()
        .ok_or_else(|| SVMError::NotFound(format!("no {kind} reader registered for '{tag}'")))
}

fn insert<R>(table: &RwLock<HashMap<String, R>>, kind: &str, tag: &str, reader: R) -> Result<()> {
    let mut guard = table.write().unwrap_or_else(PoisonError::into_inner);
    match guard.entry(tag.to_string()) {
        Entry::Occupied(_) => Err(SVMError::InvalidParameter(format!(
            "a {kind} reader is already registered for '{tag}'"
        ))),
        Entry::Vacant(slot) => {
            slot.insert(reader);
            debug!("Registered {kind} reader for {tag}");
            Ok(())
        }
    }
}

pub fn model_reader(tag: &str) -> Result<ModelReader> {
    lookup(&MODEL_READERS, "model", tag)
}

pub fn stage_reader(tag: &str) -> Result<StageReader> {
    lookup(&STAGE_READERS, "stage", tag)
}

pub fn pipeline_reader(name: &str) -> Result<PipelineReader> {
    lookup(&PIPELINE_READERS, "pipeline", name)
}

/// Register a reader for a new model tag; existing tags cannot be replaced
pub fn register_model(tag: &str, reader: ModelReader) -> Result<()> {
    insert(&MODEL_READERS, "model", tag, reader)
}

pub fn register_stage(tag: &str, reader: StageReader) -> Result<()> {
    insert(&STAGE_READERS, "stage", tag, reader)
}

pub fn register_pipeline(name: &str, reader: PipelineReader) -> Result<()> {
    insert(&PIPELINE_READERS, "pipeline", name, reader)
}

/// Tags of every registered model reader, sorted
pub fn model_tags() -> Vec<String> {
    let mut tags: Vec<String> = MODEL_READERS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .keys()
        .cloned()
        .collect();
    tags.sort();
    tags
}
