//! Composable numeric stages
//!
//! A [`Stage`] maps one [`Value`] to another and declares how many inputs and
//! outputs it works with (0 = unconstrained). Stages are chained into a
//! [`Pipeline`], applied innermost first. Arity is checked when a stage is
//! appended and again when a value enters a stage with a fixed input size.
//!
//! Each stage is written as
//!
//! ```text
//! Scale<vector(vector)>
//! 3 3
//! <stage data>
//! ```
//!
//! and read back through the stage registry, keyed by the tag line.

pub mod blocks;
pub mod pipelines;

pub use self::blocks::*;
pub use self::pipelines::*;

use crate::core::{Result, SVMError, SparseVector};
use crate::persistence::TextReader;
use crate::registry;
use std::fmt;
use std::io::Write;

/// Kind of value a stage consumes or produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Scalar,
    Vector,
    Sparse,
}

impl ValueKind {
    /// Name used inside stage tags
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Scalar => "double",
            ValueKind::Vector => "vector",
            ValueKind::Sparse => "SparseVector",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value flowing through a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Vector(Vec<f64>),
    Sparse(SparseVector),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Scalar(_) => ValueKind::Scalar,
            Value::Vector(_) => ValueKind::Vector,
            Value::Sparse(_) => ValueKind::Sparse,
        }
    }

    /// Number of positions: 1 for a scalar, the dimensionality of a sparse vector
    pub fn len(&self) -> usize {
        match self {
            Value::Scalar(_) => 1,
            Value::Vector(v) => v.len(),
            Value::Sparse(v) => v.size(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(x) => Some(*x),
            _ => None,
        }
    }

    pub fn into_vector(self) -> Option<Vec<f64>> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_sparse(self) -> Option<SparseVector> {
        match self {
            Value::Sparse(v) => Some(v),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(x)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

impl From<SparseVector> for Value {
    fn from(v: SparseVector) -> Self {
        Value::Sparse(v)
    }
}

/// Output and input kind of a stage, written as `output(input)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub output: ValueKind,
    pub input: ValueKind,
}

impl Signature {
    pub const fn new(output: ValueKind, input: ValueKind) -> Self {
        Self { output, input }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.output, self.input)
    }
}

/// A single transform in a pipeline
pub trait Stage: Send + Sync + fmt::Debug {
    /// Stage family name (`Scale`, `Threshold`, ...)
    fn name(&self) -> &'static str;

    fn signature(&self) -> Signature;

    /// Registry key written as the first line of the stage
    fn tag(&self) -> String {
        format!("{}<{}>", self.name(), self.signature())
    }

    /// Expected input length, 0 when unconstrained
    fn num_inputs(&self) -> usize;

    /// Produced output length, 0 when unconstrained
    fn num_outputs(&self) -> usize;

    /// Transform a value whose kind and arity were already checked
    fn apply(&self, value: Value) -> Result<Value>;

    /// Stage parameters, written after the tag and arity lines
    fn write_data(&self, w: &mut dyn Write) -> Result<()>;

    fn clone_box(&self) -> Box<dyn Stage>;
}

impl Clone for Box<dyn Stage> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Check that `value` may enter `stage`
///
/// Dense values must match a fixed input arity exactly; a sparse value only
/// needs to fit within it.
pub fn check_input(stage: &dyn Stage, value: &Value) -> Result<()> {
    let expected = stage.signature().input;
    if value.kind() != expected {
        return Err(SVMError::InvalidParameter(format!(
            "{} expects a {expected} input, got a {}",
            stage.tag(),
            value.kind()
        )));
    }
    let arity = stage.num_inputs();
    if arity == 0 {
        return Ok(());
    }
    let fits = match value {
        Value::Sparse(v) => v.size() <= arity,
        other => other.len() == arity,
    };
    if fits {
        Ok(())
    } else {
        Err(SVMError::ArityMismatch {
            expected: arity,
            actual: value.len(),
        })
    }
}

/// Chain of stages, applied first to last
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn from_stages(stages: Vec<Box<dyn Stage>>) -> Result<Self> {
        let mut pipeline = Self::new();
        for stage in stages {
            pipeline.push(stage)?;
        }
        Ok(pipeline)
    }

    /// Append `stage` as the new outermost transform
    pub fn push(&mut self, stage: Box<dyn Stage>) -> Result<()> {
        if let Some(inner) = self.stages.last() {
            if inner.signature().output != stage.signature().input {
                return Err(SVMError::InvalidParameter(format!(
                    "cannot feed the output of {} into {}",
                    inner.tag(),
                    stage.tag()
                )));
            }
            let produced = inner.num_outputs();
            let expected = stage.num_inputs();
            if produced > 0 && expected > 0 && produced != expected {
                return Err(SVMError::ArityMismatch {
                    expected,
                    actual: produced,
                });
            }
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Builder form of [`Pipeline::push`]
    pub fn then(mut self, stage: Box<dyn Stage>) -> Result<Self> {
        self.push(stage)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    /// Output kind of the last stage and input kind of the first
    pub fn signature(&self) -> Option<Signature> {
        let first = self.stages.first()?;
        let last = self.stages.last()?;
        Some(Signature::new(last.signature().output, first.signature().input))
    }

    pub fn num_inputs(&self) -> usize {
        self.stages.first().map_or(0, |s| s.num_inputs())
    }

    pub fn num_outputs(&self) -> usize {
        self.stages.last().map_or(0, |s| s.num_outputs())
    }

    /// Run `value` through every stage
    pub fn process(&self, value: Value) -> Result<Value> {
        self.stages.iter().try_fold(value, |value, stage| {
            check_input(stage.as_ref(), &value)?;
            stage.apply(value)
        })
    }

    /// Write every stage, innermost first
    pub fn serialize(&self, w: &mut dyn Write) -> Result<()> {
        for stage in &self.stages {
            writeln!(w, "{}", stage.tag())?;
            writeln!(w, "{} {}", stage.num_inputs(), stage.num_outputs())?;
            stage.write_data(w)?;
        }
        Ok(())
    }
}

/// Read one stage through the registry
pub fn read_stage(reader: &mut TextReader<'_>) -> Result<Box<dyn Stage>> {
    let tag = reader.next_line("stage tag")?;
    let read = registry::stage_reader(tag.trim())?;
    let arity: Vec<usize> = reader.values_line(2, "stage arity")?;
    read(reader, arity[0], arity[1])
}

/// Read one stage and require its tag to be `expected`
pub fn read_expected_stage(reader: &mut TextReader<'_>, expected: &str) -> Result<Box<dyn Stage>> {
    let stage = read_stage(reader)?;
    if stage.tag() != expected {
        return Err(reader.malformed(format!(
            "expecting stage {expected}, got {}",
            stage.tag()
        )));
    }
    Ok(stage)
}
