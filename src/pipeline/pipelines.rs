//! Named multistage pipelines
//!
//! A [`MultistagePipeline`] is a fixed composition of stages that is written
//! and read as one unit: a name line followed by its stages, innermost first.
//! These are the only pipelines a workflow embeds.

use crate::core::{BinaryModel, Result, SVMError, SparseVector};
use crate::persistence::TextReader;
use crate::pipeline::{
    read_expected_stage, Average, Logistic, ModelStage, Offset, Pipeline, Scale, Signature, Stage,
    Sum, Threshold, Value, ValueKind,
};
use crate::registry::{self, PipelineReader};
use log::debug;
use std::fmt;
use std::io::Write;

pub const MAJORITY_VOTE: &str = "MajorityVote";
pub const LOGISTIC_REGRESSION: &str = "LogisticRegression";
pub const NORMALIZE_LINEAR: &str = "NormalizeLinear";
pub const BINARY_SVM_AGGREGATION: &str = "BinarySVMAggregation";
pub const LINEAR_AGGREGATION: &str = "LinearAggregation";

/// An opaque, named chain of stages
#[derive(Debug, Clone)]
pub struct MultistagePipeline {
    name: String,
    chain: Pipeline,
}

impl MultistagePipeline {
    /// Wrap an arbitrary chain under `name`
    ///
    /// Reading it back requires a pipeline reader registered for `name`.
    pub fn new(name: impl Into<String>, chain: Pipeline) -> Result<Self> {
        if chain.is_empty() {
            return Err(SVMError::InvalidParameter(
                "a multistage pipeline needs at least one stage".to_string(),
            ));
        }
        Ok(Self {
            name: name.into(),
            chain,
        })
    }

    /// Unweighted majority vote over `num_inputs` decision values (0 = any number)
    ///
    /// Yields the fraction of positive inputs.
    pub fn majority_vote(num_inputs: usize) -> Result<Self> {
        let chain = Pipeline::new()
            .then(Box::new(Threshold::uniform(0.0, 1.0, 0.0, num_inputs)))?
            .then(Box::new(Scale::vector(vec![1.0], num_inputs, num_inputs)))?
            .then(Box::new(Average::new(num_inputs, 0.0)))?;
        Self::new(MAJORITY_VOTE, chain)
    }

    /// Weighted vote: inputs above `threshold` count with their coefficient,
    /// normalized by the sum of all coefficients
    pub fn weighted_majority_vote(coeffs: Vec<f64>, threshold: f64) -> Result<Self> {
        let n = coeffs.len();
        let total: f64 = coeffs.iter().sum();
        if n == 0 || total == 0.0 {
            return Err(SVMError::InvalidParameter(
                "weighted majority vote needs coefficients with a non-zero sum".to_string(),
            ));
        }
        let chain = Pipeline::new()
            .then(Box::new(Threshold::uniform(threshold, 1.0, 0.0, n)))?
            .then(Box::new(Scale::vector(coeffs, n, n)))?
            .then(Box::new(Average::new(n, total)))?;
        Self::new(MAJORITY_VOTE, chain)
    }

    /// `logistic(sum(coeffs * x) + offset)`
    pub fn logistic_regression(coeffs: Vec<f64>, offset: f64) -> Result<Self> {
        let n = coeffs.len();
        if n == 0 {
            return Err(SVMError::InvalidParameter(
                "logistic regression needs at least one coefficient".to_string(),
            ));
        }
        let chain = Pipeline::new()
            .then(Box::new(Scale::vector(coeffs, n, n)))?
            .then(Box::new(Sum::new(n)))?
            .then(Box::new(Offset::scalar(offset)))?
            .then(Box::new(Logistic::scalar()))?;
        Self::new(LOGISTIC_REGRESSION, chain)
    }

    /// Logistic regression with unit coefficients and no offset over `num_inputs` values
    pub fn unit_logistic_regression(num_inputs: usize) -> Result<Self> {
        let chain = Pipeline::new()
            .then(Box::new(Scale::vector(vec![1.0], num_inputs, num_inputs)))?
            .then(Box::new(Sum::new(num_inputs)))?
            .then(Box::new(Offset::scalar(0.0)))?
            .then(Box::new(Logistic::scalar()))?;
        Self::new(LOGISTIC_REGRESSION, chain)
    }

    /// Per-feature affine normalization of sparse vectors: `x * scale + offset`
    ///
    /// Features beyond `scale.len()` are dropped.
    pub fn normalize_linear(scale: Vec<f64>, offset: Vec<f64>) -> Result<Self> {
        if scale.is_empty() || scale.len() != offset.len() {
            return Err(SVMError::InvalidParameter(format!(
                "scale and offset must have the same non-zero length (got {} and {})",
                scale.len(),
                offset.len()
            )));
        }
        let n = scale.len();
        let chain = Pipeline::new()
            .then(Box::new(Scale::sparse(scale, 0, n)))?
            .then(Box::new(Offset::sparse(offset, n, n)))?;
        Self::new(NORMALIZE_LINEAR, chain)
    }

    /// Aggregate decision values with a second-level model
    pub fn binary_svm_aggregation(model: Box<dyn BinaryModel>) -> Result<Self> {
        let chain = Pipeline::new().then(Box::new(ModelStage::new(model)))?;
        Self::new(BINARY_SVM_AGGREGATION, chain)
    }

    /// `sum(coeffs * x) + offset`
    pub fn linear_aggregation(coeffs: Vec<f64>, offset: f64) -> Result<Self> {
        let n = coeffs.len();
        if n == 0 {
            return Err(SVMError::InvalidParameter(
                "linear aggregation needs at least one coefficient".to_string(),
            ));
        }
        let chain = Pipeline::new()
            .then(Box::new(Scale::vector(coeffs, n, n)))?
            .then(Box::new(Sum::new(n)))?
            .then(Box::new(Offset::scalar(offset)))?;
        Self::new(LINEAR_AGGREGATION, chain)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chain(&self) -> &Pipeline {
        &self.chain
    }

    pub fn signature(&self) -> Option<Signature> {
        self.chain.signature()
    }

    pub fn num_inputs(&self) -> usize {
        self.chain.num_inputs()
    }

    pub fn num_outputs(&self) -> usize {
        self.chain.num_outputs()
    }

    pub fn process(&self, value: Value) -> Result<Value> {
        self.chain.process(value)
    }

    /// Evaluate a `double(vector)` pipeline
    pub fn process_vector(&self, x: Vec<f64>) -> Result<f64> {
        let name = &self.name;
        self.process(Value::Vector(x))?
            .as_scalar()
            .ok_or_else(|| SVMError::InvalidParameter(format!("{name} does not produce a scalar")))
    }

    /// Evaluate a `SparseVector(SparseVector)` pipeline
    pub fn process_sparse(&self, x: SparseVector) -> Result<SparseVector> {
        let name = &self.name;
        self.process(Value::Sparse(x))?.into_sparse().ok_or_else(|| {
            SVMError::InvalidParameter(format!("{name} does not produce a sparse vector"))
        })
    }

    pub fn serialize(&self, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "{}", self.name)?;
        self.chain.serialize(w)
    }

    /// Read a named pipeline through the registry
    pub fn read(reader: &mut TextReader<'_>) -> Result<Self> {
        let name = reader.next_line("pipeline name")?;
        Self::read_named(name.trim(), reader)
    }

    /// Read the stages of the pipeline called `name`, whose name line was already consumed
    pub fn read_named(name: &str, reader: &mut TextReader<'_>) -> Result<Self> {
        let read = registry::pipeline_reader(name)?;
        let pipeline = read(reader)?;
        debug!(
            "Read {} pipeline with {} stages",
            pipeline.name,
            pipeline.chain.len()
        );
        Ok(pipeline)
    }
}

impl fmt::Display for MultistagePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::new();
        self.serialize(&mut out).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

fn tag_of(name: &str, output: ValueKind, input: ValueKind) -> String {
    format!("{name}<{}>", Signature::new(output, input))
}

/// Read the stages of a named pipeline, checking each tag
fn read_stages(reader: &mut TextReader<'_>, name: &str, tags: &[String]) -> Result<MultistagePipeline> {
    let mut chain = Pipeline::new();
    for tag in tags {
        let stage: Box<dyn Stage> = read_expected_stage(reader, tag)?;
        chain.push(stage).map_err(|e| reader.malformed(e))?;
    }
    MultistagePipeline::new(name, chain)
}

fn read_majority_vote(reader: &mut TextReader<'_>) -> Result<MultistagePipeline> {
    use ValueKind::{Scalar, Vector};
    let tags = [
        tag_of("Threshold", Vector, Vector),
        tag_of("Scale", Vector, Vector),
        tag_of("Average", Scalar, Vector),
    ];
    read_stages(reader, MAJORITY_VOTE, &tags)
}

fn read_logistic_regression(reader: &mut TextReader<'_>) -> Result<MultistagePipeline> {
    use ValueKind::{Scalar, Vector};
    let tags = [
        tag_of("Scale", Vector, Vector),
        tag_of("Sum", Scalar, Vector),
        tag_of("Offset", Scalar, Scalar),
        tag_of("Logistic", Scalar, Scalar),
    ];
    read_stages(reader, LOGISTIC_REGRESSION, &tags)
}

fn read_normalize_linear(reader: &mut TextReader<'_>) -> Result<MultistagePipeline> {
    use ValueKind::Sparse;
    let tags = [tag_of("Scale", Sparse, Sparse), tag_of("Offset", Sparse, Sparse)];
    read_stages(reader, NORMALIZE_LINEAR, &tags)
}

fn read_binary_svm_aggregation(reader: &mut TextReader<'_>) -> Result<MultistagePipeline> {
    let tags = [tag_of("Predictor", ValueKind::Scalar, ValueKind::Vector)];
    read_stages(reader, BINARY_SVM_AGGREGATION, &tags)
}

fn read_linear_aggregation(reader: &mut TextReader<'_>) -> Result<MultistagePipeline> {
    use ValueKind::{Scalar, Vector};
    let tags = [
        tag_of("Scale", Vector, Vector),
        tag_of("Sum", Scalar, Vector),
        tag_of("Offset", Scalar, Scalar),
    ];
    read_stages(reader, LINEAR_AGGREGATION, &tags)
}

/// Names and readers of every built-in multistage pipeline
pub(crate) fn list_built_in_pipelines() -> Vec<(String, PipelineReader)> {
    vec![
        (MAJORITY_VOTE.to_string(), read_majority_vote as PipelineReader),
        (LOGISTIC_REGRESSION.to_string(), read_logistic_regression as PipelineReader),
        (NORMALIZE_LINEAR.to_string(), read_normalize_linear as PipelineReader),
        (BINARY_SVM_AGGREGATION.to_string(), read_binary_svm_aggregation as PipelineReader),
        (LINEAR_AGGREGATION.to_string(), read_linear_aggregation as PipelineReader),
    ]
}
