//! Complete binary classifiers
//!
//! A [`BinaryWorkflow`] chains an optional preprocessing pipeline, a predictor,
//! an optional postprocessing pipeline and a threshold. It is itself a
//! [`BinaryModel`], so a workflow can serve as the predictor of another one.
//!
//! ```text
//! BinaryWorkflow
//! preprocessing
//! <named pipeline or empty line>
//! predictor
//! <model>
//! postprocessing
//! <named pipeline or empty line>
//! threshold
//! <value>
//! ```

use crate::core::{BinaryModel, Prediction, Result, SVMError, SparseVector};
use crate::model;
use crate::persistence::{Sig16, TextReader};
use crate::pipeline::{MultistagePipeline, Signature, ValueKind};
use log::debug;
use std::any::Any;
use std::io::Write;

pub const BINARY_WORKFLOW_TAG: &str = "BinaryWorkflow";

const PREPROCESSING_SIGNATURE: Signature = Signature::new(ValueKind::Sparse, ValueKind::Sparse);
const POSTPROCESSING_SIGNATURE: Signature = Signature::new(ValueKind::Scalar, ValueKind::Vector);

#[derive(Debug, Clone)]
pub struct BinaryWorkflow {
    preprocessing: Option<MultistagePipeline>,
    predictor: Box<dyn BinaryModel>,
    postprocessing: Option<MultistagePipeline>,
    threshold: f64,
}

fn check_signature(pipeline: &MultistagePipeline, expected: Signature, role: &str) -> Result<()> {
    match pipeline.signature() {
        Some(sig) if sig == expected => Ok(()),
        Some(sig) => Err(SVMError::InvalidParameter(format!(
            "{role} must map {expected}, {} maps {sig}",
            pipeline.name()
        ))),
        None => Err(SVMError::InvalidParameter(format!(
            "{role} pipeline {} has no stages",
            pipeline.name()
        ))),
    }
}

fn check_postprocessing_arity(post: &MultistagePipeline, predictor: &dyn BinaryModel) -> Result<()> {
    let expected = post.num_inputs();
    if expected > 0 && expected != predictor.num_outputs() {
        return Err(SVMError::ArityMismatch {
            expected,
            actual: predictor.num_outputs(),
        });
    }
    Ok(())
}

impl BinaryWorkflow {
    /// Workflow around `predictor` with threshold 0 and no processing
    pub fn new(predictor: Box<dyn BinaryModel>) -> Self {
        Self {
            preprocessing: None,
            predictor,
            postprocessing: None,
            threshold: 0.0,
        }
    }

    /// Build a workflow from all of its parts, validating signatures and arity
    pub fn from_parts(
        preprocessing: Option<MultistagePipeline>,
        predictor: Box<dyn BinaryModel>,
        postprocessing: Option<MultistagePipeline>,
        threshold: f64,
    ) -> Result<Self> {
        let mut flow = Self::new(predictor);
        flow.threshold = threshold;
        if let Some(pre) = preprocessing {
            flow.set_preprocessing(pre)?;
        }
        if let Some(post) = postprocessing {
            flow.set_postprocessing(post)?;
        }
        Ok(flow)
    }

    pub fn set_preprocessing(&mut self, pipeline: MultistagePipeline) -> Result<()> {
        check_signature(&pipeline, PREPROCESSING_SIGNATURE, "preprocessing")?;
        self.preprocessing = Some(pipeline);
        Ok(())
    }

    /// Replace the postprocessing; a fixed input arity must match the predictor outputs
    pub fn set_postprocessing(&mut self, pipeline: MultistagePipeline) -> Result<()> {
        check_signature(&pipeline, POSTPROCESSING_SIGNATURE, "postprocessing")?;
        check_postprocessing_arity(&pipeline, self.predictor.as_ref())?;
        self.postprocessing = Some(pipeline);
        Ok(())
    }

    pub fn clear_preprocessing(&mut self) {
        self.preprocessing = None;
    }

    pub fn clear_postprocessing(&mut self) {
        self.postprocessing = None;
    }

    pub fn set_predictor(&mut self, predictor: Box<dyn BinaryModel>) -> Result<()> {
        if let Some(post) = &self.postprocessing {
            check_postprocessing_arity(post, predictor.as_ref())?;
        }
        self.predictor = predictor;
        Ok(())
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    pub fn preprocessing(&self) -> Option<&MultistagePipeline> {
        self.preprocessing.as_ref()
    }

    pub fn predictor(&self) -> &dyn BinaryModel {
        self.predictor.as_ref()
    }

    pub fn postprocessing(&self) -> Option<&MultistagePipeline> {
        self.postprocessing.as_ref()
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Input length required by the preprocessing, 0 when unconstrained
    pub fn num_inputs(&self) -> usize {
        self.preprocessing.as_ref().map_or(0, |p| p.num_inputs())
    }

    pub fn num_predictor_outputs(&self) -> usize {
        self.predictor.num_outputs()
    }

    /// Take the predictor out of the workflow, dropping everything else
    pub fn release_predictor(self) -> Box<dyn BinaryModel> {
        self.predictor
    }

    pub fn print_preprocessing(&self, w: &mut dyn Write) -> Result<()> {
        match &self.preprocessing {
            Some(pipeline) => pipeline.serialize(w),
            None => Ok(writeln!(w)?),
        }
    }

    pub fn print_predictor(&self, w: &mut dyn Write) -> Result<()> {
        self.predictor.serialize(w)
    }

    pub fn print_postprocessing(&self, w: &mut dyn Write) -> Result<()> {
        match &self.postprocessing {
            Some(pipeline) => pipeline.serialize(w),
            None => Ok(writeln!(w)?),
        }
    }

    pub fn print_threshold(&self, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "{}", Sig16(self.threshold))?;
        Ok(())
    }

    /// Combine raw predictor outputs into `[score, raw...]`
    fn aggregate(&self, raw: Vec<f64>) -> Result<Vec<f64>> {
        let score = match &self.postprocessing {
            Some(post) => post.process_vector(raw.clone())?,
            None => raw.first().copied().ok_or(SVMError::ArityMismatch {
                expected: 1,
                actual: 0,
            })?,
        };
        let mut result = Vec::with_capacity(raw.len() + 1);
        result.push(score);
        result.extend(raw);
        Ok(result)
    }

    fn to_prediction(&self, scores: Vec<f64>) -> Prediction {
        let label = if scores[0] > self.threshold {
            self.predictor.positive_label()
        } else {
            self.predictor.negative_label()
        };
        Prediction::new(label, scores)
    }

    pub fn read(reader: &mut TextReader<'_>) -> Result<Self> {
        reader.expect_marker("preprocessing")?;
        let line = reader.next_line("preprocessing pipeline")?;
        let preprocessing = match line.trim() {
            "" => None,
            name => Some(MultistagePipeline::read_named(name, reader)?),
        };

        reader.expect_marker("predictor")?;
        let predictor = model::read_model(reader)?;

        reader.expect_marker("postprocessing")?;
        let line = reader.next_line("postprocessing pipeline")?;
        let postprocessing = match line.trim() {
            "" => None,
            name => Some(MultistagePipeline::read_named(name, reader)?),
        };

        reader.expect_marker("threshold")?;
        let line = reader.next_line("threshold")?;
        let threshold: f64 = reader.parse(line.trim(), "threshold")?;

        debug!(
            "Read workflow around {} (preprocessing: {}, postprocessing: {})",
            predictor.tag(),
            preprocessing.is_some(),
            postprocessing.is_some()
        );
        Self::from_parts(preprocessing, predictor, postprocessing, threshold)
            .map_err(|e| reader.malformed(e))
    }
}

impl BinaryModel for BinaryWorkflow {
    fn tag(&self) -> &'static str {
        BINARY_WORKFLOW_TAG
    }

    fn predict(&self, x: &SparseVector) -> Result<Prediction> {
        let scores = self.decision_value(x)?;
        Ok(self.to_prediction(scores))
    }

    fn predict_dense(&self, x: &[f64]) -> Result<Prediction> {
        let scores = self.decision_value_dense(x)?;
        Ok(self.to_prediction(scores))
    }

    fn decision_value(&self, x: &SparseVector) -> Result<Vec<f64>> {
        let raw = match &self.preprocessing {
            Some(pre) => {
                let processed = pre.process_sparse(x.clone())?;
                self.predictor.decision_value(&processed)?
            }
            None => self.predictor.decision_value(x)?,
        };
        self.aggregate(raw)
    }

    fn decision_value_dense(&self, x: &[f64]) -> Result<Vec<f64>> {
        match &self.preprocessing {
            Some(_) => self.decision_value(&SparseVector::from_dense(x)),
            None => {
                let raw = self.predictor.decision_value_dense(x)?;
                self.aggregate(raw)
            }
        }
    }

    fn positive_label(&self) -> String {
        self.predictor.positive_label()
    }

    fn negative_label(&self) -> String {
        self.predictor.negative_label()
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn serialize(&self, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "{BINARY_WORKFLOW_TAG}")?;
        writeln!(w, "preprocessing")?;
        self.print_preprocessing(w)?;
        writeln!(w, "predictor")?;
        self.print_predictor(w)?;
        writeln!(w, "postprocessing")?;
        self.print_postprocessing(w)?;
        writeln!(w, "threshold")?;
        self.print_threshold(w)
    }

    fn clone_box(&self) -> Box<dyn BinaryModel> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// Standard workflow for `predictor`
///
/// Single-output predictors are used as is with threshold 0. Predictors with
/// several outputs get majority vote (or unit logistic regression) postprocessing
/// and threshold 0.5.
pub fn default_binary_workflow(predictor: Box<dyn BinaryModel>, majority_vote: bool) -> Result<BinaryWorkflow> {
    let n = predictor.num_outputs();
    if n == 1 {
        return Ok(BinaryWorkflow::new(predictor));
    }
    let post = if majority_vote {
        MultistagePipeline::majority_vote(n)?
    } else {
        MultistagePipeline::unit_logistic_regression(n)?
    };
    BinaryWorkflow::from_parts(None, predictor, Some(post), 0.5)
}

/// Registry entry point for `BinaryWorkflow` blocks
pub(crate) fn read_binary_workflow(reader: &mut TextReader<'_>) -> Result<Box<dyn BinaryModel>> {
    Ok(Box::new(BinaryWorkflow::read(reader)?))
}
