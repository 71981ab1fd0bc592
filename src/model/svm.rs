//! Single kernel machine

use crate::core::{BinaryModel, Prediction, Result, SVMError, SparseVector};
use crate::kernel::Kernel;
use crate::persistence::{Sig16, TextReader};
use log::debug;
use std::any::Any;
use std::io::Write;
use std::sync::Arc;

pub const SVM_MODEL_TAG: &str = "SVMModel";

/// Where the support vector column of a model's SV lines comes from
pub(crate) enum SvSource<'a> {
    /// Full sparse text after the weights
    Inline,
    /// Index into an ensemble's distinct support vectors
    JumpTable(&'a [Arc<SparseVector>]),
}

/// A kernel machine trained by an external solver
///
/// Weights are stored as `(k - 1)` rows of `num_sv` entries each
/// (`weights[sv + row * num_sv]`); support vectors are grouped by class in the
/// order of `classes`. Only the binary pair (class 0, class 1) is evaluated.
#[derive(Debug, Clone)]
pub struct SVMModel {
    svs: Vec<Arc<SparseVector>>,
    weights: Vec<f64>,
    classes: Vec<(String, usize)>,
    constants: Vec<f64>,
    kernel: Arc<Kernel>,
    ensemble: Option<u64>,
}

impl SVMModel {
    /// Build a model from solver output
    pub fn new(
        svs: Vec<SparseVector>,
        weights: Vec<f64>,
        classes: Vec<(String, usize)>,
        constants: Vec<f64>,
        kernel: Kernel,
    ) -> Result<Self> {
        Self::from_shared(
            svs.into_iter().map(Arc::new).collect(),
            weights,
            classes,
            constants,
            Arc::new(kernel),
        )
    }

    pub(crate) fn from_shared(
        svs: Vec<Arc<SparseVector>>,
        weights: Vec<f64>,
        classes: Vec<(String, usize)>,
        constants: Vec<f64>,
        kernel: Arc<Kernel>,
    ) -> Result<Self> {
        let k = classes.len();
        if k < 2 {
            return Err(SVMError::InvalidParameter(format!(
                "A model needs at least two classes, got {k}"
            )));
        }
        let counted: usize = classes.iter().map(|(_, n)| n).sum();
        if counted != svs.len() {
            return Err(SVMError::InvalidParameter(format!(
                "Class counts sum to {counted} but the model has {} support vectors",
                svs.len()
            )));
        }
        if weights.len() != (k - 1) * svs.len() {
            return Err(SVMError::ArityMismatch {
                expected: (k - 1) * svs.len(),
                actual: weights.len(),
            });
        }
        if constants.len() != k * (k - 1) / 2 {
            return Err(SVMError::ArityMismatch {
                expected: k * (k - 1) / 2,
                actual: constants.len(),
            });
        }
        Ok(Self {
            svs,
            weights,
            classes,
            constants,
            kernel,
            ensemble: None,
        })
    }

    /// Number of support vectors
    pub fn size(&self) -> usize {
        self.svs.len()
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn label(&self, class: usize) -> Option<&str> {
        self.classes.get(class).map(|(label, _)| label.as_str())
    }

    pub fn num_sv(&self, class: usize) -> Option<usize> {
        self.classes.get(class).map(|&(_, n)| n)
    }

    pub fn constant(&self, index: usize) -> Option<f64> {
        self.constants.get(index).copied()
    }

    pub fn constants(&self) -> &[f64] {
        &self.constants
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn classes(&self) -> &[(String, usize)] {
        &self.classes
    }

    pub fn support_vectors(&self) -> &[Arc<SparseVector>] {
        &self.svs
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub(crate) fn kernel_handle(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    /// Whether the model currently belongs to an ensemble
    pub fn is_in_ensemble(&self) -> bool {
        self.ensemble.is_some()
    }

    pub(crate) fn owner(&self) -> Option<u64> {
        self.ensemble
    }

    pub(crate) fn set_owner(&mut self, owner: Option<u64>) {
        self.ensemble = owner;
    }

    pub(crate) fn set_kernel(&mut self, kernel: Arc<Kernel>) {
        self.kernel = kernel;
    }

    /// Rename class `current` to `replacement`
    pub fn update_label(&mut self, current: &str, replacement: &str) -> Result<()> {
        let mut replaced = false;
        for (label, _) in self.classes.iter_mut().filter(|(label, _)| label == current) {
            *label = replacement.to_string();
            replaced = true;
        }
        if replaced {
            Ok(())
        } else {
            Err(SVMError::UnknownLabel(format!(
                "unable to replace class label '{current}' with '{replacement}'"
            )))
        }
    }

    /// Swap the handle of SV `position` for a value-equal shared one
    pub(crate) fn redirect_sv(&mut self, position: usize, canonical: Arc<SparseVector>) -> Result<()> {
        let current = self.svs.get_mut(position).ok_or_else(|| {
            SVMError::OwnershipViolation(format!("support vector {position} does not exist"))
        })?;
        if **current != *canonical {
            return Err(SVMError::OwnershipViolation(format!(
                "support vector {position} redirected to a different vector"
            )));
        }
        *current = canonical;
        Ok(())
    }

    /// Binary one-vs-one decision value from per-SV kernel evaluations
    pub(crate) fn decision_from_cache<F>(&self, kernel_value: F) -> f64
    where
        F: Fn(usize) -> f64,
    {
        let num_sv = self.svs.len();
        let (i, j) = (0, 1);
        let start_i = 0;
        let start_j = self.classes[i].1;
        let count_i = self.classes[i].1;
        let count_j = self.classes[j].1;
        let row_i = j - 1;
        let row_j = i;

        let mut sum = 0.0;
        for k in start_i..start_i + count_i {
            sum += self.weights[k + row_i * num_sv] * kernel_value(k);
        }
        for k in start_j..start_j + count_j {
            sum += self.weights[k + row_j * num_sv] * kernel_value(k);
        }
        sum - self.constants[0]
    }

    fn label_for(&self, value: f64) -> String {
        if value > 0.0 {
            self.classes[0].0.clone()
        } else {
            self.classes[1].0.clone()
        }
    }

    /// Write everything after the tag line
    ///
    /// `slots` holds the jump table slot of every SV when the model is written
    /// by its ensemble.
    pub(crate) fn write_body(&self, w: &mut dyn Write, slots: Option<&[usize]>) -> Result<()> {
        match slots {
            None => {
                writeln!(w, "in_ensemble 0")?;
                self.kernel.serialize(w)?;
            }
            Some(_) => writeln!(w, "in_ensemble 1")?,
        }
        writeln!(w, "nr_class {}", self.classes.len())?;
        writeln!(w, "total_sv {}", self.svs.len())?;
        write!(w, "label")?;
        for (label, _) in &self.classes {
            write!(w, " {label}")?;
        }
        writeln!(w)?;
        write!(w, "nr_sv")?;
        for (_, count) in &self.classes {
            write!(w, " {count}")?;
        }
        writeln!(w)?;
        write!(w, "rho")?;
        for &c in &self.constants {
            write!(w, " {}", Sig16(c))?;
        }
        writeln!(w)?;
        writeln!(w, "SV")?;

        let num_sv = self.svs.len();
        let rows = self.classes.len() - 1;
        for (position, sv) in self.svs.iter().enumerate() {
            for row in 0..rows {
                write!(w, "{} ", Sig16(self.weights[position + row * num_sv]))?;
            }
            match slots {
                None => writeln!(w, "{sv}")?,
                Some(slots) => writeln!(w, "{}", slots[position])?,
            }
        }
        Ok(())
    }

    /// Read a standalone model (tag line already consumed)
    pub fn read(reader: &mut TextReader<'_>) -> Result<Self> {
        let in_ensemble: u8 = reader.keyword_value("in_ensemble")?;
        if in_ensemble != 0 {
            return Err(reader.malformed(
                "model belongs to an ensemble and can only be read as part of it",
            ));
        }
        let kernel = Arc::new(Kernel::read(reader)?);
        Self::read_body(reader, kernel, SvSource::Inline)
    }

    /// Read a member model inside an ensemble block (tag line already consumed)
    pub(crate) fn read_member(
        reader: &mut TextReader<'_>,
        kernel: Arc<Kernel>,
        jump_table: &[Arc<SparseVector>],
    ) -> Result<Self> {
        let in_ensemble: u8 = reader.keyword_value("in_ensemble")?;
        if in_ensemble != 1 {
            return Err(reader.malformed("expecting a model stored inside the ensemble"));
        }
        Self::read_body(reader, kernel, SvSource::JumpTable(jump_table))
    }

    fn read_body(reader: &mut TextReader<'_>, kernel: Arc<Kernel>, source: SvSource<'_>) -> Result<Self> {
        let nr_class: usize = reader.keyword_value("nr_class")?;
        if nr_class < 2 {
            return Err(reader.malformed(format!("a model needs two classes, got {nr_class}")));
        }
        let total_sv: usize = reader.keyword_value("total_sv")?;
        let labels = reader.keyword_line("label")?;
        if labels.len() != nr_class {
            return Err(reader.malformed(format!(
                "expecting {nr_class} labels, got {}",
                labels.len()
            )));
        }
        let counts = reader.keyword_line("nr_sv")?;
        if counts.len() != nr_class {
            return Err(reader.malformed(format!(
                "expecting {nr_class} SV counts, got {}",
                counts.len()
            )));
        }
        let counts = counts
            .iter()
            .map(|c| reader.parse::<usize>(c, "nr_sv"))
            .collect::<Result<Vec<_>>>()?;
        if counts.iter().sum::<usize>() != total_sv {
            return Err(reader.malformed("total_sv does not match the sum of nr_sv"));
        }
        let constants = reader
            .keyword_line("rho")?
            .iter()
            .map(|c| reader.parse::<f64>(c, "rho"))
            .collect::<Result<Vec<_>>>()?;
        reader.expect_marker("SV")?;

        let rows = nr_class - 1;
        let mut row_major = vec![Vec::with_capacity(total_sv); rows];
        let mut svs = Vec::with_capacity(total_sv);
        for _ in 0..total_sv {
            let line = reader.next_line("support vector")?;
            let mut tokens = line.split_whitespace();
            for row in row_major.iter_mut() {
                let token = tokens
                    .next()
                    .ok_or_else(|| reader.malformed("missing SV weight"))?;
                row.push(reader.parse::<f64>(token, "SV weight")?);
            }
            let sv = match &source {
                SvSource::Inline => {
                    let rest: Vec<&str> = tokens.collect();
                    Arc::new(
                        SparseVector::parse(&rest.join(" "))
                            .map_err(|e| reader.malformed(e))?,
                    )
                }
                SvSource::JumpTable(table) => {
                    let token = tokens
                        .next()
                        .ok_or_else(|| reader.malformed("missing support vector index"))?;
                    let slot: usize = reader.parse(token, "support vector index")?;
                    let sv = table.get(slot).ok_or_else(|| {
                        reader.malformed(format!("support vector index {slot} out of range"))
                    })?;
                    Arc::clone(sv)
                }
            };
            svs.push(sv);
        }

        let classes = labels.into_iter().zip(counts).collect();
        let weights = row_major.concat();
        let model = Self::from_shared(svs, weights, classes, constants, kernel)
            .map_err(|e| reader.malformed(e))?;
        debug!(
            "Read SVM model with {} support vectors ({} kernel)",
            model.size(),
            model.kernel
        );
        Ok(model)
    }
}

impl BinaryModel for SVMModel {
    fn tag(&self) -> &'static str {
        SVM_MODEL_TAG
    }

    fn predict(&self, x: &SparseVector) -> Result<Prediction> {
        let value = self.decision_value(x)?;
        Ok(Prediction::new(self.label_for(value[0]), value))
    }

    fn predict_dense(&self, x: &[f64]) -> Result<Prediction> {
        let value = self.decision_value_dense(x)?;
        Ok(Prediction::new(self.label_for(value[0]), value))
    }

    fn decision_value(&self, x: &SparseVector) -> Result<Vec<f64>> {
        let evaluations: Vec<f64> = self
            .svs
            .iter()
            .map(|sv| self.kernel.compute(sv, x))
            .collect();
        Ok(vec![self.decision_from_cache(|k| evaluations[k])])
    }

    fn decision_value_dense(&self, x: &[f64]) -> Result<Vec<f64>> {
        self.decision_value(&SparseVector::from_dense(x))
    }

    fn positive_label(&self) -> String {
        self.classes[0].0.clone()
    }

    fn negative_label(&self) -> String {
        self.classes[1].0.clone()
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn serialize(&self, w: &mut dyn Write) -> Result<()> {
        if self.ensemble.is_some() {
            return Err(SVMError::OwnershipViolation(
                "a model inside an ensemble is serialized by its ensemble".to_string(),
            ));
        }
        writeln!(w, "{SVM_MODEL_TAG}")?;
        self.write_body(w, None)
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

/// Registry entry point for `SVMModel` blocks
pub(crate) fn read_svm_model(reader: &mut TextReader<'_>) -> Result<Box<dyn BinaryModel>> {
    Ok(Box::new(SVMModel::read(reader)?))
}
