//! Ensembles of SVM models sharing one kernel and one pool of support vectors
//!
//! Every support vector added through [`SVMEnsemble::add`] is deduplicated by
//! value into a jump table. Evaluating the ensemble computes one kernel value
//! per distinct support vector and lets each member model gather its own
//! evaluations from that cache, so models trained on overlapping samples share
//! the kernel work.

use crate::core::{BinaryModel, Prediction, Result, SVMError, SparseVector};
use crate::kernel::Kernel;
use crate::model::svm::{SVMModel, SVM_MODEL_TAG};
use crate::persistence::TextReader;
use log::debug;
use std::any::Any;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

pub const SVM_ENSEMBLE_TAG: &str = "SVMEnsemble";

/// Translation from internal training labels to user-facing labels
pub type LabelMap = BTreeMap<String, String>;

static NEXT_ENSEMBLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ENSEMBLE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
pub struct SVMEnsemble {
    id: u64,
    kernel: Arc<Kernel>,
    jump_table: Vec<Arc<SparseVector>>,
    dedup: BTreeMap<Arc<SparseVector>, usize>,
    sv_index: Vec<usize>,
    /// Member models in insertion order with their offset into `sv_index`
    models: Vec<(SVMModel, usize)>,
    labelmap: LabelMap,
    dense_cache: OnceLock<Vec<Vec<f64>>>,
}

impl SVMEnsemble {
    /// Create an empty ensemble that will own `kernel`
    pub fn new(kernel: Kernel) -> Self {
        Self::with_labelmap(kernel, LabelMap::new())
    }

    pub fn with_labelmap(kernel: Kernel, labelmap: LabelMap) -> Self {
        Self {
            id: next_id(),
            kernel: Arc::new(kernel),
            jump_table: Vec::new(),
            dedup: BTreeMap::new(),
            sv_index: Vec::new(),
            models: Vec::new(),
            labelmap,
            dense_cache: OnceLock::new(),
        }
    }

    /// Build an ensemble from models sharing the same labels
    ///
    /// The kernel of the first model becomes the ensemble kernel.
    pub fn from_models(models: Vec<SVMModel>) -> Result<Self> {
        let (positive, negative) = shared_labels(&models)?;
        Self::build(models, positive.clone(), positive, negative.clone(), negative)
    }

    /// Like [`SVMEnsemble::from_models`], translating the shared internal
    /// labels to `positive` and `negative`
    pub fn from_models_relabeled(models: Vec<SVMModel>, positive: &str, negative: &str) -> Result<Self> {
        let (internal_pos, internal_neg) = shared_labels(&models)?;
        Self::build(
            models,
            internal_pos,
            positive.to_string(),
            internal_neg,
            negative.to_string(),
        )
    }

    fn build(
        models: Vec<SVMModel>,
        internal_pos: String,
        positive: String,
        internal_neg: String,
        negative: String,
    ) -> Result<Self> {
        let kernel = models
            .first()
            .map(|m| m.kernel().clone())
            .ok_or(SVMError::EmptyEnsemble)?;
        let mut labelmap = LabelMap::new();
        labelmap.insert(internal_pos, positive);
        labelmap.insert(internal_neg, negative);

        let mut ensemble = Self::with_labelmap(kernel, labelmap);
        for model in models {
            ensemble.add(model)?;
        }
        Ok(ensemble)
    }

    /// Take ownership of `model`, sharing its kernel and deduplicating its SVs
    pub fn add(&mut self, mut model: SVMModel) -> Result<()> {
        if let Some(owner) = model.owner() {
            return Err(SVMError::OwnershipViolation(if owner == self.id {
                "model already belongs to this ensemble".to_string()
            } else {
                "model already belongs to another ensemble".to_string()
            }));
        }
        if model.kernel() != self.kernel.as_ref() {
            return Err(SVMError::KernelMismatch {
                expected: self.kernel.to_string(),
                actual: model.kernel().to_string(),
            });
        }
        if self.labelmap.is_empty() {
            let pos = model.positive_label();
            let neg = model.negative_label();
            self.labelmap.insert(pos.clone(), pos);
            self.labelmap.insert(neg.clone(), neg);
        }

        if !Arc::ptr_eq(model.kernel_handle(), &self.kernel) {
            model.set_kernel(Arc::clone(&self.kernel));
        }

        let start = self.sv_index.len();
        let mut fresh = 0;
        for position in 0..model.size() {
            let sv = Arc::clone(&model.support_vectors()[position]);
            let slot = match self.dedup.get(&sv) {
                Some(&slot) => slot,
                None => {
                    let slot = self.jump_table.len();
                    self.jump_table.push(Arc::clone(&sv));
                    self.dedup.insert(sv, slot);
                    fresh += 1;
                    slot
                }
            };
            model.redirect_sv(position, Arc::clone(&self.jump_table[slot]))?;
            self.sv_index.push(slot);
        }

        debug!(
            "Added model {} with {} support vectors ({} new, {} distinct in total)",
            self.models.len(),
            model.size(),
            fresh,
            self.jump_table.len()
        );

        model.set_owner(Some(self.id));
        self.models.push((model, start));
        self.dense_cache = OnceLock::new();
        Ok(())
    }

    /// Number of member models
    pub fn size(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn num_distinct_sv(&self) -> usize {
        self.jump_table.len()
    }

    /// Support vectors summed over all member models
    pub fn num_total_sv(&self) -> usize {
        self.models.iter().map(|(m, _)| m.size()).sum()
    }

    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    pub fn labelmap(&self) -> &LabelMap {
        &self.labelmap
    }

    /// Distinct support vectors in insertion order
    pub fn support_vectors(&self) -> &[Arc<SparseVector>] {
        &self.jump_table
    }

    pub fn models(&self) -> impl Iterator<Item = &SVMModel> {
        self.models.iter().map(|(m, _)| m)
    }

    /// Jump table slot of SV `local` of member `model`
    pub fn sv_index(&self, model: usize, local: usize) -> Option<usize> {
        let (m, start) = self.models.get(model)?;
        if local < m.size() {
            self.sv_index.get(start + local).copied()
        } else {
            None
        }
    }

    /// Release the member models as standalone models
    pub fn into_models(self) -> Vec<SVMModel> {
        self.models
            .into_iter()
            .map(|(mut model, _)| {
                model.set_owner(None);
                model
            })
            .collect()
    }

    /// Map an internal label to its user-facing form
    pub fn translate(&self, label: &str) -> Result<String> {
        if self.labelmap.is_empty() {
            return Ok(label.to_string());
        }
        self.labelmap
            .get(label)
            .cloned()
            .ok_or_else(|| SVMError::UnknownLabel(format!("no translation for label '{label}'")))
    }

    /// Non-zeros of the distinct support vectors over their largest index
    pub fn density(&self) -> f64 {
        let mut max_dim = 0;
        let mut total = 0;
        for sv in &self.jump_table {
            if !sv.is_empty() {
                total += sv.num_nonzero();
                max_dim = max_dim.max(sv.size());
            }
        }
        if max_dim == 0 {
            0.0
        } else {
            total as f64 / max_dim as f64
        }
    }

    fn decisions_from_cache(&self, cache: &[f64]) -> Result<Vec<f64>> {
        if self.models.is_empty() {
            return Err(SVMError::EmptyEnsemble);
        }
        Ok(self
            .models
            .iter()
            .map(|(model, start)| {
                let slots = &self.sv_index[*start..*start + model.size()];
                model.decision_from_cache(|k| cache[slots[k]])
            })
            .collect())
    }

    fn to_prediction(&self, decisions: Vec<f64>) -> Result<Prediction> {
        let size = decisions.len();
        let num_pos = decisions.iter().filter(|&&d| d > 0.0).count();
        let label = if 2 * num_pos > size {
            self.translated_label(|m| m.positive_label())?
        } else {
            self.translated_label(|m| m.negative_label())?
        };
        let mut scores = Vec::with_capacity(size + 1);
        scores.push(num_pos as f64 / size as f64);
        scores.extend(decisions);
        Ok(Prediction::new(label, scores))
    }

    fn translated_label<F>(&self, pick: F) -> Result<String>
    where
        F: Fn(&SVMModel) -> String,
    {
        let (first, _) = self.models.first().ok_or(SVMError::EmptyEnsemble)?;
        self.translate(&pick(first))
    }

    fn dense_support_vectors(&self) -> &[Vec<f64>] {
        self.dense_cache
            .get_or_init(|| self.jump_table.iter().map(|sv| sv.dense()).collect())
    }

    fn write_body(&self, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "num_distinct_sv {}", self.jump_table.len())?;
        if !self.labelmap.is_empty() {
            write!(w, "labelmap")?;
            for (internal, external) in &self.labelmap {
                write!(w, " {internal} {external}")?;
            }
            writeln!(w)?;
        }
        writeln!(w, "num_models {}", self.models.len())?;
        self.kernel.serialize(w)?;
        writeln!(w, "*** SV ***")?;
        for sv in &self.jump_table {
            writeln!(w, "{sv}")?;
        }
        writeln!(w, "*** MODELS ***")?;
        for (model, start) in &self.models {
            writeln!(w, "{SVM_MODEL_TAG}")?;
            model.write_body(w, Some(&self.sv_index[*start..*start + model.size()]))?;
        }
        Ok(())
    }

    /// Read an ensemble block (tag line already consumed)
    pub fn read(reader: &mut TextReader<'_>) -> Result<Self> {
        let num_sv: usize = reader.keyword_value("num_distinct_sv")?;

        let line = reader.next_line("labelmap or num_models")?;
        let mut tokens = line.split_whitespace();
        let mut labelmap = LabelMap::new();
        let num_models_line = match tokens.next() {
            Some("labelmap") => {
                let pairs: Vec<&str> = tokens.collect();
                if pairs.len() % 2 != 0 {
                    return Err(reader.malformed("label map must hold internal/external pairs"));
                }
                for pair in pairs.chunks(2) {
                    labelmap.insert(pair[0].to_string(), pair[1].to_string());
                }
                reader.next_line("num_models")?
            }
            _ => line.clone(),
        };
        let num_models: usize = match num_models_line.split_whitespace().collect::<Vec<_>>()[..] {
            ["num_models", count] => reader.parse(count, "num_models")?,
            _ => {
                return Err(reader.malformed(format!(
                    "expecting 'num_models', got '{num_models_line}'"
                )))
            }
        };

        let kernel = Kernel::read(reader)?;
        reader.expect_marker("*** SV ***")?;

        let mut ensemble = Self::with_labelmap(kernel, labelmap);
        for slot in 0..num_sv {
            let line = reader.next_line("support vector")?;
            let sv = Arc::new(SparseVector::parse(&line).map_err(|e| reader.malformed(e))?);
            if ensemble.dedup.insert(Arc::clone(&sv), slot).is_some() {
                return Err(reader.malformed("duplicate support vector in ensemble"));
            }
            ensemble.jump_table.push(sv);
        }

        reader.expect_marker("*** MODELS ***")?;
        for _ in 0..num_models {
            reader.expect_marker(SVM_MODEL_TAG)?;
            let model =
                SVMModel::read_member(reader, Arc::clone(&ensemble.kernel), &ensemble.jump_table)?;
            ensemble.add(model)?;
        }
        debug!(
            "Read ensemble with {} models and {} distinct support vectors",
            ensemble.size(),
            ensemble.num_distinct_sv()
        );
        Ok(ensemble)
    }
}

fn shared_labels(models: &[SVMModel]) -> Result<(String, String)> {
    let first = models.first().ok_or(SVMError::EmptyEnsemble)?;
    let positive = first.positive_label();
    let negative = first.negative_label();
    for model in models {
        if model.positive_label() != positive || model.negative_label() != negative {
            return Err(SVMError::UnknownLabel(format!(
                "model labels '{}'/'{}' differ from '{positive}'/'{negative}'",
                model.positive_label(),
                model.negative_label()
            )));
        }
    }
    Ok((positive, negative))
}

impl Clone for SVMEnsemble {
    /// Deep copy with a fresh identity; member models are re-tagged
    fn clone(&self) -> Self {
        let id = next_id();
        let models = self
            .models
            .iter()
            .map(|(model, start)| {
                let mut model = model.clone();
                model.set_owner(Some(id));
                (model, *start)
            })
            .collect();
        Self {
            id,
            kernel: Arc::clone(&self.kernel),
            jump_table: self.jump_table.clone(),
            dedup: self.dedup.clone(),
            sv_index: self.sv_index.clone(),
            models,
            labelmap: self.labelmap.clone(),
            dense_cache: OnceLock::new(),
        }
    }
}

impl BinaryModel for SVMEnsemble {
    fn tag(&self) -> &'static str {
        SVM_ENSEMBLE_TAG
    }

    /// Label by strict majority; `scores[0]` is the fraction of positive votes
    fn predict(&self, x: &SparseVector) -> Result<Prediction> {
        let decisions = self.decision_value(x)?;
        self.to_prediction(decisions)
    }

    fn predict_dense(&self, x: &[f64]) -> Result<Prediction> {
        let decisions = self.decision_value_dense(x)?;
        self.to_prediction(decisions)
    }

    fn decision_value(&self, x: &SparseVector) -> Result<Vec<f64>> {
        if self.models.is_empty() {
            return Err(SVMError::EmptyEnsemble);
        }
        let cache: Vec<f64> = self
            .jump_table
            .iter()
            .map(|sv| self.kernel.compute(sv, x))
            .collect();
        self.decisions_from_cache(&cache)
    }

    fn decision_value_dense(&self, x: &[f64]) -> Result<Vec<f64>> {
        if self.models.is_empty() {
            return Err(SVMError::EmptyEnsemble);
        }
        let cache: Vec<f64> = self
            .dense_support_vectors()
            .iter()
            .map(|sv| self.kernel.compute_dense(sv, x))
            .collect();
        self.decisions_from_cache(&cache)
    }

    fn positive_label(&self) -> String {
        self.translated_label(|m| m.positive_label())
            .unwrap_or_default()
    }

    fn negative_label(&self) -> String {
        self.translated_label(|m| m.negative_label())
            .unwrap_or_default()
    }

    fn num_outputs(&self) -> usize {
        self.models.len()
    }

    fn serialize(&self, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "{SVM_ENSEMBLE_TAG}")?;
        self.write_body(w)
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

/// Registry entry point for `SVMEnsemble` blocks
pub(crate) fn read_svm_ensemble(reader: &mut TextReader<'_>) -> Result<Box<dyn BinaryModel>> {
    Ok(Box::new(SVMEnsemble::read(reader)?))
}
