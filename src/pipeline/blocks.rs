//! Built-in stages

use crate::core::{BinaryModel, Result, SVMError};
use crate::model;
use crate::persistence::{write_values_line, Sig16, TextReader};
use crate::pipeline::{Signature, Stage, Value, ValueKind};
use crate::registry::StageReader;
use std::io::Write;

fn kind_mismatch(stage: &str, value: &Value) -> SVMError {
    SVMError::InvalidParameter(format!("{stage} cannot process a {} value", value.kind()))
}

/// Coefficient for position `i`; a single coefficient applies everywhere
fn broadcast(values: &[f64], i: usize) -> Result<f64> {
    match values {
        [single] => Ok(*single),
        _ => values.get(i).copied().ok_or(SVMError::ArityMismatch {
            expected: values.len(),
            actual: i + 1,
        }),
    }
}

fn elementwise<F>(input: &[f64], params: &[f64], num_outputs: usize, op: F) -> Result<Vec<f64>>
where
    F: Fn(f64, f64) -> f64,
{
    if params.len() > 1 && num_outputs == 0 && params.len() != input.len() {
        return Err(SVMError::ArityMismatch {
            expected: params.len(),
            actual: input.len(),
        });
    }
    let len = if num_outputs > 0 { num_outputs } else { input.len() };
    (0..len)
        .map(|i| Ok(op(input.get(i).copied().unwrap_or(0.0), broadcast(params, i)?)))
        .collect()
}

fn read_count(reader: &mut TextReader<'_>, what: &str) -> Result<usize> {
    let line = reader.next_line(what)?;
    let count: usize = reader.parse(line.trim(), what)?;
    if count == 0 {
        return Err(reader.malformed(format!("{what} must be positive")));
    }
    Ok(count)
}

/// Elementwise multiplication by one coefficient or one per position
#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    kind: ValueKind,
    coeffs: Vec<f64>,
    num_inputs: usize,
    num_outputs: usize,
}

impl Scale {
    pub fn vector(coeffs: Vec<f64>, num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            kind: ValueKind::Vector,
            coeffs,
            num_inputs,
            num_outputs,
        }
    }

    /// Scale a sparse vector; the result is trimmed to `num_outputs` when non-zero
    pub fn sparse(coeffs: Vec<f64>, num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            kind: ValueKind::Sparse,
            coeffs,
            num_inputs,
            num_outputs,
        }
    }

    pub fn scalar(coeff: f64) -> Self {
        Self {
            kind: ValueKind::Scalar,
            coeffs: vec![coeff],
            num_inputs: 1,
            num_outputs: 1,
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coeffs
    }

    fn read(reader: &mut TextReader<'_>, kind: ValueKind, num_inputs: usize, num_outputs: usize) -> Result<Box<dyn Stage>> {
        let count = read_count(reader, "number of scale coefficients")?;
        let coeffs = reader.values_line(count, "scale coefficients")?;
        Ok(Box::new(Self {
            kind,
            coeffs,
            num_inputs,
            num_outputs,
        }))
    }
}

impl Stage for Scale {
    fn name(&self) -> &'static str {
        "Scale"
    }

    fn signature(&self) -> Signature {
        Signature::new(self.kind, self.kind)
    }

    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    fn apply(&self, value: Value) -> Result<Value> {
        match value {
            Value::Scalar(x) => Ok(Value::Scalar(x * broadcast(&self.coeffs, 0)?)),
            Value::Vector(v) => Ok(Value::Vector(elementwise(
                &v,
                &self.coeffs,
                self.num_outputs,
                |x, c| x * c,
            )?)),
            Value::Sparse(v) => Ok(Value::Sparse(v.scale(&self.coeffs, self.num_outputs))),
        }
    }

    fn write_data(&self, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "{}", self.coeffs.len())?;
        write_values_line(w, &self.coeffs)
    }

    fn clone_box(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

/// Elementwise addition of one offset or one per position
#[derive(Debug, Clone, PartialEq)]
pub struct Offset {
    kind: ValueKind,
    offsets: Vec<f64>,
    num_inputs: usize,
    num_outputs: usize,
}

impl Offset {
    pub fn vector(offsets: Vec<f64>, num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            kind: ValueKind::Vector,
            offsets,
            num_inputs,
            num_outputs,
        }
    }

    pub fn sparse(offsets: Vec<f64>, num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            kind: ValueKind::Sparse,
            offsets,
            num_inputs,
            num_outputs,
        }
    }

    pub fn scalar(offset: f64) -> Self {
        Self {
            kind: ValueKind::Scalar,
            offsets: vec![offset],
            num_inputs: 1,
            num_outputs: 1,
        }
    }

    pub fn offsets(&self) -> &[f64] {
        &self.offsets
    }

    fn read(reader: &mut TextReader<'_>, kind: ValueKind, num_inputs: usize, num_outputs: usize) -> Result<Box<dyn Stage>> {
        let count = read_count(reader, "number of offsets")?;
        let offsets = reader.values_line(count, "offsets")?;
        Ok(Box::new(Self {
            kind,
            offsets,
            num_inputs,
            num_outputs,
        }))
    }
}

impl Stage for Offset {
    fn name(&self) -> &'static str {
        "Offset"
    }

    fn signature(&self) -> Signature {
        Signature::new(self.kind, self.kind)
    }

    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    fn apply(&self, value: Value) -> Result<Value> {
        match value {
            Value::Scalar(x) => Ok(Value::Scalar(x + broadcast(&self.offsets, 0)?)),
            Value::Vector(v) => Ok(Value::Vector(elementwise(
                &v,
                &self.offsets,
                self.num_outputs,
                |x, o| x + o,
            )?)),
            Value::Sparse(v) => Ok(Value::Sparse(v.offset(&self.offsets, self.num_outputs))),
        }
    }

    fn write_data(&self, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "{}", self.offsets.len())?;
        write_values_line(w, &self.offsets)
    }

    fn clone_box(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

/// `1 / (1 + e^-x)`, elementwise
#[derive(Debug, Clone, PartialEq)]
pub struct Logistic {
    kind: ValueKind,
    num: usize,
}

impl Logistic {
    pub fn scalar() -> Self {
        Self {
            kind: ValueKind::Scalar,
            num: 1,
        }
    }

    pub fn vector(num: usize) -> Self {
        Self {
            kind: ValueKind::Vector,
            num,
        }
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Stage for Logistic {
    fn name(&self) -> &'static str {
        "Logistic"
    }

    fn signature(&self) -> Signature {
        Signature::new(self.kind, self.kind)
    }

    fn num_inputs(&self) -> usize {
        self.num
    }

    fn num_outputs(&self) -> usize {
        self.num
    }

    fn apply(&self, value: Value) -> Result<Value> {
        match value {
            Value::Scalar(x) => Ok(Value::Scalar(logistic(x))),
            Value::Vector(v) => Ok(Value::Vector(v.into_iter().map(logistic).collect())),
            other => Err(kind_mismatch("Logistic", &other)),
        }
    }

    fn write_data(&self, _w: &mut dyn Write) -> Result<()> {
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

/// Generalized binarization: `x > threshold` maps to `above`, otherwise `below`
///
/// Each parameter holds either one entry, applied to every position, or one
/// entry per position.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    kind: ValueKind,
    thresholds: Vec<f64>,
    above: Vec<f64>,
    below: Vec<f64>,
    num: usize,
}

impl Threshold {
    pub fn vector(thresholds: Vec<f64>, above: Vec<f64>, below: Vec<f64>, num: usize) -> Result<Self> {
        if thresholds.is_empty() || thresholds.len() != above.len() || thresholds.len() != below.len() {
            return Err(SVMError::InvalidParameter(format!(
                "threshold scheme needs equally sized, non-empty parts (got {}, {}, {})",
                thresholds.len(),
                above.len(),
                below.len()
            )));
        }
        if thresholds.len() > 1 && num > 0 && thresholds.len() != num {
            return Err(SVMError::ArityMismatch {
                expected: num,
                actual: thresholds.len(),
            });
        }
        Ok(Self {
            kind: ValueKind::Vector,
            thresholds,
            above,
            below,
            num,
        })
    }

    /// Same threshold and replacement values for every position
    pub fn uniform(threshold: f64, above: f64, below: f64, num: usize) -> Self {
        Self {
            kind: ValueKind::Vector,
            thresholds: vec![threshold],
            above: vec![above],
            below: vec![below],
            num,
        }
    }

    pub fn scalar(threshold: f64, above: f64, below: f64) -> Self {
        Self {
            kind: ValueKind::Scalar,
            thresholds: vec![threshold],
            above: vec![above],
            below: vec![below],
            num: 1,
        }
    }

    fn binarize(&self, x: f64, i: usize) -> Result<f64> {
        if x > broadcast(&self.thresholds, i)? {
            broadcast(&self.above, i)
        } else {
            broadcast(&self.below, i)
        }
    }

    fn read(reader: &mut TextReader<'_>, kind: ValueKind, num_inputs: usize, _num_outputs: usize) -> Result<Box<dyn Stage>> {
        let size = read_count(reader, "threshold scheme size")?;
        let thresholds = reader.values_line(size, "thresholds")?;
        let above = reader.values_line(size, "values above threshold")?;
        let below = reader.values_line(size, "values below threshold")?;
        let stage = match kind {
            ValueKind::Scalar if size == 1 => Self::scalar(thresholds[0], above[0], below[0]),
            ValueKind::Scalar => {
                return Err(reader.malformed("a scalar threshold has exactly one entry"))
            }
            _ => Self::vector(thresholds, above, below, num_inputs)
                .map_err(|e| reader.malformed(e))?,
        };
        Ok(Box::new(stage))
    }
}

impl Stage for Threshold {
    fn name(&self) -> &'static str {
        "Threshold"
    }

    fn signature(&self) -> Signature {
        Signature::new(self.kind, self.kind)
    }

    fn num_inputs(&self) -> usize {
        self.num
    }

    fn num_outputs(&self) -> usize {
        self.num
    }

    fn apply(&self, value: Value) -> Result<Value> {
        match value {
            Value::Scalar(x) => Ok(Value::Scalar(self.binarize(x, 0)?)),
            Value::Vector(v) => Ok(Value::Vector(
                v.iter()
                    .enumerate()
                    .map(|(i, &x)| self.binarize(x, i))
                    .collect::<Result<Vec<f64>>>()?,
            )),
            other => Err(kind_mismatch("Threshold", &other)),
        }
    }

    fn write_data(&self, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "{}", self.thresholds.len())?;
        write_values_line(w, &self.thresholds)?;
        write_values_line(w, &self.above)?;
        write_values_line(w, &self.below)
    }

    fn clone_box(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

fn vector_input(stage: &str, value: Value) -> Result<Vec<f64>> {
    match value {
        Value::Vector(v) => Ok(v),
        other => Err(kind_mismatch(stage, &other)),
    }
}

/// Mean of a vector
///
/// A non-zero divisor replaces the element count, which turns the stage into a
/// weighted vote when it follows a `Scale`.
#[derive(Debug, Clone, PartialEq)]
pub struct Average {
    num_inputs: usize,
    divisor: f64,
}

impl Average {
    pub fn new(num_inputs: usize, divisor: f64) -> Self {
        Self {
            num_inputs,
            divisor,
        }
    }

    pub fn divisor(&self) -> f64 {
        self.divisor
    }

    fn read(reader: &mut TextReader<'_>, num_inputs: usize, _num_outputs: usize) -> Result<Box<dyn Stage>> {
        let line = reader.next_line("divisor")?;
        let divisor = reader.parse(line.trim(), "divisor")?;
        Ok(Box::new(Self::new(num_inputs, divisor)))
    }
}

impl Stage for Average {
    fn name(&self) -> &'static str {
        "Average"
    }

    fn signature(&self) -> Signature {
        Signature::new(ValueKind::Scalar, ValueKind::Vector)
    }

    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn apply(&self, value: Value) -> Result<Value> {
        let v = vector_input("Average", value)?;
        let divisor = if self.divisor != 0.0 {
            self.divisor
        } else if v.is_empty() {
            return Err(SVMError::InvalidParameter(
                "cannot average an empty vector".to_string(),
            ));
        } else {
            v.len() as f64
        };
        Ok(Value::Scalar(v.iter().sum::<f64>() / divisor))
    }

    fn write_data(&self, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "{}", Sig16(self.divisor))?;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

/// Order statistic at position `len / 2`
#[derive(Debug, Clone, PartialEq)]
pub struct Median {
    num_inputs: usize,
}

impl Median {
    pub fn new(num_inputs: usize) -> Self {
        Self { num_inputs }
    }

    fn read(_reader: &mut TextReader<'_>, num_inputs: usize, _num_outputs: usize) -> Result<Box<dyn Stage>> {
        Ok(Box::new(Self::new(num_inputs)))
    }
}

impl Stage for Median {
    fn name(&self) -> &'static str {
        "Median"
    }

    fn signature(&self) -> Signature {
        Signature::new(ValueKind::Scalar, ValueKind::Vector)
    }

    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn apply(&self, value: Value) -> Result<Value> {
        let mut v = vector_input("Median", value)?;
        if v.is_empty() {
            return Err(SVMError::InvalidParameter(
                "cannot take the median of an empty vector".to_string(),
            ));
        }
        let mid = v.len() / 2;
        let (_, median, _) = v.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        Ok(Value::Scalar(*median))
    }

    fn write_data(&self, _w: &mut dyn Write) -> Result<()> {
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sum {
    num_inputs: usize,
}

impl Sum {
    pub fn new(num_inputs: usize) -> Self {
        Self { num_inputs }
    }

    fn read(_reader: &mut TextReader<'_>, num_inputs: usize, _num_outputs: usize) -> Result<Box<dyn Stage>> {
        Ok(Box::new(Self::new(num_inputs)))
    }
}

impl Stage for Sum {
    fn name(&self) -> &'static str {
        "Sum"
    }

    fn signature(&self) -> Signature {
        Signature::new(ValueKind::Scalar, ValueKind::Vector)
    }

    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn apply(&self, value: Value) -> Result<Value> {
        let v = vector_input("Sum", value)?;
        Ok(Value::Scalar(v.iter().sum()))
    }

    fn write_data(&self, _w: &mut dyn Write) -> Result<()> {
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

/// Any binary model used as a single-output stage
///
/// The stage yields the model's first decision value for a dense input.
#[derive(Debug, Clone)]
pub struct ModelStage {
    model: Box<dyn BinaryModel>,
    num_inputs: usize,
}

impl ModelStage {
    pub fn new(model: Box<dyn BinaryModel>) -> Self {
        Self {
            model,
            num_inputs: 0,
        }
    }

    pub fn with_inputs(model: Box<dyn BinaryModel>, num_inputs: usize) -> Self {
        Self { model, num_inputs }
    }

    pub fn model(&self) -> &dyn BinaryModel {
        self.model.as_ref()
    }

    fn read(reader: &mut TextReader<'_>, num_inputs: usize, _num_outputs: usize) -> Result<Box<dyn Stage>> {
        let model = model::read_model(reader)?;
        Ok(Box::new(Self::with_inputs(model, num_inputs)))
    }
}

impl Stage for ModelStage {
    fn name(&self) -> &'static str {
        "Predictor"
    }

    fn signature(&self) -> Signature {
        Signature::new(ValueKind::Scalar, ValueKind::Vector)
    }

    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn apply(&self, value: Value) -> Result<Value> {
        let v = vector_input("Predictor", value)?;
        let decision = self.model.decision_value_dense(&v)?;
        decision
            .first()
            .copied()
            .map(Value::Scalar)
            .ok_or(SVMError::ArityMismatch {
                expected: 1,
                actual: 0,
            })
    }

    fn write_data(&self, w: &mut dyn Write) -> Result<()> {
        self.model.serialize(w)
    }

    fn clone_box(&self) -> Box<dyn Stage> {
        Box::new(self.clone())
    }
}

fn read_scale_vector(r: &mut TextReader<'_>, ni: usize, no: usize) -> Result<Box<dyn Stage>> {
    Scale::read(r, ValueKind::Vector, ni, no)
}

fn read_scale_sparse(r: &mut TextReader<'_>, ni: usize, no: usize) -> Result<Box<dyn Stage>> {
    Scale::read(r, ValueKind::Sparse, ni, no)
}

fn read_scale_scalar(r: &mut TextReader<'_>, ni: usize, no: usize) -> Result<Box<dyn Stage>> {
    Scale::read(r, ValueKind::Scalar, ni, no)
}

fn read_offset_vector(r: &mut TextReader<'_>, ni: usize, no: usize) -> Result<Box<dyn Stage>> {
    Offset::read(r, ValueKind::Vector, ni, no)
}

fn read_offset_sparse(r: &mut TextReader<'_>, ni: usize, no: usize) -> Result<Box<dyn Stage>> {
    Offset::read(r, ValueKind::Sparse, ni, no)
}

fn read_offset_scalar(r: &mut TextReader<'_>, ni: usize, no: usize) -> Result<Box<dyn Stage>> {
    Offset::read(r, ValueKind::Scalar, ni, no)
}

fn read_logistic_scalar(_r: &mut TextReader<'_>, _ni: usize, _no: usize) -> Result<Box<dyn Stage>> {
    Ok(Box::new(Logistic::scalar()))
}

fn read_logistic_vector(_r: &mut TextReader<'_>, ni: usize, _no: usize) -> Result<Box<dyn Stage>> {
    Ok(Box::new(Logistic::vector(ni)))
}

fn read_threshold_vector(r: &mut TextReader<'_>, ni: usize, no: usize) -> Result<Box<dyn Stage>> {
    Threshold::read(r, ValueKind::Vector, ni, no)
}

fn read_threshold_scalar(r: &mut TextReader<'_>, ni: usize, no: usize) -> Result<Box<dyn Stage>> {
    Threshold::read(r, ValueKind::Scalar, ni, no)
}

/// Tags and readers of every built-in stage
pub(crate) fn list_built_in_stages() -> Vec<(String, StageReader)> {
    let vector = Signature::new(ValueKind::Vector, ValueKind::Vector);
    let sparse = Signature::new(ValueKind::Sparse, ValueKind::Sparse);
    let scalar = Signature::new(ValueKind::Scalar, ValueKind::Scalar);
    let reduce = Signature::new(ValueKind::Scalar, ValueKind::Vector);
    let tag = |name: &str, sig: Signature| format!("{name}<{sig}>");
    vec![
        (tag("Scale", vector), read_scale_vector as StageReader),
        (tag("Scale", sparse), read_scale_sparse as StageReader),
        (tag("Scale", scalar), read_scale_scalar as StageReader),
        (tag("Offset", vector), read_offset_vector as StageReader),
        (tag("Offset", sparse), read_offset_sparse as StageReader),
        (tag("Offset", scalar), read_offset_scalar as StageReader),
        (tag("Logistic", scalar), read_logistic_scalar as StageReader),
        (tag("Logistic", vector), read_logistic_vector as StageReader),
        (tag("Threshold", vector), read_threshold_vector as StageReader),
        (tag("Threshold", scalar), read_threshold_scalar as StageReader),
        (tag("Average", reduce), Average::read as StageReader),
        (tag("Median", reduce), Median::read as StageReader),
        (tag("Sum", reduce), Sum::read as StageReader),
        (tag("Predictor", reduce), ModelStage::read as StageReader),
    ]
}
