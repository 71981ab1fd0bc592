//! Core type definitions: predictions and sparse vectors

use crate::core::{Result, SVMError};
use crate::persistence::Sig16;
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul};
use std::str::FromStr;

/// Prediction result containing a label and an ordered score sequence
///
/// `scores[0]` is the aggregate score of the predictor; any further entries are
/// the raw decision values of its sub-models.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted class label
    pub label: String,
    /// Aggregate score followed by per-submodel decision values
    pub scores: Vec<f64>,
}

impl Prediction {
    /// Create a new prediction
    pub fn new(label: impl Into<String>, scores: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            scores,
        }
    }

    /// Aggregate score (first entry, 0 when no scores exist)
    pub fn score(&self) -> f64 {
        self.scores.first().copied().unwrap_or(0.0)
    }

    /// Number of scores carried by this prediction
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        for score in &self.scores {
            write!(f, " {score}")?;
        }
        Ok(())
    }
}

/// Sparse vector with strictly ascending, 1-based indices
///
/// Support vectors and test instances share this representation. Apart from
/// [`SparseVector::trim`] a vector never changes once built, which is what lets
/// an ensemble hand out shared handles to deduplicated support vectors.
#[derive(Clone, Debug, Default)]
pub struct SparseVector {
    entries: Vec<(u32, f64)>,
}

impl SparseVector {
    /// Create a sparse vector from `(index, value)` pairs
    ///
    /// Indices must be 1-based and strictly ascending.
    pub fn new(entries: Vec<(u32, f64)>) -> Result<Self> {
        let mut previous = 0;
        for &(index, _) in &entries {
            if index == 0 {
                return Err(SVMError::InvalidParameter(
                    "Sparse vector indices are 1-based".to_string(),
                ));
            }
            if index <= previous {
                return Err(SVMError::InvalidParameter(format!(
                    "Sparse vector indices must be strictly ascending ({previous} then {index})"
                )));
            }
            previous = index;
        }
        Ok(Self { entries })
    }

    /// Create an empty sparse vector
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Build a sparse vector from dense values, skipping zeros
    pub fn from_dense(values: &[f64]) -> Self {
        let entries = values
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v != 0.0)
            .map(|(i, &v)| (i as u32 + 1, v))
            .collect();
        Self { entries }
    }

    /// Number of stored entries
    pub fn num_nonzero(&self) -> usize {
        self.entries.len()
    }

    /// Dimensionality: the last index, 0 when empty
    pub fn size(&self) -> usize {
        self.entries.last().map_or(0, |&(index, _)| index as usize)
    }

    /// Check if vector has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fraction of stored entries over the dimensionality (0 for an empty vector)
    pub fn density(&self) -> f64 {
        match self.size() {
            0 => 0.0,
            size => self.num_nonzero() as f64 / size as f64,
        }
    }

    /// Get the value at a 1-based index (0 if not present)
    pub fn get(&self, index: u32) -> f64 {
        match self.entries.binary_search_by_key(&index, |&(i, _)| i) {
            Ok(pos) => self.entries[pos].1,
            Err(_) => 0.0,
        }
    }

    /// Stored `(index, value)` pairs in ascending index order
    pub fn entries(&self) -> &[(u32, f64)] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, (u32, f64)> {
        self.entries.iter()
    }

    /// Dense expansion of length `size()`, absent indices filled with 0
    pub fn dense(&self) -> Vec<f64> {
        let mut dense = vec![0.0; self.size()];
        for &(index, value) in &self.entries {
            dense[index as usize - 1] = value;
        }
        dense
    }

    /// Drop every entry with index > `maxlen`; `trim(0)` empties the vector
    pub fn trim(&mut self, maxlen: usize) {
        if maxlen == 0 {
            self.entries.clear();
            return;
        }
        while let Some(&(index, _)) = self.entries.last() {
            if index as usize > maxlen {
                self.entries.pop();
            } else {
                break;
            }
        }
    }

    /// Squared L2 norm
    pub fn norm_squared(&self) -> f64 {
        self.entries.iter().map(|&(_, v)| v * v).sum()
    }

    /// Inner product via a merge-join over the sorted indices
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (x, y) = (&self.entries, &other.entries);
        let mut result = 0.0;
        let (mut i, mut j) = (0, 0);

        while i < x.len() && j < y.len() {
            match x[i].0.cmp(&y[j].0) {
                Ordering::Equal => {
                    result += x[i].1 * y[j].1;
                    i += 1;
                    j += 1;
                }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }

        result
    }

    /// Squared Euclidean distance; indices present on one side only count fully
    pub fn squared_distance(&self, other: &SparseVector) -> f64 {
        let (x, y) = (&self.entries, &other.entries);
        let mut distance = 0.0;
        let (mut i, mut j) = (0, 0);

        while i < x.len() && j < y.len() {
            match x[i].0.cmp(&y[j].0) {
                Ordering::Equal => {
                    let diff = x[i].1 - y[j].1;
                    distance += diff * diff;
                    i += 1;
                    j += 1;
                }
                Ordering::Less => {
                    distance += x[i].1 * x[i].1;
                    i += 1;
                }
                Ordering::Greater => {
                    distance += y[j].1 * y[j].1;
                    j += 1;
                }
            }
        }
        distance += x[i..].iter().map(|&(_, v)| v * v).sum::<f64>();
        distance += y[j..].iter().map(|&(_, v)| v * v).sum::<f64>();

        distance
    }

    /// Elementwise sum with a dense vector
    ///
    /// Positions beyond the dense length keep their sparse value; zero sums are dropped.
    pub fn add_dense(&self, dense: &[f64]) -> SparseVector {
        let mut entries = Vec::with_capacity(dense.len().max(self.entries.len()));
        let mut it = self.entries.iter().peekable();

        for (pos, &offset) in dense.iter().enumerate() {
            let index = pos as u32 + 1;
            let mut value = offset;
            if let Some(&&(i, v)) = it.peek() {
                if i == index {
                    value += v;
                    it.next();
                }
            }
            if value != 0.0 {
                entries.push((index, value));
            }
        }
        entries.extend(it.copied());

        SparseVector { entries }
    }

    /// Elementwise sum with another sparse vector, dropping zero sums
    pub fn add_sparse(&self, other: &SparseVector) -> SparseVector {
        let (x, y) = (&self.entries, &other.entries);
        let mut entries = Vec::with_capacity(x.len() + y.len());
        let (mut i, mut j) = (0, 0);

        while i < x.len() && j < y.len() {
            match x[i].0.cmp(&y[j].0) {
                Ordering::Equal => {
                    let sum = x[i].1 + y[j].1;
                    if sum != 0.0 {
                        entries.push((x[i].0, sum));
                    }
                    i += 1;
                    j += 1;
                }
                Ordering::Less => {
                    if x[i].1 != 0.0 {
                        entries.push(x[i]);
                    }
                    i += 1;
                }
                Ordering::Greater => {
                    if y[j].1 != 0.0 {
                        entries.push(y[j]);
                    }
                    j += 1;
                }
            }
        }
        entries.extend(x[i..].iter().filter(|&&(_, v)| v != 0.0));
        entries.extend(y[j..].iter().filter(|&&(_, v)| v != 0.0));

        SparseVector { entries }
    }

    /// Elementwise product with a dense vector
    ///
    /// Indices beyond the dense length vanish, as do zero products.
    pub fn mul_dense(&self, dense: &[f64]) -> SparseVector {
        let entries = self
            .entries
            .iter()
            .take_while(|&&(index, _)| index as usize <= dense.len())
            .map(|&(index, value)| (index, value * dense[index as usize - 1]))
            .filter(|&(_, value)| value != 0.0)
            .collect();
        SparseVector { entries }
    }

    /// Elementwise product with another sparse vector (intersection of indices)
    pub fn mul_sparse(&self, other: &SparseVector) -> SparseVector {
        let (x, y) = (&self.entries, &other.entries);
        let mut entries = Vec::with_capacity(x.len().min(y.len()));
        let (mut i, mut j) = (0, 0);

        while i < x.len() && j < y.len() {
            match x[i].0.cmp(&y[j].0) {
                Ordering::Equal => {
                    let product = x[i].1 * y[j].1;
                    if product != 0.0 {
                        entries.push((x[i].0, product));
                    }
                    i += 1;
                    j += 1;
                }
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
            }
        }

        SparseVector { entries }
    }

    /// Multiply by `coeffs`, then trim to `num_outputs` when it is non-zero
    ///
    /// A single coefficient scales every entry.
    pub fn scale(&self, coeffs: &[f64], num_outputs: usize) -> SparseVector {
        let mut result = match coeffs {
            [c] => SparseVector {
                entries: self
                    .entries
                    .iter()
                    .map(|&(i, v)| (i, v * c))
                    .filter(|&(_, v)| v != 0.0)
                    .collect(),
            },
            _ => self.mul_dense(coeffs),
        };
        if num_outputs > 0 {
            result.trim(num_outputs);
        }
        result
    }

    /// Add `offsets`, then trim to `num_outputs` when it is non-zero
    ///
    /// A single offset is added to the first `num_outputs` positions, or to the
    /// stored entries only when the output length is unconstrained.
    pub fn offset(&self, offsets: &[f64], num_outputs: usize) -> SparseVector {
        let mut result = match offsets {
            [o] if num_outputs > 0 => self.add_dense(&vec![*o; num_outputs]),
            [o] => SparseVector {
                entries: self
                    .entries
                    .iter()
                    .map(|&(i, v)| (i, v + o))
                    .filter(|&(_, v)| v != 0.0)
                    .collect(),
            },
            _ => self.add_dense(offsets),
        };
        if num_outputs > 0 {
            result.trim(num_outputs);
        }
        result
    }

    /// Parse the default `idx:val idx:val ...` text form
    pub fn parse(line: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for token in line.split_whitespace() {
            let (index, value) = token.split_once(':').ok_or_else(|| {
                SVMError::ParseError(format!("Invalid feature format: {token}"))
            })?;
            let index = index
                .parse::<u32>()
                .map_err(|_| SVMError::ParseError(format!("Invalid feature index: {index}")))?;
            let value = value
                .parse::<f64>()
                .map_err(|_| SVMError::ParseError(format!("Invalid feature value: {value}")))?;
            entries.push((index, value));
        }
        Self::new(entries).map_err(|e| SVMError::ParseError(e.to_string()))
    }

    /// Parse the sparse CSV form `idx:val,idx:val,...`
    pub fn parse_sparse_csv(line: &str) -> Result<Self> {
        Self::parse(&line.replace(',', " "))
    }

    /// Parse a dense CSV row `v1,v2,...`, skipping zeros
    pub fn parse_dense_csv(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::empty());
        }
        let values = line
            .split(',')
            .map(|field| {
                let field = field.trim();
                field
                    .parse::<f64>()
                    .map_err(|_| SVMError::ParseError(format!("Invalid feature value: {field}")))
            })
            .collect::<Result<Vec<f64>>>()?;
        Ok(Self::from_dense(&values))
    }
}

impl FromStr for SparseVector {
    type Err = SVMError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SparseVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, &(index, value)) in self.entries.iter().enumerate() {
            if n > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}:{}", index, Sig16(value))?;
        }
        Ok(())
    }
}

/// Total order used to deduplicate support vectors
///
/// Vectors with fewer entries come first. Among equally long vectors the first
/// differing index decides (the larger index sorts first), then the first
/// differing value (the smaller value sorts first).
impl Ord for SparseVector {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entries.len().cmp(&other.entries.len()).then_with(|| {
            for (&(i, v), &(j, w)) in self.entries.iter().zip(&other.entries) {
                if i != j {
                    return j.cmp(&i);
                }
                match v.total_cmp(&w) {
                    Ordering::Equal => continue,
                    ordering => return ordering,
                }
            }
            Ordering::Equal
        })
    }
}

impl PartialOrd for SparseVector {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SparseVector {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SparseVector {}

impl Add<&SparseVector> for &SparseVector {
    type Output = SparseVector;

    fn add(self, rhs: &SparseVector) -> SparseVector {
        self.add_sparse(rhs)
    }
}

impl Add<&[f64]> for &SparseVector {
    type Output = SparseVector;

    fn add(self, rhs: &[f64]) -> SparseVector {
        self.add_dense(rhs)
    }
}

impl Mul<&SparseVector> for &SparseVector {
    type Output = SparseVector;

    fn mul(self, rhs: &SparseVector) -> SparseVector {
        self.mul_sparse(rhs)
    }
}

impl Mul<&[f64]> for &SparseVector {
    type Output = SparseVector;

    fn mul(self, rhs: &[f64]) -> SparseVector {
        self.mul_dense(rhs)
    }
}
