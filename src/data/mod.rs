//! Data files and foreign model formats
//!
//! Instances are read one per line in one of three formats:
//!
//! - default: `idx:val idx:val ...` (LIBSVM style)
//! - sparse CSV: `idx:val,idx:val,...`
//! - dense CSV: `v1,v2,...` (zeros are skipped)
//!
//! Labeled files carry the label as the first field, delimited by a space in
//! the default format and by a comma otherwise.

pub mod csv;
pub mod libsvm;

pub use self::libsvm::{
    load_liblinear_model, load_libsvm_model, load_svm_model, read_liblinear_model, read_libsvm_model,
};

use crate::core::{Result, SVMError, SparseVector};
use log::{debug, info, warn};
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Default,
    SparseCsv,
    Csv,
}

impl DataFormat {
    /// Guess the format of a data line
    pub fn sniff(line: &str) -> Self {
        if !line.contains(',') {
            DataFormat::Default
        } else if line.contains(':') {
            DataFormat::SparseCsv
        } else {
            DataFormat::Csv
        }
    }

    /// Format implied by a file extension, if any
    pub fn from_extension<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(DataFormat::Csv),
            "scsv" => Some(DataFormat::SparseCsv),
            "txt" | "svm" | "libsvm" | "dat" => Some(DataFormat::Default),
            _ => None,
        }
    }

    fn delimiter(self) -> char {
        match self {
            DataFormat::Default => ' ',
            DataFormat::SparseCsv | DataFormat::Csv => ',',
        }
    }

    /// Parse an unlabeled instance
    pub fn parse_instance(self, text: &str) -> Result<SparseVector> {
        match self {
            DataFormat::Default => SparseVector::parse(text),
            DataFormat::SparseCsv => SparseVector::parse_sparse_csv(text),
            DataFormat::Csv => SparseVector::parse_dense_csv(text),
        }
    }

    /// Split off the leading label and parse the rest of the line
    pub fn parse_labeled(self, line: &str) -> Result<(String, SparseVector)> {
        let line = line.trim_start();
        let (label, rest) = match line.split_once(self.delimiter()) {
            Some((label, rest)) => (label, rest),
            None => (line, ""),
        };
        let label = label.trim();
        if label.is_empty() {
            return Err(SVMError::ParseError(format!("Missing label: '{line}'")));
        }
        Ok((label.to_string(), self.parse_instance(rest)?))
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataFormat::Default => "default",
            DataFormat::SparseCsv => "sparsecsv",
            DataFormat::Csv => "csv",
        })
    }
}

impl FromStr for DataFormat {
    type Err = SVMError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "default" | "libsvm" => Ok(DataFormat::Default),
            "sparsecsv" | "sparse-csv" => Ok(DataFormat::SparseCsv),
            "csv" => Ok(DataFormat::Csv),
            other => Err(SVMError::InvalidParameter(format!(
                "Unknown data format: {other}"
            ))),
        }
    }
}

/// Instances of a data file, with their labels when the file is labeled
#[derive(Debug, Clone, Default)]
pub struct DataFile {
    instances: Vec<SparseVector>,
    labels: Option<Vec<String>>,
}

impl DataFile {
    /// Read a data file; `format` of `None` sniffs it from the first data line
    pub fn from_file<P: AsRef<Path>>(path: P, format: Option<DataFormat>, labeled: bool) -> Result<Self> {
        let path = path.as_ref();
        let format = match format {
            Some(format) => Some(format),
            None => {
                let by_extension = DataFormat::from_extension(path);
                if by_extension.is_none() {
                    warn!("Cannot infer the data format of {path:?} from its extension, sniffing content");
                }
                by_extension
            }
        };
        let file = File::open(path)?;
        let data = Self::from_reader(BufReader::new(file), format, labeled)?;
        info!("Read {} instances from {path:?}", data.len());
        Ok(data)
    }

    /// Read instances from any buffered reader
    ///
    /// Empty lines and lines starting with `#` are skipped. A header line is
    /// skipped in dense CSV files.
    pub fn from_reader<R: BufRead>(reader: R, format: Option<DataFormat>, labeled: bool) -> Result<Self> {
        let mut format = format;
        let mut instances = Vec::new();
        let mut labels = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let current = *format.get_or_insert_with(|| {
                let sniffed = DataFormat::sniff(line);
                debug!("Detected {sniffed} data format");
                sniffed
            });
            if instances.is_empty() && current == DataFormat::Csv && csv::is_header_line(line, labeled) {
                debug!("Skipping CSV header: {line}");
                continue;
            }

            let parsed = if labeled {
                current.parse_labeled(line).map(|(label, x)| {
                    labels.push(label);
                    x
                })
            } else {
                current.parse_instance(line)
            };
            let instance = parsed.map_err(|e| {
                SVMError::ParseError(format!("Error parsing line {}: {e}", line_num + 1))
            })?;
            instances.push(instance);
        }

        Ok(Self {
            instances,
            labels: labeled.then_some(labels),
        })
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instances(&self) -> &[SparseVector] {
        &self.instances
    }

    /// Labels in file order, `None` for unlabeled files
    pub fn labels(&self) -> Option<&[String]> {
        self.labels.as_deref()
    }

    pub fn is_labeled(&self) -> bool {
        self.labels.is_some()
    }

    /// Largest feature index over all instances
    pub fn dimension(&self) -> usize {
        self.instances.iter().map(SparseVector::size).max().unwrap_or(0)
    }
}
