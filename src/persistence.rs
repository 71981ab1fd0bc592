//! Text persistence primitives
//!
//! Every persisted object (kernels, models, ensembles, stages, workflows) is
//! written as line-oriented text. Floats use the `%.16g` convention: 16
//! significant digits, trailing zeros removed, and scientific notation when the
//! decimal exponent falls outside `[-4, 16)`. Reading goes through [`TextReader`],
//! which tracks line numbers so malformed files report where they broke.

use crate::core::{BinaryModel, Result, SVMError};
use log::info;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Number of significant digits used for every persisted float
pub const SIGNIFICANT_DIGITS: usize = 16;

/// Display adapter printing an `f64` with 16 significant digits (`%.16g`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sig16(pub f64);

impl fmt::Display for Sig16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_sig16(self.0))
    }
}

/// Format a float the way C's `%.16g` does
pub fn format_sig16(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // The exponent of the rounded value decides between fixed and scientific
    let scientific = format!("{:.*e}", SIGNIFICANT_DIGITS - 1, x);
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= SIGNIFICANT_DIGITS as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (SIGNIFICANT_DIGITS as i32 - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, x)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Write `values` on one line, each value followed by a single space
pub fn write_values_line(w: &mut dyn Write, values: &[f64]) -> Result<()> {
    for &v in values {
        write!(w, "{} ", Sig16(v))?;
    }
    writeln!(w)?;
    Ok(())
}

/// Parse a single whitespace-free token
pub fn parse_token<T: FromStr>(token: &str, what: &str) -> Result<T> {
    token
        .parse::<T>()
        .map_err(|_| SVMError::ParseError(format!("Invalid {what}: '{token}'")))
}

/// Line reader over any buffered stream
///
/// Lines are returned without their terminator (`\n` or `\r\n`).
pub struct TextReader<'a> {
    inner: &'a mut dyn BufRead,
    line_no: usize,
}

impl<'a> TextReader<'a> {
    pub fn new(inner: &'a mut dyn BufRead) -> Self {
        Self { inner, line_no: 0 }
    }

    /// Number of the last line handed out (1-based, 0 before the first read)
    pub fn line_number(&self) -> usize {
        self.line_no
    }

    /// Next line, or `None` at the end of the stream
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line)?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    /// Next line; running out of input is a malformed stream
    pub fn next_line(&mut self, expecting: &str) -> Result<String> {
        match self.read_line()? {
            Some(line) => Ok(line),
            None => Err(SVMError::MalformedInput(format!(
                "line {}: unexpected end of stream, expecting {expecting}",
                self.line_no + 1
            ))),
        }
    }

    /// Consume a line that must equal `marker` exactly
    pub fn expect_marker(&mut self, marker: &str) -> Result<()> {
        let line = self.next_line(marker)?;
        if line != marker {
            return Err(self.malformed(format!("expecting '{marker}', got '{line}'")));
        }
        Ok(())
    }

    /// Consume a `keyword value value ...` line and return the values
    pub fn keyword_line(&mut self, keyword: &str) -> Result<Vec<String>> {
        let line = self.next_line(keyword)?;
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some(k) if k == keyword => Ok(tokens.map(str::to_string).collect()),
            _ => Err(self.malformed(format!("expecting '{keyword}', got '{line}'"))),
        }
    }

    /// Consume a `keyword value` line and parse the single value
    pub fn keyword_value<T: FromStr>(&mut self, keyword: &str) -> Result<T> {
        let values = self.keyword_line(keyword)?;
        match values.as_slice() {
            [value] => self.parse(value, keyword),
            _ => Err(self.malformed(format!(
                "expecting exactly one value after '{keyword}', got {}",
                values.len()
            ))),
        }
    }

    /// Consume a line holding exactly `count` whitespace separated values
    pub fn values_line<T: FromStr>(&mut self, count: usize, what: &str) -> Result<Vec<T>> {
        let line = self.next_line(what)?;
        let values = line
            .split_whitespace()
            .map(|token| self.parse(token, what))
            .collect::<Result<Vec<T>>>()?;
        if values.len() != count {
            return Err(self.malformed(format!(
                "expecting {count} values for {what}, got {}",
                values.len()
            )));
        }
        Ok(values)
    }

    /// Parse a token, reporting the current line on failure
    pub fn parse<T: FromStr>(&self, token: &str, what: &str) -> Result<T> {
        token
            .parse::<T>()
            .map_err(|_| self.malformed(format!("invalid {what}: '{token}'")))
    }

    /// Build a `MalformedInput` error tagged with the current line number
    pub fn malformed(&self, message: impl fmt::Display) -> SVMError {
        SVMError::MalformedInput(format!("line {}: {message}", self.line_no))
    }
}

/// Serialize any model into a string
pub fn to_text(model: &dyn BinaryModel) -> Result<String> {
    let mut buffer = Vec::new();
    model.serialize(&mut buffer)?;
    String::from_utf8(buffer).map_err(|e| SVMError::SerializationError(e.to_string()))
}

/// Write a model to `path`, replacing any existing file
pub fn save<P: AsRef<Path>>(model: &dyn BinaryModel, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(SVMError::IoError)?;
    let mut writer = BufWriter::new(file);
    model.serialize(&mut writer)?;
    writer.flush()?;
    info!("Model saved to: {path:?}");
    Ok(())
}
