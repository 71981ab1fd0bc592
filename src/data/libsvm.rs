//! LIBSVM model import
//!
//! Reads the text models written by LIBSVM's `svm-train`:
//!
//! ```text
//! svm_type c_svc
//! kernel_type rbf
//! gamma 0.5
//! nr_class 2
//! total_sv 3
//! rho 0.1
//! label 1 -1
//! nr_sv 2 1
//! SV
//! 0.5 1:0.3 2:0.4
//! ...
//! ```
//!
//! Only `c_svc` models with a built-in kernel can be imported.

use crate::core::{Result, SVMError, SparseVector};
use crate::kernel::{Kernel, KernelType};
use crate::model::{self, SVMModel, SVM_MODEL_TAG};
use crate::persistence::TextReader;
use log::{debug, info};
use std::fs;
use std::io::Cursor;
use std::path::Path;

/// Header fields collected before the `SV` marker
#[derive(Debug, Default)]
struct Header {
    kernel_type: Option<KernelType>,
    degree: u32,
    gamma: f64,
    coef0: f64,
    nr_class: Option<usize>,
    total_sv: Option<usize>,
    rho: Vec<f64>,
    labels: Vec<String>,
    nr_sv: Vec<usize>,
}

fn parse_kernel_type(name: &str) -> Result<KernelType> {
    match name {
        "linear" => Ok(KernelType::Linear),
        "polynomial" => Ok(KernelType::Polynomial),
        "rbf" => Ok(KernelType::Rbf),
        "sigmoid" => Ok(KernelType::Sigmoid),
        "precomputed" => Err(SVMError::InvalidParameter(
            "precomputed LIBSVM kernels cannot be imported".to_string(),
        )),
        other => Err(SVMError::ParseError(format!("Unknown LIBSVM kernel type: {other}"))),
    }
}

fn single_value<'a>(reader: &TextReader<'_>, key: &str, values: &[&'a str]) -> Result<&'a str> {
    match values {
        [value] => Ok(*value),
        _ => Err(reader.malformed(format!("expecting one value after '{key}'"))),
    }
}

fn read_header(reader: &mut TextReader<'_>) -> Result<Header> {
    let mut header = Header {
        degree: 3,
        ..Header::default()
    };
    loop {
        let line = reader.next_line("SV")?;
        let mut tokens = line.split_whitespace();
        let Some(key) = tokens.next() else {
            continue;
        };
        let values: Vec<&str> = tokens.collect();
        let single = || single_value(reader, key, &values);
        match key {
            "SV" => break,
            "svm_type" => {
                let svm_type = single()?;
                if svm_type != "c_svc" {
                    return Err(SVMError::InvalidParameter(format!(
                        "only c_svc LIBSVM models can be imported, got {svm_type}"
                    )));
                }
            }
            "kernel_type" => header.kernel_type = Some(parse_kernel_type(single()?)?),
            "degree" => header.degree = reader.parse(single()?, "degree")?,
            "gamma" => header.gamma = reader.parse(single()?, "gamma")?,
            "coef0" => header.coef0 = reader.parse(single()?, "coef0")?,
            "nr_class" => header.nr_class = Some(reader.parse(single()?, "nr_class")?),
            "total_sv" => header.total_sv = Some(reader.parse(single()?, "total_sv")?),
            "rho" => {
                header.rho = values
                    .iter()
                    .map(|v| reader.parse(v, "rho"))
                    .collect::<Result<_>>()?
            }
            "label" => header.labels = values.iter().map(|v| v.to_string()).collect(),
            "nr_sv" => {
                header.nr_sv = values
                    .iter()
                    .map(|v| reader.parse(v, "nr_sv"))
                    .collect::<Result<_>>()?
            }
            "probA" | "probB" => debug!("Ignoring LIBSVM {key}"),
            other => return Err(reader.malformed(format!("unknown LIBSVM model field '{other}'"))),
        }
    }
    Ok(header)
}

/// Read a LIBSVM text model
pub fn read_libsvm_model(reader: &mut TextReader<'_>) -> Result<SVMModel> {
    let header = read_header(reader)?;
    let kernel_type = header
        .kernel_type
        .ok_or_else(|| reader.malformed("missing kernel_type"))?;
    let nr_class = header
        .nr_class
        .ok_or_else(|| reader.malformed("missing nr_class"))?;
    let total_sv = header
        .total_sv
        .ok_or_else(|| reader.malformed("missing total_sv"))?;
    if header.labels.len() != nr_class || header.nr_sv.len() != nr_class {
        return Err(reader.malformed(format!(
            "expecting {nr_class} labels and SV counts"
        )));
    }
    let kernel = Kernel::from_type(kernel_type.code(), header.degree, header.gamma, header.coef0)?;

    let rows = nr_class.saturating_sub(1);
    let mut coefficients = vec![Vec::with_capacity(total_sv); rows];
    let mut svs = Vec::with_capacity(total_sv);
    for _ in 0..total_sv {
        let line = reader.next_line("support vector")?;
        let mut tokens = line.split_whitespace();
        for row in coefficients.iter_mut() {
            let token = tokens
                .next()
                .ok_or_else(|| reader.malformed("missing SV coefficient"))?;
            row.push(reader.parse::<f64>(token, "SV coefficient")?);
        }
        let rest: Vec<&str> = tokens.collect();
        svs.push(SparseVector::parse(&rest.join(" ")).map_err(|e| reader.malformed(e))?);
    }

    let classes = header.labels.into_iter().zip(header.nr_sv).collect();
    let model = SVMModel::new(svs, coefficients.concat(), classes, header.rho, kernel)
        .map_err(|e| reader.malformed(e))?;
    debug!("Imported LIBSVM model with {} support vectors", model.size());
    Ok(model)
}

pub fn load_libsvm_model<P: AsRef<Path>>(path: P) -> Result<SVMModel> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let mut cursor = Cursor::new(text);
    let mut reader = TextReader::new(&mut cursor);
    let model = read_libsvm_model(&mut reader)?;
    info!("Imported LIBSVM model from {path:?}");
    Ok(model)
}

/// Read the weights and bias of a binary LIBLINEAR model
///
/// Header lines are scanned for `nr_feature` and `bias` up to the `w` marker;
/// the weights follow, whitespace separated.
pub fn read_liblinear_model(reader: &mut TextReader<'_>) -> Result<(Vec<f64>, f64)> {
    let mut nr_feature: Option<usize> = None;
    let mut bias = 0.0;
    loop {
        let line = reader.next_line("w")?;
        let mut tokens = line.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some("w"), _) => break,
            (Some("nr_feature"), Some(value)) => nr_feature = Some(reader.parse(value, "nr_feature")?),
            (Some("bias"), Some(value)) => bias = reader.parse(value, "bias")?,
            _ => {}
        }
    }
    let nr_feature = nr_feature.ok_or_else(|| reader.malformed("missing nr_feature"))?;

    let mut weights = Vec::with_capacity(nr_feature);
    while weights.len() < nr_feature {
        let line = reader.next_line("LIBLINEAR weights")?;
        for token in line.split_whitespace() {
            weights.push(reader.parse::<f64>(token, "weight")?);
        }
    }
    if weights.len() != nr_feature {
        return Err(reader.malformed(format!(
            "expecting {nr_feature} weights, got {}",
            weights.len()
        )));
    }
    Ok((weights, bias))
}

pub fn load_liblinear_model<P: AsRef<Path>>(path: P) -> Result<(Vec<f64>, f64)> {
    let text = fs::read_to_string(path.as_ref())?;
    let mut cursor = Cursor::new(text);
    let mut reader = TextReader::new(&mut cursor);
    read_liblinear_model(&mut reader)
}

/// Load an `SVMModel` stored natively or as a LIBSVM model
pub fn load_svm_model<P: AsRef<Path>>(path: P) -> Result<SVMModel> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let native = text.lines().next().map(str::trim) == Some(SVM_MODEL_TAG);

    let mut cursor = Cursor::new(text);
    if native {
        let loaded = model::deserialize(&mut cursor)?;
        return model::downcast(loaded);
    }
    let mut reader = TextReader::new(&mut cursor);
    let model = read_libsvm_model(&mut reader)?;
    info!("Imported LIBSVM model from {path:?}");
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BinaryModel;
    use crate::persistence;
    use approx::assert_relative_eq;

    const RBF_MODEL: &str = "svm_type c_svc
kernel_type rbf
gamma 0.5
nr_class 2
total_sv 3
rho 0.25
label 1 -1
nr_sv 2 1
SV
1 1:1 2:1
0.5 3:2
-1.5 1:-1
";

    fn read(text: &str) -> Result<SVMModel> {
        let mut cursor = Cursor::new(text.to_string());
        let mut reader = TextReader::new(&mut cursor);
        read_libsvm_model(&mut reader)
    }

    #[test]
    fn test_import_rbf_model() {
        let model = read(RBF_MODEL).unwrap();
        assert_eq!(model.size(), 3);
        assert_eq!(model.label(0), Some("1"));
        assert_eq!(model.label(1), Some("-1"));
        assert_eq!(model.num_sv(0), Some(2));
        assert_eq!(model.weights(), &[1.0, 0.5, -1.5]);
        assert_eq!(model.kernel(), &Kernel::rbf(0.5));
        assert_eq!(model.constant(0), Some(0.25));

        let x = SparseVector::empty();
        let expected = (-1.0f64).exp() + 0.5 * (-2.0f64).exp() - 1.5 * (-0.5f64).exp() - 0.25;
        assert_relative_eq!(model.decision_value(&x).unwrap()[0], expected);
    }

    #[test]
    fn test_polynomial_defaults() {
        let text = "svm_type c_svc\nkernel_type polynomial\ngamma 1\ncoef0 1\nnr_class 2\ntotal_sv 2\nrho 0\nlabel a b\nnr_sv 1 1\nSV\n1 1:1\n-1 2:1\n";
        let model = read(text).unwrap();
        assert_eq!(model.kernel(), &Kernel::polynomial(3, 1.0, 1.0));
    }

    #[test]
    fn test_rejects_unsupported_models() {
        let nu = RBF_MODEL.replace("c_svc", "nu_svr");
        assert!(matches!(read(&nu), Err(SVMError::InvalidParameter(_))));
        let pre = RBF_MODEL.replace("kernel_type rbf", "kernel_type precomputed");
        assert!(matches!(read(&pre), Err(SVMError::InvalidParameter(_))));
        let truncated = RBF_MODEL.replace("-1.5 1:-1\n", "");
        assert!(matches!(read(&truncated), Err(SVMError::MalformedInput(_))));
    }

    #[test]
    fn test_liblinear_weights() {
        let text = "solver_type L2R_LR\nnr_class 2\nlabel 1 -1\nnr_feature 3\nbias -1\nw\n0.5 \n-1 \n2 \n";
        let mut cursor = Cursor::new(text.to_string());
        let mut reader = TextReader::new(&mut cursor);
        let (weights, bias) = read_liblinear_model(&mut reader).unwrap();
        assert_eq!(weights, vec![0.5, -1.0, 2.0]);
        assert_eq!(bias, -1.0);
    }

    #[test]
    fn test_load_native_and_libsvm() {
        let dir = tempfile::tempdir().unwrap();
        let libsvm_path = dir.path().join("model.libsvm");
        fs::write(&libsvm_path, RBF_MODEL).unwrap();
        let imported = load_svm_model(&libsvm_path).unwrap();

        let native_path = dir.path().join("model.native");
        persistence::save(&imported, &native_path).unwrap();
        let native = load_svm_model(&native_path).unwrap();
        assert_eq!(
            persistence::to_text(&native).unwrap(),
            persistence::to_text(&imported).unwrap()
        );
        assert_eq!(load_libsvm_model(&libsvm_path).unwrap().size(), 3);
    }
}
