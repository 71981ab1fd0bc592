//! Persistence tests: every model kind survives a trip through a file, and
//! hand-written or damaged files are read (or rejected) as expected.

use approx::assert_relative_eq;
use ensemble_svm::model::{self, SVMEnsemble, SVMModel};
use ensemble_svm::persistence::{self, Sig16, TextReader};
use ensemble_svm::pipeline::MultistagePipeline;
use ensemble_svm::registry;
use ensemble_svm::{
    default_binary_workflow, BinaryModel, BinaryWorkflow, Kernel, Prediction, Result, SVMError, SparseVector,
};
use std::any::Any;
use std::fs;
use std::io::{Cursor, Write};

fn sv(entries: &[(u32, f64)]) -> SparseVector {
    SparseVector::new(entries.to_vec()).unwrap()
}

fn poly_model(weights: [f64; 3], rho: f64) -> SVMModel {
    SVMModel::new(
        vec![
            sv(&[(1, 0.5), (2, -1.0)]),
            sv(&[(2, 0.125)]),
            sv(&[(1, 3.0), (5, 1e-7)]),
        ],
        weights.to_vec(),
        vec![("yes".to_string(), 2), ("no".to_string(), 1)],
        vec![rho],
        Kernel::polynomial(2, 1.0, 0.5),
    )
    .unwrap()
}

fn ensemble() -> SVMEnsemble {
    SVMEnsemble::from_models(vec![
        poly_model([1.0, 0.5, -1.5], 0.3),
        poly_model([0.25, 0.25, -0.5], -0.1),
        poly_model([2.0, -1.0, -1.0], 1.0 / 3.0),
    ])
    .unwrap()
}

/// Save to a file, load it back and check the text is reproduced exactly
fn file_round_trip(model: &dyn BinaryModel) -> Box<dyn BinaryModel> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.txt");
    persistence::save(model, &path).unwrap();
    let loaded = model::load(&path).unwrap();
    assert_eq!(loaded.tag(), model.tag());
    assert_eq!(
        persistence::to_text(loaded.as_ref()).unwrap(),
        fs::read_to_string(&path).unwrap()
    );
    loaded
}

fn probes() -> Vec<SparseVector> {
    vec![
        sv(&[(1, 1.0)]),
        sv(&[(1, -0.5), (2, 2.0), (5, 4.0)]),
        sv(&[(3, 1.0)]),
    ]
}

fn assert_same_predictions(a: &dyn BinaryModel, b: &dyn BinaryModel) {
    for x in probes() {
        let pa = a.predict(&x).unwrap();
        let pb = b.predict(&x).unwrap();
        assert_eq!(pa.label, pb.label);
        assert_eq!(pa.scores.len(), pb.scores.len());
        for (sa, sb) in pa.scores.iter().zip(&pb.scores) {
            assert_relative_eq!(*sa, *sb, epsilon = 1e-12, max_relative = 1e-12);
        }
    }
}

#[test]
fn test_svm_model_file_round_trip() {
    let original = poly_model([1.0, 0.5, -1.5], 0.3);
    let loaded = file_round_trip(&original);
    assert_same_predictions(&original, loaded.as_ref());
}

#[test]
fn test_ensemble_file_round_trip() {
    let original = ensemble();
    let loaded = file_round_trip(&original);
    assert_same_predictions(&original, loaded.as_ref());

    let loaded: SVMEnsemble = model::downcast(loaded).unwrap();
    assert_eq!(loaded.size(), 3);
    assert_eq!(loaded.num_distinct_sv(), 3);
    assert_eq!(loaded.num_total_sv(), 9);
}

#[test]
fn test_workflow_file_round_trip() {
    let mut flow = default_binary_workflow(Box::new(ensemble()), false).unwrap();
    flow.set_preprocessing(MultistagePipeline::normalize_linear(vec![0.5, 2.0], vec![0.1, -0.1]).unwrap())
        .unwrap();
    flow.set_threshold(0.25);

    let loaded = file_round_trip(&flow);
    assert_same_predictions(&flow, loaded.as_ref());
    let loaded: BinaryWorkflow = model::downcast(loaded).unwrap();
    assert_eq!(loaded.threshold(), 0.25);
    assert_eq!(loaded.preprocessing().unwrap().name(), "NormalizeLinear");
    assert_eq!(loaded.postprocessing().unwrap().name(), "LogisticRegression");
}

#[test]
fn test_aggregation_workflow_round_trip() {
    let second_level = SVMModel::new(
        vec![sv(&[(1, 1.0), (2, 1.0), (3, 1.0)]), sv(&[(1, -1.0)])],
        vec![0.5, -0.5],
        vec![("yes".to_string(), 1), ("no".to_string(), 1)],
        vec![0.0],
        Kernel::linear(),
    )
    .unwrap();
    let mut flow = BinaryWorkflow::new(Box::new(ensemble()));
    flow.set_postprocessing(MultistagePipeline::binary_svm_aggregation(Box::new(second_level)).unwrap())
        .unwrap();

    let loaded = file_round_trip(&flow);
    assert_same_predictions(&flow, loaded.as_ref());
}

#[test]
fn test_read_hand_written_model() {
    let text = "SVMModel\nin_ensemble 0\nkernel_type 2\ngamma 0.5\nnr_class 2\ntotal_sv 2\n\
                label pos neg\nnr_sv 1 1\nrho 0.25\nSV\n1 1:1 2:1\n-1 3:2\n";
    let model = model::deserialize(&mut Cursor::new(text)).unwrap();
    assert_eq!(model.positive_label(), "pos");

    let x = SparseVector::empty();
    let expected = (-1.0f64).exp() - (-2.0f64).exp() - 0.25;
    assert_relative_eq!(model.decision_value(&x).unwrap()[0], expected);
    assert_eq!(persistence::to_text(model.as_ref()).unwrap(), text);
}

#[test]
fn test_floats_use_sixteen_significant_digits() {
    let text = persistence::to_text(&poly_model([1.0, 0.5, -1.5], 1.0 / 3.0)).unwrap();
    assert!(text.contains("rho 0.3333333333333333\n"));
    assert!(text.contains("5:1e-07"));
    assert_eq!(Sig16(1.0 / 3.0).to_string(), "0.3333333333333333");
}

#[test]
fn test_damaged_files_are_rejected() {
    let text = persistence::to_text(&ensemble()).unwrap();

    let truncated: String = text.lines().take(10).map(|line| format!("{line}\n")).collect();
    assert!(matches!(
        model::deserialize(&mut Cursor::new(truncated)),
        Err(SVMError::MalformedInput(_))
    ));

    let unknown = text.replacen("SVMEnsemble", "SVMForest", 1);
    assert!(matches!(
        model::deserialize(&mut Cursor::new(unknown)),
        Err(SVMError::NotFound(_))
    ));

    let empty = "";
    assert!(model::deserialize(&mut Cursor::new(empty)).is_err());
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        model::load(dir.path().join("absent.model")),
        Err(SVMError::IoError(_))
    ));
}

/// Predictor returning a fixed decision value
#[derive(Debug, Clone)]
struct ConstantModel {
    value: f64,
}

const CONSTANT_MODEL_TAG: &str = "ConstantModelForSerializationTest";

impl BinaryModel for ConstantModel {
    fn tag(&self) -> &'static str {
        CONSTANT_MODEL_TAG
    }

    fn predict(&self, x: &SparseVector) -> Result<Prediction> {
        let scores = self.decision_value(x)?;
        let label = if scores[0] > 0.0 { "up" } else { "down" };
        Ok(Prediction::new(label, scores))
    }

    fn predict_dense(&self, _x: &[f64]) -> Result<Prediction> {
        self.predict(&SparseVector::empty())
    }

    fn decision_value(&self, _x: &SparseVector) -> Result<Vec<f64>> {
        Ok(vec![self.value])
    }

    fn decision_value_dense(&self, _x: &[f64]) -> Result<Vec<f64>> {
        Ok(vec![self.value])
    }

    fn positive_label(&self) -> String {
        "up".to_string()
    }

    fn negative_label(&self) -> String {
        "down".to_string()
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn serialize(&self, w: &mut dyn Write) -> Result<()> {
        writeln!(w, "{CONSTANT_MODEL_TAG}")?;
        writeln!(w, "value {}", Sig16(self.value))?;
        Ok(())
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

fn read_constant_model(reader: &mut TextReader<'_>) -> Result<Box<dyn BinaryModel>> {
    let value = reader.keyword_value("value")?;
    Ok(Box::new(ConstantModel { value }))
}

#[test]
fn test_registered_model_nests_in_workflow() {
    registry::register_model(CONSTANT_MODEL_TAG, read_constant_model).unwrap();
    assert!(registry::model_tags().contains(&CONSTANT_MODEL_TAG.to_string()));
    assert!(matches!(
        registry::register_model(CONSTANT_MODEL_TAG, read_constant_model),
        Err(SVMError::InvalidParameter(_))
    ));

    let mut flow = BinaryWorkflow::new(Box::new(ConstantModel { value: 0.75 }));
    flow.set_threshold(1.0);
    let loaded = file_round_trip(&flow);
    let prediction = loaded.predict(&SparseVector::empty()).unwrap();
    assert_eq!(prediction.label, "down");
    assert_eq!(prediction.scores, vec![0.75, 0.75]);
}
