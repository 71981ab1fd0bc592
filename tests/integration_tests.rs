//! Integration tests for the ensemble-svm library
//!
//! These tests exercise ensembles, pipelines and workflows together, the way
//! the command line tools use them.

use approx::assert_relative_eq;
use ensemble_svm::model::{self, SVMEnsemble, SVMModel};
use ensemble_svm::pipeline::MultistagePipeline;
use ensemble_svm::{default_binary_workflow, BinaryModel, BinaryWorkflow, Kernel, SVMError, SparseVector};

fn sv(entries: &[(u32, f64)]) -> SparseVector {
    SparseVector::new(entries.to_vec()).unwrap()
}

fn rbf_model(svs: Vec<SparseVector>, weights: Vec<f64>, rho: f64) -> SVMModel {
    let n = svs.len();
    SVMModel::new(
        svs,
        weights,
        vec![("+1".to_string(), 1), ("-1".to_string(), n - 1)],
        vec![rho],
        Kernel::rbf(0.25),
    )
    .unwrap()
}

/// Three models over five distinct support vectors
fn overlapping_models() -> Vec<SVMModel> {
    let a = sv(&[(1, 1.0), (2, 1.0)]);
    let b = sv(&[(1, -1.0), (3, 0.5)]);
    let c = sv(&[(2, 2.0)]);
    let d = sv(&[(1, 0.5), (2, -0.5), (4, 1.0)]);
    let e = sv(&[(3, -2.0)]);
    vec![
        rbf_model(vec![a.clone(), b.clone(), c.clone()], vec![1.0, -0.5, -0.5], 0.1),
        rbf_model(vec![d.clone(), a.clone(), e], vec![0.8, -0.3, -0.5], -0.2),
        rbf_model(vec![c, d, b], vec![1.5, -1.0, -0.5], 0.0),
    ]
}

fn instances() -> Vec<SparseVector> {
    vec![
        sv(&[(1, 1.0), (2, 0.5)]),
        sv(&[(1, -1.0), (3, 1.0)]),
        sv(&[(2, 1.5), (4, 0.5)]),
        SparseVector::empty(),
    ]
}

#[test]
fn test_ensemble_matches_separate_models() {
    let separate = overlapping_models();
    let ensemble = SVMEnsemble::from_models(overlapping_models()).unwrap();
    assert_eq!(ensemble.num_total_sv(), 9);
    assert_eq!(ensemble.num_distinct_sv(), 5);

    for x in instances() {
        let shared = ensemble.decision_value(&x).unwrap();
        assert_eq!(shared.len(), separate.len());
        for (model, value) in separate.iter().zip(&shared) {
            assert_relative_eq!(model.decision_value(&x).unwrap()[0], *value, epsilon = 1e-12);
        }

        let dense = x.dense();
        let shared_dense = ensemble.decision_value_dense(&dense).unwrap();
        for (a, b) in shared.iter().zip(&shared_dense) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_ensemble_prediction_scores() {
    let ensemble = SVMEnsemble::from_models(overlapping_models()).unwrap();
    for x in instances() {
        let prediction = ensemble.predict(&x).unwrap();
        let decisions = &prediction.scores[1..];
        let positive = decisions.iter().filter(|&&d| d > 0.0).count();
        assert_relative_eq!(prediction.scores[0], positive as f64 / 3.0);
        let expected = if positive >= 2 { "+1" } else { "-1" };
        assert_eq!(prediction.label, expected);
    }
}

#[test]
fn test_ensemble_rejects_foreign_kernel() {
    let mut ensemble = SVMEnsemble::from_models(overlapping_models()).unwrap();
    let linear = SVMModel::new(
        vec![sv(&[(1, 1.0)]), sv(&[(2, 1.0)])],
        vec![1.0, -1.0],
        vec![("+1".to_string(), 1), ("-1".to_string(), 1)],
        vec![0.0],
        Kernel::linear(),
    )
    .unwrap();
    assert!(matches!(ensemble.add(linear), Err(SVMError::KernelMismatch { .. })));
    assert_eq!(ensemble.size(), 3);
}

#[test]
fn test_released_models_join_another_ensemble() {
    let first = SVMEnsemble::from_models(overlapping_models()).unwrap();
    let models = first.into_models();
    assert!(models.iter().all(|m| !m.is_in_ensemble()));

    let mut second = SVMEnsemble::new(Kernel::rbf(0.25));
    for model in models {
        second.add(model).unwrap();
    }
    assert_eq!(second.size(), 3);
    assert_eq!(second.num_distinct_sv(), 5);
}

#[test]
fn test_relabeled_ensemble() {
    let ensemble = SVMEnsemble::from_models_relabeled(overlapping_models(), "spam", "ham").unwrap();
    assert_eq!(ensemble.positive_label(), "spam");
    assert_eq!(ensemble.negative_label(), "ham");
    let label = ensemble.predict(&instances()[0]).unwrap().label;
    assert!(label == "spam" || label == "ham");
}

#[test]
fn test_workflow_with_preprocessing_and_vote() {
    let ensemble = SVMEnsemble::from_models(overlapping_models()).unwrap();
    let mut flow = default_binary_workflow(Box::new(ensemble.clone()), true).unwrap();
    assert_eq!(flow.threshold(), 0.5);

    // identity normalization leaves every score unchanged
    let identity = MultistagePipeline::normalize_linear(vec![1.0; 4], vec![0.0; 4]).unwrap();
    flow.set_preprocessing(identity).unwrap();

    for x in instances() {
        let raw = ensemble.predict(&x).unwrap();
        let prediction = flow.predict(&x).unwrap();
        assert_relative_eq!(prediction.scores[0], raw.scores[0]);
        assert_eq!(&prediction.scores[1..], &raw.scores[1..]);
        let expected = if raw.scores[0] > 0.5 { "+1" } else { "-1" };
        assert_eq!(prediction.label, expected);

        let dense = flow.predict_dense(&x.dense()).unwrap();
        assert_eq!(dense.label, prediction.label);
        assert_relative_eq!(dense.scores[0], prediction.scores[0], epsilon = 1e-12);
    }
}

#[test]
fn test_logistic_workflow_scores_are_probabilities() {
    let ensemble = SVMEnsemble::from_models(overlapping_models()).unwrap();
    let flow = default_binary_workflow(Box::new(ensemble.clone()), false).unwrap();
    for x in instances() {
        let prediction = flow.predict(&x).unwrap();
        let sum: f64 = ensemble.decision_value(&x).unwrap().iter().sum();
        assert_relative_eq!(prediction.scores[0], 1.0 / (1.0 + (-sum).exp()), epsilon = 1e-12);
        assert!(prediction.scores[0] > 0.0 && prediction.scores[0] < 1.0);
    }
}

#[test]
fn test_postprocessing_arity_is_checked() {
    let ensemble = SVMEnsemble::from_models(overlapping_models()).unwrap();
    let mut flow = BinaryWorkflow::new(Box::new(ensemble));
    let wrong = MultistagePipeline::majority_vote(2).unwrap();
    assert!(matches!(
        flow.set_postprocessing(wrong),
        Err(SVMError::ArityMismatch { expected: 2, actual: 3 })
    ));
    assert!(flow.postprocessing().is_none());
}

#[test]
fn test_release_predictor_round_trip() {
    let ensemble = SVMEnsemble::from_models(overlapping_models()).unwrap();
    let flow = default_binary_workflow(Box::new(ensemble), true).unwrap();
    let predictor = flow.release_predictor();
    assert_eq!(predictor.num_outputs(), 3);
    let ensemble: SVMEnsemble = model::downcast(predictor).unwrap();
    assert_eq!(ensemble.size(), 3);
}
