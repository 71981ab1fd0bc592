//! Integration tests for the esvm command line tool
//!
//! These tests run the compiled binary on model and data files written to a
//! temporary directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Linear LIBSVM model with decision value `x1 - x2`
const MODEL_A: &str = "svm_type c_svc
kernel_type linear
nr_class 2
total_sv 2
rho 0
label 1 -1
nr_sv 1 1
SV
1 1:1
-1 2:1
";

/// Linear LIBSVM model with decision value `0.5 * (x1 - x3)`
const MODEL_B: &str = "svm_type c_svc
kernel_type linear
nr_class 2
total_sv 2
rho 0
label 1 -1
nr_sv 1 1
SV
0.5 1:1
-0.5 3:1
";

// decision values (A, B): (1, 1), (-3, 0), (1, -1.5)
const DATA: &str = "1:2 2:1\n2:3\n1:1 3:4\n";
const LABELED_DATA: &str = "1 1:2 2:1\n-1 2:3\n1 1:1 3:4\n";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(dir.path().join("a.model"), MODEL_A).unwrap();
        fs::write(dir.path().join("b.model"), MODEL_B).unwrap();
        fs::write(dir.path().join("test.txt"), DATA).unwrap();
        fs::write(dir.path().join("labeled.txt"), LABELED_DATA).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Merge the two LIBSVM models into `merged.wf`
    fn merged(&self, logistic: bool) -> PathBuf {
        let out = self.path("merged.wf");
        let mut args = vec![
            "merge".to_string(),
            "--model1".to_string(),
            arg(&self.path("a.model")),
            "--model2".to_string(),
            arg(&self.path("b.model")),
            "-o".to_string(),
            arg(&out),
        ];
        if logistic {
            args.push("--logistic".to_string());
        }
        let output = esvm(&args);
        assert_success(&output);
        out
    }
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn esvm<S: AsRef<str>>(args: &[S]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_esvm"))
        .args(args.iter().map(|a| a.as_ref()))
        .output()
        .expect("Failed to run esvm")
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "esvm failed:\nstdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_help() {
    let output = esvm(&["--help"]);
    assert_success(&output);
    let text = stdout(&output);
    for command in ["predict", "info", "edit", "merge"] {
        assert!(text.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_merge_and_predict() {
    let fx = Fixture::new();
    let model = fx.merged(false);
    assert!(fs::read_to_string(&model).unwrap().starts_with("BinaryWorkflow\n"));

    let out = fx.path("predictions.txt");
    let output = esvm(&[
        "predict",
        "--model",
        &arg(&model),
        "--data",
        &arg(&fx.path("test.txt")),
        "-o",
        &arg(&out),
    ]);
    assert_success(&output);
    assert_eq!(fs::read_to_string(&out).unwrap(), "1 1\n-1 0\n-1 0.5\n");
}

#[test]
fn test_predict_base_scores_to_stdout() {
    let fx = Fixture::new();
    let model = fx.merged(false);
    let output = esvm(&[
        "predict",
        "--model",
        &arg(&model),
        "--data",
        &arg(&fx.path("test.txt")),
        "--format",
        "default",
        "--base",
    ]);
    assert_success(&output);
    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(lines, vec!["1 1 1 1", "-1 0 -3 0", "-1 0.5 1 -1.5"]);
}

#[test]
fn test_predict_labeled_reports_accuracy() {
    let fx = Fixture::new();
    let model = fx.merged(false);
    let output = esvm(&[
        "predict",
        "--model",
        &arg(&model),
        "--data",
        &arg(&fx.path("labeled.txt")),
        "--labeled",
    ]);
    assert_success(&output);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Accuracy: 0.666"), "stderr: {stderr}");
    assert!(stderr.contains("base model accuracy: 0.833"), "stderr: {stderr}");
}

#[test]
fn test_info_json() {
    let fx = Fixture::new();
    let model = fx.merged(true);
    let output = esvm(&["info", &arg(&model), "--json"]);
    assert_success(&output);

    let summary: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(summary["kind"], "BinaryWorkflow");
    assert_eq!(summary["positive_label"], "1");
    assert_eq!(summary["workflow"]["postprocessing"], "LogisticRegression");
    assert_eq!(summary["workflow"]["threshold"], 0.5);
    assert_eq!(summary["ensemble"]["num_models"], 2);
    assert_eq!(summary["ensemble"]["num_distinct_sv"], 3);
    assert_eq!(summary["ensemble"]["num_total_sv"], 4);
    assert_eq!(summary["ensemble"]["kernel"], "linear");
}

#[test]
fn test_info_text() {
    let fx = Fixture::new();
    let model = fx.merged(false);
    let output = esvm(&["info", &arg(&model)]);
    assert_success(&output);
    let text = stdout(&output);
    assert!(text.contains("Type: BinaryWorkflow"));
    assert!(text.contains("Postprocessing: MajorityVote"));
    assert!(text.contains("Models: 2"));
}

#[test]
fn test_merge_range() {
    let fx = Fixture::new();
    fs::write(fx.path("part1"), MODEL_A).unwrap();
    fs::write(fx.path("part2"), MODEL_B).unwrap();
    fs::write(fx.path("part3"), MODEL_A).unwrap();
    let out = fx.path("range.wf");

    let output = esvm(&[
        "merge",
        "--base",
        &arg(&fx.path("part")),
        "--range",
        "1",
        "3",
        "-o",
        &arg(&out),
    ]);
    assert_success(&output);

    let info = esvm(&["info", &arg(&out), "--json"]);
    assert_success(&info);
    let summary: serde_json::Value = serde_json::from_str(&stdout(&info)).unwrap();
    assert_eq!(summary["ensemble"]["num_models"], 3);
    assert_eq!(summary["ensemble"]["num_distinct_sv"], 3);
}

#[test]
fn test_merge_extends_existing_workflow() {
    let fx = Fixture::new();
    let model = fx.merged(false);
    let out = fx.path("bigger.wf");
    let output = esvm(&[
        "merge",
        "--model1",
        &arg(&model),
        "--model2",
        &arg(&fx.path("a.model")),
        "-o",
        &arg(&out),
    ]);
    assert_success(&output);

    let info = esvm(&["info", &arg(&out), "--json"]);
    let summary: serde_json::Value = serde_json::from_str(&stdout(&info)).unwrap();
    assert_eq!(summary["ensemble"]["num_models"], 3);
}

#[test]
fn test_merge_rejects_reversed_range() {
    let fx = Fixture::new();
    let output = esvm(&[
        "merge",
        "--base",
        &arg(&fx.path("part")),
        "--range",
        "3",
        "1",
        "-o",
        &arg(&fx.path("never.wf")),
    ]);
    assert!(!output.status.success());
    assert!(!fx.path("never.wf").exists());
}

#[test]
fn test_edit_postprocessing_and_threshold() {
    let fx = Fixture::new();
    let model = fx.merged(false);

    let output = esvm(&["edit", "--model", &arg(&model), "--post", "2"]);
    assert_success(&output);
    let output = esvm(&["edit", "--model", &arg(&model), "--print", "3"]);
    assert_success(&output);
    assert!(stdout(&output).starts_with("LogisticRegression\n"));

    let edited = fx.path("edited.wf");
    let output = esvm(&[
        "edit",
        "--model",
        &arg(&model),
        "--threshold",
        "0.75",
        "-o",
        &arg(&edited),
    ]);
    assert_success(&output);

    let output = esvm(&["edit", "--model", &arg(&edited), "--print", "4"]);
    assert_eq!(stdout(&output), "0.75\n");
    let output = esvm(&["edit", "--model", &arg(&model), "--print", "4"]);
    assert_eq!(stdout(&output), "0.5\n");
}

#[test]
fn test_edit_weighted_vote() {
    let fx = Fixture::new();
    let model = fx.merged(false);
    let pars = fx.path("weights.txt");
    fs::write(&pars, "2 1\n").unwrap();

    let output = esvm(&[
        "edit",
        "--model",
        &arg(&model),
        "--post",
        "1",
        "--postpars",
        &arg(&pars),
    ]);
    assert_success(&output);

    let output = esvm(&[
        "predict",
        "--model",
        &arg(&model),
        "--data",
        &arg(&fx.path("test.txt")),
    ]);
    assert_success(&output);
    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(lines[0], "1 1");
    assert_eq!(lines[1], "-1 0");
    assert!(lines[2].starts_with("1 0.66666"), "got {}", lines[2]);
}

#[test]
fn test_edit_preprocessing() {
    let fx = Fixture::new();
    let model = fx.merged(false);
    let pre = fx.path("normalize.txt");
    // swaps the sign of feature 2
    fs::write(&pre, "1 -1 1\n0 0 0\n").unwrap();

    let output = esvm(&["edit", "--model", &arg(&model), "--pre", &arg(&pre)]);
    assert_success(&output);
    let output = esvm(&["edit", "--model", &arg(&model), "--print", "1"]);
    assert!(stdout(&output).starts_with("NormalizeLinear\n"));

    let output = esvm(&[
        "predict",
        "--model",
        &arg(&model),
        "--data",
        &arg(&fx.path("test.txt")),
        "--base",
    ]);
    assert_success(&output);
    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(lines[0], "1 1 3 1");
    assert_eq!(lines[1], "-1 0.5 3 0");
}

#[test]
fn test_edit_requires_workflow() {
    let fx = Fixture::new();
    let output = esvm(&[
        "edit",
        "--model",
        &arg(&fx.path("a.model")),
        "--threshold",
        "1",
    ]);
    assert!(!output.status.success());
    assert_eq!(fs::read_to_string(fx.path("a.model")).unwrap(), MODEL_A);
}

#[test]
fn test_postpars_requires_post() {
    let fx = Fixture::new();
    let model = fx.merged(false);
    let output = esvm(&[
        "edit",
        "--model",
        &arg(&model),
        "--postpars",
        &arg(&fx.path("test.txt")),
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_predict_missing_model() {
    let fx = Fixture::new();
    let output = esvm(&[
        "predict",
        "--model",
        &arg(&fx.path("absent.wf")),
        "--data",
        &arg(&fx.path("test.txt")),
    ]);
    assert!(!output.status.success());
}
