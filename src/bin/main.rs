//! ESVM Command Line Interface
//!
//! Prediction, inspection, editing and merging of persisted SVM models,
//! ensembles and binary workflows.

use clap::{Args, Parser, Subcommand, ValueEnum};
use ensemble_svm::core::{BinaryModel, Result, SVMError};
use ensemble_svm::data::{self, DataFile, DataFormat};
use ensemble_svm::model::{self, SVMEnsemble, SVMModel, SVM_ENSEMBLE_TAG};
use ensemble_svm::persistence::{self, Sig16};
use ensemble_svm::pipeline::MultistagePipeline;
use ensemble_svm::workflow::{default_binary_workflow, BinaryWorkflow, BINARY_WORKFLOW_TAG};
use env_logger::Env;
use log::{error, info, warn};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "esvm")]
#[command(about = "Ensembles of SVM models with shared support vectors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "ensemble-svm contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict a data file with a persisted model
    Predict(PredictArgs),
    /// Display model information
    Info(InfoArgs),
    /// Print or modify the sections of a binary workflow
    Edit(EditArgs),
    /// Merge models into one ensemble workflow
    Merge(MergeArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliDataFormat {
    /// Guess from the extension, then from the first data line
    Auto,
    /// idx:val idx:val ...
    Default,
    /// v1,v2,...
    Csv,
    /// idx:val,idx:val,...
    Sparsecsv,
}

impl CliDataFormat {
    fn resolve(self) -> Option<DataFormat> {
        match self {
            CliDataFormat::Auto => None,
            CliDataFormat::Default => Some(DataFormat::Default),
            CliDataFormat::Csv => Some(DataFormat::Csv),
            CliDataFormat::Sparsecsv => Some(DataFormat::SparseCsv),
        }
    }
}

#[derive(Args)]
struct PredictArgs {
    /// Model file (SVMModel, SVMEnsemble or BinaryWorkflow)
    #[arg(short, long)]
    model: PathBuf,

    /// Input data file
    #[arg(long)]
    data: PathBuf,

    /// Output predictions file (optional, prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Data format
    #[arg(short, long, value_enum, default_value = "auto")]
    format: CliDataFormat,

    /// The first field of every data line is the true label
    #[arg(long)]
    labeled: bool,

    /// Include base model decision values in the output
    #[arg(long)]
    base: bool,
}

#[derive(Args)]
struct InfoArgs {
    /// Model file
    model: PathBuf,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct EditArgs {
    /// Workflow file to edit
    #[arg(short, long)]
    model: PathBuf,

    /// Output file for the edited workflow (default: overwrite the model file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print one section and exit: 1 preprocessing, 2 predictor, 3 postprocessing, 4 threshold
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
    print: Option<u8>,

    /// Linear preprocessing file: scale factors on line 1, offsets on line 2
    #[arg(long)]
    pre: Option<PathBuf>,

    /// Postprocessing: 1 majority vote, 2 logistic regression, 3 LIBSVM model, 4 LIBLINEAR model
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=4))]
    post: Option<u8>,

    /// Parameters of the postprocessing scheme
    #[arg(long, requires = "post")]
    postpars: Option<PathBuf>,

    /// Final decision threshold
    #[arg(long)]
    threshold: Option<f64>,
}

#[derive(Args)]
struct MergeArgs {
    /// First model; an ensemble or workflow here is extended
    #[arg(long, requires = "model2", conflicts_with = "base")]
    model1: Option<PathBuf>,

    /// Second model (or ensemble) to merge into the first
    #[arg(long, requires = "model1")]
    model2: Option<PathBuf>,

    /// Base name of a numbered range of model files
    #[arg(long, requires = "range")]
    base: Option<String>,

    /// First and last number appended to the base name
    #[arg(long, num_args = 2, value_names = ["START", "STOP"], requires = "base")]
    range: Option<Vec<u32>>,

    /// Output file for the merged workflow
    #[arg(short, long)]
    output: PathBuf,

    /// Aggregate with logistic regression instead of majority voting
    #[arg(long)]
    logistic: bool,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Predict(args) => predict_command(args),
        Commands::Info(args) => info_command(args),
        Commands::Edit(args) => edit_command(args),
        Commands::Merge(args) => merge_command(args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout())),
    })
}

/// Fraction of base models voting for the true class
fn base_accuracy(scores: &[f64], truth_is_positive: bool) -> Option<f64> {
    let base = scores.get(1..).filter(|s| !s.is_empty())?;
    let positive = base.iter().filter(|&&x| x > 0.0).count() as f64 / base.len() as f64;
    Some(if truth_is_positive { positive } else { 1.0 - positive })
}

fn predict_command(args: PredictArgs) -> Result<()> {
    let model = model::load(&args.model)?;
    let data = DataFile::from_file(&args.data, args.format.resolve(), args.labeled)?;
    info!(
        "Predicting {} instances with {} ({} outputs)",
        data.len(),
        model.tag(),
        model.num_outputs()
    );

    let positive = model.positive_label();
    let mut out = open_output(args.output.as_deref())?;
    let mut correct = 0usize;
    let mut base_total = 0.0;
    let mut base_count = 0usize;

    for (i, x) in data.instances().iter().enumerate() {
        let prediction = model.predict(x)?;
        if args.base {
            write!(out, "{}", prediction.label)?;
            for &score in &prediction.scores {
                write!(out, " {}", Sig16(score))?;
            }
            writeln!(out)?;
        } else {
            writeln!(out, "{} {}", prediction.label, Sig16(prediction.score()))?;
        }

        if let Some(labels) = data.labels() {
            let truth = &labels[i];
            if *truth == prediction.label {
                correct += 1;
            }
            if let Some(acc) = base_accuracy(&prediction.scores, *truth == positive) {
                base_total += acc;
                base_count += 1;
            }
        }
    }
    out.flush()?;

    if args.labeled && !data.is_empty() {
        let accuracy = correct as f64 / data.len() as f64;
        if base_count > 0 {
            eprintln!(
                "Accuracy: {accuracy} base model accuracy: {}",
                base_total / base_count as f64
            );
        } else {
            eprintln!("Accuracy: {accuracy}");
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct EnsembleSummary {
    num_models: usize,
    num_distinct_sv: usize,
    num_total_sv: usize,
    density: f64,
    kernel: String,
}

#[derive(Serialize)]
struct WorkflowSummary {
    preprocessing: Option<String>,
    predictor: String,
    postprocessing: Option<String>,
    threshold: f64,
}

#[derive(Serialize)]
struct ModelSummary {
    kind: String,
    positive_label: String,
    negative_label: String,
    num_outputs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_sv: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kernel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ensemble: Option<EnsembleSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow: Option<WorkflowSummary>,
}

fn summarize_ensemble(ensemble: &SVMEnsemble) -> EnsembleSummary {
    EnsembleSummary {
        num_models: ensemble.size(),
        num_distinct_sv: ensemble.num_distinct_sv(),
        num_total_sv: ensemble.num_total_sv(),
        density: ensemble.density(),
        kernel: ensemble.kernel().to_string(),
    }
}

impl ModelSummary {
    fn new(model: &dyn BinaryModel) -> Self {
        let any = model.as_any();
        let svm = any.downcast_ref::<SVMModel>();
        let flow = any.downcast_ref::<BinaryWorkflow>();
        let ensemble = any
            .downcast_ref::<SVMEnsemble>()
            .or_else(|| flow.and_then(|f| f.predictor().as_any().downcast_ref::<SVMEnsemble>()));

        Self {
            kind: model.tag().to_string(),
            positive_label: model.positive_label(),
            negative_label: model.negative_label(),
            num_outputs: model.num_outputs(),
            num_sv: svm.map(SVMModel::size),
            kernel: svm.map(|m| m.kernel().to_string()),
            ensemble: ensemble.map(summarize_ensemble),
            workflow: flow.map(|f| WorkflowSummary {
                preprocessing: f.preprocessing().map(|p| p.name().to_string()),
                predictor: f.predictor().tag().to_string(),
                postprocessing: f.postprocessing().map(|p| p.name().to_string()),
                threshold: f.threshold(),
            }),
        }
    }

    fn print(&self) {
        println!("=== Model Summary ===");
        println!("  Type: {}", self.kind);
        println!("  Labels: {} (positive), {} (negative)", self.positive_label, self.negative_label);
        println!("  Outputs: {}", self.num_outputs);
        if let (Some(num_sv), Some(kernel)) = (self.num_sv, &self.kernel) {
            println!("  Support vectors: {num_sv}");
            println!("  Kernel: {kernel}");
        }
        if let Some(flow) = &self.workflow {
            println!("\nWorkflow:");
            println!(
                "  Preprocessing: {}",
                flow.preprocessing.as_deref().unwrap_or("none")
            );
            println!("  Predictor: {}", flow.predictor);
            println!(
                "  Postprocessing: {}",
                flow.postprocessing.as_deref().unwrap_or("none")
            );
            println!("  Threshold: {}", Sig16(flow.threshold));
        }
        if let Some(ens) = &self.ensemble {
            println!("\nEnsemble:");
            println!("  Models: {}", ens.num_models);
            println!("  Kernel: {}", ens.kernel);
            println!("  Distinct support vectors: {}", ens.num_distinct_sv);
            println!("  Total support vectors: {}", ens.num_total_sv);
            println!("  Density: {:.4}", ens.density);
        }
    }
}

fn info_command(args: InfoArgs) -> Result<()> {
    let model = model::load(&args.model)?;
    let summary = ModelSummary::new(model.as_ref());
    if args.json {
        let json = serde_json::to_string_pretty(&summary)
            .map_err(|e| SVMError::SerializationError(e.to_string()))?;
        println!("{json}");
    } else {
        summary.print();
    }
    Ok(())
}

/// Whitespace separated numbers on one line of `text`
fn parse_numbers(line: &str, what: &str) -> Result<Vec<f64>> {
    line.split_whitespace()
        .map(|token| persistence::parse_token(token, what))
        .collect()
}

/// First line: numbers; second line, when `with_second` is set: also numbers
fn read_parameter_file(path: &Path, with_second: bool) -> Result<(Vec<f64>, Option<Vec<f64>>)> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let first = lines
        .next()
        .ok_or_else(|| SVMError::ParseError(format!("{path:?} is empty")))?;
    let first = parse_numbers(first, "parameter")?;
    let second = if with_second {
        let line = lines
            .next()
            .ok_or_else(|| SVMError::ParseError(format!("{path:?} has no second line")))?;
        Some(parse_numbers(line, "parameter")?)
    } else {
        None
    };
    Ok((first, second))
}

fn single(values: Vec<f64>, what: &str) -> Result<f64> {
    match values.as_slice() {
        [value] => Ok(*value),
        _ => Err(SVMError::ParseError(format!(
            "expecting a single {what}, got {} values",
            values.len()
        ))),
    }
}

fn build_postprocessing(scheme: u8, pars: Option<&Path>, num_inputs: usize) -> Result<(MultistagePipeline, f64)> {
    match (scheme, pars) {
        (1, None) => Ok((MultistagePipeline::majority_vote(num_inputs)?, 0.5)),
        (1, Some(path)) => {
            let (coeffs, _) = read_parameter_file(path, false)?;
            Ok((MultistagePipeline::weighted_majority_vote(coeffs, 0.0)?, 0.5))
        }
        (2, None) => Ok((MultistagePipeline::unit_logistic_regression(num_inputs)?, 0.5)),
        (2, Some(path)) => {
            let (coeffs, offset) = read_parameter_file(path, true)?;
            let offset = single(offset.unwrap_or_default(), "offset")?;
            Ok((MultistagePipeline::logistic_regression(coeffs, offset)?, 0.5))
        }
        (3, Some(path)) => {
            let svm = data::load_svm_model(path)?;
            Ok((MultistagePipeline::binary_svm_aggregation(Box::new(svm))?, 0.0))
        }
        (4, Some(path)) => {
            let (weights, bias) = data::load_liblinear_model(path)?;
            Ok((MultistagePipeline::linear_aggregation(weights, bias)?, 0.0))
        }
        (3 | 4, None) => Err(SVMError::InvalidParameter(
            "postprocessing schemes 3 and 4 need a model file in --postpars".to_string(),
        )),
        (other, _) => Err(SVMError::InvalidParameter(format!(
            "unknown postprocessing scheme {other}"
        ))),
    }
}

fn edit_command(args: EditArgs) -> Result<()> {
    let loaded = model::load(&args.model)?;
    if !loaded.as_any().is::<BinaryWorkflow>() {
        return Err(SVMError::InvalidParameter(format!(
            "{:?} holds a {}, edit only works on binary workflows",
            args.model,
            loaded.tag()
        )));
    }
    let mut flow: BinaryWorkflow = model::downcast(loaded)?;

    if let Some(section) = args.print {
        let mut out = BufWriter::new(io::stdout());
        match section {
            1 => flow.print_preprocessing(&mut out)?,
            2 => flow.print_predictor(&mut out)?,
            3 => flow.print_postprocessing(&mut out)?,
            _ => flow.print_threshold(&mut out)?,
        }
        out.flush()?;
        return Ok(());
    }

    let mut modified = false;

    if let Some(path) = &args.pre {
        let (scale, offset) = read_parameter_file(path, true)?;
        let pipeline = MultistagePipeline::normalize_linear(scale, offset.unwrap_or_default())?;
        flow.set_preprocessing(pipeline)?;
        info!("Set linear preprocessing from {path:?}");
        modified = true;
    }

    if let Some(scheme) = args.post {
        let (pipeline, threshold) =
            build_postprocessing(scheme, args.postpars.as_deref(), flow.num_predictor_outputs())?;
        info!("Set {} postprocessing", pipeline.name());
        flow.set_postprocessing(pipeline)?;
        flow.set_threshold(threshold);
        modified = true;
    }

    if let Some(threshold) = args.threshold {
        flow.set_threshold(threshold);
        modified = true;
    }

    if !modified {
        warn!("No modifications requested, nothing written");
        return Ok(());
    }
    let output = args.output.as_ref().unwrap_or(&args.model);
    persistence::save(&flow, output)
}

/// Load the model that the others are merged into
fn load_first(path: &Path) -> Result<SVMEnsemble> {
    let text = fs::read_to_string(path)?;
    let tag = text.lines().next().map(str::trim).unwrap_or_default();
    if tag != SVM_ENSEMBLE_TAG && tag != BINARY_WORKFLOW_TAG {
        let svm = data::load_svm_model(path)?;
        return SVMEnsemble::from_models(vec![svm]);
    }

    let loaded = model::deserialize(&mut io::Cursor::new(text))?;
    let predictor = if loaded.as_any().is::<BinaryWorkflow>() {
        model::downcast::<BinaryWorkflow>(loaded)?.release_predictor()
    } else {
        loaded
    };
    if predictor.as_any().is::<SVMEnsemble>() {
        return model::downcast(predictor);
    }
    if predictor.as_any().is::<SVMModel>() {
        let svm: SVMModel = model::downcast(predictor)?;
        return SVMEnsemble::from_models(vec![svm]);
    }
    Err(SVMError::InvalidParameter(format!(
        "cannot merge into a workflow around a {}",
        predictor.tag()
    )))
}

/// Load the members contributed by one additional file
fn load_members(path: &Path) -> Result<Vec<SVMModel>> {
    let text = fs::read_to_string(path)?;
    if text.lines().next().map(str::trim) == Some(SVM_ENSEMBLE_TAG) {
        let ensemble: SVMEnsemble = model::downcast(model::deserialize(&mut io::Cursor::new(text))?)?;
        return Ok(ensemble.into_models());
    }
    Ok(vec![data::load_svm_model(path)?])
}

fn merge_command(args: MergeArgs) -> Result<()> {
    let files: Vec<PathBuf> = match (&args.model1, &args.model2, &args.base, &args.range) {
        (Some(first), Some(second), _, _) => vec![first.clone(), second.clone()],
        (_, _, Some(base), Some(range)) => {
            let (start, stop) = (range[0], range[1]);
            if start > stop {
                return Err(SVMError::InvalidParameter(format!(
                    "start of range ({start}) is after its end ({stop})"
                )));
            }
            (start..=stop).map(|i| PathBuf::from(format!("{base}{i}"))).collect()
        }
        _ => {
            return Err(SVMError::InvalidParameter(
                "specify --model1 and --model2, or --base and --range".to_string(),
            ))
        }
    };

    let mut ensemble = load_first(&files[0])?;
    for path in &files[1..] {
        for svm in load_members(path)? {
            ensemble.add(svm)?;
        }
        info!("Merged {path:?}");
    }
    info!(
        "Merged ensemble holds {} models with {} distinct support vectors",
        ensemble.size(),
        ensemble.num_distinct_sv()
    );

    let flow = default_binary_workflow(Box::new(ensemble), !args.logistic)?;
    persistence::save(&flow, &args.output)
}
