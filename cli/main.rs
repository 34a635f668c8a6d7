#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use chrono::{DateTime, Utc};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clinpredict::bundle::ModelBundle;
use clinpredict::config::AppConfig;
use clinpredict::data::{load_patient_table, save_predictions};
use clinpredict::pipeline::{PredictionResponse, Predictor, predict_batch, predict_record};
use clinpredict::record::PatientRecord;
use clinpredict::report::{ReportMetadata, assemble};
use clinpredict::schema::Disease;

#[derive(Clone, Copy, ValueEnum)]
pub enum DiseaseCli {
    Heart,
    Diabetes,
    Kidney,
    Liver,
}

impl From<DiseaseCli> for Disease {
    fn from(value: DiseaseCli) -> Self {
        match value {
            DiseaseCli::Heart => Disease::Heart,
            DiseaseCli::Diabetes => Disease::Diabetes,
            DiseaseCli::Kidney => Disease::Kidney,
            DiseaseCli::Liver => Disease::Liver,
        }
    }
}

/// Where the model artifact for a command comes from.
#[derive(Args)]
pub struct ModelSource {
    /// Path to a model artifact (JSON pair/mapping or TOML mapping)
    #[arg(long, value_name = "PATH", conflicts_with = "config")]
    pub model: Option<PathBuf>,

    /// Configuration file listing one artifact per disease
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ModelSource {
    fn predictor(&self, disease: Disease) -> Result<Predictor, Box<dyn std::error::Error>> {
        match (&self.model, &self.config) {
            (Some(model), _) => {
                let mut predictor = Predictor::new();
                predictor.register(disease, model.clone());
                Ok(predictor)
            }
            (None, Some(config)) => Ok(Predictor::from_config(&AppConfig::load(config)?)),
            (None, None) => Err("either --model or --config must be given".into()),
        }
    }
}

#[derive(Args)]
pub struct PredictArgs {
    #[arg(long, value_enum)]
    pub disease: DiseaseCli,

    #[command(flatten)]
    pub source: ModelSource,

    /// JSON object mapping field names to values
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// Username recorded in the report metadata
    #[arg(long)]
    pub user: Option<String>,

    /// Write a report here (JSON when the path ends in .json, text otherwise)
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

#[derive(Args)]
pub struct InferArgs {
    #[arg(long, value_enum)]
    pub disease: DiseaseCli,

    #[command(flatten)]
    pub source: ModelSource,

    /// Tab- or comma-separated patient table with a header row
    pub records: PathBuf,

    #[arg(long, default_value = "predictions.tsv")]
    pub output: PathBuf,
}

#[derive(Parser)]
#[command(
    name = "clinpredict",
    about = "Clinical risk prediction from persisted classifier bundles",
    long_about = "Aligns patient records onto a model's feature schema, applies the stored \
                 scaler and classifier, and reports the predicted label and risk tier."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict one patient record
    #[command(about = "Predict a single patient record (prints JSON)")]
    Predict(PredictArgs),

    /// Predict every row of a patient table
    #[command(about = "Batch prediction over a patient table (outputs: predictions.tsv)")]
    Infer(InferArgs),

    /// Print the built-in feature schema for a disease
    #[command(about = "Print the built-in feature schema for a disease")]
    Schema {
        #[arg(long, value_enum)]
        disease: DiseaseCli,
    },

    /// Load a model artifact and describe it
    #[command(about = "Load a model artifact and print its layout and schema")]
    Inspect {
        #[arg(long, value_name = "PATH")]
        model: PathBuf,

        /// Disease whose built-in schema is used when the artifact stores none
        #[arg(long, value_enum)]
        disease: Option<DiseaseCli>,
    },

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Predict(args)) => run_predict(args),
        Some(Commands::Infer(args)) => infer(args),
        Some(Commands::Schema { disease }) => {
            print_schema(disease.into());
            Ok(())
        }
        Some(Commands::Inspect { model, disease }) => run_inspect(&model, disease.map(Into::into)),
        Some(Commands::Version) => {
            print_version_info();
            Ok(())
        }
        None => {
            let mut command = Cli::command();
            let printed = command.print_help();
            println!();
            printed.map_err(Into::into)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let disease = Disease::from(args.disease);
    let predictor = args.source.predictor(disease)?;

    let text = fs::read_to_string(&args.input)?;
    let record = PatientRecord::from_json_str(&text)?;
    log::info!("Read {} fields from {}", record.len(), args.input.display());

    let outcome = predictor
        .bundle(disease)
        .and_then(|bundle| predict_record(&bundle, &record).map(|outcome| (bundle, outcome)));

    let (bundle, outcome) = match outcome {
        Ok(done) => done,
        Err(e) => {
            let response = PredictionResponse::from(Err(e));
            println!("{}", serde_json::to_string_pretty(&response)?);
            let code = response.error.map(|err| err.code).unwrap_or_default();
            return Err(format!("prediction failed ({code})").into());
        }
    };

    if let Some(report_path) = &args.report {
        let metadata = ReportMetadata::now(disease, &bundle, args.user.as_deref());
        let report = assemble(
            &record,
            bundle.feature_schema(),
            &outcome.aligned,
            &outcome.result,
            metadata,
        )?;
        report.write(report_path)?;
    }

    let response = PredictionResponse::from(Ok(outcome));
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub fn infer(args: InferArgs) -> Result<(), Box<dyn std::error::Error>> {
    let disease = Disease::from(args.disease);
    let predictor = args.source.predictor(disease)?;

    println!("Loading {disease} model");
    let bundle = predictor.bundle(disease)?;
    println!("Model expects {} features", bundle.feature_schema().len());

    println!("Loading patient records from: {}", args.records.display());
    let table = load_patient_table(&args.records)?;
    println!("Loaded {} records for prediction", table.len());

    let responses: Vec<PredictionResponse> = predict_batch(&bundle, &table.records)
        .into_iter()
        .map(PredictionResponse::from)
        .collect();

    let failed = responses.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        println!("{failed} of {} records could not be scored", responses.len());
    }

    save_predictions(&args.output, &table.sample_ids, &responses)?;
    println!("Predictions saved to: {}", args.output.display());
    Ok(())
}

fn print_schema(disease: Disease) {
    println!("# {disease} ({} features)", disease.feature_names().len());
    for (position, name) in disease.feature_names().iter().enumerate() {
        println!("{position}\t{name}");
    }
}

fn run_inspect(path: &Path, disease: Option<Disease>) -> Result<(), Box<dyn std::error::Error>> {
    let fallback = disease.map(Disease::default_schema);
    let bundle = ModelBundle::load(path, fallback.as_ref())?;
    let info = bundle.info();

    println!("Artifact: {}", path.display());
    println!("Layout: {:?}", info.shape);
    if let Some(fingerprint) = &info.fingerprint {
        println!("SHA-256: {fingerprint}");
    }
    if let Some(version) = &info.schema_version {
        println!("Schema version: {version}");
    }
    if let Some(name) = &info.disease {
        println!("Disease: {name}");
    }
    println!("Features: {}", bundle.feature_schema().len());
    println!("Classifier: {:?}", bundle.classifier());
    println!("Scaler: {:?}", bundle.scaler());
    println!("Schema: {}", bundle.feature_schema().names().join(", "));
    Ok(())
}

fn describe_age(age: chrono::TimeDelta) -> String {
    match (age.num_days(), age.num_hours(), age.num_minutes()) {
        (days, _, _) if days > 0 => format!("{days} days ago"),
        (_, hours, _) if hours > 0 => format!("{hours} hours ago"),
        (_, _, minutes) if minutes > 0 => format!("{minutes} minutes ago"),
        _ => "just now".to_string(),
    }
}

fn print_version_info() {
    println!("clinpredict {}", env!("CARGO_PKG_VERSION"));
    println!(
        "Release: {}",
        option_env!("CLINPREDICT_RELEASE_TAG").unwrap_or("development build")
    );

    let built = option_env!("CLINPREDICT_BUILD_TIMESTAMP")
        .and_then(|stamp| stamp.parse::<i64>().ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    if let Some(built) = built {
        println!(
            "Built: {} ({})",
            built.format("%Y-%m-%d %H:%M UTC"),
            describe_age(Utc::now() - built)
        );
    }
}
