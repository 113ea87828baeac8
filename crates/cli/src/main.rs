// Strata CLI - stratum classification and period reconciliation

mod adapters;
mod exit_codes;

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use strata_period::input::load_json_batch;
use strata_period::model::MethodResponse;
use strata_period::pipeline::Pipeline;
use strata_period::{classify_batch, reconcile, Batch, PeriodKey, StrataConfig, StrataError};

use adapters::{read_batch_file, DirSink, DirSource, LogNotifier, OutputFormat};
use exit_codes::{
    exit_code_for, EXIT_IO, EXIT_STRATA_ANOMALIES, EXIT_STRATA_INVALID_CONFIG,
    EXIT_STRATA_PIPELINE_FAILED, EXIT_SUCCESS, EXIT_USAGE,
};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Assign survey strata and reconcile them across reporting periods")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every record in a batch
    #[command(after_help = "\
Examples:
  strata classify enrichment_out.json --config strata.toml
  strata classify batch.csv --output classified.csv --format csv
  cat batch.json | strata classify - --json")]
    Classify {
        /// Batch file (.json array or .csv); '-' reads JSON from stdin
        input: PathBuf,

        /// Path to the strata TOML config (defaults apply when omitted)
        #[arg(long, short = 'c', env = "STRATA_CONFIG")]
        config: Option<PathBuf>,

        /// Print the response envelope as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write the classified batch to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Format for --output
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Reconcile strata of an already-classified batch against a current period
    #[command(after_help = "\
Examples:
  strata reconcile classified.json --period 201809
  strata reconcile classified.json --period 201809 --anomalies anomalies.json --fail-on-anomalies")]
    Reconcile {
        /// Classified batch file (.json array or .csv); '-' reads JSON from stdin
        input: PathBuf,

        #[arg(long, short = 'c', env = "STRATA_CONFIG")]
        config: Option<PathBuf>,

        /// Current period (overrides current_period in config)
        #[arg(long, short = 'p')]
        period: Option<String>,

        #[arg(long)]
        json: bool,

        /// Write the corrected batch to file
        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Write the anomaly report to file (only when non-empty)
        #[arg(long)]
        anomalies: Option<PathBuf>,

        /// Exit with code 62 when any anomaly pair is reported
        #[arg(long)]
        fail_on_anomalies: bool,
    },

    /// Classify then reconcile in one pass
    #[command(after_help = "\
Examples:
  strata run enrichment_out.json --config strata.toml --json
  strata run batch.csv --period 201809 --output out.csv --format csv")]
    Run {
        input: PathBuf,

        #[arg(long, short = 'c', env = "STRATA_CONFIG")]
        config: Option<PathBuf>,

        #[arg(long, short = 'p')]
        period: Option<String>,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,

        #[arg(long)]
        anomalies: Option<PathBuf>,

        #[arg(long)]
        fail_on_anomalies: bool,
    },

    /// Process the next batch waiting in an inbox directory
    #[command(after_help = "\
Examples:
  strata pipeline --config strata.toml --inbox queue/ --outbox results/
  strata pipeline --inbox queue/ --outbox results/ --period 201809 --format csv")]
    Pipeline {
        #[arg(long, short = 'c', env = "STRATA_CONFIG")]
        config: Option<PathBuf>,

        /// Directory holding pending batch files
        #[arg(long)]
        inbox: PathBuf,

        /// Directory receiving the corrected batch, anomalies and notifications
        #[arg(long)]
        outbox: PathBuf,

        #[arg(long, short = 'p')]
        period: Option<String>,

        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Validate a strata config without running
    #[command(after_help = "\
Examples:
  strata validate strata.toml")]
    Validate {
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Classify { input, config, json, output, format } => {
            cmd_classify(input, config, json, output, format)
        }
        Commands::Reconcile {
            input,
            config,
            period,
            json,
            output,
            format,
            anomalies,
            fail_on_anomalies,
        } => cmd_reconcile(input, config, period, json, output, format, anomalies, fail_on_anomalies),
        Commands::Run {
            input,
            config,
            period,
            json,
            output,
            format,
            anomalies,
            fail_on_anomalies,
        } => cmd_run(input, config, period, json, output, format, anomalies, fail_on_anomalies),
        Commands::Pipeline { config, inbox, outbox, period, format } => {
            cmd_pipeline(config, inbox, outbox, period, format)
        }
        Commands::Validate { config } => cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_IO, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<StrataError> for CliError {
    fn from(err: StrataError) -> Self {
        let code = exit_code_for(&err);
        let hint = match &err {
            StrataError::MissingColumn { field } => Some(format!(
                "at least one record must carry '{field}'; null or absent in single records is fine"
            )),
            StrataError::ConfigValidation(msg) if msg.contains("current period") => {
                Some("pass --period or set current_period in the config".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn load_config(path: Option<&Path>) -> Result<StrataConfig, CliError> {
    let Some(path) = path else {
        return Ok(StrataConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .map_err(|e| CliError::io(format!("cannot read config {}: {e}", path.display())))?;
    Ok(StrataConfig::from_toml(&text)?)
}

fn load_input(path: &Path) -> Result<Batch, CliError> {
    if path.as_os_str() == "-" {
        let mut data = String::new();
        io::stdin()
            .read_to_string(&mut data)
            .map_err(|e| CliError::io(format!("cannot read stdin: {e}")))?;
        return Ok(load_json_batch(&data)?);
    }
    if !path.exists() {
        return Err(CliError::args(format!("input not found: {}", path.display())));
    }
    Ok(read_batch_file(path)?)
}

fn resolve_period(config: &StrataConfig, period: Option<String>) -> Result<PeriodKey, CliError> {
    let override_period = match period {
        Some(p) if p.trim().is_empty() => {
            return Err(CliError::new(EXIT_STRATA_INVALID_CONFIG, "--period must not be empty"));
        }
        Some(p) => Some(PeriodKey::parse(&p)),
        None => None,
    };
    Ok(config.resolve_period(override_period)?)
}

fn write_file(path: &Path, contents: &str) -> Result<(), CliError> {
    std::fs::write(path, contents)
        .map_err(|e| CliError::io(format!("cannot write {}: {e}", path.display())))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_classify(
    input: PathBuf,
    config_path: Option<PathBuf>,
    json: bool,
    output: Option<PathBuf>,
    format: OutputFormat,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_deref())?;
    let records = load_input(&input)?;

    let result = classify_batch(&records, &config);
    let failure = result.as_ref().err().cloned();

    if let (Ok(classified), Some(path)) = (&result, &output) {
        write_file(path, &format.render(&classified.records)?)?;
    }

    if let Ok(classified) = &result {
        eprintln!(
            "classified {} record(s), {} unclassified",
            classified.records.len(),
            classified.signals.len(),
        );
    }

    if json {
        let response = MethodResponse::from_result(
            &config.pipeline.module,
            result.map(|c| c.records),
        );
        println!("{}", to_json(&response)?);
    }

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

#[derive(Serialize)]
struct ReconcileOutput<'a> {
    corrected_batch: &'a [strata_period::Record],
    anomalies: &'a [strata_period::AnomalyPair],
    summary: &'a strata_period::model::ReconcileSummary,
}

#[allow(clippy::too_many_arguments)]
fn cmd_reconcile(
    input: PathBuf,
    config_path: Option<PathBuf>,
    period: Option<String>,
    json: bool,
    output: Option<PathBuf>,
    format: OutputFormat,
    anomalies_path: Option<PathBuf>,
    fail_on_anomalies: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_deref())?;
    let current = resolve_period(&config, period)?;
    let records = load_input(&input)?;

    let result = reconcile(&records, &config.fields.reconcile_fields(), &current)?;

    if let Some(ref path) = output {
        write_file(path, &format.render(&result.corrected_batch)?)?;
    }
    if let (Some(path), false) = (&anomalies_path, result.anomalies.is_empty()) {
        write_file(path, &to_json(&result.anomalies)?)?;
    }

    if json {
        let out = ReconcileOutput {
            corrected_batch: &result.corrected_batch,
            anomalies: &result.anomalies,
            summary: &result.summary,
        };
        println!("{}", to_json(&out)?);
    }

    let s = &result.summary;
    eprintln!(
        "period {current}: {} record(s), {} candidate(s), {} corrected, {} anomaly pair(s)",
        s.records, s.candidates, s.corrected, s.anomalies,
    );

    check_anomalies(result.anomalies.len(), fail_on_anomalies)
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    input: PathBuf,
    config_path: Option<PathBuf>,
    period: Option<String>,
    json: bool,
    output: Option<PathBuf>,
    format: OutputFormat,
    anomalies_path: Option<PathBuf>,
    fail_on_anomalies: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_deref())?;
    let current = resolve_period(&config, period)?;
    let records = load_input(&input)?;

    let result = strata_period::run(&config, &records, &current)?;

    if let Some(ref path) = output {
        write_file(path, &format.render(&result.records)?)?;
    }
    if let (Some(path), false) = (&anomalies_path, result.anomalies.is_empty()) {
        write_file(path, &to_json(&result.anomalies)?)?;
    }

    if json {
        println!("{}", to_json(&result)?);
    }

    let s = &result.summary;
    eprintln!(
        "{}: {} record(s), {} unclassified, {} corrected, {} anomaly pair(s)",
        result.meta.config_name, s.records, s.unclassified, s.corrected, s.anomalies,
    );

    check_anomalies(result.anomalies.len(), fail_on_anomalies)
}

fn cmd_pipeline(
    config_path: Option<PathBuf>,
    inbox: PathBuf,
    outbox: PathBuf,
    period: Option<String>,
    format: OutputFormat,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_deref())?;
    let current = resolve_period(&config, period)?;

    if !inbox.is_dir() {
        return Err(CliError::args(format!("inbox is not a directory: {}", inbox.display())));
    }

    let mut pipeline = Pipeline::new(
        &config,
        DirSource::new(&inbox),
        DirSink::new(&outbox, format),
        LogNotifier::new(Some(outbox.clone())),
    );
    let outcome = pipeline.run(&current);

    println!("{}", to_json(&outcome)?);

    if outcome.success {
        Ok(())
    } else {
        Err(CliError::new(
            EXIT_STRATA_PIPELINE_FAILED,
            outcome.error.unwrap_or_default(),
        )
        .with_hint("pending batches were purged from the inbox"))
    }
}

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(Some(&config_path))?;
    let f = &config.fields;
    eprintln!(
        "valid: '{}' (reference={}, period={}, marker={}, value={}, region={}, stratum={})",
        config.name, f.reference, f.period, f.marker, f.value, f.region, f.stratum,
    );
    Ok(())
}

fn check_anomalies(count: usize, fail_on_anomalies: bool) -> Result<(), CliError> {
    if count > 0 && fail_on_anomalies {
        return Err(CliError::new(
            EXIT_STRATA_ANOMALIES,
            format!("{count} anomaly pair(s) found"),
        ));
    }
    Ok(())
}
