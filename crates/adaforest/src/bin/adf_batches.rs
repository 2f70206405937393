//! Batch-log driver.
//!
//! Reads a log whose lines name `train test` ARFF file pairs, learns from
//! each train file in turn, writes the best forest of every batch next to its
//! train file and appends one diagnostics row per batch to a CSV file next to
//! the log.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use adaforest::data::ArffStream;
use adaforest::{run_with_threads, AdfConfig, AdfError, BatchStats, ForestOrchestrator, InducerKind, Parallelism};

const CSV_HEADER: &str =
    "Batch, TestAccuracy, TotalTime, PFAccuracy, PFTime, AFAccuracy, AFTime, TFAccuracy, TFTime, Status";

#[derive(Parser, Debug)]
#[command(author, version, about = "Adaptive decision forest over a log of batch files", long_about = None)]
struct Args {
    /// Batch log: one `train test` pair of ARFF files per line, relative to
    /// the log's directory.
    #[arg(value_name = "BATCH_LOG")]
    log: PathBuf,
    /// JSON configuration file; command-line options override it.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Base inducer (RF, SysFor or HT).
    #[arg(short = 'F', long = "inducer")]
    inducer: Option<InducerKind>,
    /// Number of trees per forest.
    #[arg(short = 'E', long)]
    ensemble_size: Option<usize>,
    /// Minimum number of records per leaf.
    #[arg(short = 'm', long)]
    min_leaf_size: Option<usize>,
    /// Largest perturbed-leaf ratio at which a forest is repaired.
    #[arg(short = 'R', long)]
    repairable_threshold: Option<f64>,
    /// Confidence drop a leaf tolerates before it is perturbed.
    #[arg(short = 'B', long)]
    error_tolerance: Option<f64>,
    /// Number of recent batches the transient forest trains on.
    #[arg(short = 'Z', long)]
    window_threshold: Option<usize>,
    /// Unrepairable batches tolerated before the transient forest is promoted.
    #[arg(short = 'D', long)]
    cdf_threshold: Option<usize>,
    /// Repair the current forest only when it is repairable.
    #[arg(long)]
    no_pf_update: bool,
    /// Class attribute position (0-based); defaults to the last attribute.
    #[arg(long)]
    class_index: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    /// Worker threads (0 = all cores).
    #[arg(long)]
    threads: Option<usize>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Start from the JSON config (or defaults) and apply overrides.
    fn to_config(&self) -> Result<AdfConfig, AdfError> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
            None => AdfConfig::default(),
        };
        if let Some(v) = self.inducer {
            config.inducer = v;
        }
        if let Some(v) = self.ensemble_size {
            config.ensemble_size = v;
        }
        if let Some(v) = self.min_leaf_size {
            config.min_leaf_size = v;
        }
        if let Some(v) = self.repairable_threshold {
            config.repairable_threshold = v;
        }
        if let Some(v) = self.error_tolerance {
            config.error_tolerance = v;
        }
        if let Some(v) = self.window_threshold {
            config.window_threshold = v;
        }
        if let Some(v) = self.cdf_threshold {
            config.cdf_threshold = v;
        }
        if self.no_pf_update {
            config.pf_always_update = false;
        }
        if self.class_index.is_some() {
            config.class_index = self.class_index;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.threads {
            config.n_threads = std::num::NonZeroUsize::new(v);
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    match run(&args) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failed) => {
            eprintln!("error: {failed} batch(es) failed, see the log above");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {err}");
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

/// Returns the number of batches that failed.
fn run(args: &Args) -> Result<usize, AdfError> {
    let config = args.to_config()?;
    let pairs = read_batch_log(&args.log)?;
    let csv_path = accuracy_file(&args.log, &config.method_name());
    fs::write(&csv_path, format!("{}\n{}", config.describe(), CSV_HEADER))?;
    info!(batches = pairs.len(), csv = %csv_path.display(), "{}", config.describe());

    run_with_threads(config.thread_count(), |parallelism| learn(&config, parallelism, &pairs, &csv_path))
}

/// Feed every batch to the forests. A batch that fails is logged and
/// skipped; the forests keep their state from before it.
fn learn(config: &AdfConfig, parallelism: Parallelism, pairs: &[(PathBuf, PathBuf)], csv_path: &Path) -> Result<usize, AdfError> {
    let mut adf = ForestOrchestrator::with_parallelism(config.clone(), parallelism)?;
    let mut csv = OpenOptions::new().append(true).open(csv_path)?;
    let mut failed = 0;

    for (train, test) in pairs {
        let batch_id = file_name(train);
        info!(train = %train.display(), "processing batch");
        match learn_batch(config, &mut adf, &batch_id, train, test) {
            Ok(row) => {
                info!(batch = %batch_id, "{}", row);
                write!(csv, "\n{}", row)?;
            }
            Err(err) => {
                error!(batch = %batch_id, %err, "batch failed, keeping previous forests");
                failed += 1;
            }
        }
    }
    writeln!(csv)?;
    Ok(failed)
}

/// Process one train file, write the best forest and score it on the test
/// file. Returns the diagnostics row.
fn learn_batch(
    config: &AdfConfig,
    adf: &mut ForestOrchestrator,
    batch_id: &str,
    train: &Path,
    test: &Path,
) -> Result<String, AdfError> {
    let batch = read_batch(train, config.class_index)?;
    let report = adf.process_batch(batch_id, batch)?;

    let forest = adf.best_forest();
    fs::write(classifier_file(train), forest.to_rule_set())?;
    let test_accuracy = if forest.is_empty() {
        warn!(batch = %batch_id, "no forest was built");
        0.0
    } else {
        forest.accuracy(&read_batch(test, config.class_index)?)
    };

    Ok(format!(
        "{}, {:.3}%, {}, {}",
        batch_id,
        test_accuracy,
        report.total_time.as_millis(),
        report.csv_columns()
    ))
}

/// `train test` pairs of the log, resolved against the log's directory.
/// Fields may be separated by whitespace or commas; blank lines and lines
/// starting with `#` are skipped.
fn read_batch_log(log: &Path) -> Result<Vec<(PathBuf, PathBuf)>, AdfError> {
    let dir = log.parent().unwrap_or_else(|| Path::new(""));
    let mut pairs = Vec::new();
    for (i, line) in fs::read_to_string(log)?.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|f| !f.is_empty())
            .collect();
        match fields.as_slice() {
            [train, test, ..] => pairs.push((dir.join(train), dir.join(test))),
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("{}:{}: expected `train test`, found `{}`", log.display(), i + 1, line),
                )
                .into())
            }
        }
    }
    Ok(pairs)
}

fn read_batch(path: &Path, class_index: Option<usize>) -> Result<BatchStats, AdfError> {
    let mut stream = ArffStream::from_file(path, class_index)?;
    Ok(BatchStats::from_stream(&mut stream)?)
}

fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// `dir/b1.arff` -> `dir/b1_finalclassifier.txt`
fn classifier_file(train: &Path) -> PathBuf {
    let stem = train.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    train.with_file_name(format!("{}_finalclassifier.txt", stem))
}

/// `dir/log.txt` -> `dir/log_accuracyADF-RF.csv`
fn accuracy_file(log: &Path, method: &str) -> PathBuf {
    let stem = log.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    log.with_file_name(format!("{}_accuracy{}.csv", stem, method))
}
