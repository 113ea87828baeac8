//! Local stand-ins for the queue, storage and notification collaborators:
//! an inbox directory of batch files, an outbox directory for results, and a
//! notifier that logs and appends to a JSON-lines file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use strata_period::input::{batch_to_csv, batch_to_json, load_csv_batch, load_json_batch};
use strata_period::pipeline::{BatchSink, BatchSource, Notification, Notifier};
use strata_period::{AnomalyPair, Batch, Record, StrataError};

pub const BATCH_FILE_STEM: &str = "strata_out";
pub const ANOMALIES_FILE: &str = "anomalies.json";
pub const NOTIFICATIONS_FILE: &str = "notifications.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn render(self, batch: &[Record]) -> Result<String, StrataError> {
        match self {
            Self::Json => batch_to_json(batch),
            Self::Csv => batch_to_csv(batch),
        }
    }
}

/// Load a batch file; `.csv` files are read as CSV, anything else as JSON.
pub fn read_batch_file(path: &Path) -> Result<Batch, StrataError> {
    let data = fs::read_to_string(path)
        .map_err(|e| StrataError::Io(format!("cannot read {}: {e}", path.display())))?;
    if is_csv(path) {
        load_csv_batch(&data)
    } else {
        load_json_batch(&data)
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
}

fn is_batch_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "json" | "csv"))
}

fn io_err(action: &str, path: &Path, e: std::io::Error) -> StrataError {
    StrataError::Io(format!("cannot {action} {}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Takes the first batch file (by name) from an inbox directory.
pub struct DirSource {
    inbox: PathBuf,
    pending: Option<PathBuf>,
}

impl DirSource {
    pub fn new(inbox: impl Into<PathBuf>) -> Self {
        Self { inbox: inbox.into(), pending: None }
    }

    fn batch_files(&self) -> Result<Vec<PathBuf>, StrataError> {
        let entries = fs::read_dir(&self.inbox).map_err(|e| io_err("read", &self.inbox, e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| io_err("read", &self.inbox, e))?.path();
            if is_batch_file(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl BatchSource for DirSource {
    fn receive(&mut self) -> Result<Batch, StrataError> {
        let path = self
            .batch_files()?
            .into_iter()
            .next()
            .ok_or_else(|| StrataError::Io(format!("no batch waiting in {}", self.inbox.display())))?;
        log::info!("reading batch {}", path.display());
        let batch = read_batch_file(&path)?;
        self.pending = Some(path);
        Ok(batch)
    }

    fn acknowledge(&mut self) -> Result<(), StrataError> {
        if let Some(path) = self.pending.take() {
            fs::remove_file(&path).map_err(|e| io_err("remove", &path, e))?;
            log::debug!("acknowledged {}", path.display());
        }
        Ok(())
    }

    fn purge(&mut self) -> Result<(), StrataError> {
        self.pending = None;
        for path in self.batch_files()? {
            fs::remove_file(&path).map_err(|e| io_err("remove", &path, e))?;
            log::warn!("purged {}", path.display());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Writes the corrected batch and anomaly report into an outbox directory.
pub struct DirSink {
    outbox: PathBuf,
    format: OutputFormat,
}

impl DirSink {
    pub fn new(outbox: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self { outbox: outbox.into(), format }
    }

    pub fn batch_path(&self) -> PathBuf {
        self.outbox
            .join(format!("{BATCH_FILE_STEM}.{}", self.format.extension()))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), StrataError> {
        fs::create_dir_all(&self.outbox).map_err(|e| io_err("create", &self.outbox, e))?;
        fs::write(path, contents).map_err(|e| io_err("write", path, e))?;
        log::info!("wrote {}", path.display());
        Ok(())
    }
}

impl BatchSink for DirSink {
    fn write_batch(&mut self, batch: &[Record]) -> Result<(), StrataError> {
        let contents = self.format.render(batch)?;
        self.write(&self.batch_path(), &contents)
    }

    fn write_anomalies(&mut self, anomalies: &[AnomalyPair]) -> Result<(), StrataError> {
        let contents = serde_json::to_string_pretty(anomalies)
            .map_err(|e| StrataError::Io(format!("JSON serialization error: {e}")))?;
        self.write(&self.outbox.join(ANOMALIES_FILE), &contents)
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Logs each notification and, when given a directory, appends it as one
/// JSON line to `notifications.jsonl` there.
pub struct LogNotifier {
    dir: Option<PathBuf>,
}

impl LogNotifier {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }
}

impl Notifier for LogNotifier {
    fn notify(&mut self, notification: &Notification) -> Result<(), StrataError> {
        log::info!(
            "[{}] {} (checkpoint {})",
            notification.module,
            notification.message,
            notification.checkpoint
        );

        let Some(dir) = &self.dir else { return Ok(()) };
        fs::create_dir_all(dir).map_err(|e| io_err("create", dir, e))?;
        let path = dir.join(NOTIFICATIONS_FILE);
        let line = serde_json::to_string(notification)
            .map_err(|e| StrataError::Io(format!("JSON serialization error: {e}")))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err("open", &path, e))?;
        writeln!(file, "{line}").map_err(|e| io_err("write", &path, e))
    }
}
