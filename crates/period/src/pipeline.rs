//! Orchestration seams: where batches come from, where results go, and who
//! hears about completion. The core never touches storage or queues itself.

use serde::Serialize;

use crate::config::StrataConfig;
use crate::engine::{run, StrataResult};
use crate::error::StrataError;
use crate::model::{AnomalyPair, Batch, PeriodKey, Record};
use crate::summary::RunSummary;

/// Supplies one batch per run.
pub trait BatchSource {
    fn receive(&mut self) -> Result<Batch, StrataError>;
    /// The batch was processed and its results written; drop it.
    fn acknowledge(&mut self) -> Result<(), StrataError>;
    /// The run failed; discard pending input so it is not reprocessed.
    fn purge(&mut self) -> Result<(), StrataError>;
}

/// Receives the corrected batch and, when non-empty, the anomaly report.
pub trait BatchSink {
    fn write_batch(&mut self, batch: &[Record]) -> Result<(), StrataError>;
    fn write_anomalies(&mut self, anomalies: &[AnomalyPair]) -> Result<(), StrataError>;
}

pub trait Notifier {
    fn notify(&mut self, notification: &Notification) -> Result<(), StrataError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub success: bool,
    pub module: String,
    pub checkpoint: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub success: bool,
    pub checkpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

pub struct Pipeline<'a, S, K, N> {
    config: &'a StrataConfig,
    source: S,
    sink: K,
    notifier: N,
}

impl<'a, S, K, N> Pipeline<'a, S, K, N>
where
    S: BatchSource,
    K: BatchSink,
    N: Notifier,
{
    pub fn new(config: &'a StrataConfig, source: S, sink: K, notifier: N) -> Self {
        Self { config, source, sink, notifier }
    }

    /// receive → classify → reconcile → write → acknowledge → notify.
    ///
    /// Any failure purges the source and is reported in the outcome rather
    /// than returned; nothing is written after the failing step.
    pub fn run(&mut self, current: &PeriodKey) -> PipelineOutcome {
        let checkpoint = self.config.pipeline.checkpoint.clone();
        match self.try_run(current) {
            Ok(result) => PipelineOutcome {
                success: true,
                checkpoint,
                error: None,
                summary: Some(result.summary),
            },
            Err(e) => {
                log::error!("{} failed at checkpoint {checkpoint}: {e}", self.config.pipeline.module);
                if let Err(purge_err) = self.source.purge() {
                    log::error!("purge failed: {purge_err}");
                }
                PipelineOutcome {
                    success: false,
                    checkpoint,
                    error: Some(e.to_string()),
                    summary: None,
                }
            }
        }
    }

    fn try_run(&mut self, current: &PeriodKey) -> Result<StrataResult, StrataError> {
        let batch = self.source.receive()?;
        log::info!("received {} record(s)", batch.len());

        let result = run(self.config, &batch, current)?;

        self.sink.write_batch(&result.records)?;
        if !result.anomalies.is_empty() {
            self.sink.write_anomalies(&result.anomalies)?;
        }
        self.source.acknowledge()?;

        self.notifier.notify(&Notification {
            success: true,
            module: self.config.pipeline.module.clone(),
            checkpoint: self.config.pipeline.checkpoint.clone(),
            message: format!("Completed {}", self.config.pipeline.module),
        })?;

        Ok(result)
    }

    pub fn into_parts(self) -> (S, K, N) {
        (self.source, self.sink, self.notifier)
    }
}
