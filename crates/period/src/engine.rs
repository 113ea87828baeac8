use serde::Serialize;

use crate::config::StrataConfig;
use crate::error::StrataError;
use crate::model::{AnomalyPair, Batch, ClassificationSignal, PeriodKey, Record};
use crate::reconcile::reconcile;
use crate::runner::classify_batch;
use crate::summary::{compute_summary, RunSummary};

#[derive(Debug, Clone, Serialize)]
pub struct RunMeta {
    pub config_name: String,
    pub current_period: PeriodKey,
    pub engine_version: String,
    pub run_at: String,
}

/// Output of a full classify + reconcile run.
#[derive(Debug, Clone, Serialize)]
pub struct StrataResult {
    pub meta: RunMeta,
    pub summary: RunSummary,
    pub records: Batch,
    pub anomalies: Vec<AnomalyPair>,
    pub signals: Vec<ClassificationSignal>,
}

/// Classify `records`, then reconcile strata against `current`.
///
/// Fails before producing anything if the config is invalid or a record
/// lacks a required field.
pub fn run(config: &StrataConfig, records: &[Record], current: &PeriodKey) -> Result<StrataResult, StrataError> {
    config.validate()?;

    let classified = classify_batch(records, config)?;
    let reconciliation = reconcile(
        &classified.records,
        &config.fields.reconcile_fields(),
        current,
    )?;

    let summary = compute_summary(&classified, &reconciliation, &config.fields.stratum);
    log::info!(
        "{}: {} record(s), {} unclassified, {} corrected, {} anomaly pair(s) for period {current}",
        config.name,
        summary.records,
        summary.unclassified,
        summary.corrected,
        summary.anomalies,
    );

    Ok(StrataResult {
        meta: RunMeta {
            config_name: config.name.clone(),
            current_period: current.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        summary,
        records: reconciliation.corrected_batch,
        anomalies: reconciliation.anomalies,
        signals: classified.signals,
    })
}
