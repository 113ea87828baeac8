use std::thread;

use crate::classify::classify;
use crate::config::StrataConfig;
use crate::error::StrataError;
use crate::model::{
    missing_column, Batch, Classification, ClassificationSignal, ClassifiedBatch, MethodResponse,
    Record,
};

/// Classify every record in `records`, preserving order and length.
///
/// The config is validated first. The batch must then carry the reference,
/// period, marker and region columns: a column no record has fails the whole
/// call before anything is classified, while a key missing from single
/// records reads as null. Value may be absent everywhere.
pub fn classify_batch(records: &[Record], config: &StrataConfig) -> Result<ClassifiedBatch, StrataError> {
    config.validate()?;
    check_required_columns(records, config)?;

    let threads = config.runner.threads.max(1);
    let classified: Vec<Classification> = if threads == 1 || records.len() < 2 {
        records.iter().map(|r| classify(r, config)).collect()
    } else {
        classify_parallel(records, config, threads)
    };

    let mut out = Vec::with_capacity(classified.len());
    let mut signals = Vec::new();
    for (index, Classification { record, signal }) in classified.into_iter().enumerate() {
        if let Some(kind) = signal {
            let reference = record
                .get(&config.fields.reference)
                .cloned()
                .unwrap_or_default();
            log::warn!("record {index} (reference {reference}) left unclassified: {kind}");
            signals.push(ClassificationSignal { index, reference, kind });
        }
        out.push(record);
    }

    log::debug!(
        "classified {} record(s), {} unclassified",
        out.len(),
        signals.len()
    );

    Ok(ClassifiedBatch { records: out, signals })
}

/// Classification wrapped in the caller-facing envelope.
pub fn classify_response(records: &[Record], config: &StrataConfig) -> MethodResponse<Batch> {
    let result = classify_batch(records, config).map(|b| b.records);
    if let Err(ref e) = result {
        log::error!("{} failed: {e}", config.pipeline.module);
    }
    MethodResponse::from_result(&config.pipeline.module, result)
}

fn check_required_columns(records: &[Record], config: &StrataConfig) -> Result<(), StrataError> {
    let required = config.fields.required_for_classify();
    match missing_column(records, &required) {
        Some(field) => Err(StrataError::MissingColumn { field: field.to_string() }),
        None => Ok(()),
    }
}

/// Split into contiguous chunks, one scoped thread each, and join in order.
fn classify_parallel(records: &[Record], config: &StrataConfig, threads: usize) -> Vec<Classification> {
    let chunk_size = records.len().div_ceil(threads);

    thread::scope(|s| {
        let handles: Vec<_> = records
            .chunks(chunk_size)
            .map(|chunk| {
                s.spawn(move || chunk.iter().map(|r| classify(r, config)).collect::<Vec<_>>())
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|h| match h.join() {
                Ok(part) => part,
                // classify does not panic on any record shape
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    })
}
