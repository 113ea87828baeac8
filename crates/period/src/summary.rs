use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{ClassifiedBatch, Reconciliation};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub records: usize,
    pub classified: usize,
    pub unclassified: usize,
    /// Rows per stratum after reconciliation. Unclassified rows count under "".
    pub stratum_counts: BTreeMap<String, usize>,
    pub signal_counts: BTreeMap<String, usize>,
    pub corrected: usize,
    pub anomalies: usize,
}

/// Compute summary statistics for a classify + reconcile run.
pub fn compute_summary(
    classified: &ClassifiedBatch,
    reconciliation: &Reconciliation,
    stratum_field: &str,
) -> RunSummary {
    let mut stratum_counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in &reconciliation.corrected_batch {
        *stratum_counts.entry(record.stratum(stratum_field)).or_insert(0) += 1;
    }

    let mut signal_counts: BTreeMap<String, usize> = BTreeMap::new();
    for signal in &classified.signals {
        *signal_counts.entry(signal.kind.to_string()).or_insert(0) += 1;
    }

    let records = classified.records.len();
    let unclassified = classified
        .records
        .iter()
        .filter(|r| r.stratum(stratum_field).is_empty())
        .count();

    RunSummary {
        records,
        classified: records - unclassified,
        unclassified,
        stratum_counts,
        signal_counts,
        corrected: reconciliation.summary.corrected,
        anomalies: reconciliation.anomalies.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassificationSignal, Record, ReconcileSummary, SignalKind};
    use serde_json::json;

    #[test]
    fn summary_counts() {
        let records = vec![
            Record::new().set("strata", "E"),
            Record::new().set("strata", ""),
            Record::new().set("strata", "D"),
        ];
        let classified = ClassifiedBatch {
            records: records.clone(),
            signals: vec![ClassificationSignal {
                index: 1,
                reference: json!("2"),
                kind: SignalKind::UnknownMarker,
            }],
        };
        let mut corrected_batch = records;
        corrected_batch[2] = corrected_batch[2].with_field("strata", "E");
        let reconciliation = Reconciliation {
            corrected_batch,
            anomalies: vec![],
            summary: ReconcileSummary {
                records: 3,
                corrected: 1,
                ..ReconcileSummary::default()
            },
        };

        let summary = compute_summary(&classified, &reconciliation, "strata");
        assert_eq!(summary.records, 3);
        assert_eq!(summary.classified, 2);
        assert_eq!(summary.unclassified, 1);
        assert_eq!(summary.stratum_counts["E"], 2);
        assert_eq!(summary.stratum_counts[""], 1);
        assert_eq!(summary.signal_counts["unknown_marker"], 1);
        assert_eq!(summary.corrected, 1);
        assert_eq!(summary.anomalies, 0);
    }
}
