use std::collections::HashMap;

use serde_json::Value;

use crate::config::ReconcileFields;
use crate::error::StrataError;
use crate::model::{
    missing_column, value_key, AnomalyPair, PeriodKey, ReconcileSummary, Reconciliation, Record,
};

static NULL: Value = Value::Null;

/// One projected row: (reference, stratum, period).
#[derive(Debug, Clone)]
struct Projected<'a> {
    reference: &'a Value,
    reference_key: String,
    stratum: String,
    period: PeriodKey,
}

/// Reconcile strata across periods.
///
/// A (reference, stratum) pair that occurs more than once is consistent.
/// Rows whose pair is unique are anomaly candidates; for every reference
/// with a candidate in `current`, that stratum is forced onto all of the
/// reference's rows and paired with the most recent earlier candidate.
///
/// Record count, order and every field but the stratum are preserved. The
/// batch must carry the reference, stratum and period columns; a key missing
/// from single records reads as null.
pub fn reconcile(
    records: &[Record],
    fields: &ReconcileFields,
    current: &PeriodKey,
) -> Result<Reconciliation, StrataError> {
    fields.validate()?;
    let required = [fields.reference.as_str(), fields.stratum.as_str(), fields.period.as_str()];
    if let Some(field) = missing_column(records, &required) {
        return Err(StrataError::MissingColumn { field: field.to_string() });
    }
    let projected = project(records, fields);

    // Pass 1: multiplicity of each (reference, stratum) pair.
    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    for row in &projected {
        *counts
            .entry((row.reference_key.as_str(), row.stratum.as_str()))
            .or_insert(0) += 1;
    }

    let candidates: Vec<&Projected> = projected
        .iter()
        .filter(|row| counts[&(row.reference_key.as_str(), row.stratum.as_str())] == 1)
        .collect();

    // Pass 2: split candidates around the current period.
    let mut authoritative: HashMap<&str, &Projected> = HashMap::new();
    let mut current_order: Vec<&str> = Vec::new();
    let mut previous: HashMap<&str, &Projected> = HashMap::new();

    for row in candidates.iter().copied() {
        let key = row.reference_key.as_str();
        if &row.period == current {
            match authoritative.get(key) {
                Some(first) => log::warn!(
                    "reference {} has strata '{}' and '{}' in period {current}; keeping '{}'",
                    row.reference,
                    first.stratum,
                    row.stratum,
                    first.stratum,
                ),
                None => {
                    authoritative.insert(key, row);
                    current_order.push(key);
                }
            }
        } else {
            // Most recent earlier period wins; later batch position breaks ties.
            let replace = previous.get(key).map_or(true, |seen| row.period >= seen.period);
            if replace {
                previous.insert(key, row);
            }
        }
    }

    // Correct: every row of an authoritative reference takes the current stratum.
    let mut corrected = 0;
    let corrected_batch: Vec<Record> = records
        .iter()
        .zip(&projected)
        .map(|(record, row)| match authoritative.get(row.reference_key.as_str()) {
            Some(auth) if auth.stratum != row.stratum => {
                corrected += 1;
                record.with_field(&fields.stratum, auth.stratum.as_str())
            }
            _ => record.clone(),
        })
        .collect();

    // Report: references with candidates on both sides of the current period.
    let mut anomalies = Vec::new();
    for key in &current_order {
        let cur = authoritative[key];
        if let Some(prev) = previous.get(key) {
            anomalies.push(AnomalyPair {
                reference: cur.reference.clone(),
                current_stratum: cur.stratum.clone(),
                previous_stratum: prev.stratum.clone(),
                current_period: cur.period.clone(),
                previous_period: prev.period.clone(),
            });
        }
    }

    let one_sided = current_order.len() - anomalies.len()
        + previous.keys().filter(|k| !authoritative.contains_key(*k)).count();
    if one_sided > 0 {
        log::debug!("{one_sided} reference(s) with candidates on one side of period {current} only");
    }

    let summary = ReconcileSummary {
        records: records.len(),
        candidates: candidates.len(),
        corrected,
        anomalies: anomalies.len(),
        one_sided,
    };
    log::debug!(
        "reconciled {} record(s): {} candidate(s), {} corrected, {} anomaly pair(s)",
        summary.records,
        summary.candidates,
        summary.corrected,
        summary.anomalies,
    );

    Ok(Reconciliation {
        corrected_batch,
        anomalies,
        summary,
    })
}

fn project<'a>(records: &'a [Record], fields: &ReconcileFields) -> Vec<Projected<'a>> {
    records
        .iter()
        .map(|record| {
            let reference = record.get(&fields.reference).unwrap_or(&NULL);
            let period = record.get(&fields.period).unwrap_or(&NULL);
            Projected {
                reference,
                reference_key: value_key(reference),
                stratum: record.stratum(&fields.stratum),
                period: PeriodKey::from_value(period),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> ReconcileFields {
        ReconcileFields::new("ref", "strata", "period")
    }

    fn row(reference: impl Into<Value>, period: i64, stratum: &str) -> Record {
        Record::new()
            .set("ref", reference)
            .set("period", period)
            .set("strata", stratum)
            .set("Q608_total", 1234)
    }

    fn strata(out: &Reconciliation) -> Vec<String> {
        out.corrected_batch.iter().map(|r| r.stratum("strata")).collect()
    }

    const CURRENT: PeriodKey = PeriodKey::Numeric(201809);

    #[test]
    fn consistent_batch_is_unchanged() {
        let records = vec![
            row(1, 201809, "E"),
            row(1, 201806, "E"),
            row(2, 201809, "C"),
            row(2, 201806, "C"),
        ];
        let out = reconcile(&records, &fields(), &CURRENT).unwrap();
        assert!(out.anomalies.is_empty());
        assert_eq!(out.corrected_batch, records);
        assert_eq!(out.summary.candidates, 0);
        assert_eq!(out.summary.corrected, 0);
    }

    #[test]
    fn scenario_previous_row_corrected() {
        let records = vec![row(1, 201809, "E"), row(1, 201806, "D")];
        let out = reconcile(&records, &fields(), &CURRENT).unwrap();

        assert_eq!(strata(&out), vec!["E", "E"]);
        assert_eq!(
            out.anomalies,
            vec![AnomalyPair {
                reference: json!(1),
                current_stratum: "E".into(),
                previous_stratum: "D".into(),
                current_period: PeriodKey::Numeric(201809),
                previous_period: PeriodKey::Numeric(201806),
            }]
        );
        assert_eq!(out.summary.corrected, 1);
    }

    #[test]
    fn current_d_previous_c() {
        let records = vec![row("R", 201808, "C"), row("R", 201809, "D")];
        let current = PeriodKey::Numeric(201809);
        let out = reconcile(&records, &fields(), &current).unwrap();
        assert_eq!(strata(&out), vec!["D", "D"]);
        assert_eq!(out.anomalies.len(), 1);
        let pair = &out.anomalies[0];
        assert_eq!(pair.reference, json!("R"));
        assert_eq!((pair.current_stratum.as_str(), pair.previous_stratum.as_str()), ("D", "C"));
        assert_eq!(pair.previous_period, PeriodKey::Numeric(201808));
    }

    #[test]
    fn other_fields_untouched() {
        let records = vec![row(1, 201809, "E"), row(1, 201806, "D").set("extra", "keep")];
        let out = reconcile(&records, &fields(), &CURRENT).unwrap();
        assert_eq!(out.corrected_batch[1].get("extra"), Some(&json!("keep")));
        assert_eq!(out.corrected_batch[1].get("Q608_total"), Some(&json!(1234)));
        assert_eq!(out.corrected_batch[1].get("period"), Some(&json!(201806)));
    }

    #[test]
    fn input_not_mutated() {
        let records = vec![row(1, 201809, "E"), row(1, 201806, "D")];
        let _ = reconcile(&records, &fields(), &CURRENT).unwrap();
        assert_eq!(records[1].stratum("strata"), "D");
    }

    #[test]
    fn most_recent_previous_period_is_paired() {
        let records = vec![
            row(1, 201803, "B1"),
            row(1, 201809, "A"),
            row(1, 201806, "C"),
        ];
        let out = reconcile(&records, &fields(), &CURRENT).unwrap();
        assert_eq!(strata(&out), vec!["A", "A", "A"]);
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.anomalies[0].previous_stratum, "C");
        assert_eq!(out.anomalies[0].previous_period, PeriodKey::Numeric(201806));
    }

    #[test]
    fn repeated_previous_stratum_is_not_a_candidate() {
        // (1, C) occurs twice, so only the current row is a candidate: the
        // earlier rows are still corrected, but no pair is reported.
        let records = vec![
            row(1, 201809, "D"),
            row(1, 201806, "C"),
            row(1, 201803, "C"),
        ];
        let out = reconcile(&records, &fields(), &CURRENT).unwrap();
        assert_eq!(strata(&out), vec!["D", "D", "D"]);
        assert!(out.anomalies.is_empty());
        assert_eq!(out.summary.one_sided, 1);
    }

    #[test]
    fn reference_only_in_previous_period_is_untouched() {
        let records = vec![row(1, 201809, "E"), row(2, 201806, "D")];
        let out = reconcile(&records, &fields(), &CURRENT).unwrap();
        assert_eq!(out.corrected_batch, records);
        assert!(out.anomalies.is_empty());
        assert_eq!(out.summary.one_sided, 2);
    }

    #[test]
    fn reference_keys_compare_across_types() {
        let records = vec![row(7, 201809, "E"), row("7", 201806, "D")];
        let out = reconcile(&records, &fields(), &CURRENT).unwrap();
        assert_eq!(strata(&out), vec!["E", "E"]);
        assert_eq!(out.anomalies.len(), 1);
    }

    #[test]
    fn string_periods_match_numeric_current() {
        let records = vec![
            row(1, 0, "E").set("period", "201809"),
            row(1, 0, "D").set("period", "201806"),
        ];
        let out = reconcile(&records, &fields(), &PeriodKey::parse("201809")).unwrap();
        assert_eq!(strata(&out), vec!["E", "E"]);
        assert_eq!(out.anomalies.len(), 1);
    }

    #[test]
    fn conflicting_current_strata_keep_first() {
        let records = vec![
            row(1, 201809, "E"),
            row(1, 201809, "D"),
            row(1, 201806, "C"),
        ];
        let out = reconcile(&records, &fields(), &CURRENT).unwrap();
        assert_eq!(strata(&out), vec!["E", "E", "E"]);
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.anomalies[0].current_stratum, "E");
    }

    #[test]
    fn anomalies_follow_batch_order() {
        let records = vec![
            row(2, 201809, "A"),
            row(1, 201809, "E"),
            row(1, 201806, "D"),
            row(2, 201806, "B2"),
            row(3, 201809, "M"),
            row(3, 201806, "M"),
        ];
        let out = reconcile(&records, &fields(), &CURRENT).unwrap();
        let refs: Vec<_> = out.anomalies.iter().map(|a| a.reference.clone()).collect();
        assert_eq!(refs, vec![json!(2), json!(1)]);
        assert_eq!(strata(&out), vec!["A", "E", "E", "A", "M", "M"]);
    }

    #[test]
    fn empty_and_null_strata_take_part() {
        let records = vec![row(1, 201809, "E"), row(1, 201806, "").set("strata", Value::Null)];
        let out = reconcile(&records, &fields(), &CURRENT).unwrap();
        assert_eq!(strata(&out), vec!["E", "E"]);
        assert_eq!(out.anomalies[0].previous_stratum, "");
    }

    #[test]
    fn missing_column_is_structural() {
        let records = vec![
            Record::new().set("ref", 1).set("period", 201809),
            Record::new().set("ref", 1).set("period", 201806),
        ];
        let err = reconcile(&records, &fields(), &CURRENT).unwrap_err();
        assert_eq!(err, StrataError::MissingColumn { field: "strata".into() });
    }

    #[test]
    fn stratum_missing_from_one_record_reads_as_empty() {
        let records = vec![
            row(1, 201809, "E"),
            row(1, 201806, "D"),
            Record::new().set("ref", 2).set("period", 201806),
        ];
        let out = reconcile(&records, &fields(), &CURRENT).unwrap();
        assert_eq!(strata(&out), vec!["E", "E", ""]);
        assert!(!out.corrected_batch[2].has_field("strata"));
        assert_eq!(out.anomalies.len(), 1);
        assert_eq!(out.anomalies[0].reference, json!(1));
        assert_eq!(out.summary.one_sided, 1);
    }

    #[test]
    fn empty_batch() {
        let out = reconcile(&[], &fields(), &CURRENT).unwrap();
        assert!(out.corrected_batch.is_empty());
        assert!(out.anomalies.is_empty());
        assert_eq!(out.summary, ReconcileSummary::default());
    }
}
