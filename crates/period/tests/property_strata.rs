// Property-based tests for stratum classification and reconciliation.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::HashMap;

use proptest::prelude::*;
use serde_json::Value;
use strata_period::{classify, reconcile, PeriodKey, ReconcileFields, Record, StrataConfig};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

const CURRENT: i64 = 201809;
const PERIODS: [i64; 3] = [201803, 201806, 201809];
const STRATA: [&str; 7] = ["A", "B1", "B2", "C", "D", "E", "M"];

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

fn record(marker: &str, value: Value, region: i64) -> Record {
    Record::new()
        .set("responder_id", "12000001")
        .set("period", CURRENT)
        .set("land_or_marine", marker)
        .set("Q608_total", value)
        .set("region", region)
}

/// Arbitrary value: mostly spread across the bands, sometimes on a boundary.
fn arb_value() -> impl Strategy<Value = f64> {
    prop_oneof![
        4 => 0.0..400_000.0f64,
        1 => prop::sample::select(vec![29_999.0, 30_000.0, 79_999.0, 80_000.0, 129_999.0, 130_000.0, 199_999.0, 200_000.0]),
    ]
}

/// Expected stratum for a land record, written as a closed-form band lookup.
fn expected_land(v: f64, region: i64) -> &'static str {
    if v >= 200_000.0 {
        "A"
    } else if v >= 130_000.0 {
        if region >= 10 { "B2" } else { "B1" }
    } else if v >= 80_000.0 {
        "C"
    } else if v >= 30_000.0 {
        "D"
    } else {
        "E"
    }
}

/// Rows of (reference, period, stratum), one row per (reference, period).
fn arb_history() -> impl Strategy<Value = Vec<(u32, i64, &'static str)>> {
    proptest::collection::vec(
        (0u32..12, proptest::sample::subsequence(PERIODS.to_vec(), 1..=3)),
        0..12,
    )
    .prop_flat_map(|refs| {
        let n: usize = refs.iter().map(|(_, p)| p.len()).sum();
        (Just(refs), proptest::collection::vec(proptest::sample::select(STRATA.to_vec()), n))
    })
    .prop_map(|(refs, strata)| {
        let mut seen = std::collections::HashSet::new();
        let mut rows = Vec::new();
        let mut strata = strata.into_iter();
        for (reference, periods) in refs {
            for period in periods {
                let stratum = strata.next().unwrap_or("E");
                if seen.insert((reference, period)) {
                    rows.push((reference, period, stratum));
                }
            }
        }
        rows
    })
}

fn history_records(rows: &[(u32, i64, &str)]) -> Vec<Record> {
    rows.iter()
        .map(|(r, p, s)| {
            Record::new()
                .set("ref", *r)
                .set("period", *p)
                .set("strata", *s)
                .set("value", (*r as i64) * 1000)
        })
        .collect()
}

fn fields() -> ReconcileFields {
    ReconcileFields::new("ref", "strata", "period")
}

// ===========================================================================
// Classifier
// ===========================================================================

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn land_bands(v in arb_value(), region in 0i64..20) {
        let out = classify(&record("L", Value::from(v), region), &StrataConfig::default());
        prop_assert_eq!(out.record.stratum("strata"), expected_land(v, region));
        prop_assert!(out.signal.is_none());
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn marine_always_m(v in arb_value(), region in 0i64..20, null in prop::bool::ANY) {
        let value = if null { Value::Null } else { Value::from(v) };
        let out = classify(&record("M", value, region), &StrataConfig::default());
        prop_assert_eq!(out.record.stratum("strata"), "M");
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn classification_idempotent(v in arb_value(), region in 0i64..20, marker in "[LMX]") {
        let config = StrataConfig::default();
        let once = classify(&record(&marker, Value::from(v), region), &config);
        let twice = classify(&once.record, &config);
        prop_assert_eq!(&once.record, &twice.record);
        prop_assert_eq!(once.signal, twice.signal);
    }
}

// ===========================================================================
// Reconciler
// ===========================================================================

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn shape_and_other_fields_preserved(rows in arb_history()) {
        let records = history_records(&rows);
        let out = reconcile(&records, &fields(), &PeriodKey::Numeric(CURRENT)).unwrap();

        prop_assert_eq!(out.corrected_batch.len(), records.len());
        for (before, after) in records.iter().zip(&out.corrected_batch) {
            for (k, v) in before.fields() {
                if k != "strata" {
                    prop_assert_eq!(after.get(k), Some(v));
                }
            }
            prop_assert_eq!(before.fields().len(), after.fields().len());
        }
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn consistent_history_untouched(refs in proptest::collection::btree_map(0u32..20, proptest::sample::select(STRATA.to_vec()), 0..10)) {
        let rows: Vec<(u32, i64, &str)> = refs
            .iter()
            .flat_map(|(r, s)| PERIODS.iter().map(move |p| (*r, *p, *s)))
            .collect();
        let records = history_records(&rows);
        let out = reconcile(&records, &fields(), &PeriodKey::Numeric(CURRENT)).unwrap();
        prop_assert!(out.anomalies.is_empty());
        prop_assert_eq!(&out.corrected_batch, &records);
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn anomalies_are_real_disagreements(rows in arb_history()) {
        let records = history_records(&rows);
        let out = reconcile(&records, &fields(), &PeriodKey::Numeric(CURRENT)).unwrap();

        let mut counts: HashMap<(u32, &str), usize> = HashMap::new();
        for (r, _, s) in &rows {
            *counts.entry((*r, *s)).or_insert(0) += 1;
        }

        for pair in &out.anomalies {
            prop_assert_ne!(&pair.current_stratum, &pair.previous_stratum);
            prop_assert_eq!(&pair.current_period, &PeriodKey::Numeric(CURRENT));
            prop_assert!(pair.previous_period < PeriodKey::Numeric(CURRENT));

            let r = pair.reference.as_u64().unwrap() as u32;
            prop_assert_eq!(counts[&(r, pair.current_stratum.as_str())], 1);
            prop_assert_eq!(counts[&(r, pair.previous_stratum.as_str())], 1);

            // Every row of the reference now carries the current stratum.
            for rec in &out.corrected_batch {
                if rec.get("ref").and_then(Value::as_u64) == Some(r as u64) {
                    prop_assert_eq!(rec.stratum("strata"), pair.current_stratum.clone());
                }
            }
        }
    }
}

proptest! {
    #![proptest_config(config_256())]
    #[test]
    fn reconcile_is_a_fixpoint(rows in arb_history()) {
        let records = history_records(&rows);
        let current = PeriodKey::Numeric(CURRENT);
        let once = reconcile(&records, &fields(), &current).unwrap();
        let twice = reconcile(&once.corrected_batch, &fields(), &current).unwrap();
        prop_assert_eq!(&twice.corrected_batch, &once.corrected_batch);
    }
}
