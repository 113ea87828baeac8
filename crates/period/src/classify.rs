use serde_json::Value;

use crate::config::{Population, StrataConfig};
use crate::model::{value_as_f64, Classification, Record, SignalKind};

// ---------------------------------------------------------------------------
// Rule ladder
// ---------------------------------------------------------------------------

/// Region condition attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegionBand {
    Any,
    /// region < n
    Below(f64),
    /// region >= n
    AtLeast(f64),
}

/// One rung of the ladder: a predicate and the stratum it assigns.
///
/// Value bounds are `min_value <= v < max_value`; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rule {
    pub population: Population,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub region: RegionBand,
    pub stratum: &'static str,
}

impl Rule {
    const fn land(min_value: Option<f64>, max_value: Option<f64>, region: RegionBand, stratum: &'static str) -> Self {
        Self { population: Population::Land, min_value, max_value, region, stratum }
    }

    pub fn matches(&self, population: Population, value: Option<f64>, region: Option<f64>) -> bool {
        if population != self.population {
            return false;
        }

        // Rules without bounds (marine) don't look at the value at all.
        if self.min_value.is_some() || self.max_value.is_some() {
            let Some(v) = value else { return false };
            if self.min_value.is_some_and(|min| v < min) {
                return false;
            }
            if self.max_value.is_some_and(|max| v >= max) {
                return false;
            }
        }

        match self.region {
            RegionBand::Any => true,
            RegionBand::Below(n) => region.is_some_and(|r| r < n),
            RegionBand::AtLeast(n) => region.is_some_and(|r| r >= n),
        }
    }
}

/// Stratum ladder, evaluated top to bottom. Every matching rule overwrites
/// the previous result, so with rising thresholds the last match wins.
pub const LADDER: [Rule; 7] = [
    Rule { population: Population::Marine, min_value: None, max_value: None, region: RegionBand::Any, stratum: "M" },
    Rule::land(None, Some(30_000.0), RegionBand::Any, "E"),
    Rule::land(Some(30_000.0), None, RegionBand::Any, "D"),
    Rule::land(Some(80_000.0), None, RegionBand::Any, "C"),
    Rule::land(Some(130_000.0), None, RegionBand::AtLeast(10.0), "B2"),
    Rule::land(Some(130_000.0), None, RegionBand::Below(10.0), "B1"),
    Rule::land(Some(200_000.0), None, RegionBand::Any, "A"),
];

/// Fold `rules` left to right; the last satisfied rule wins.
pub fn fold_ladder(
    rules: &[Rule],
    population: Population,
    value: Option<f64>,
    region: Option<f64>,
) -> Option<&'static str> {
    rules.iter().fold(None, |acc, rule| {
        if rule.matches(population, value, region) {
            Some(rule.stratum)
        } else {
            acc
        }
    })
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Classify one record with the standard ladder.
pub fn classify(record: &Record, config: &StrataConfig) -> Classification {
    classify_with(record, config, &LADDER)
}

/// Classify one record against an explicit ladder.
///
/// Returns a new record with the stratum field always present; it is the
/// empty string when no rule matched. Any prior stratum is discarded first,
/// so classifying twice gives the same result.
pub fn classify_with(record: &Record, config: &StrataConfig, rules: &[Rule]) -> Classification {
    let fields = &config.fields;

    let raw_value = record.get(&fields.value);
    let value = raw_value.and_then(value_as_f64);
    let region = record.get(&fields.region).and_then(value_as_f64);
    let population = record
        .get(&fields.marker)
        .and_then(|m| config.marker.population(m));

    let (stratum, signal) = match population {
        None => (None, Some(SignalKind::UnknownMarker)),
        Some(population) => {
            let stratum = fold_ladder(rules, population, value, region);
            let signal = match (population, value, raw_value) {
                (Population::Land, None, None | Some(Value::Null)) => Some(SignalKind::MissingValue),
                (Population::Land, None, Some(_)) => Some(SignalKind::NonNumericValue),
                _ => None,
            };
            (stratum, signal)
        }
    };

    Classification {
        record: record.with_field(&fields.stratum, stratum.unwrap_or("")),
        signal,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
