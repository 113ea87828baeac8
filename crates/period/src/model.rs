use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One survey response row. Field names are bound by config, so the record
/// is an ordered key-value map rather than a fixed struct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    fields: Map<String, Value>,
}

/// Ordered records for one invocation, possibly spanning several periods.
pub type Batch = Vec<Record>;

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Whether the key exists at all. A key holding `null` still counts.
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Copy of this record with `field` set to `value`. The original is left untouched.
    pub fn with_field(&self, field: &str, value: impl Into<Value>) -> Self {
        let mut fields = self.fields.clone();
        fields.insert(field.to_string(), value.into());
        Self { fields }
    }

    /// Builder-style insert, for constructing records.
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    /// Stratum as a string. Absent or null reads as empty (unclassified).
    pub fn stratum(&self, field: &str) -> String {
        match self.fields.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// First of `required` that no record in `records` carries. Keys absent from
/// some records but present in others read as null. An empty batch has no
/// columns to miss.
pub fn missing_column<'f>(records: &[Record], required: &[&'f str]) -> Option<&'f str> {
    if records.is_empty() {
        return None;
    }
    required
        .iter()
        .copied()
        .find(|field| !records.iter().any(|r| r.has_field(field)))
}

/// Canonical grouping key for an opaque identifier value.
/// `1` and `"1"` are the same reference.
pub fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Numeric reading of a measure. Integers, floats and numeric strings count;
/// anything else is `None`.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Period key
// ---------------------------------------------------------------------------

/// Orderable reporting-period identifier (e.g. 201809).
///
/// Integer-valued numbers and numeric strings both become `Numeric`, so a
/// period read from a flag compares equal to one read from a record.
/// Numeric periods order before textual ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PeriodKey {
    Numeric(i64),
    Text(String),
}

impl PeriodKey {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Numeric(i)
                } else {
                    match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                            Self::Numeric(f as i64)
                        }
                        _ => Self::Text(n.to_string()),
                    }
                }
            }
            Value::String(s) => Self::parse(s),
            Value::Null => Self::Text(String::new()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        match trimmed.parse::<i64>() {
            Ok(i) => Self::Numeric(i),
            Err(_) => Self::Text(trimmed.to_string()),
        }
    }
}

impl Ord for PeriodKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Numeric(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Numeric(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for PeriodKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(i) => write!(f, "{i}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl<'de> Deserialize<'de> for PeriodKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&raw))
    }
}

impl From<i64> for PeriodKey {
    fn from(value: i64) -> Self {
        Self::Numeric(value)
    }
}

// ---------------------------------------------------------------------------
// Classification output
// ---------------------------------------------------------------------------

/// Why a record left the classifier without a stratum. Never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Land record with a null or absent value.
    MissingValue,
    /// Value present but not a number.
    NonNumericValue,
    /// Marker matches neither side of the vocabulary.
    UnknownMarker,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingValue => write!(f, "missing_value"),
            Self::NonNumericValue => write!(f, "non_numeric_value"),
            Self::UnknownMarker => write!(f, "unknown_marker"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationSignal {
    pub index: usize,
    pub reference: Value,
    pub kind: SignalKind,
}

/// Result of classifying one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub record: Record,
    pub signal: Option<SignalKind>,
}

/// Result of classifying a whole batch: same length and order as the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedBatch {
    pub records: Batch,
    pub signals: Vec<ClassificationSignal>,
}

// ---------------------------------------------------------------------------
// Reconciliation output
// ---------------------------------------------------------------------------

/// A reference whose stratum differs between the current period and an
/// earlier one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnomalyPair {
    pub reference: Value,
    pub current_stratum: String,
    pub previous_stratum: String,
    pub current_period: PeriodKey,
    pub previous_period: PeriodKey,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub records: usize,
    /// Rows whose (reference, stratum) pair occurs exactly once.
    pub candidates: usize,
    /// Rows whose stratum value actually changed.
    pub corrected: usize,
    pub anomalies: usize,
    /// Anomalous references seen on only one side of the current period.
    pub one_sided: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub corrected_batch: Batch,
    pub anomalies: Vec<AnomalyPair>,
    pub summary: ReconcileSummary,
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Caller-facing envelope: `data` is present only on success, never partially.
#[derive(Debug, Clone, Serialize)]
pub struct MethodResponse<T: Serialize> {
    pub success: bool,
    pub module: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> MethodResponse<T> {
    pub fn from_result<E: fmt::Display>(module: &str, result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                module: module.to_string(),
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                success: false,
                module: module.to_string(),
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}
