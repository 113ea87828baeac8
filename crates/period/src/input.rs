//! Batch loading and writing: JSON arrays of objects and headed CSV.

use serde_json::{Map, Number, Value};

use crate::error::StrataError;
use crate::model::{Batch, Record};

/// Parse a JSON array of objects into a batch.
pub fn load_json_batch(data: &str) -> Result<Batch, StrataError> {
    let value: Value =
        serde_json::from_str(data).map_err(|e| StrataError::Input(format!("invalid JSON: {e}")))?;

    let Value::Array(items) = value else {
        return Err(StrataError::Input("expected a JSON array of records".into()));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(Record::from_map(map)),
            other => Err(StrataError::Input(format!(
                "record {i}: expected an object, found {}",
                type_name(&other)
            ))),
        })
        .collect()
}

/// Parse headed CSV into a batch.
///
/// Empty cells become `null`. Integer and decimal cells become numbers,
/// except integers with a leading zero (`"076"`), which stay text.
pub fn load_csv_batch(data: &str) -> Result<Batch, StrataError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(data.as_bytes());

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| StrataError::Input(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut batch = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row.map_err(|e| StrataError::Input(format!("row {i}: {e}")))?;
        let mut fields = Map::new();
        for (h, cell) in headers.iter().zip(row.iter()) {
            fields.insert(h.clone(), csv_cell(cell));
        }
        batch.push(Record::from_map(fields));
    }
    Ok(batch)
}

fn csv_cell(cell: &str) -> Value {
    let cell = cell.trim();
    if cell.is_empty() {
        return Value::Null;
    }

    let digits = cell.strip_prefix('-').unwrap_or(cell);
    let leading_zero = digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.");
    if leading_zero {
        return Value::String(cell.to_string());
    }

    if let Ok(i) = cell.parse::<i64>() {
        return Value::Number(i.into());
    }
    if cell.contains('.') {
        if let Some(n) = cell.parse::<f64>().ok().and_then(Number::from_f64) {
            return Value::Number(n);
        }
    }
    Value::String(cell.to_string())
}

pub fn batch_to_json(batch: &[Record]) -> Result<String, StrataError> {
    serde_json::to_string_pretty(batch).map_err(|e| StrataError::Input(e.to_string()))
}

/// Write a batch as headed CSV. Columns are the union of all record keys in
/// first-seen order; missing and null cells are empty.
pub fn batch_to_csv(batch: &[Record]) -> Result<String, StrataError> {
    let mut headers: Vec<&str> = Vec::new();
    for record in batch {
        for key in record.fields().keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&headers)
        .map_err(|e| StrataError::Io(e.to_string()))?;
    for record in batch {
        let row: Vec<String> = headers
            .iter()
            .map(|h| match record.get(h) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer
            .write_record(&row)
            .map_err(|e| StrataError::Io(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| StrataError::Io(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| StrataError::Io(e.to_string()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
