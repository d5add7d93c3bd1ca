//! crates/fee_tracker_core/src/normalize.rs
//!
//! Turns loosely-typed spreadsheet rows into fixed-shape candidate records.
//! No row is dropped and nothing is validated here. Only the enrollment number
//! and the semester are coerced; name and branch must already be text.

use serde_json::{Map, Value};

use crate::domain::CandidateRecord;

/// One spreadsheet row as received: column label to cell value.
pub type UploadRow = Value;

const ENROLLMENT_LABELS: &[&str] = &["enrollmentnumber", "enrollmentno", "enrollment"];
const NAME_LABELS: &[&str] = &["name", "studentname"];
const BRANCH_LABELS: &[&str] = &["branch"];
const SEMESTER_LABELS: &[&str] = &["semester", "sem"];

/// Normalizes every row, preserving length and order.
pub fn normalize_rows(rows: &[UploadRow]) -> Vec<CandidateRecord> {
    rows.iter().map(normalize_row).collect()
}

pub fn normalize_row(row: &UploadRow) -> CandidateRecord {
    let Some(cells) = row.as_object() else {
        return CandidateRecord::default();
    };

    CandidateRecord {
        enrollment_number: find_cell(cells, ENROLLMENT_LABELS)
            .map(cell_to_text)
            .unwrap_or_default(),
        name: find_cell(cells, NAME_LABELS).and_then(text_cell),
        branch: find_cell(cells, BRANCH_LABELS).and_then(text_cell),
        semester: find_cell(cells, SEMESTER_LABELS).and_then(cell_to_integer),
    }
}

/// Lowercases a column label and drops everything that is not alphanumeric.
fn fold_label(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn find_cell<'a>(cells: &'a Map<String, Value>, labels: &[&str]) -> Option<&'a Value> {
    // Labels are tried in priority order.
    for label in labels {
        if let Some(value) = cells
            .iter()
            .find(|(key, _)| fold_label(key) == *label)
            .map(|(_, value)| value)
        {
            return Some(value);
        }
    }
    None
}

fn text_cell(cell: &Value) -> Option<String> {
    cell.as_str().map(str::to_string)
}

fn cell_to_text(cell: &Value) -> String {
    match cell {
        Value::String(text) => text.clone(),
        Value::Number(number) => {
            if let Some(integer) = number.as_i64() {
                integer.to_string()
            } else if let Some(integer) = number.as_u64() {
                integer.to_string()
            } else {
                match number.as_f64() {
                    Some(float) if float.fract() == 0.0 && float.abs() < 1e15 => {
                        format!("{float:.0}")
                    }
                    _ => number.to_string(),
                }
            }
        }
        Value::Bool(flag) => flag.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn cell_to_integer(cell: &Value) -> Option<i64> {
    match cell {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && float.abs() < 1e15)
                .map(|float| float as i64)
        }),
        Value::String(text) => {
            let trimmed = text.trim();
            trimmed.parse::<i64>().ok().or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|float| float.fract() == 0.0 && float.abs() < 1e15)
                    .map(|float| float as i64)
            })
        }
        _ => None,
    }
}
