//! Result shaping: raw rows to typed columns, a Hebrew summary and
//! execution metadata.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::builder::DEFAULT_ROW_CAP;
use crate::executor::Record;
use crate::intent::{Action, Intent, IntentSource};
use crate::schema::{Domain, FieldType};

/// Message for an empty list or group result.
pub const NO_RESULTS_MESSAGE: &str = "לא נמצאו תוצאות";

static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}(?:[T ]\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+-]\d{2}:?\d{2})?)?$")
        .expect("Invalid regex")
});

// ============================================================================
// Result Types
// ============================================================================

/// Display type of a result column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Decimal,
    Currency,
    Percentage,
    Date,
    Enum,
    Text,
    Boolean,
}

impl From<FieldType> for ColumnType {
    fn from(field_type: FieldType) -> Self {
        match field_type {
            FieldType::Integer => Self::Integer,
            FieldType::Text => Self::Text,
            FieldType::Currency => Self::Currency,
            FieldType::Date => Self::Date,
            FieldType::Enum => Self::Enum,
            FieldType::Percentage => Self::Percentage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_rows: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub executed_at: DateTime<Utc>,
    pub query_source: IntentSource,
    pub confidence: f64,
    pub domain: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// The answer to a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Record>,
    pub summary: Summary,
    pub metadata: ResultMetadata,
}

impl QueryResult {
    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.metadata.warnings.extend(warnings);
        self
    }
}

// ============================================================================
// Formatter
// ============================================================================

/// Shapes executor rows for display.
#[derive(Debug, Clone, Copy)]
pub struct ResultFormatter {
    row_cap: usize,
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self {
            row_cap: DEFAULT_ROW_CAP,
        }
    }
}

impl ResultFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Row cap the query was built with; a full page is reported as such.
    pub fn with_row_cap(mut self, row_cap: usize) -> Self {
        self.row_cap = row_cap;
        self
    }

    pub fn format(&self, rows: Vec<Record>, intent: &Intent, domain: &Domain) -> QueryResult {
        let (columns, rows, message) = match intent.action() {
            Action::Count | Action::Sum | Action::Average => self.aggregate(rows, intent, domain),
            Action::List | Action::Group if rows.is_empty() => {
                (Vec::new(), Vec::new(), NO_RESULTS_MESSAGE.to_string())
            }
            Action::List => {
                let message = if rows.len() == 1 {
                    "נמצאה תוצאה אחת".to_string()
                } else if rows.len() >= self.row_cap {
                    format!("מוצגות {} התוצאות הראשונות", rows.len())
                } else {
                    format!("נמצאו {} תוצאות", rows.len())
                };
                (tabular_columns(&rows, domain), rows, message)
            }
            Action::Group => {
                let message = format!("נמצאו {} קבוצות", rows.len());
                (tabular_columns(&rows, domain), rows, message)
            }
        };

        QueryResult {
            columns,
            summary: Summary {
                total_rows: rows.len(),
                message,
            },
            rows,
            metadata: ResultMetadata {
                executed_at: Utc::now(),
                query_source: intent.source(),
                confidence: intent.confidence(),
                domain: domain.key.clone(),
                action: intent.action(),
                warnings: Vec::new(),
            },
        }
    }

    /// Aggregates always produce exactly one row with one column.
    fn aggregate(
        &self,
        rows: Vec<Record>,
        intent: &Intent,
        domain: &Domain,
    ) -> (Vec<Column>, Vec<Record>, String) {
        let first = rows.into_iter().next().unwrap_or_default();
        let amount = domain.amount_field();
        let amount_label = amount.map_or("סכום", |f| f.label.as_str());
        let amount_type = amount.map_or(ColumnType::Currency, |f| f.field_type.into());

        let (key, label, column_type, value, message) = match intent.action() {
            Action::Count => {
                let count = first.get("count").and_then(number).unwrap_or(0.0) as i64;
                (
                    "count",
                    "מספר רשומות".to_string(),
                    ColumnType::Integer,
                    json!(count),
                    format!("נמצאו {} רשומות ב{}", count, domain.label),
                )
            }
            Action::Sum => {
                let total = first.get("total_sum").and_then(number).unwrap_or(0.0);
                (
                    "total_sum",
                    format!("סה״כ {}", amount_label),
                    amount_type,
                    number_value(total),
                    format!("סה״כ {}: {}", amount_label, format_number(total)),
                )
            }
            _ => match first.get("average").and_then(number) {
                Some(average) => (
                    "average",
                    format!("ממוצע {}", amount_label),
                    amount_type,
                    number_value(round2(average)),
                    format!("ממוצע {}: {}", amount_label, format_number(average)),
                ),
                None => (
                    "average",
                    format!("ממוצע {}", amount_label),
                    amount_type,
                    Value::Null,
                    "אין נתונים לחישוב ממוצע".to_string(),
                ),
            },
        };

        let mut row = Record::new();
        row.insert(key.to_string(), value);
        let column = Column {
            key: key.to_string(),
            label,
            column_type,
        };
        (vec![column], vec![row], message)
    }
}

/// Columns in the key order of the first row.
fn tabular_columns(rows: &[Record], domain: &Domain) -> Vec<Column> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };

    first
        .keys()
        .map(|key| {
            if let Some(field) = domain.field(key) {
                return Column {
                    key: key.clone(),
                    label: field.label.clone(),
                    column_type: field.field_type.into(),
                };
            }
            let (label, column_type) = match key.as_str() {
                "count" => ("מספר רשומות".to_string(), ColumnType::Integer),
                "total_sum" => ("סה״כ".to_string(), ColumnType::Currency),
                "average" => ("ממוצע".to_string(), ColumnType::Currency),
                _ => {
                    let sample = rows.iter().filter_map(|r| r.get(key)).find(|v| !v.is_null());
                    (key.clone(), sample.map_or(ColumnType::Text, infer_type))
                }
            };
            Column {
                key: key.clone(),
                label,
                column_type,
            }
        })
        .collect()
}

/// Infer a display type from a JSON value.
pub fn infer_type(value: &Value) -> ColumnType {
    match value {
        Value::Bool(_) => ColumnType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => ColumnType::Integer,
        Value::Number(n) if n.as_f64().is_some_and(|f| f.fract() == 0.0) => ColumnType::Integer,
        Value::Number(_) => ColumnType::Decimal,
        Value::String(s) if ISO_DATE.is_match(s) => ColumnType::Date,
        _ => ColumnType::Text,
    }
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `1234567.5` → `1,234,567.50`
pub fn format_number(value: f64) -> String {
    let negative = value < 0.0;
    let rounded = round2(value.abs());
    let whole = rounded.trunc() as u64;
    let cents = ((rounded - rounded.trunc()) * 100.0).round() as u64;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    if cents == 0 {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{:02}", sign, grouped, cents)
    }
}
