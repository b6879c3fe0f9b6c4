//! Types for the structured query intent.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved filter key for free-text matching across searchable columns.
pub const SEARCH_KEY: &str = "search";

// ============================================================================
// Action
// ============================================================================

/// Shape of the requested report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    List,
    Count,
    Sum,
    Average,
    Group,
}

impl Action {
    /// Every action, in declaration order.
    pub const ALL: [Action; 5] = [
        Action::List,
        Action::Count,
        Action::Sum,
        Action::Average,
        Action::Group,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Average => "average",
            Self::Group => "group",
        }
    }

    /// Actions that collapse the result to a single synthetic value.
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Self::Count | Self::Sum | Self::Average)
    }

    /// Hebrew display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::List => "רשימה",
            Self::Count => "ספירה",
            Self::Sum => "סכום",
            Self::Average => "ממוצע",
            Self::Group => "קיבוץ",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

// ============================================================================
// Intent Source
// ============================================================================

/// Which strategy produced an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentSource {
    /// Model-assisted parse
    Model,
    /// Deterministic rule-based parse
    Rules,
    /// Guaranteed generic fallback
    Fallback,
    /// Structured request supplied by the caller
    Caller,
}

impl IntentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Rules => "rules",
            Self::Fallback => "fallback",
            Self::Caller => "caller",
        }
    }
}

// ============================================================================
// Filters
// ============================================================================

/// Scalar filter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl FilterValue {
    /// Numeric value, parsing text when it looks like a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Decimal(d) => Some(*d),
            Self::Text(s) => s.trim().replace(',', "").parse().ok(),
        }
    }

    /// Integer value, accepting whole decimals and numeric text.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Decimal(d) if d.fract() == 0.0 => Some(*d as i64),
            Self::Decimal(_) => None,
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Build the tightest numeric representation of `n`.
    pub fn number(n: f64) -> Self {
        if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
            Self::Integer(n as i64)
        } else {
            Self::Decimal(n)
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FilterValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for FilterValue {
    fn from(d: f64) -> Self {
        Self::Decimal(d)
    }
}

/// Filters keyed by field (ordered for deterministic iteration).
pub type Filters = BTreeMap<String, FilterValue>;

/// Parsed form of a filter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKey<'a> {
    /// The reserved free-text key
    Search,
    /// `<field>`
    Equals(&'a str),
    /// `<field>_gt`
    GreaterThan(&'a str),
    /// `<field>_lt`
    LessThan(&'a str),
}

impl<'a> FilterKey<'a> {
    pub fn parse(key: &'a str) -> Self {
        if key == SEARCH_KEY {
            return Self::Search;
        }
        match key.strip_suffix("_gt") {
            Some(base) if !base.is_empty() => return Self::GreaterThan(base),
            _ => {}
        }
        match key.strip_suffix("_lt") {
            Some(base) if !base.is_empty() => Self::LessThan(base),
            _ => Self::Equals(key),
        }
    }

    /// Field the key refers to, if any.
    pub fn base(&self) -> Option<&'a str> {
        match self {
            Self::Search => None,
            Self::Equals(b) | Self::GreaterThan(b) | Self::LessThan(b) => Some(b),
        }
    }
}

// ============================================================================
// Intent
// ============================================================================

/// Structured, schema-constrained interpretation of a question.
///
/// Built once through the `with_*` chain and then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    domain: String,
    action: Action,
    #[serde(default)]
    filters: Filters,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<String>,
    confidence: f64,
    #[serde(default)]
    explanation: String,
    source: IntentSource,
    timestamp: DateTime<Utc>,
}

impl Intent {
    pub fn new(domain: impl Into<String>, action: Action, source: IntentSource) -> Self {
        Self {
            domain: domain.into(),
            action,
            filters: Filters::new(),
            fields: Vec::new(),
            confidence: 0.0,
            explanation: String::new(),
            source,
            timestamp: Utc::now(),
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn filter(&self, key: &str) -> Option<&FilterValue> {
        self.filters.get(key)
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    pub fn source(&self) -> IntentSource {
        self.source
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
