//! Schema types describing the queryable domains.

use serde::{Deserialize, Serialize};

use crate::intent::FilterKey;

// ============================================================================
// Field
// ============================================================================

/// Declared type of a domain field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Text,
    Currency,
    Date,
    Enum,
    Percentage,
}

impl FieldType {
    /// Numeric types support `_gt` / `_lt` comparisons and aggregation.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Currency | Self::Percentage)
    }

    /// Types that accept ordered comparisons.
    pub fn is_ordered(&self) -> bool {
        self.is_numeric() || matches!(self, Self::Date)
    }
}

/// A single field of a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// `"<domain>.<field>"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    #[serde(default)]
    pub filterable: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub aggregatable: bool,
    /// Source field for derived columns (e.g. the year of a date).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_from: Option<String>,
}

impl Field {
    /// Whether `value` is one of the declared enum values.
    pub fn allows_value(&self, value: &str) -> bool {
        match &self.enum_values {
            Some(values) => values.iter().any(|v| v == value),
            None => true,
        }
    }
}

// ============================================================================
// Domain
// ============================================================================

/// Keyword lists used for domain scoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Keywords {
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default)]
    pub secondary: Vec<String>,
}

/// A named query target mapping to one base table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub table: String,
    pub primary_key: String,
    pub fields: Vec<Field>,
    pub default_fields: Vec<String>,
    #[serde(default)]
    pub keywords: Keywords,
    /// Marks the generic domain used when nothing else matches.
    #[serde(default)]
    pub fallback: bool,
}

impl Domain {
    /// Look up a field by key.
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// The field `sum`/`average` aggregate over and amount comparisons target:
    /// the first aggregatable currency field, else the first aggregatable
    /// numeric field.
    pub fn amount_field(&self) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.aggregatable && f.field_type == FieldType::Currency)
            .or_else(|| {
                self.fields
                    .iter()
                    .find(|f| f.aggregatable && f.field_type.is_numeric())
            })
    }

    /// Whether a filter key is meaningful for this domain.
    ///
    /// Accepts the reserved `search` key, filterable fields, and `_gt`/`_lt`
    /// comparisons on filterable ordered fields.
    pub fn accepts_filter(&self, key: &str) -> bool {
        match FilterKey::parse(key) {
            FilterKey::Search => true,
            FilterKey::Equals(base) => self.field(base).is_some_and(|f| f.filterable),
            FilterKey::GreaterThan(base) | FilterKey::LessThan(base) => self
                .field(base)
                .is_some_and(|f| f.filterable && f.field_type.is_ordered()),
        }
    }

    /// Fields available for projection, in declaration order.
    pub fn field_keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.key.as_str())
    }
}
