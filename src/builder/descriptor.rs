//! Query descriptors and their SQL rendering.
//!
//! A descriptor keeps every predicate value out of the SQL text; rendering
//! produces `$1..$n` placeholders plus the ordered parameter list.

use std::fmt;

use serde::Serialize;

// ============================================================================
// Values
// ============================================================================

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{}", i),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::Text(s) => write!(f, "'{}'", s),
        }
    }
}

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Gt,
    Lt,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Lt => "<",
        }
    }
}

/// A single WHERE condition. Conditions are AND-combined in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Predicate {
    /// `column <op> $n`, with an optional parameter cast
    Compare {
        column: String,
        op: CompareOp,
        value: SqlValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        cast: Option<&'static str>,
    },
    /// `column ILIKE $n`; the value already carries `%` wildcards
    Contains { column: String, value: SqlValue },
    /// `(a ILIKE $n OR b ILIKE $n ...)`
    AnyContains { columns: Vec<String>, value: SqlValue },
}

impl Predicate {
    pub fn value(&self) -> &SqlValue {
        match self {
            Self::Compare { value, .. } | Self::Contains { value, .. } | Self::AnyContains { value, .. } => {
                value
            }
        }
    }

    fn render(&self, placeholder: &str) -> String {
        match self {
            Self::Compare {
                column, op, cast, ..
            } => match cast {
                Some(cast) => format!("{} {} {}::{}", column, op.as_sql(), placeholder, cast),
                None => format!("{} {} {}", column, op.as_sql(), placeholder),
            },
            Self::Contains { column, .. } => format!("{} ILIKE {}", column, placeholder),
            Self::AnyContains { columns, .. } => {
                let parts: Vec<String> = columns
                    .iter()
                    .map(|c| format!("{} ILIKE {}", c, placeholder))
                    .collect();
                format!("({})", parts.join(" OR "))
            }
        }
    }
}

/// Wrap a value for a substring match, escaping LIKE metacharacters.
pub fn contains_pattern(value: &str) -> SqlValue {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('%');
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    SqlValue::Text(escaped)
}

// ============================================================================
// Relations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// A join against a table or a sub-select.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Join {
    pub kind: JoinKind,
    pub source: String,
    pub alias: String,
    pub on: String,
}

/// Base table with its alias and joins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRef {
    pub table: String,
    pub alias: String,
    pub joins: Vec<Join>,
}

/// One projected expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection {
    pub expr: String,
    pub alias: String,
}

impl Projection {
    pub fn new(expr: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub expr: String,
    pub descending: bool,
}

// ============================================================================
// Descriptor
// ============================================================================

/// A compiled, parameterised query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDescriptor {
    pub table: TableRef,
    pub projection: Vec<Projection>,
    pub predicates: Vec<Predicate>,
    pub group_by: Vec<String>,
    pub order_by: Vec<OrderBy>,
    pub row_cap: Option<usize>,
    pub distinct: bool,
}

impl QueryDescriptor {
    /// Bound parameters in placeholder order.
    pub fn params(&self) -> Vec<SqlValue> {
        self.predicates.iter().map(|p| p.value().clone()).collect()
    }

    /// Render SQL text and its parameters.
    pub fn to_sql(&self) -> (String, Vec<SqlValue>) {
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }

        let columns: Vec<String> = self
            .projection
            .iter()
            .map(|p| format!("{} AS {}", p.expr, p.alias))
            .collect();
        sql.push_str(&columns.join(", "));

        sql.push_str(&format!(" FROM {} AS {}", self.table.table, self.table.alias));
        for join in &self.table.joins {
            sql.push_str(&format!(
                " {} {} AS {} ON {}",
                join.kind.as_sql(),
                join.source,
                join.alias,
                join.on
            ));
        }

        if !self.predicates.is_empty() {
            let conditions: Vec<String> = self
                .predicates
                .iter()
                .enumerate()
                .map(|(i, p)| p.render(&format!("${}", i + 1)))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if !self.group_by.is_empty() {
            sql.push_str(" GROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if !self.order_by.is_empty() {
            let order: Vec<String> = self
                .order_by
                .iter()
                .map(|o| {
                    if o.descending {
                        format!("{} DESC", o.expr)
                    } else {
                        format!("{} ASC", o.expr)
                    }
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        if let Some(cap) = self.row_cap {
            sql.push_str(&format!(" LIMIT {}", cap));
        }

        (sql, self.params())
    }
}
