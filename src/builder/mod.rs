//! Stage two, first half: compile a validated intent into a
//! [`QueryDescriptor`].
//!
//! Building is pure: the same intent and domain always produce the same
//! descriptor. Filter values never reach the SQL text.

pub mod catalog;
pub mod descriptor;

pub use catalog::Layout;
pub use descriptor::{
    contains_pattern, CompareOp, Join, JoinKind, OrderBy, Predicate, Projection, QueryDescriptor,
    SqlValue, TableRef,
};

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::error::{ConfigError, Result};
use crate::intent::{Action, FilterKey, FilterValue, Intent};
use crate::schema::{Domain, Field, FieldType};

/// Default maximum rows returned by `list`.
pub const DEFAULT_ROW_CAP: usize = 100;

/// Compiles intents into descriptors.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    row_cap: usize,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            row_cap: DEFAULT_ROW_CAP,
        }
    }
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row_cap(mut self, row_cap: usize) -> Self {
        self.row_cap = row_cap;
        self
    }

    /// Compile `intent` against `domain`.
    pub fn build(&self, intent: &Intent, domain: &Domain) -> Result<QueryDescriptor> {
        if intent.domain() != domain.key {
            return Err(ConfigError::Invalid(format!(
                "intent for domain {} built against domain {}",
                intent.domain(),
                domain.key
            ))
            .into());
        }

        let layout = catalog::layout(&domain.key).unwrap_or(&Layout::GENERIC);
        let columns = Columns { domain, layout };

        let mut group_by = Vec::new();
        let mut order_by = Vec::new();
        let mut row_cap = None;

        let projection = match intent.action() {
            Action::Count => vec![Projection::new("COUNT(*)", "count")],
            Action::Sum => vec![Projection::new(
                format!("COALESCE(SUM({}), 0)", columns.amount()?),
                "total_sum",
            )],
            Action::Average => vec![Projection::new(
                format!("AVG({})", columns.amount()?),
                "average",
            )],
            Action::Group => {
                let group = columns.group_field()?;
                let group_column = columns.resolve(group);
                let mut projection = vec![
                    Projection::new(group_column.clone(), group.key.clone()),
                    Projection::new("COUNT(*)", "count"),
                ];
                let amount = domain.amount_field();
                if let Some(amount) = amount {
                    projection.push(Projection::new(
                        format!("COALESCE(SUM({}), 0)", columns.resolve(amount)),
                        "total_sum",
                    ));
                }
                for field in intent.fields().iter().filter_map(|k| domain.field(k)) {
                    if field.aggregatable && Some(field) != amount && field.key != group.key {
                        projection.push(Projection::new(
                            format!("COALESCE(SUM({}), 0)", columns.resolve(field)),
                            field.key.clone(),
                        ));
                    }
                }
                group_by.push(group_column.clone());
                order_by.push(OrderBy {
                    expr: group_column,
                    descending: false,
                });
                projection
            }
            Action::List => {
                order_by = layout
                    .order_by
                    .iter()
                    .filter_map(|(key, descending)| {
                        domain.field(key).map(|f| OrderBy {
                            expr: columns.resolve(f),
                            descending: *descending,
                        })
                    })
                    .collect();
                row_cap = Some(self.row_cap);
                columns.list_projection(intent)
            }
        };

        let descriptor = QueryDescriptor {
            table: TableRef {
                table: domain.table.clone(),
                alias: layout.alias.to_string(),
                joins: layout
                    .joins
                    .iter()
                    .map(|j| Join {
                        kind: j.kind,
                        source: j.source.to_string(),
                        alias: j.alias.to_string(),
                        on: j.on.to_string(),
                    })
                    .collect(),
            },
            projection,
            predicates: columns.predicates(intent),
            group_by,
            order_by,
            row_cap,
            distinct: layout.distinct && intent.action() == Action::List,
        };

        debug!(
            domain = %domain.key,
            action = %intent.action(),
            predicates = descriptor.predicates.len(),
            "Query built"
        );
        Ok(descriptor)
    }
}

/// Column resolution for one domain and layout.
struct Columns<'a> {
    domain: &'a Domain,
    layout: &'a Layout,
}

impl<'a> Columns<'a> {
    fn resolve(&self, field: &Field) -> String {
        if let Some(expr) = self.layout.column_override(&field.key) {
            return expr.to_string();
        }
        let date_source = field
            .derived_from
            .as_deref()
            .and_then(|source| self.domain.field(source))
            .filter(|source| source.field_type == FieldType::Date);
        match date_source {
            Some(source) => format!("EXTRACT(YEAR FROM {}.{})::int", self.layout.alias, source.key),
            None => format!("{}.{}", self.layout.alias, field.key),
        }
    }

    fn amount(&self) -> Result<String> {
        let field = self.domain.amount_field().ok_or_else(|| {
            ConfigError::Invalid(format!(
                "domain {} has no aggregatable amount field",
                self.domain.key
            ))
        })?;
        Ok(self.resolve(field))
    }

    /// The layout's grouping field, else the domain's first filterable
    /// categorical field. Requested fields never change the grouping key.
    fn group_field(&self) -> Result<&'a Field> {
        self.layout
            .group_by
            .and_then(|k| self.domain.field(k))
            .or_else(|| {
                self.domain.fields.iter().find(|f| {
                    f.filterable
                        && !f.aggregatable
                        && matches!(
                            f.field_type,
                            FieldType::Text | FieldType::Enum | FieldType::Integer
                        )
                })
            })
            .ok_or_else(|| {
                ConfigError::Invalid(format!("domain {} has no grouping field", self.domain.key))
                    .into()
            })
    }

    fn list_projection(&self, intent: &Intent) -> Vec<Projection> {
        let mut fields: Vec<&Field> = Vec::new();
        for key in intent.fields() {
            match self.domain.field(key) {
                Some(field) if !fields.contains(&field) => fields.push(field),
                Some(_) => {}
                None => debug!(field = %key, "Unknown projection field dropped"),
            }
        }
        if fields.is_empty() {
            fields = self
                .domain
                .default_fields
                .iter()
                .filter_map(|k| self.domain.field(k))
                .collect();
        }
        fields
            .into_iter()
            .map(|f| Projection::new(self.resolve(f), f.key.clone()))
            .collect()
    }

    fn predicates(&self, intent: &Intent) -> Vec<Predicate> {
        let mut predicates = Vec::new();
        for (key, value) in intent.filters() {
            if !self.domain.accepts_filter(key) {
                debug!(key = %key, domain = %self.domain.key, "Unknown filter dropped");
                continue;
            }

            let predicate = match FilterKey::parse(key) {
                FilterKey::Search => self.search(value),
                FilterKey::Equals(base) => self.domain.field(base).and_then(|f| self.equals(f, value)),
                FilterKey::GreaterThan(base) => self
                    .domain
                    .field(base)
                    .and_then(|f| self.compare(f, CompareOp::Gt, value)),
                FilterKey::LessThan(base) => self
                    .domain
                    .field(base)
                    .and_then(|f| self.compare(f, CompareOp::Lt, value)),
            };

            match predicate {
                Some(p) => predicates.push(p),
                None => warn!(key = %key, value = %value, "Filter value does not fit its field, dropped"),
            }
        }
        predicates
    }

    fn search(&self, value: &FilterValue) -> Option<Predicate> {
        let columns: Vec<String> = if self.layout.search.is_empty() {
            self.domain
                .fields
                .iter()
                .filter(|f| f.searchable)
                .map(|f| self.resolve(f))
                .collect()
        } else {
            self.layout
                .search
                .iter()
                .filter_map(|k| self.domain.field(k))
                .map(|f| self.resolve(f))
                .collect()
        };
        let text = value.to_string();
        if columns.is_empty() || text.trim().is_empty() {
            return None;
        }
        Some(Predicate::AnyContains {
            columns,
            value: contains_pattern(text.trim()),
        })
    }

    fn equals(&self, field: &Field, value: &FilterValue) -> Option<Predicate> {
        let column = self.resolve(field);
        if field.field_type == FieldType::Text && self.layout.matches_as_contains(&field.key) {
            return Some(Predicate::Contains {
                column,
                value: contains_pattern(&value.to_string()),
            });
        }
        self.compare(field, CompareOp::Eq, value)
    }

    fn compare(&self, field: &Field, op: CompareOp, value: &FilterValue) -> Option<Predicate> {
        let value = coerce(field, value)?;
        let cast = (field.field_type == FieldType::Date).then_some("date");
        Some(Predicate::Compare {
            column: self.resolve(field),
            op,
            value,
            cast,
        })
    }
}

/// Convert a filter value to the field's SQL type.
fn coerce(field: &Field, value: &FilterValue) -> Option<SqlValue> {
    match field.field_type {
        FieldType::Text | FieldType::Enum => Some(SqlValue::Text(value.to_string())),
        FieldType::Integer => value.as_i64().map(SqlValue::Integer),
        FieldType::Currency | FieldType::Percentage => match value {
            FilterValue::Integer(i) => Some(SqlValue::Integer(*i)),
            _ => value.as_f64().filter(|n| n.is_finite()).map(|n| {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    SqlValue::Integer(n as i64)
                } else {
                    SqlValue::Decimal(n)
                }
            }),
        },
        FieldType::Date => match value {
            FilterValue::Integer(year) if (1900..=2100).contains(year) => {
                Some(SqlValue::Text(format!("{}-01-01", year)))
            }
            FilterValue::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .map(|d| SqlValue::Text(d.format("%Y-%m-%d").to_string())),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;
    use crate::intent::IntentSource;
    use crate::schema::SchemaRegistry;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::municipal().unwrap()
    }

    fn build(intent: &Intent) -> QueryDescriptor {
        let schema = schema();
        let domain = schema.domain(intent.domain()).unwrap();
        QueryBuilder::new().build(intent, domain).unwrap()
    }

    fn intent(domain: &str, action: Action) -> Intent {
        Intent::new(domain, action, IntentSource::Caller).with_confidence(1.0)
    }

    #[test]
    fn test_sum_of_budget() {
        let (sql, params) = build(&intent("tabarim", Action::Sum)).to_sql();
        assert_eq!(
            sql,
            "SELECT COALESCE(SUM(t.total_authorized), 0) AS total_sum FROM tabarim AS t"
        );
        assert!(params.is_empty());
    }

    #[test]
    fn test_count_with_status() {
        let (sql, params) =
            build(&intent("tabarim", Action::Count).with_filter("status", "פעיל")).to_sql();
        assert_eq!(sql, "SELECT COUNT(*) AS count FROM tabarim AS t WHERE t.status = $1");
        assert_eq!(params, vec![SqlValue::Text("פעיל".to_string())]);
    }

    #[test]
    fn test_list_uses_default_fields_order_and_cap() {
        let (sql, params) = build(
            &intent("transactions", Action::List).with_filter("amount_gt", FilterValue::Integer(10000)),
        )
        .to_sql();
        assert_eq!(
            sql,
            "SELECT tr.transaction_date AS transaction_date, tr.tabar_number AS tabar_number, \
             tr.supplier AS supplier, tr.description AS description, tr.amount AS amount, \
             tr.status AS status FROM transactions AS tr WHERE tr.amount > $1 \
             ORDER BY tr.transaction_date DESC LIMIT 100"
        );
        assert_eq!(params, vec![SqlValue::Integer(10000)]);
    }

    #[test]
    fn test_requested_fields_filtered_to_known() {
        let descriptor = build(&intent("tabarim", Action::List).with_fields(vec![
            "name".to_string(),
            "color".to_string(),
            "utilization".to_string(),
        ]));
        let aliases: Vec<_> = descriptor.projection.iter().map(|p| p.alias.as_str()).collect();
        assert_eq!(aliases, vec!["name", "utilization"]);
        assert!(descriptor.projection[1].expr.contains("NULLIF(t.total_authorized, 0)"));
    }

    #[test]
    fn test_derived_year_columns() {
        let (sql, _) = build(
            &intent("transactions", Action::Count).with_filter("year", FilterValue::Integer(2024)),
        )
        .to_sql();
        assert!(sql.ends_with("WHERE EXTRACT(YEAR FROM tr.transaction_date)::int = $1"));

        let (sql, _) = build(
            &intent("budget_items", Action::Count).with_filter("year", FilterValue::Integer(2024)),
        )
        .to_sql();
        assert!(sql.ends_with("WHERE b.fiscal_year = $1"));
    }

    #[test]
    fn test_department_matches_as_substring() {
        let (sql, params) =
            build(&intent("tabarim", Action::Count).with_filter("department", "חינוך")).to_sql();
        assert!(sql.ends_with("WHERE t.department ILIKE $1"));
        assert_eq!(params, vec![SqlValue::Text("%חינוך%".to_string())]);
    }

    #[test]
    fn test_search_reuses_one_parameter() {
        let (sql, params) =
            build(&intent("comprehensive", Action::List).with_filter("search", "xyz123")).to_sql();
        assert!(sql.contains(
            "WHERE (t.tabar_number ILIKE $1 OR t.name ILIKE $1 OR t.department ILIKE $1 \
             OR tx.suppliers ILIKE $1 OR pm.ministries ILIKE $1)"
        ));
        assert!(sql.contains("LEFT JOIN (SELECT tabar_number, SUM(amount) AS transactions_total"));
        assert_eq!(params, vec![SqlValue::Text("%xyz123%".to_string())]);
    }

    #[test]
    fn test_values_never_in_sql_text() {
        let hostile = "'; DROP TABLE tabarim; --";
        let (sql, params) = build(
            &intent("tabarim", Action::List)
                .with_filter("search", hostile)
                .with_filter("tabar_number", hostile),
        )
        .to_sql();
        assert!(!sql.contains("DROP"));
        assert_eq!(params.len(), 2);
        assert!(params.iter().all(|p| p.to_string().contains("DROP")));
    }

    #[test]
    fn test_date_comparison_is_cast() {
        let (sql, params) = build(
            &intent("permissions", Action::List).with_filter("valid_until_lt", "2025-06-30"),
        )
        .to_sql();
        assert!(sql.contains("WHERE p.valid_until < $1::date"));
        assert_eq!(params, vec![SqlValue::Text("2025-06-30".to_string())]);
    }

    #[test]
    fn test_uncoercible_and_unknown_filters_dropped() {
        let descriptor = build(
            &intent("tabarim", Action::Count)
                .with_filter("year", "שנה שעברה")
                .with_filter("start_date_gt", "yesterday")
                .with_filter("color", "red"),
        );
        assert!(descriptor.predicates.is_empty());
    }

    #[test]
    fn test_group_projection() {
        let (sql, _) = build(&intent("tabarim", Action::Group)).to_sql();
        assert_eq!(
            sql,
            "SELECT t.department AS department, COUNT(*) AS count, \
             COALESCE(SUM(t.total_authorized), 0) AS total_sum FROM tabarim AS t \
             GROUP BY t.department ORDER BY t.department ASC"
        );

    }

    #[test]
    fn test_group_key_ignores_requested_fields() {
        let descriptor = build(
            &intent("tabarim", Action::Group)
                .with_fields(vec!["status".to_string(), "total_authorized".to_string()]),
        );
        assert_eq!(descriptor.group_by, vec!["t.department".to_string()]);
        assert_eq!(descriptor.projection[0].alias, "department");
        assert!(descriptor.projection.iter().all(|p| p.alias != "status"));

        let descriptor =
            build(&intent("transactions", Action::Group).with_fields(vec!["status".to_string()]));
        assert_eq!(descriptor.group_by, vec!["tr.supplier".to_string()]);
    }

    #[test]
    fn test_build_is_deterministic() {
        let intent = intent("transactions", Action::List)
            .with_filter("status", "שולם")
            .with_filter("amount_lt", FilterValue::Decimal(2500.5))
            .with_filter("search", "בטון");
        assert_eq!(build(&intent).to_sql(), build(&intent).to_sql());
    }

    #[test]
    fn test_average_without_amount_field_is_configuration_error() {
        let schema = SchemaRegistry::from_json(
            r#"{"domains": [{
                "key": "notes", "label": "N", "table": "notes", "primaryKey": "id", "fallback": true,
                "fields": [{"key": "title", "label": "T", "type": "text", "filterable": true}],
                "defaultFields": ["title"]
            }]}"#,
        )
        .unwrap();
        let domain = schema.domain("notes").unwrap();
        let err = QueryBuilder::new()
            .build(&intent("notes", Action::Average), domain)
            .unwrap_err();
        assert!(matches!(err, ReportError::Configuration(_)));

        let (sql, _) = QueryBuilder::new()
            .build(&intent("notes", Action::List), domain)
            .unwrap()
            .to_sql();
        assert_eq!(sql, "SELECT t.title AS title FROM notes AS t LIMIT 100");
    }
}
