//! Fixed table layouts for the built-in domains.
//!
//! Each layout names the base alias, the joins, column expressions that do
//! not follow the `alias.key` convention, and the grouping and ordering used
//! for `group` and `list`. Joins against child tables go through
//! pre-aggregated sub-selects so every joined row stays one-to-one with the
//! base row.

use super::descriptor::JoinKind;

/// A static join definition.
#[derive(Debug, Clone, Copy)]
pub struct JoinSpec {
    pub kind: JoinKind,
    pub source: &'static str,
    pub alias: &'static str,
    pub on: &'static str,
}

/// Physical layout of one domain.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub alias: &'static str,
    pub joins: &'static [JoinSpec],
    /// Field key to SQL expression.
    pub columns: &'static [(&'static str, &'static str)],
    /// Equality filters on these fields match as substrings.
    pub contains: &'static [&'static str],
    /// Fields searched by the `search` filter; empty means the domain's
    /// searchable fields.
    pub search: &'static [&'static str],
    /// Field used by the `group` action.
    pub group_by: Option<&'static str>,
    /// `list` ordering: (field key, descending).
    pub order_by: &'static [(&'static str, bool)],
    pub distinct: bool,
}

impl Layout {
    /// Layout for domains without a catalogue entry.
    pub const GENERIC: Layout = Layout {
        alias: "t",
        joins: &[],
        columns: &[],
        contains: &[],
        search: &[],
        group_by: None,
        order_by: &[],
        distinct: false,
    };

    pub fn column_override(&self, key: &str) -> Option<&'static str> {
        self.columns
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, expr)| *expr)
    }

    pub fn matches_as_contains(&self, key: &str) -> bool {
        self.contains.iter().any(|k| *k == key)
    }
}

const TABARIM: Layout = Layout {
    alias: "t",
    joins: &[],
    columns: &[(
        "utilization",
        "ROUND(100.0 * t.total_spent / NULLIF(t.total_authorized, 0), 1)",
    )],
    contains: &["name", "department", "ministry"],
    search: &[],
    group_by: Some("department"),
    order_by: &[("tabar_number", false)],
    distinct: false,
};

const TRANSACTIONS: Layout = Layout {
    alias: "tr",
    joins: &[],
    columns: &[],
    contains: &["supplier", "description", "department"],
    search: &["supplier", "description", "order_number", "tabar_number"],
    group_by: Some("supplier"),
    order_by: &[("transaction_date", true)],
    distinct: false,
};

const BUDGET_ITEMS: Layout = Layout {
    alias: "b",
    joins: &[],
    columns: &[("year", "b.fiscal_year")],
    contains: &["name", "department"],
    search: &[],
    group_by: Some("tabar_number"),
    order_by: &[("tabar_number", false), ("item_code", false)],
    distinct: false,
};

const PERMISSIONS: Layout = Layout {
    alias: "p",
    joins: &[],
    columns: &[],
    contains: &["ministry"],
    search: &[],
    group_by: Some("ministry"),
    order_by: &[("valid_until", false)],
    distinct: false,
};

const COMPREHENSIVE: Layout = Layout {
    alias: "t",
    joins: &[
        JoinSpec {
            kind: JoinKind::Left,
            source: "(SELECT tabar_number, SUM(amount) AS transactions_total, \
                     STRING_AGG(DISTINCT supplier, ', ') AS suppliers \
                     FROM transactions GROUP BY tabar_number)",
            alias: "tx",
            on: "tx.tabar_number = t.tabar_number",
        },
        JoinSpec {
            kind: JoinKind::Left,
            source: "(SELECT tabar_number, COUNT(*) AS items_count \
                     FROM budget_items GROUP BY tabar_number)",
            alias: "bi",
            on: "bi.tabar_number = t.tabar_number",
        },
        JoinSpec {
            kind: JoinKind::Left,
            source: "(SELECT tabar_number, STRING_AGG(DISTINCT ministry, ', ') AS ministries \
                     FROM permissions GROUP BY tabar_number)",
            alias: "pm",
            on: "pm.tabar_number = t.tabar_number",
        },
    ],
    columns: &[
        ("transactions_total", "COALESCE(tx.transactions_total, 0)"),
        ("suppliers", "tx.suppliers"),
        ("budget_items_count", "COALESCE(bi.items_count, 0)"),
        ("ministries", "pm.ministries"),
    ],
    contains: &["name", "department", "suppliers", "ministries"],
    search: &["tabar_number", "name", "department", "suppliers", "ministries"],
    group_by: Some("department"),
    order_by: &[("tabar_number", false)],
    distinct: false,
};

const LAYOUTS: &[(&str, Layout)] = &[
    ("tabarim", TABARIM),
    ("transactions", TRANSACTIONS),
    ("budget_items", BUDGET_ITEMS),
    ("permissions", PERMISSIONS),
    ("comprehensive", COMPREHENSIVE),
];

/// Catalogue entry for a domain.
pub fn layout(domain_key: &str) -> Option<&'static Layout> {
    LAYOUTS
        .iter()
        .find(|(key, _)| *key == domain_key)
        .map(|(_, layout)| layout)
}
