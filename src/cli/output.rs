//! Output formatting for CLI commands.
//!
//! Everything prints either as pretty JSON or as human-readable text.

use budget_query::{
    api::DomainsResponse,
    builder::SqlValue,
    formatter::{format_number, Column, ColumnType, QueryResult},
    Intent, ReportOutcome,
};
use serde::Serialize;
use serde_json::{json, Value};

/// Widest cell before truncation.
const MAX_CELL_WIDTH: usize = 40;

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

/// Print a report outcome.
pub fn print_outcome(outcome: &ReportOutcome, json: bool) {
    if json {
        print_json(outcome);
        return;
    }

    match outcome {
        ReportOutcome::Completed(result) => print_result(result),
        ReportOutcome::NeedsConfirmation { intent, message } => {
            println!("{}", message);
            println!();
            print_intent(intent, false);
            println!();
            println!("Run again with --yes to execute this interpretation.");
        }
        ReportOutcome::Declined => println!("הפענוח נדחה והשאילתה לא הורצה"),
    }
}

fn print_result(result: &QueryResult) {
    println!("{}", result.summary.message);
    for warning in &result.metadata.warnings {
        eprintln!("warning: {}", warning);
    }
    if result.columns.is_empty() {
        return;
    }
    println!();

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(|c| cell(c, row.get(&c.key).unwrap_or(&Value::Null)))
                .collect()
        })
        .collect();

    let widths: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| width(&r[i]))
                .chain(std::iter::once(width(&c.label)))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let header: Vec<String> = result
        .columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| pad(&c.label, *w))
        .collect();
    println!("{}", header.join("  "));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));

    for row in &cells {
        let line: Vec<String> = row.iter().zip(&widths).map(|(v, w)| pad(v, *w)).collect();
        println!("{}", line.join("  "));
    }

    println!(
        "\n[{} · {} · {} · confidence {:.2}]",
        result.metadata.domain,
        result.metadata.action,
        result.metadata.query_source.as_str(),
        result.metadata.confidence
    );
}

fn cell(column: &Column, value: &Value) -> String {
    let text = match (value, column.column_type) {
        (Value::Null, _) => "-".to_string(),
        (Value::Number(n), ColumnType::Currency | ColumnType::Decimal) => {
            n.as_f64().map(format_number).unwrap_or_else(|| n.to_string())
        }
        (Value::Number(n), ColumnType::Percentage) => format!("{}%", n),
        (Value::String(s), ColumnType::Date) => s.chars().take(10).collect(),
        (Value::String(s), _) => s.clone(),
        (Value::Bool(b), _) => (if *b { "כן" } else { "לא" }).to_string(),
        (other, _) => other.to_string(),
    };

    if width(&text) > MAX_CELL_WIDTH {
        let truncated: String = text.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{}...", truncated)
    } else {
        text
    }
}

fn width(text: &str) -> usize {
    text.chars().count()
}

fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(self::width(text));
    format!("{}{}", text, " ".repeat(fill))
}

/// Print a parsed intent.
pub fn print_intent(intent: &Intent, json: bool) {
    if json {
        print_json(intent);
        return;
    }

    println!("Domain:      {}", intent.domain());
    println!("Action:      {}", intent.action());
    if intent.filters().is_empty() {
        println!("Filters:     (none)");
    } else {
        println!("Filters:");
        for (key, value) in intent.filters() {
            println!("  {} = {}", key, value);
        }
    }
    if !intent.fields().is_empty() {
        println!("Fields:      {}", intent.fields().join(", "));
    }
    println!("Confidence:  {:.2}", intent.confidence());
    println!("Source:      {}", intent.source().as_str());
    if !intent.explanation().is_empty() {
        println!("Explanation: {}", intent.explanation());
    }
}

/// Print rendered SQL with its bound parameters.
pub fn print_sql(intent: &Intent, sql: &str, params: &[SqlValue], json: bool) {
    if json {
        print_json(&json!({
            "intent": intent,
            "sql": sql,
            "params": params,
        }));
        return;
    }

    println!("{}", sql);
    if !params.is_empty() {
        println!();
        for (i, param) in params.iter().enumerate() {
            println!("  ${} = {}", i + 1, param);
        }
    }
}

/// Print the schema's domains.
pub fn print_domains(result: &DomainsResponse, json: bool) {
    if json {
        print_json(result);
        return;
    }

    println!("{:<16} {:<8} LABEL", "DOMAIN", "FIELDS");
    println!("{}", "-".repeat(60));
    for domain in &result.domains {
        println!("{:<16} {:<8} {}", domain.key, domain.fields.len(), domain.label);
    }
    println!("\nTotal: {} domains", result.total);
}
