//! End-to-end question scenarios over the built-in municipal schema.

use std::sync::Arc;

use serde_json::{json, Value};

use budget_query::builder::SqlValue;
use budget_query::{
    Action, FilterValue, IntentSource, Record, ReportEngine, ReportError, ReportOutcome,
    ReportRequest, SchemaRegistry, StaticDatastore, ValidationError,
};

fn rows(values: Vec<Value>) -> Vec<Record> {
    values
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

fn engine_with(values: Vec<Value>) -> (ReportEngine, Arc<StaticDatastore>) {
    let store = Arc::new(StaticDatastore::new(rows(values)));
    let engine = ReportEngine::new(Arc::new(SchemaRegistry::municipal().unwrap()))
        .with_datastore(store.clone());
    (engine, store)
}

#[tokio::test]
async fn test_invoices_above_amount() {
    let (engine, store) = engine_with(vec![
        json!({
            "transaction_date": "2024-03-01",
            "tabar_number": "2211",
            "supplier": "א.ב. בנייה",
            "description": "עבודות פיתוח",
            "amount": 125000,
            "status": "שולם"
        }),
        json!({
            "transaction_date": "2024-02-11",
            "tabar_number": "1870",
            "supplier": "ג.ד. תשתיות",
            "description": "ריצוף",
            "amount": 48000.5,
            "status": "ממתין"
        }),
    ]);

    let intent = engine.parse("חשבוניות מעל 10,000 שקל").await.unwrap();
    assert_eq!(intent.domain(), "transactions");
    assert_eq!(intent.action(), Action::List);
    assert_eq!(intent.filters().len(), 1);
    assert_eq!(intent.filter("amount_gt"), Some(&FilterValue::Integer(10000)));
    assert!(intent.confidence() >= 0.6);

    let outcome = engine
        .run(ReportRequest::text("חשבוניות מעל 10,000 שקל"))
        .await
        .unwrap();
    let result = outcome.result().expect("confident intent should run");

    let (sql, params) = store.last_query().await.unwrap();
    assert!(sql.contains("FROM transactions AS tr WHERE tr.amount > $1"));
    assert!(sql.ends_with("LIMIT 100"));
    assert_eq!(params, vec![SqlValue::Integer(10000)]);

    assert_eq!(result.rows.len(), 2);
    assert_eq!(result.summary.total_rows, 2);
    assert_eq!(result.summary.message, "נמצאו 2 תוצאות");
    let keys: Vec<_> = result.columns.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(
        keys,
        vec!["transaction_date", "tabar_number", "supplier", "description", "amount", "status"]
    );
    assert_eq!(result.columns[2].label, "ספק");
}

#[tokio::test]
async fn test_count_active_projects() {
    let (engine, store) = engine_with(vec![json!({"count": 12})]);

    let outcome = engine
        .run(ReportRequest::text("כמה פרויקטים פעילים יש"))
        .await
        .unwrap();
    let result = outcome.result().unwrap();

    assert_eq!(
        store.last_query().await.unwrap(),
        (
            "SELECT COUNT(*) AS count FROM tabarim AS t WHERE t.status = $1".to_string(),
            vec![SqlValue::Text("פעיל".to_string())]
        )
    );
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.columns.len(), 1);
    assert_eq!(result.rows[0]["count"], json!(12));
    assert_eq!(result.metadata.action, Action::Count);
    assert_eq!(result.metadata.domain, "tabarim");
}

#[tokio::test]
async fn test_tabar_number() {
    let (engine, _) = engine_with(vec![]);
    let intent = engine.parse("תב״ר 2211").await.unwrap();
    assert_eq!(intent.domain(), "tabarim");
    assert_eq!(intent.filter("tabar_number"), Some(&FilterValue::from("2211")));
}

#[tokio::test]
async fn test_unrecognisable_text_falls_back() {
    let (engine, store) = engine_with(vec![]);

    let outcome = engine.run(ReportRequest::text("xyz123")).await.unwrap();
    let ReportOutcome::NeedsConfirmation { intent, .. } = outcome else {
        panic!("fallback intent must be confirmed first");
    };
    assert_eq!(intent.domain(), "comprehensive");
    assert_eq!(intent.action(), Action::List);
    assert_eq!(intent.filter("search"), Some(&FilterValue::from("xyz123")));
    assert_eq!(intent.filters().len(), 1);
    assert_eq!(intent.confidence(), 0.5);
    assert_eq!(intent.source(), IntentSource::Fallback);
    assert_eq!(store.calls(), 0);

    let echoed = serde_json::to_value(&intent).unwrap();
    let outcome = engine.confirm(&echoed, true).await.unwrap();
    let result = outcome.result().unwrap();
    assert!(result.rows.is_empty());
    assert!(result.columns.is_empty());
    assert_eq!(result.summary.message, "לא נמצאו תוצאות");
    assert_eq!(result.metadata.query_source, IntentSource::Fallback);

    let (sql, params) = store.last_query().await.unwrap();
    assert!(sql.contains("t.name ILIKE $1"));
    assert_eq!(params, vec![SqlValue::Text("%xyz123%".to_string())]);
}

#[tokio::test]
async fn test_empty_question_is_rejected() {
    let (engine, store) = engine_with(vec![]);
    for query in ["", "   "] {
        let err = engine.run(ReportRequest::text(query)).await.unwrap_err();
        assert!(
            matches!(err, ReportError::Validation(ValidationError::EmptyQuery)),
            "{:?}",
            err
        );
    }
    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn test_sum_of_budget() {
    let (engine, store) = engine_with(vec![json!({"total_sum": 18250000})]);

    let outcome = engine.run(ReportRequest::text("סכום תקציב")).await.unwrap();
    let ReportOutcome::NeedsConfirmation { intent, .. } = outcome else {
        panic!("keyword-only question should need confirmation");
    };
    assert_eq!(intent.domain(), "tabarim");
    assert_eq!(intent.action(), Action::Sum);
    assert!(intent.filters().is_empty());

    let outcome = engine
        .confirm(&serde_json::to_value(&intent).unwrap(), true)
        .await
        .unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(
        store.last_query().await.unwrap().0,
        "SELECT COALESCE(SUM(t.total_authorized), 0) AS total_sum FROM tabarim AS t"
    );
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0]["total_sum"], json!(18250000));
    assert_eq!(result.columns[0].key, "total_sum");
}

#[tokio::test]
async fn test_structured_group_request() {
    let (engine, store) = engine_with(vec![
        json!({"department": "חינוך", "count": 4, "total_sum": 9000000}),
        json!({"department": "תרבות", "count": 2, "total_sum": 1200000}),
    ]);
    let request = ReportRequest::from_value(
        &json!({"domain": "tabarim", "action": "group", "filters": {"status": "פעיל"}}),
        engine.schema(),
    )
    .unwrap();

    let outcome = engine.run(request).await.unwrap();
    let result = outcome.result().unwrap();
    assert_eq!(result.summary.message, "נמצאו 2 קבוצות");
    assert_eq!(result.metadata.query_source, IntentSource::Caller);

    let (sql, _) = store.last_query().await.unwrap();
    assert!(sql.contains("GROUP BY t.department"));
    assert!(sql.contains("WHERE t.status = $1"));
}
