//! Engine wiring from configuration files.

use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use budget_query::{
    Config, Datastore, ReportEngine, ReportOutcome, ReportRequest, SchemaRegistry,
    StaticDatastore,
};

fn write_config(dir: &TempDir, content: &str) -> Config {
    let path = dir.path().join("budget-query.toml");
    std::fs::write(&path, content).unwrap();
    Config::from_file(&path).unwrap()
}

#[tokio::test]
async fn test_engine_settings_from_file() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        &dir,
        r#"
        [engine]
        confirm_threshold = 1.0
        row_cap = 2

        [datastore]
        max_retries = 0
        "#,
    );

    let row = json!({"supplier": "א.ב.", "amount": 12000}).as_object().unwrap().clone();
    let store = Arc::new(StaticDatastore::new(vec![row.clone(), row]));
    let engine = ReportEngine::from_config(
        &config,
        Arc::new(SchemaRegistry::municipal().unwrap()),
        Some(store.clone() as Arc<dyn Datastore>),
    );
    assert_eq!(engine.confirm_threshold(), 1.0);
    assert!(!engine.parser().has_model());

    // Rule confidence never reaches 1.0
    let outcome = engine
        .run(ReportRequest::text("חשבוניות מעל 10,000 שקל"))
        .await
        .unwrap();
    let ReportOutcome::NeedsConfirmation { intent, .. } = outcome else {
        panic!("expected confirmation");
    };

    let outcome = engine
        .confirm(&serde_json::to_value(&intent).unwrap(), true)
        .await
        .unwrap();
    let result = outcome.result().unwrap();
    assert!(store.last_query().await.unwrap().0.ends_with("LIMIT 2"));
    assert_eq!(result.summary.message, "מוצגות 2 התוצאות הראשונות");
}

#[test]
fn test_custom_schema_file() {
    let dir = TempDir::new().unwrap();
    let schema_path = dir.path().join("schema.json");
    std::fs::write(
        &schema_path,
        r#"{"domains": [{
            "key": "grants", "label": "מענקים", "table": "grants", "primaryKey": "id",
            "fallback": true,
            "fields": [
                {"key": "title", "label": "שם", "type": "text", "filterable": true, "searchable": true},
                {"key": "amount", "label": "סכום", "type": "currency", "filterable": true, "aggregatable": true}
            ],
            "defaultFields": ["title", "amount"],
            "keywords": {"primary": ["מענק", "מענקים"], "secondary": []}
        }]}"#,
    )
    .unwrap();

    let config = write_config(
        &dir,
        &format!("[schema]\npath = {:?}\n", schema_path.display().to_string()),
    );
    let schema = SchemaRegistry::from_file(config.schema_path().unwrap()).unwrap();
    assert_eq!(schema.domain_keys(), vec!["grants"]);

    let engine = ReportEngine::new(Arc::new(schema));
    let intent = engine.parser().parse_rules("סכום מענקים").unwrap();
    assert_eq!(intent.domain(), "grants");

    let (sql, _) = engine.compile(&intent).unwrap().to_sql();
    assert!(sql.contains("FROM grants AS t"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[engine]\nrow_cap = 0\n").unwrap();
    assert!(Config::from_file(&path).is_err());
}
