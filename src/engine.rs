//! Report engine: wires parser, validator, builder, executor and formatter
//! into one request pipeline.
//!
//! Low-confidence interpretations are never executed directly; they come
//! back as [`ReportOutcome::NeedsConfirmation`] and run only after the caller
//! confirms them through [`ReportEngine::confirm`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::builder::{QueryBuilder, QueryDescriptor};
use crate::config::Config;
use crate::error::{DatabaseError, ReportError, Result, ValidationError};
use crate::executor::{Datastore, QueryExecutor};
use crate::formatter::{QueryResult, ResultFormatter};
use crate::intent::{Action, Filters, Intent, IntentSource};
use crate::parser::{ChatCompletionModel, IntentParser};
use crate::schema::SchemaRegistry;
use crate::validator::IntentValidator;

/// Default confidence below which an intent needs confirmation.
pub const DEFAULT_CONFIRM_THRESHOLD: f64 = 0.6;

// ============================================================================
// Requests & Outcomes
// ============================================================================

/// A question, either as free text or as a pre-built descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportRequest {
    Text {
        query: String,
    },
    Structured {
        domain: String,
        action: Option<Action>,
        fields: Vec<String>,
        filters: Filters,
    },
}

impl ReportRequest {
    pub fn text(query: impl Into<String>) -> Self {
        Self::Text {
            query: query.into(),
        }
    }

    /// Read a request body: `{query}` or `{domain, action?, fields?, filters?}`.
    pub fn from_value(value: &Value, schema: &SchemaRegistry) -> std::result::Result<Self, ValidationError> {
        let object = value.as_object().ok_or_else(|| ValidationError::InvalidShape {
            field: "request",
            reason: "expected a JSON object".to_string(),
        })?;

        if let Some(query) = object.get("query") {
            let query = query.as_str().ok_or_else(|| ValidationError::InvalidShape {
                field: "query",
                reason: "expected a string".to_string(),
            })?;
            return Ok(Self::text(query));
        }

        if !object.contains_key("domain") {
            return Err(ValidationError::MissingField("query"));
        }

        // Reuse the untrusted-intent checks for the structured shape.
        let mut candidate = value.clone();
        if let Some(map) = candidate.as_object_mut() {
            map.entry("action").or_insert_with(|| Value::from(Action::List.as_str()));
            map.insert("confidence".to_string(), Value::from(1.0));
        }
        let (intent, _) =
            IntentValidator::new().validate_value(&candidate, schema, IntentSource::Caller)?;

        Ok(Self::Structured {
            domain: intent.domain().to_string(),
            action: Some(intent.action()),
            fields: intent.fields().to_vec(),
            filters: intent.filters().clone(),
        })
    }
}

/// What happened to a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportOutcome {
    /// The query ran
    Completed(QueryResult),
    /// The interpretation is uncertain and was not executed
    NeedsConfirmation { intent: Intent, message: String },
    /// The caller rejected the interpretation
    Declined,
}

impl ReportOutcome {
    pub fn result(&self) -> Option<&QueryResult> {
        match self {
            Self::Completed(result) => Some(result),
            _ => None,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// The two-stage report pipeline.
#[derive(Clone)]
pub struct ReportEngine {
    schema: Arc<SchemaRegistry>,
    parser: IntentParser,
    validator: IntentValidator,
    builder: QueryBuilder,
    executor: Option<QueryExecutor>,
    formatter: ResultFormatter,
    confirm_threshold: f64,
}

impl ReportEngine {
    /// Rule-only engine without a datastore.
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self {
            parser: IntentParser::new(schema.clone()),
            schema,
            validator: IntentValidator::new(),
            builder: QueryBuilder::new(),
            executor: None,
            formatter: ResultFormatter::new(),
            confirm_threshold: DEFAULT_CONFIRM_THRESHOLD,
        }
    }

    /// Engine configured from settings.
    pub fn from_config(
        config: &Config,
        schema: Arc<SchemaRegistry>,
        datastore: Option<Arc<dyn Datastore>>,
    ) -> Self {
        let mut parser = IntentParser::new(schema.clone())
            .with_max_query_chars(config.engine.max_query_chars)
            .with_model_timeout(Duration::from_secs(config.model.timeout_secs));
        if config.model.enabled {
            info!(model = %config.model.model, "Model-assisted parsing enabled");
            parser = parser.with_model(Arc::new(ChatCompletionModel::from_config(&config.model)));
        }

        let mut engine = Self::new(schema)
            .with_parser(parser)
            .with_confirm_threshold(config.engine.confirm_threshold)
            .with_row_cap(config.engine.row_cap);
        if let Some(datastore) = datastore {
            engine = engine.with_executor(QueryExecutor::from_config(datastore, &config.datastore));
        }
        engine
    }

    pub fn with_parser(mut self, parser: IntentParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_datastore(self, datastore: Arc<dyn Datastore>) -> Self {
        self.with_executor(QueryExecutor::new(datastore))
    }

    pub fn with_executor(mut self, executor: QueryExecutor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_confirm_threshold(mut self, threshold: f64) -> Self {
        self.confirm_threshold = threshold;
        self
    }

    pub fn with_row_cap(mut self, row_cap: usize) -> Self {
        self.builder = self.builder.with_row_cap(row_cap);
        self.formatter = self.formatter.with_row_cap(row_cap);
        self
    }

    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    pub fn parser(&self) -> &IntentParser {
        &self.parser
    }

    pub fn confirm_threshold(&self) -> f64 {
        self.confirm_threshold
    }

    /// Name of the configured datastore, if any.
    pub fn datastore_name(&self) -> Option<&str> {
        self.executor.as_ref().map(QueryExecutor::datastore_name)
    }

    /// Parse a question without executing it.
    pub async fn parse(&self, query: &str) -> Result<Intent> {
        self.parser.parse(query).await
    }

    /// Validate and compile an intent.
    pub fn compile(&self, intent: &Intent) -> Result<QueryDescriptor> {
        self.validator.validate(intent, &self.schema)?;
        let domain = self
            .schema
            .domain(intent.domain())
            .ok_or_else(|| ValidationError::UnknownDomain(intent.domain().to_string()))?;
        self.builder.build(intent, domain)
    }

    /// Run a request through the pipeline.
    pub async fn run(&self, request: ReportRequest) -> Result<ReportOutcome> {
        let intent = match request {
            ReportRequest::Text { query } => {
                let intent = self.parser.parse(&query).await?;
                if intent.confidence() < self.confirm_threshold {
                    info!(
                        domain = %intent.domain(),
                        confidence = intent.confidence(),
                        "Intent needs confirmation"
                    );
                    let message = confirmation_message(&intent);
                    return Ok(ReportOutcome::NeedsConfirmation { intent, message });
                }
                intent
            }
            ReportRequest::Structured {
                domain,
                action,
                fields,
                filters,
            } => Intent::new(domain, action.unwrap_or_default(), IntentSource::Caller)
                .with_fields(fields)
                .with_filters(filters)
                .with_confidence(1.0)
                .with_explanation("בקשה מובנית"),
        };

        self.execute(&intent).await.map(ReportOutcome::Completed)
    }

    /// Like [`run`](Self::run), abandoning in-flight work when `token` is
    /// cancelled.
    pub async fn run_with_cancel(
        &self,
        request: ReportRequest,
        token: &CancellationToken,
    ) -> Result<ReportOutcome> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!("Report request cancelled");
                Err(ReportError::Cancelled)
            }
            outcome = self.run(request) => outcome,
        }
    }

    /// Execute a previously returned intent once the caller has decided.
    pub async fn confirm(&self, intent: &Value, confirmed: bool) -> Result<ReportOutcome> {
        if !confirmed {
            info!("Intent declined by caller");
            return Ok(ReportOutcome::Declined);
        }

        let source = intent
            .get("source")
            .and_then(|s| serde_json::from_value(s.clone()).ok())
            .unwrap_or(IntentSource::Caller);
        let (intent, _) = self.validator.validate_value(intent, &self.schema, source)?;
        self.execute(&intent).await.map(ReportOutcome::Completed)
    }

    /// Like [`confirm`](Self::confirm), abandoning in-flight work when
    /// `token` is cancelled.
    pub async fn confirm_with_cancel(
        &self,
        intent: &Value,
        confirmed: bool,
        token: &CancellationToken,
    ) -> Result<ReportOutcome> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!("Confirmed report cancelled");
                Err(ReportError::Cancelled)
            }
            outcome = self.confirm(intent, confirmed) => outcome,
        }
    }

    /// Validate, build, execute and format one intent.
    pub async fn execute(&self, intent: &Intent) -> Result<QueryResult> {
        let report = self.validator.validate(intent, &self.schema)?;
        let domain = self
            .schema
            .domain(intent.domain())
            .ok_or_else(|| ValidationError::UnknownDomain(intent.domain().to_string()))?;
        let descriptor = self.builder.build(intent, domain)?;

        let executor = self.executor.as_ref().ok_or(DatabaseError::NotConfigured)?;
        let rows = executor.execute(&descriptor).await?;

        info!(
            domain = %domain.key,
            action = %intent.action(),
            source = intent.source().as_str(),
            rows = rows.len(),
            "Report executed"
        );
        Ok(self
            .formatter
            .format(rows, intent, domain)
            .with_warnings(report.warnings))
    }
}

fn confirmation_message(intent: &Intent) -> String {
    format!(
        "הפענוח אינו ודאי (רמת ביטחון {:.0}%). {}. יש לאשר לפני הרצה.",
        intent.confidence() * 100.0,
        intent.explanation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StaticDatastore;
    use serde_json::json;

    fn engine(rows: Vec<Value>) -> (ReportEngine, Arc<StaticDatastore>) {
        let rows = rows
            .into_iter()
            .map(|r| r.as_object().unwrap().clone())
            .collect();
        let store = Arc::new(StaticDatastore::new(rows));
        let engine = ReportEngine::new(Arc::new(SchemaRegistry::municipal().unwrap()))
            .with_datastore(store.clone());
        (engine, store)
    }

    #[tokio::test]
    async fn test_confident_text_runs() {
        let (engine, store) = engine(vec![json!({"count": 4})]);
        let outcome = engine
            .run(ReportRequest::text("כמה פרויקטים פעילים יש"))
            .await
            .unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.rows[0]["count"], json!(4));
        assert_eq!(result.metadata.query_source, IntentSource::Rules);
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_low_confidence_needs_confirmation() {
        let (engine, store) = engine(vec![]);
        let outcome = engine.run(ReportRequest::text("xyz123")).await.unwrap();
        match outcome {
            ReportOutcome::NeedsConfirmation { intent, message } => {
                assert_eq!(intent.domain(), "comprehensive");
                assert!(message.contains("50%"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn test_confirm_executes_echoed_intent() {
        let (engine, store) = engine(vec![json!({"total_sum": 2500000})]);
        let outcome = engine.run(ReportRequest::text("סכום תקציב")).await.unwrap();
        let ReportOutcome::NeedsConfirmation { intent, .. } = outcome else {
            panic!("expected confirmation");
        };

        let echoed = serde_json::to_value(&intent).unwrap();
        let declined = engine.confirm(&echoed, false).await.unwrap();
        assert!(matches!(declined, ReportOutcome::Declined));
        assert_eq!(store.calls(), 0);

        let outcome = engine.confirm(&echoed, true).await.unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["total_sum"], json!(2500000));
        assert_eq!(result.metadata.query_source, IntentSource::Rules);
        assert_eq!(
            store.last_query().await.unwrap().0,
            "SELECT COALESCE(SUM(t.total_authorized), 0) AS total_sum FROM tabarim AS t"
        );
    }

    #[tokio::test]
    async fn test_confirm_rejects_tampered_intent() {
        let (engine, _) = engine(vec![]);
        let err = engine
            .confirm(&json!({"domain": "salaries", "action": "list", "confidence": 0.5}), true)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
    }

    #[tokio::test]
    async fn test_structured_request() {
        let (engine, store) = engine(vec![json!({"supplier": "א.ב.", "amount": 100})]);
        let schema = engine.schema().clone();
        let request = ReportRequest::from_value(
            &json!({"domain": "transactions", "fields": ["supplier", "amount"], "filters": {"status": "שולם"}}),
            &schema,
        )
        .unwrap();
        let outcome = engine.run(request).await.unwrap();
        let result = outcome.result().unwrap();
        assert_eq!(result.metadata.query_source, IntentSource::Caller);
        assert_eq!(result.metadata.confidence, 1.0);
        let (sql, _) = store.last_query().await.unwrap();
        assert!(sql.starts_with("SELECT tr.supplier AS supplier, tr.amount AS amount"));
    }

    #[test]
    fn test_request_from_value_errors() {
        let schema = SchemaRegistry::municipal().unwrap();
        assert!(ReportRequest::from_value(&json!({"query": 5}), &schema).is_err());
        assert_eq!(
            ReportRequest::from_value(&json!({}), &schema).unwrap_err(),
            ValidationError::MissingField("query")
        );
        assert!(ReportRequest::from_value(&json!({"domain": "nope"}), &schema).is_err());
    }

    #[tokio::test]
    async fn test_missing_datastore() {
        let engine = ReportEngine::new(Arc::new(SchemaRegistry::municipal().unwrap()));
        let err = engine
            .run(ReportRequest::text("כמה פרויקטים פעילים יש"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReportError::Database(DatabaseError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_cancelled_request() {
        let store = Arc::new(StaticDatastore::new(vec![]).with_delay(Duration::from_secs(30)));
        let engine = ReportEngine::new(Arc::new(SchemaRegistry::municipal().unwrap()))
            .with_datastore(store);
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = engine
            .run_with_cancel(ReportRequest::text("כמה פרויקטים פעילים יש"), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_confirmation() {
        let store = Arc::new(StaticDatastore::new(vec![]).with_delay(Duration::from_secs(30)));
        let engine = ReportEngine::new(Arc::new(SchemaRegistry::municipal().unwrap()))
            .with_datastore(store);
        let intent = engine.parser().parse_rules("סכום תקציב").unwrap();
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = engine
            .confirm_with_cancel(&serde_json::to_value(&intent).unwrap(), true, &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Cancelled));
    }

    #[test]
    fn test_compile() {
        let engine = ReportEngine::new(Arc::new(SchemaRegistry::municipal().unwrap()));
        let intent = engine.parser().parse_rules("חשבוניות מעל 10,000 שקל").unwrap();
        let (sql, params) = engine.compile(&intent).unwrap().to_sql();
        assert!(sql.contains("WHERE tr.amount > $1"));
        assert_eq!(params.len(), 1);
    }
}
