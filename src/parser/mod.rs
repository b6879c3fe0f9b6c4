//! Stage one: free text to a validated [`Intent`].
//!
//! Parsing runs an ordered chain and the first step that yields a valid
//! intent wins:
//!
//! 1. model-assisted proposal (only when a model is injected),
//! 2. deterministic rules,
//! 3. the guaranteed fallback over the generic domain.

pub mod lexicon;
pub mod model;
pub mod rules;
pub mod text;

pub use model::{ChatCompletionModel, IntentModel, ModelRequest, OutputContract};
pub use rules::RuleParser;
pub use text::{fold, QueryText};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{ModelError, ReportError, Result, ValidationError};
use crate::intent::{Action, FilterValue, Intent, IntentSource, SEARCH_KEY};
use crate::schema::SchemaRegistry;
use crate::validator::IntentValidator;

/// Confidence of the guaranteed fallback intent.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(8);
const DEFAULT_MAX_QUERY_CHARS: usize = 500;

/// Turns questions into intents.
#[derive(Clone)]
pub struct IntentParser {
    schema: Arc<SchemaRegistry>,
    rules: RuleParser,
    contract: Arc<OutputContract>,
    model: Option<Arc<dyn IntentModel>>,
    model_timeout: Duration,
    max_query_chars: usize,
}

impl IntentParser {
    /// Rule-only parser.
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self {
            rules: RuleParser::new(schema.clone()),
            contract: Arc::new(OutputContract::from_schema(&schema)),
            schema,
            model: None,
            model_timeout: DEFAULT_MODEL_TIMEOUT,
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
        }
    }

    /// Enable the model-assisted step.
    pub fn with_model(mut self, model: Arc<dyn IntentModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub fn with_max_query_chars(mut self, max: usize) -> Self {
        self.max_query_chars = max;
        self
    }

    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Parse a question through the full chain.
    pub async fn parse(&self, query: &str) -> Result<Intent> {
        let text = self.prepare(query)?;

        if let Some(model) = &self.model {
            match self.parse_with_model(model.as_ref(), &text).await {
                Ok(intent) => {
                    info!(domain = %intent.domain(), action = %intent.action(), "Intent from model");
                    return Ok(intent);
                }
                Err(e) => {
                    warn!(model = model.name(), error = %e, "Model parse failed, using rules");
                }
            }
        }

        Ok(self.parse_rules_text(&text))
    }

    /// Parse with rules and the fallback only; never touches the model.
    pub fn parse_rules(&self, query: &str) -> Result<Intent> {
        let text = self.prepare(query)?;
        Ok(self.parse_rules_text(&text))
    }

    fn prepare(&self, query: &str) -> Result<QueryText> {
        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        if query.chars().count() > self.max_query_chars {
            return Err(ReportError::ParsingFailed(format!(
                "query longer than {} characters",
                self.max_query_chars
            )));
        }
        Ok(QueryText::new(query))
    }

    async fn parse_with_model(
        &self,
        model: &dyn IntentModel,
        text: &QueryText,
    ) -> std::result::Result<Intent, ModelError> {
        let request = ModelRequest {
            query: text.raw(),
            contract: &self.contract,
        };

        let value = tokio::time::timeout(self.model_timeout, model.propose(request))
            .await
            .map_err(|_| ModelError::Timeout(self.model_timeout.as_millis() as u64))??;

        let (intent, report) = IntentValidator::strict()
            .validate_value(&value, &self.schema, IntentSource::Model)
            .map_err(|e| ModelError::Contract(e.to_string()))?;
        if !report.is_clean() {
            debug!(warnings = ?report.warnings, "Model intent accepted with warnings");
        }
        Ok(intent)
    }

    fn parse_rules_text(&self, text: &QueryText) -> Intent {
        let Some(intent) = self.rules.parse(text) else {
            return fallback_intent(&self.schema, text.raw());
        };

        match IntentValidator::new().validate(&intent, &self.schema) {
            Ok(_) => {
                debug!(
                    domain = %intent.domain(),
                    action = %intent.action(),
                    confidence = intent.confidence(),
                    "Intent from rules"
                );
                intent
            }
            Err(e) => {
                warn!(error = %e, "Rule intent failed validation, using fallback");
                fallback_intent(&self.schema, text.raw())
            }
        }
    }
}

/// The intent used when nothing else applies: list the generic domain,
/// searching for the raw query.
pub fn fallback_intent(schema: &SchemaRegistry, raw: &str) -> Intent {
    let domain = schema.fallback_domain();
    debug!(domain = %domain.key, "Using fallback intent");
    Intent::new(domain.key.clone(), Action::List, IntentSource::Fallback)
        .with_filter(SEARCH_KEY, FilterValue::from(raw.trim()))
        .with_confidence(FALLBACK_CONFIDENCE)
        .with_explanation(format!("חיפוש חופשי ב{}", domain.label))
}
