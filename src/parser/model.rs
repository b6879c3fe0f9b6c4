//! Model-assisted intent proposals.
//!
//! The model never sees free-form instructions alone: every request carries an
//! [`OutputContract`] listing the allowed domains, actions and filter shapes.
//! Whatever comes back is untrusted JSON and is validated by the caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::intent::{Action, SEARCH_KEY};
use crate::schema::{FieldType, SchemaRegistry};

// ============================================================================
// Output Contract
// ============================================================================

/// Filter key the model may emit for a domain.
#[derive(Debug, Clone, Serialize)]
pub struct FilterHint {
    pub key: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

/// Per-domain part of the contract.
#[derive(Debug, Clone, Serialize)]
pub struct DomainContract {
    pub key: String,
    pub label: String,
    pub description: String,
    pub filters: Vec<FilterHint>,
}

/// Allowed output values, derived from the schema.
#[derive(Debug, Clone, Serialize)]
pub struct OutputContract {
    pub domains: Vec<DomainContract>,
    pub actions: Vec<&'static str>,
}

impl OutputContract {
    pub fn from_schema(schema: &SchemaRegistry) -> Self {
        let domains = schema
            .domains()
            .iter()
            .map(|domain| {
                let mut filters = Vec::new();
                for field in domain.fields.iter().filter(|f| f.filterable) {
                    filters.push(FilterHint {
                        key: field.key.clone(),
                        field_type: field.field_type,
                        enum_values: field.enum_values.clone(),
                    });
                    if field.field_type.is_ordered() {
                        for suffix in ["gt", "lt"] {
                            filters.push(FilterHint {
                                key: format!("{}_{}", field.key, suffix),
                                field_type: field.field_type,
                                enum_values: None,
                            });
                        }
                    }
                }
                filters.push(FilterHint {
                    key: SEARCH_KEY.to_string(),
                    field_type: FieldType::Text,
                    enum_values: None,
                });

                DomainContract {
                    key: domain.key.clone(),
                    label: domain.label.clone(),
                    description: domain.description.clone(),
                    filters,
                }
            })
            .collect();

        Self {
            domains,
            actions: Action::ALL.iter().map(Action::as_str).collect(),
        }
    }
}

/// One proposal request.
#[derive(Debug, Clone, Copy)]
pub struct ModelRequest<'a> {
    pub query: &'a str,
    pub contract: &'a OutputContract,
}

/// Proposes an intent as raw JSON.
#[async_trait]
pub trait IntentModel: Send + Sync {
    async fn propose(&self, request: ModelRequest<'_>) -> Result<Value, ModelError>;

    fn name(&self) -> &str;
}

// ============================================================================
// Chat Completions Client
// ============================================================================

/// [`IntentModel`] backed by an OpenAI-compatible chat completions API.
pub struct ChatCompletionModel {
    api_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl ChatCompletionModel {
    pub fn new(base_url: &str, api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            api_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from config, reading `OPENAI_API_KEY` when no key is configured.
    pub fn from_config(config: &ModelConfig) -> Self {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        Self::new(&config.base_url, api_key, config.model.clone())
    }

    fn build_prompt(request: &ModelRequest<'_>) -> Result<String, ModelError> {
        let contract = serde_json::to_string(request.contract)
            .map_err(|e| ModelError::Contract(e.to_string()))?;
        Ok(format!(
            "Translate the question about municipal budget data into a query intent.\n\
            Allowed domains, filters and actions:\n{}\n\n\
            Question: {}\n\n\
            Respond with a single JSON object only: \
            {{\"domain\": <domain key>, \"action\": <action>, \"filters\": {{<filter key>: <string or number>}}, \
            \"fields\": [<field key>], \"confidence\": <number between 0 and 1>, \"explanation\": <string>}}",
            contract, request.query
        ))
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[async_trait]
impl IntentModel for ChatCompletionModel {
    async fn propose(&self, request: ModelRequest<'_>) -> Result<Value, ModelError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Self::build_prompt(&request)?,
            }],
            temperature: 0.0,
        };

        let mut req_builder = self.client.post(&self.api_url).json(&body);
        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder
            .send()
            .await
            .map_err(|e| ModelError::Api(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModelError::Api(format!("status {}", response.status())));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Api(format!("Failed to parse response: {}", e)))?;

        let content = chat
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ModelError::Contract("empty choices".to_string()))?;

        extract_json(content)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Pull the JSON object out of a completion, tolerating code fences and
/// surrounding prose.
pub fn extract_json(content: &str) -> Result<Value, ModelError> {
    let start = content
        .find('{')
        .ok_or_else(|| ModelError::Contract("no JSON object in response".to_string()))?;
    let end = content
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| ModelError::Contract("unterminated JSON object".to_string()))?;
    serde_json::from_str(&content[start..=end]).map_err(|e| ModelError::Contract(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_enumerates_schema() {
        let schema = SchemaRegistry::municipal().unwrap();
        let contract = OutputContract::from_schema(&schema);
        assert_eq!(contract.domains.len(), schema.domains().len());
        assert_eq!(contract.actions, vec!["list", "count", "sum", "average", "group"]);

        let transactions = contract
            .domains
            .iter()
            .find(|d| d.key == "transactions")
            .unwrap();
        let keys: Vec<_> = transactions.filters.iter().map(|f| f.key.as_str()).collect();
        assert!(keys.contains(&"amount_gt"));
        assert!(keys.contains(&"status"));
        assert!(keys.contains(&"search"));
        assert!(!keys.contains(&"description"));
    }

    #[test]
    fn test_extract_json_from_fenced_block() {
        let content = "```json\n{\"domain\": \"tabarim\", \"action\": \"count\"}\n```";
        let value = extract_json(content).unwrap();
        assert_eq!(value["domain"], "tabarim");
    }

    #[test]
    fn test_extract_json_rejects_prose() {
        assert!(extract_json("I cannot answer that").is_err());
    }

    #[test]
    fn test_api_url() {
        let model = ChatCompletionModel::new("http://localhost:11434/v1/", None, "llama3");
        assert_eq!(model.api_url, "http://localhost:11434/v1/chat/completions");
        assert_eq!(model.name(), "llama3");
    }
}
