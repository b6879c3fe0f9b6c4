//! Intent validation against the schema registry.
//!
//! Typed intents are checked with [`IntentValidator::validate`]. Untrusted
//! JSON (model output, intents echoed back through the confirm surface) goes
//! through [`IntentValidator::validate_value`], which applies the same checks
//! before an [`Intent`] is constructed.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::intent::{Action, FilterValue, Filters, Intent, IntentSource};
use crate::schema::SchemaRegistry;

/// Non-fatal findings from validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Validates intents against the schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentValidator {
    /// Reject unknown filter keys instead of warning about them.
    strict_filters: bool,
}

impl IntentValidator {
    /// Validator that reports unknown filter keys as warnings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validator for model output: every filter key must be one the domain
    /// accepts, and the full output contract must be present.
    pub fn strict() -> Self {
        Self {
            strict_filters: true,
        }
    }

    /// Validate a typed intent.
    pub fn validate(
        &self,
        intent: &Intent,
        schema: &SchemaRegistry,
    ) -> Result<ValidationReport, ValidationError> {
        if intent.domain().trim().is_empty() {
            return Err(ValidationError::MissingField("domain"));
        }

        let domain = schema
            .domain(intent.domain())
            .ok_or_else(|| ValidationError::UnknownDomain(intent.domain().to_string()))?;

        // A typed intent always carries a known action; raw action strings
        // are checked in `validate_value`.
        check_confidence(intent.confidence())?;

        let mut report = ValidationReport::default();
        for key in intent.filters().keys() {
            if domain.accepts_filter(key) {
                continue;
            }
            if self.strict_filters {
                return Err(ValidationError::InvalidShape {
                    field: "filters",
                    reason: format!("filter {} is not defined for domain {}", key, domain.key),
                });
            }
            report
                .warnings
                .push(format!("unknown filter '{}' for domain '{}' ignored", key, domain.key));
        }

        for field in intent.fields() {
            if domain.field(field).is_none() {
                report
                    .warnings
                    .push(format!("unknown field '{}' for domain '{}' ignored", field, domain.key));
            }
        }

        if !report.is_clean() {
            tracing::debug!(warnings = ?report.warnings, "Intent validated with warnings");
        }

        Ok(report)
    }

    /// Validate untrusted JSON and build an intent from it.
    pub fn validate_value(
        &self,
        value: &Value,
        schema: &SchemaRegistry,
        source: IntentSource,
    ) -> Result<(Intent, ValidationReport), ValidationError> {
        let object = value.as_object().ok_or_else(|| ValidationError::InvalidShape {
            field: "intent",
            reason: "expected a JSON object".to_string(),
        })?;

        let mut required = vec!["domain", "action", "confidence"];
        if self.strict_filters {
            required.extend(["filters", "explanation"]);
        }
        for key in required {
            if object.get(key).map_or(true, Value::is_null) {
                return Err(ValidationError::MissingField(key));
            }
        }

        let domain = object["domain"]
            .as_str()
            .ok_or_else(|| ValidationError::UnknownDomain(object["domain"].to_string()))?;
        if domain.trim().is_empty() {
            return Err(ValidationError::MissingField("domain"));
        }
        if schema.domain(domain).is_none() {
            return Err(ValidationError::UnknownDomain(domain.to_string()));
        }

        let action: Action = object["action"]
            .as_str()
            .ok_or_else(|| ValidationError::UnknownAction(object["action"].to_string()))?
            .parse()
            .map_err(ValidationError::UnknownAction)?;

        let confidence = object["confidence"]
            .as_f64()
            .ok_or_else(|| ValidationError::InvalidConfidence(object["confidence"].to_string()))?;
        check_confidence(confidence)?;

        let filters = match object.get("filters") {
            None | Some(Value::Null) => Filters::new(),
            Some(Value::Object(map)) => parse_filters(map)?,
            Some(_) => {
                return Err(ValidationError::InvalidShape {
                    field: "filters",
                    reason: "expected an object".to_string(),
                })
            }
        };

        let fields = match object.get("fields") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ValidationError::InvalidShape {
                            field: "fields",
                            reason: "expected an array of strings".to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ValidationError::InvalidShape {
                    field: "fields",
                    reason: "expected an array of strings".to_string(),
                })
            }
        };

        let explanation = match object.get("explanation") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(_) => {
                return Err(ValidationError::InvalidShape {
                    field: "explanation",
                    reason: "expected a string".to_string(),
                })
            }
        };

        let intent = Intent::new(domain, action, source)
            .with_filters(filters)
            .with_fields(fields)
            .with_confidence(confidence)
            .with_explanation(explanation);

        let report = self.validate(&intent, schema)?;
        Ok((intent, report))
    }
}

fn check_confidence(confidence: f64) -> Result<(), ValidationError> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(ValidationError::InvalidConfidence(confidence.to_string()))
    }
}

fn parse_filters(map: &Map<String, Value>) -> Result<Filters, ValidationError> {
    let mut filters = Filters::new();
    for (key, value) in map {
        let parsed = match value {
            Value::String(s) => FilterValue::Text(s.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FilterValue::Integer(i),
                None => FilterValue::Decimal(n.as_f64().ok_or_else(|| {
                    ValidationError::InvalidShape {
                        field: "filters",
                        reason: format!("filter {} is not a finite number", key),
                    }
                })?),
            },
            _ => {
                return Err(ValidationError::InvalidShape {
                    field: "filters",
                    reason: format!("filter {} must be a string or number", key),
                })
            }
        };
        filters.insert(key.clone(), parsed);
    }
    Ok(filters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> SchemaRegistry {
        SchemaRegistry::municipal().unwrap()
    }

    #[test]
    fn test_valid_intent() {
        let intent = Intent::new("tabarim", Action::Count, IntentSource::Rules)
            .with_filter("status", "פעיל")
            .with_confidence(0.6);
        let report = IntentValidator::new().validate(&intent, &schema()).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_unknown_domain() {
        let intent = Intent::new("parking", Action::List, IntentSource::Rules).with_confidence(0.5);
        let err = IntentValidator::new().validate(&intent, &schema()).unwrap_err();
        assert_eq!(err.field(), "domain");
    }

    #[test]
    fn test_empty_domain_is_missing() {
        let intent = Intent::new("", Action::List, IntentSource::Rules).with_confidence(0.5);
        let err = IntentValidator::new().validate(&intent, &schema()).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("domain"));
    }

    #[test]
    fn test_confidence_out_of_range() {
        let intent = Intent::new("tabarim", Action::List, IntentSource::Rules).with_confidence(1.2);
        let err = IntentValidator::new().validate(&intent, &schema()).unwrap_err();
        assert_eq!(err.field(), "confidence");

        let intent =
            Intent::new("tabarim", Action::List, IntentSource::Rules).with_confidence(f64::NAN);
        assert!(IntentValidator::new().validate(&intent, &schema()).is_err());
    }

    #[test]
    fn test_unknown_filter_is_warning() {
        let intent = Intent::new("tabarim", Action::List, IntentSource::Rules)
            .with_filter("color", "red")
            .with_filter("search", "גן")
            .with_confidence(0.7);
        let report = IntentValidator::new().validate(&intent, &schema()).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("color"));
    }

    #[test]
    fn test_strict_rejects_unknown_filter() {
        let intent = Intent::new("tabarim", Action::List, IntentSource::Model)
            .with_filter("color", "red")
            .with_confidence(0.7);
        let err = IntentValidator::strict().validate(&intent, &schema()).unwrap_err();
        assert_eq!(err.field(), "filters");
    }

    #[test]
    fn test_validate_value_builds_intent() {
        let value = json!({
            "domain": "transactions",
            "action": "list",
            "filters": {"amount_gt": 10000, "status": "שולם"},
            "confidence": 0.8,
            "explanation": "חשבוניות מעל 10,000"
        });
        let (intent, report) = IntentValidator::strict()
            .validate_value(&value, &schema(), IntentSource::Model)
            .unwrap();
        assert!(report.is_clean());
        assert_eq!(intent.domain(), "transactions");
        assert_eq!(intent.filter("amount_gt"), Some(&FilterValue::Integer(10000)));
        assert_eq!(intent.source(), IntentSource::Model);
    }

    #[test]
    fn test_validate_value_check_order() {
        let err = IntentValidator::new()
            .validate_value(&json!({"domain": "nope"}), &schema(), IntentSource::Caller)
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("action"));

        let err = IntentValidator::new()
            .validate_value(
                &json!({"domain": "nope", "action": "list", "confidence": 0.5}),
                &schema(),
                IntentSource::Caller,
            )
            .unwrap_err();
        assert_eq!(err.field(), "domain");

        let err = IntentValidator::new()
            .validate_value(
                &json!({"domain": "tabarim", "action": "drop", "confidence": 0.5}),
                &schema(),
                IntentSource::Caller,
            )
            .unwrap_err();
        assert_eq!(err.field(), "action");

        let err = IntentValidator::new()
            .validate_value(
                &json!({"domain": "tabarim", "action": "list", "confidence": "high"}),
                &schema(),
                IntentSource::Caller,
            )
            .unwrap_err();
        assert_eq!(err.field(), "confidence");
    }

    #[test]
    fn test_validate_value_rejects_nested_filter() {
        let value = json!({
            "domain": "tabarim",
            "action": "list",
            "confidence": 0.5,
            "filters": {"status": ["פעיל", "סגור"]}
        });
        let err = IntentValidator::new()
            .validate_value(&value, &schema(), IntentSource::Caller)
            .unwrap_err();
        assert_eq!(err.field(), "filters");
    }

    #[test]
    fn test_strict_requires_explanation() {
        let value = json!({
            "domain": "tabarim",
            "action": "list",
            "confidence": 0.5,
            "filters": {}
        });
        let err = IntentValidator::strict()
            .validate_value(&value, &schema(), IntentSource::Model)
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("explanation"));
    }
}
