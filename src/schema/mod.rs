//! Schema registry: the read-only description of queryable domains.
//!
//! The registry is loaded once (from the built-in municipal description or a
//! JSON file), validated, and then shared as `Arc<SchemaRegistry>` across
//! requests.

mod types;

pub use types::*;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

const MUNICIPAL_SCHEMA: &str = include_str!("municipal.json");

/// Validated collection of domains.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaRegistry {
    domains: Vec<Domain>,
    #[serde(skip)]
    fallback_index: usize,
}

#[derive(Deserialize)]
struct RawRegistry {
    domains: Vec<Domain>,
}

impl SchemaRegistry {
    /// Build a registry from domains, validating every invariant.
    pub fn new(domains: Vec<Domain>) -> Result<Self> {
        let fallback_index = validate_domains(&domains)?;
        Ok(Self {
            domains,
            fallback_index,
        })
    }

    /// Parse a registry from its JSON form.
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: RawRegistry = serde_json::from_str(content).map_err(ConfigError::Schema)?;
        Self::new(raw.domains)
    }

    /// Load a registry from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::ReadFile)?;
        Self::from_json(&content)
    }

    /// The built-in municipal budget registry.
    pub fn municipal() -> Result<Self> {
        Self::from_json(MUNICIPAL_SCHEMA)
    }

    /// All domains in declaration order.
    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    /// Look up a domain by key.
    pub fn domain(&self, key: &str) -> Option<&Domain> {
        self.domains.iter().find(|d| d.key == key)
    }

    /// The generic domain used by the guaranteed fallback.
    pub fn fallback_domain(&self) -> &Domain {
        &self.domains[self.fallback_index]
    }

    /// Domain keys in declaration order.
    pub fn domain_keys(&self) -> Vec<&str> {
        self.domains.iter().map(|d| d.key.as_str()).collect()
    }
}

/// Check registry invariants and return the fallback domain's index.
fn validate_domains(domains: &[Domain]) -> Result<usize> {
    let mut keys = HashSet::new();
    for domain in domains {
        if domain.key.is_empty() {
            return Err(ConfigError::MissingField("domain.key".to_string()).into());
        }
        if domain.table.is_empty() {
            return Err(ConfigError::MissingField(format!("{}.table", domain.key)).into());
        }
        if !keys.insert(domain.key.as_str()) {
            return Err(
                ConfigError::Invalid(format!("duplicate domain key: {}", domain.key)).into(),
            );
        }

        let mut field_keys = HashSet::new();
        for field in &domain.fields {
            if !field_keys.insert(field.key.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate field {} in domain {}",
                    field.key, domain.key
                ))
                .into());
            }
            if field.field_type == FieldType::Enum
                && field.enum_values.as_ref().map_or(true, |v| v.is_empty())
            {
                return Err(ConfigError::MissingField(format!(
                    "{}.{}.enumValues",
                    domain.key, field.key
                ))
                .into());
            }
        }

        for field in &domain.fields {
            if let Some(source) = &field.derived_from {
                if domain.field(source).is_none() {
                    return Err(ConfigError::UnknownField {
                        domain: domain.key.clone(),
                        field: source.clone(),
                    }
                    .into());
                }
            }
        }

        for key in &domain.default_fields {
            if domain.field(key).is_none() {
                return Err(ConfigError::UnknownField {
                    domain: domain.key.clone(),
                    field: key.clone(),
                }
                .into());
            }
        }
    }

    for domain in domains {
        for field in &domain.fields {
            let Some(reference) = &field.foreign_key else {
                continue;
            };
            let (target_domain, target_field) = reference.split_once('.').ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "foreign key {} on {}.{} must be <domain>.<field>",
                    reference, domain.key, field.key
                ))
            })?;
            let target = domains
                .iter()
                .find(|d| d.key == target_domain)
                .ok_or_else(|| ConfigError::UnknownDomain(target_domain.to_string()))?;
            if target.field(target_field).is_none() {
                return Err(ConfigError::UnknownField {
                    domain: target_domain.to_string(),
                    field: target_field.to_string(),
                }
                .into());
            }
        }
    }

    let mut fallbacks = domains
        .iter()
        .enumerate()
        .filter(|(_, d)| d.fallback)
        .map(|(i, _)| i);
    let index = fallbacks
        .next()
        .ok_or_else(|| ConfigError::MissingField("fallback domain".to_string()))?;
    if fallbacks.next().is_some() {
        return Err(ConfigError::Invalid("more than one fallback domain".to_string()).into());
    }

    Ok(index)
}
