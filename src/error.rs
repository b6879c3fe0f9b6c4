//! Error types for the budget report engine.

use thiserror::Error;

/// Main error type for report operations.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Parsing failed: {0}")]
    ParsingFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Request cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReportError {
    /// Safe, localized message for the person who asked the question.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::EmptyQuery) => "יש להזין שאלה".to_string(),
            Self::Validation(e) => format!("הבקשה אינה תקינה (שדה: {})", e.field()),
            Self::ParsingFailed(_) => "לא ניתן היה לפענח את השאלה".to_string(),
            Self::Database(DatabaseError::NotConfigured) => {
                "מקור הנתונים אינו מוגדר".to_string()
            }
            Self::Database(_) => "אירעה שגיאה בשליפת הנתונים, נסו שוב מאוחר יותר".to_string(),
            Self::Configuration(_) => "שגיאת תצורה במערכת הדוחות".to_string(),
            Self::Cancelled => "הבקשה בוטלה".to_string(),
            Self::Io(_) | Self::Serialization(_) => "אירעה שגיאה פנימית".to_string(),
        }
    }

    /// Internal diagnostic detail. Not meant for end users.
    pub fn detail(&self) -> String {
        self.to_string()
    }

    /// Short machine-readable code used by the REST surface.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::ParsingFailed(_) => "parsing_failed",
            Self::Database(DatabaseError::Timeout(_)) => "database_timeout",
            Self::Database(_) => "database_error",
            Self::Configuration(_) => "configuration_error",
            Self::Cancelled => "cancelled",
            Self::Io(_) | Self::Serialization(_) => "internal_error",
        }
    }
}

/// Intent validation failures. Each variant names the violated field.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Query text is empty")]
    EmptyQuery,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Confidence must be a number in [0, 1], got {0}")]
    InvalidConfidence(String),

    #[error("Invalid shape for {field}: {reason}")]
    InvalidShape { field: &'static str, reason: String },
}

impl ValidationError {
    /// Name of the intent field that failed validation.
    pub fn field(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "query",
            Self::MissingField(field) => field,
            Self::UnknownDomain(_) => "domain",
            Self::UnknownAction(_) => "action",
            Self::InvalidConfidence(_) => "confidence",
            Self::InvalidShape { field, .. } => field,
        }
    }
}

/// Datastore failures.
#[derive(Error, Debug, Clone)]
pub enum DatabaseError {
    #[error("Query timed out after {0}ms")]
    Timeout(u64),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("No datastore configured")]
    NotConfigured,
}

impl DatabaseError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connection(_))
    }
}

/// Configuration and schema errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to parse schema: {0}")]
    Schema(#[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Schema references unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Schema references unknown field {field} in domain {domain}")]
    UnknownField { domain: String, field: String },
}

/// Model-assisted parsing failures. These never leave the parser.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("API error: {0}")]
    Api(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Response violates the output contract: {0}")]
    Contract(String),
}

/// Result type alias for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;
