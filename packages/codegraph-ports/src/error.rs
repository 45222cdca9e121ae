//! Error types for codegraph-ports

use std::fmt;
use thiserror::Error;

/// Port error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortErrorKind {
    /// Query execution failed
    Query,
    /// Node or relationship creation failed
    Write,
    /// Completion service call failed
    Completion,
    /// Serialization/deserialization errors
    Serialization,
    /// Backing service is not reachable or not configured
    Unavailable,
    /// A returned record is missing a required column or has the wrong type
    InvalidRecord,
}

impl PortErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortErrorKind::Query => "query",
            PortErrorKind::Write => "write",
            PortErrorKind::Completion => "completion",
            PortErrorKind::Serialization => "serialization",
            PortErrorKind::Unavailable => "unavailable",
            PortErrorKind::InvalidRecord => "invalid_record",
        }
    }
}

impl fmt::Display for PortErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Port error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct PortError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: PortErrorKind,
    pub message: String,
}

impl PortError {
    pub fn new(kind: PortErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(PortErrorKind::Query, message)
    }

    pub fn write(message: impl Into<String>) -> Self {
        Self::new(PortErrorKind::Write, message)
    }

    pub fn completion(message: impl Into<String>) -> Self {
        Self::new(PortErrorKind::Completion, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(PortErrorKind::Unavailable, message)
    }

    pub fn invalid_record(column: &str, expected: &str) -> Self {
        Self::new(
            PortErrorKind::InvalidRecord,
            format!("column '{}' missing or not {}", column, expected),
        )
    }
}

// JSON error conversions
impl From<serde_json::Error> for PortError {
    fn from(err: serde_json::Error) -> Self {
        PortError::new(PortErrorKind::Serialization, format!("JSON error: {}", err)).with_source(err)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PortError>;
