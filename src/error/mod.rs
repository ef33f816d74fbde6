//! Error types for the workflow engine.
//!
//! [`WorkflowError`] carries the error *kinds* the engine surfaces at its boundaries
//! (operation failure, validation failure, compensation failure, circuit-open, persistence
//! failure, invalid configuration, audit failure) rather than wrapping every downstream
//! library error individually. Downstream collaborators (operations, persistence providers,
//! audit sinks) convert their own errors into one of these variants before they cross into
//! engine-owned control flow.

pub mod circuit_breaker;
pub mod context;

use std::collections::HashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use context::{categorize_error, CorrelationIdGenerator, ErrorContext, ErrorContextExt};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// The error kinds the engine raises or propagates.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("operation '{operation_name}' failed: {message}")]
    OperationFailed {
        operation_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("operation '{operation_name}' was cancelled")]
    OperationCancelled { operation_name: String },

    #[error("validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("compensation failed: {success_count} succeeded, {failure_count} failed: {messages:?}")]
    CompensationFailed {
        success_count: usize,
        failure_count: usize,
        messages: Vec<String>,
    },

    #[error("circuit '{name}' is open")]
    CircuitOpen { name: String },

    #[error("persistence operation failed: {message}")]
    PersistenceFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Invalid WorkflowForge options: {0}")]
    ConfigurationInvalid(String),

    #[error("audit sink failed: {message}")]
    AuditFailed { message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    pub fn operation_failed(operation_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation_name: operation_name.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn configuration_invalid(invalid_fields: &[String]) -> Self {
        Self::ConfigurationInvalid(invalid_fields.join("; "))
    }

    /// Stable discriminant name recorded as `Error.Type` in checkpointed foundry properties.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::OperationFailed { .. } => "OperationFailed",
            Self::OperationCancelled { .. } => "OperationCancelled",
            Self::ValidationFailed { .. } => "ValidationFailed",
            Self::CompensationFailed { .. } => "CompensationFailed",
            Self::CircuitOpen { .. } => "CircuitOpen",
            Self::PersistenceFailed { .. } => "PersistenceFailed",
            Self::ConfigurationInvalid(_) => "ConfigurationInvalid",
            Self::AuditFailed { .. } => "AuditFailed",
            Self::Internal(_) => "Internal",
        }
    }
}

/// One field-level validation failure, as surfaced by validation middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub property_name: String,
    pub error_message: String,
}

/// Coarse error classification, used for logging and for deciding whether a resilience
/// strategy should retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    Transient,
    Permanent,
    User,
    System,
    Business,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Structured metadata attached to an [`ErrorContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorMetadata {
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub error_code: String,
    pub correlation_id: Option<String>,
    pub context: HashMap<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub retry_count: u32,
}

impl ErrorMetadata {
    pub fn new(category: ErrorCategory, severity: ErrorSeverity, error_code: impl Into<String>) -> Self {
        Self {
            category,
            severity,
            error_code: error_code.into(),
            correlation_id: None,
            context: HashMap::new(),
            timestamp: Utc::now(),
            retry_count: 0,
        }
    }
}
