//! Unified error handling
//!
//! Every fallible operation in the workspace returns [`AtriumResult`].
//! Errors carry an [`ErrorContext`] with a unique id, the component that
//! raised them, and recovery suggestions suitable for support tickets.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Context attached to structured error variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique id for correlating logs with user reports.
    pub error_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Component that raised the error.
    pub component: String,
    /// Operation in flight when the error was raised.
    pub operation: Option<String>,
    pub metadata: HashMap<String, String>,
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Workspace-wide error type.
#[derive(Error, Debug)]
pub enum AtriumError {
    #[error("HTTP error: {message}")]
    Http {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("API error ({status}): {message}")]
    Api {
        message: String,
        status: u16,
        context: ErrorContext,
    },

    #[error("Authentication error: {message}")]
    Auth {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Timeout after {duration_ms}ms during {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

pub type AtriumResult<T> = Result<T, AtriumError>;

impl AtriumError {
    /// Structured context, when the variant carries one.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            AtriumError::Http { context, .. }
            | AtriumError::Api { context, .. }
            | AtriumError::Auth { context, .. }
            | AtriumError::Config { context, .. }
            | AtriumError::Storage { context, .. }
            | AtriumError::Validation { context, .. }
            | AtriumError::Timeout { context, .. }
            | AtriumError::Internal { context, .. } => Some(context),
            AtriumError::Io(_) | AtriumError::Serialization(_) => None,
        }
    }

    /// Whether retrying the same operation can reasonably succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AtriumError::Http { .. } | AtriumError::Timeout { .. }
        )
    }

    /// Suggested delay before a retry, for recoverable errors.
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            AtriumError::Http { .. } => Some(1000),
            AtriumError::Timeout { .. } => Some(2000),
            _ => None,
        }
    }

    /// Log at a severity matching the variant.
    pub fn log(&self) {
        match self {
            AtriumError::Http { .. } | AtriumError::Timeout { .. } => {
                tracing::warn!(error = %self, "recoverable error");
            }
            AtriumError::Api { status, .. } => {
                tracing::warn!(error = %self, status = status, "API rejected request");
            }
            AtriumError::Auth { .. } => {
                tracing::warn!(error = %self, "authentication failed");
            }
            _ => {
                tracing::error!(error = %self, "operation failed");
            }
        }

        if let Some(context) = self.context() {
            tracing::debug!(
                error_id = %context.error_id,
                component = %context.component,
                operation = ?context.operation,
                "error context"
            );
            for suggestion in &context.recovery_suggestions {
                tracing::debug!(error_id = %context.error_id, suggestion = %suggestion);
            }
        }
    }
}

/// Build an [`AtriumError::Http`] with component context.
#[macro_export]
macro_rules! http_error {
    ($msg:expr) => {
        AtriumError::Http {
            message: $msg.to_string(),
            source: None,
            context: ErrorContext::new("http"),
        }
    };
    ($msg:expr, $source:expr) => {
        AtriumError::Http {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: ErrorContext::new("http"),
        }
    };
}

/// Build an [`AtriumError::Auth`] with component context.
#[macro_export]
macro_rules! auth_error {
    ($msg:expr) => {
        AtriumError::Auth {
            message: $msg.to_string(),
            source: None,
            context: ErrorContext::new("auth"),
        }
    };
    ($msg:expr, $source:expr) => {
        AtriumError::Auth {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: ErrorContext::new("auth"),
        }
    };
}
