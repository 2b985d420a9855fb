//! Error types for the Christy Cares backend
//!
//! Uses `thiserror` for ergonomic error handling with full context preservation.
//! Every remote failure is mapped onto exactly one [`ErrorClass`] so callers can
//! branch on the class instead of matching transport details.

use std::fmt;
use thiserror::Error;

/// Result type alias for backend operations
pub type Result<T> = std::result::Result<T, CaresError>;

/// Primary error type for all backend operations
#[derive(Error, Debug)]
pub enum CaresError {
    /// The remote resource does not exist
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// The remote resource already exists
    #[error("Already exists: {resource}")]
    AlreadyExists { resource: String },

    /// Credentials were rejected by the remote store
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// The remote store could not be reached at all
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Any other error answered by the remote store
    #[error("Remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Request payload failed validation
    #[error("{message}")]
    Validation { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Email composition or delivery errors
    #[error("Email error: {message}")]
    Email {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classification of an error for idempotent provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Resource is absent; the caller may create it
    NotFound,
    /// Resource is present; creation is a no-op
    AlreadyExists,
    /// Nothing further can succeed (bad credentials, unreachable store)
    Fatal,
    /// Failure local to one resource
    Other,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::Fatal => "fatal",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

impl CaresError {
    /// Create a not-found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an already-exists error
    pub fn already_exists(resource: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a transport error with source
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a remote error
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an email error
    pub fn email(message: impl Into<String>) -> Self {
        Self::Email {
            message: message.into(),
            source: None,
        }
    }

    /// Create an email error with source
    pub fn email_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Email {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Map an HTTP status answered by the remote store onto an error
    ///
    /// 404 and 409 become the idempotency signals, 401 is an authentication
    /// failure, everything else is kept as a remote error with its status.
    pub fn from_status(status: u16, message: impl Into<String>, resource: &str) -> Self {
        let message = message.into();
        match status {
            404 => Self::not_found(resource),
            409 => Self::already_exists(resource),
            401 => Self::authentication(message),
            _ => Self::remote(status, message),
        }
    }

    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::AlreadyExists { .. } => ErrorClass::AlreadyExists,
            Self::Authentication { .. } | Self::Transport { .. } => ErrorClass::Fatal,
            _ => ErrorClass::Other,
        }
    }

    /// Check if no further remote call can be expected to succeed
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }

    /// Check if this error ends a multi-call run
    ///
    /// Rejected credentials always do. An unreachable store only does on the
    /// first call of the run; later transport errors belong to one resource.
    pub fn aborts_run(&self, first_call: bool) -> bool {
        match self {
            Self::Authentication { .. } => true,
            Self::Transport { .. } => first_call,
            _ => false,
        }
    }

    /// Short machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Authentication { .. } => "authentication",
            Self::Transport { .. } => "transport",
            Self::Remote { .. } => "remote",
            Self::Validation { .. } => "validation",
            Self::Configuration { .. } => "configuration",
            Self::Serialization { .. } => "serialization",
            Self::Email { .. } => "email",
            Self::Internal(_) => "internal",
        }
    }

    /// Structured details for error responses
    pub fn details(&self) -> serde_json::Value {
        let mut details = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        if let Self::Remote { status, .. } = self {
            details["status"] = serde_json::json!(status);
        }
        details
    }
}

impl From<serde_json::Error> for CaresError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

impl From<config::ConfigError> for CaresError {
    fn from(e: config::ConfigError) -> Self {
        Self::config(e.to_string())
    }
}
