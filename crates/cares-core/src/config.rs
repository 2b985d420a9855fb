//! Configuration types for the Christy Cares backend
//!
//! Uses the `config` crate for layered configuration: built-in defaults, an
//! optional file, then `CARES__SECTION__KEY` environment variables. The
//! binaries additionally accept the flat variable names used by the hosted
//! functions (`APPWRITE_ENDPOINT`, `SMTP_HOST`, ...) through their CLI flags.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{CaresError, Result};

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaresConfig {
    /// Remote store connection
    #[serde(default)]
    pub appwrite: AppwriteConfig,

    /// Message gateway service
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Outgoing email
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ============================================================================
// Appwrite Configuration
// ============================================================================

/// Appwrite connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppwriteConfig {
    /// REST endpoint including the `/v1` suffix
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Project the API key belongs to
    #[serde(default)]
    pub project_id: String,

    /// Server API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Database holding the collections
    #[serde(default = "default_database_id")]
    pub database_id: String,

    /// Connection timeout
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    /// Request timeout
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,
}

fn default_endpoint() -> String {
    "https://nyc.cloud.appwrite.io/v1".to_string()
}

fn default_database_id() -> String {
    "christy-cares-db".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for AppwriteConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            project_id: String::new(),
            api_key: None,
            database_id: default_database_id(),
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl AppwriteConfig {
    /// Ensure the credentials needed for server-side calls are present
    pub fn require_credentials(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(CaresError::config("APPWRITE_PROJECT_ID is not set"));
        }
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(CaresError::config("APPWRITE_API_KEY is not set")),
        }
    }
}

// ============================================================================
// Gateway Configuration
// ============================================================================

/// Message gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// HTTP listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Collection receiving message documents
    #[serde(default = "default_messages_collection")]
    pub messages_collection_id: String,

    /// Function triggered for email notifications
    #[serde(default = "default_email_function")]
    pub email_function_id: String,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_messages_collection() -> String {
    "messages".to_string()
}

fn default_email_function() -> String {
    "email-notifications".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            messages_collection_id: default_messages_collection(),
            email_function_id: default_email_function(),
        }
    }
}

// ============================================================================
// SMTP Configuration
// ============================================================================

/// Outgoing email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,

    /// Submission port, upgraded with STARTTLS
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,

    /// Sender used when a request does not name one
    #[serde(default = "default_email_from")]
    pub from: String,

    /// Subject used when a request does not name one
    #[serde(default = "default_email_subject")]
    pub default_subject: String,
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_email_from() -> String {
    "\"Christy Cares\" <noreply@christy-cares.com>".to_string()
}

fn default_email_subject() -> String {
    "Notification from Christy Cares".to_string()
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            user: None,
            pass: None,
            from: default_email_from(),
            default_subject: default_email_subject(),
        }
    }
}

impl SmtpConfig {
    /// Username and password, when both are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (self.user.as_deref(), self.pass.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() => Some((user, pass)),
            _ => None,
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

impl CaresConfig {
    /// Load configuration from file and environment
    pub fn load(path: Option<&str>) -> std::result::Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default values
        builder = builder.add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        // CARES__APPWRITE__PROJECT_ID and friends
        builder = builder.add_source(
            config::Environment::with_prefix("CARES")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CaresConfig::default();

        assert_eq!(config.appwrite.endpoint, "https://nyc.cloud.appwrite.io/v1");
        assert_eq!(config.appwrite.database_id, "christy-cares-db");
        assert_eq!(config.gateway.messages_collection_id, "messages");
        assert_eq!(config.smtp.port, 587);
        assert!(config.smtp.credentials().is_none());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let mut appwrite = AppwriteConfig::default();
        assert!(appwrite.require_credentials().is_err());

        appwrite.project_id = "689fd36e0032936147b1".into();
        assert!(appwrite.require_credentials().is_err());

        appwrite.api_key = Some("secret".into());
        assert!(appwrite.require_credentials().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cares.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[appwrite]
project_id = "proj"
database_id = "staging-db"
request_timeout = "5s"

[gateway]
listen = "127.0.0.1:9000"
"#
        )
        .unwrap();

        let config = CaresConfig::load(Some(path.to_str().unwrap())).unwrap();

        assert_eq!(config.appwrite.project_id, "proj");
        assert_eq!(config.appwrite.database_id, "staging-db");
        assert_eq!(config.appwrite.request_timeout, Duration::from_secs(5));
        assert_eq!(config.appwrite.endpoint, "https://nyc.cloud.appwrite.io/v1");
        assert_eq!(config.gateway.listen, "127.0.0.1:9000");
    }
}
