//! Cares Gateway CLI

use anyhow::Context;
use cares_appwrite::{AppwriteClient, AppwriteClientConfig};
use cares_core::prelude::*;
use cares_gateway::{GatewayState, SmtpMailer};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "cares-gateway")]
#[command(about = "Message gateway and email sender for the Christy Cares backend")]
#[command(version)]
struct Args {
    /// Optional configuration file
    #[arg(long, env = "CARES_CONFIG")]
    config: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Appwrite
    // ─────────────────────────────────────────────────────────────────────────
    #[arg(long, env = "APPWRITE_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, env = "APPWRITE_PROJECT_ID")]
    project_id: Option<String>,

    #[arg(long, env = "APPWRITE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "DATABASE_ID")]
    database_id: Option<String>,

    #[arg(long, env = "MESSAGES_COLLECTION_ID")]
    messages_collection_id: Option<String>,

    #[arg(long, env = "EMAIL_FUNCTION_ID")]
    email_function_id: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // SMTP
    // ─────────────────────────────────────────────────────────────────────────
    #[arg(long, env = "SMTP_HOST")]
    smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT")]
    smtp_port: Option<u16>,

    #[arg(long, env = "SMTP_USER")]
    smtp_user: Option<String>,

    #[arg(long, env = "SMTP_PASS", hide_env_values = true)]
    smtp_pass: Option<String>,

    #[arg(long, env = "EMAIL_FROM")]
    email_from: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Server and logging
    // ─────────────────────────────────────────────────────────────────────────
    /// HTTP listen address
    #[arg(long, env = "GATEWAY_LISTEN")]
    listen: Option<String>,

    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: json or pretty
    #[arg(long, env = "LOG_FORMAT")]
    log_format: Option<String>,
}

fn set(target: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

impl Args {
    /// Layered configuration with CLI and flat environment overrides applied
    fn resolve_config(&self) -> anyhow::Result<CaresConfig> {
        let mut config = CaresConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;

        set(&mut config.appwrite.endpoint, &self.endpoint);
        set(&mut config.appwrite.project_id, &self.project_id);
        set(&mut config.appwrite.database_id, &self.database_id);
        set(&mut config.gateway.messages_collection_id, &self.messages_collection_id);
        set(&mut config.gateway.email_function_id, &self.email_function_id);
        set(&mut config.gateway.listen, &self.listen);
        set(&mut config.smtp.host, &self.smtp_host);
        set(&mut config.smtp.from, &self.email_from);
        set(&mut config.observability.log_level, &self.log_level);
        set(&mut config.observability.log_format, &self.log_format);

        if self.api_key.is_some() {
            config.appwrite.api_key = self.api_key.clone();
        }
        if let Some(port) = self.smtp_port {
            config.smtp.port = port;
        }
        if self.smtp_user.is_some() {
            config.smtp.user = self.smtp_user.clone();
        }
        if self.smtp_pass.is_some() {
            config.smtp.pass = self.smtp_pass.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.resolve_config()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));
    if config.observability.log_format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting cares-gateway");

    config.appwrite.require_credentials()?;
    let client = Arc::new(AppwriteClient::new(AppwriteClientConfig::from(&config.appwrite))?);

    let mailer: Option<Arc<dyn Mailer>> = match SmtpMailer::new(&config.smtp) {
        Ok(mailer) => {
            info!(host = %config.smtp.host, port = config.smtp.port, "SMTP mailer configured");
            Some(Arc::new(mailer))
        }
        Err(e) => {
            warn!(error = %e, "Email delivery disabled");
            None
        }
    };

    let state = GatewayState::new(&config, client.clone(), client, mailer);

    let listener = TcpListener::bind(&config.gateway.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.gateway.listen))?;

    if let Err(e) = cares_gateway::run(listener, Arc::new(state)).await {
        error!(error = %e, "Gateway failed");
        return Err(e.into());
    }

    info!("cares-gateway stopped");
    Ok(())
}
