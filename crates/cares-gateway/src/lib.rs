//! # Cares Gateway
//!
//! HTTP message gateway and email sender for the Christy Cares app.
//!
//! ## Routes
//!
//! - `POST /messages/send`: persist a direct message, optionally notify by email
//! - `POST /messages/broadcast`: persist a community-wide message
//! - `POST /email/send`: deliver one notification email over SMTP
//! - `GET /health`
//!
//! The gateway assumes the schema already exists; run `cares-provision setup`
//! first.

pub mod api;
pub mod email;

pub use self::email::*;

use axum::routing::{get, post};
use axum::Router;
use cares_core::prelude::*;
use cares_core::GatewayMetrics;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Shared handler state
pub struct GatewayState {
    pub documents: Arc<dyn DocumentStore>,
    pub functions: Arc<dyn FunctionRunner>,
    /// `None` when no SMTP credentials are configured
    pub mailer: Option<Arc<dyn Mailer>>,
    pub database_id: String,
    pub messages_collection_id: String,
    pub email_function_id: String,
    pub email_from: String,
    pub default_subject: String,
    pub metrics: GatewayMetrics,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(
        config: &CaresConfig,
        documents: Arc<dyn DocumentStore>,
        functions: Arc<dyn FunctionRunner>,
        mailer: Option<Arc<dyn Mailer>>,
    ) -> Self {
        Self {
            documents,
            functions,
            mailer,
            database_id: config.appwrite.database_id.clone(),
            messages_collection_id: config.gateway.messages_collection_id.clone(),
            email_function_id: config.gateway.email_function_id.clone(),
            email_from: config.smtp.from.clone(),
            default_subject: config.smtp.default_subject.clone(),
            metrics: GatewayMetrics::new(),
        }
    }
}

/// Build the gateway router
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/messages/send", post(api::send_message))
        .route("/messages/broadcast", post(api::broadcast_message))
        .route("/email/send", post(api::send_email))
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn run(listener: TcpListener, state: SharedState) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|e| CaresError::Internal(format!("listener has no address: {e}")))?;
    info!(listen = %local, "Gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .map_err(|e| CaresError::Internal(format!("server error: {e}")))
}
