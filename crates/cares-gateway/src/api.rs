//! HTTP handlers for the message gateway

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cares_core::prelude::*;
use cares_core::unique_id;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::SharedState;

/// Route labels for metrics
pub mod routes {
    pub const SEND: &str = "/messages/send";
    pub const BROADCAST: &str = "/messages/broadcast";
    pub const EMAIL: &str = "/email/send";
    pub const HEALTH: &str = "/health";
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Error body answered by every route
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Failure of a request, mapped onto a status code
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal { error: String, details: Option<Value> },
}

impl ApiError {
    /// Validation errors become 400s, everything else a 500
    pub fn from_error(e: CaresError, fallback: &str) -> Self {
        match e {
            CaresError::Validation { message } => ApiError::BadRequest(message),
            other => {
                let message = other.to_string();
                ApiError::Internal {
                    error: if message.is_empty() {
                        fallback.to_string()
                    } else {
                        message
                    },
                    details: Some(other.details()),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::BadRequest(error) => (StatusCode::BAD_REQUEST, error, None),
            ApiError::Internal { error, details } => {
                (StatusCode::INTERNAL_SERVER_ERROR, error, details)
            }
        };
        let body = ErrorResponse {
            success: false,
            error,
            details,
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
    pub document_id: String,
    pub data: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailResponse {
    pub success: bool,
    pub message_id: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Parse a JSON request body; an empty body reads as `{}`
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "Rejected request body");
        ApiError::BadRequest("Invalid JSON payload".to_string())
    })
}

fn finish<T: Serialize>(
    state: &SharedState,
    route: &'static str,
    result: ApiResult<T>,
) -> Response {
    let response = match result {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response(),
    };
    state.metrics.record_request(route, response.status().as_u16());
    response
}

pub async fn health(State(state): State<SharedState>) -> Response {
    let body = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    };
    finish(&state, routes::HEALTH, Ok(body))
}

pub async fn send_message(State(state): State<SharedState>, body: Bytes) -> Response {
    let result = deliver_direct(&state, &body).await;
    finish(&state, routes::SEND, result)
}

pub async fn broadcast_message(State(state): State<SharedState>, body: Bytes) -> Response {
    let result = deliver_broadcast(&state, &body).await;
    finish(&state, routes::BROADCAST, result)
}

pub async fn send_email(State(state): State<SharedState>, body: Bytes) -> Response {
    let result = deliver_email(&state, &body).await;
    finish(&state, routes::EMAIL, result)
}

const SEND_FAILED: &str = "Failed to send message";
const BROADCAST_FAILED: &str = "Failed to send broadcast message";

async fn deliver_direct(state: &SharedState, body: &Bytes) -> ApiResult<MessageResponse> {
    let request: MessageRequest = parse_body(body)?;
    let fail = |e| ApiError::from_error(e, SEND_FAILED);

    let document = MessageDocument::direct(&request, Utc::now()).map_err(fail)?;
    let (document_id, data) = persist(state, &document).await.map_err(|e| {
        error!(error = %e, "Error sending message");
        fail(e)
    })?;

    if let Some(to) = request.email_target() {
        let email = EmailRequest::for_message(to, &document);
        trigger_email(state, &email).await.map_err(|e| {
            error!(error = %e, "Error triggering email notification");
            fail(e)
        })?;
    }

    info!(
        document_id = %document_id,
        sender = %document.sender_id,
        receiver = %document.receiver_id,
        "Message sent"
    );
    Ok(MessageResponse {
        success: true,
        message: "Message sent successfully",
        document_id,
        data,
    })
}

async fn deliver_broadcast(state: &SharedState, body: &Bytes) -> ApiResult<MessageResponse> {
    let request: MessageRequest = parse_body(body)?;
    let fail = |e| ApiError::from_error(e, BROADCAST_FAILED);

    let document = MessageDocument::broadcast(&request, Utc::now()).map_err(fail)?;
    let (document_id, data) = persist(state, &document).await.map_err(|e| {
        error!(error = %e, "Error sending broadcast message");
        fail(e)
    })?;

    info!(document_id = %document_id, sender = %document.sender_id, "Broadcast sent");
    Ok(MessageResponse {
        success: true,
        message: "Broadcast message sent successfully",
        document_id,
        data,
    })
}

/// Store a message document under a fresh id
async fn persist(state: &SharedState, document: &MessageDocument) -> Result<(String, Value)> {
    let document_id = unique_id();
    let data = serde_json::to_value(document)?;

    let stored = state
        .documents
        .create_document(
            &state.database_id,
            &state.messages_collection_id,
            &document_id,
            &data,
        )
        .await?;

    let stored_id = stored
        .get("$id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(document_id);
    Ok((stored_id, stored))
}

async fn trigger_email(state: &SharedState, email: &EmailRequest) -> Result<()> {
    let body = serde_json::to_value(email)?;
    state
        .functions
        .create_execution(&state.email_function_id, &body)
        .await?;
    state.metrics.record_email("triggered");
    Ok(())
}

async fn deliver_email(state: &SharedState, body: &Bytes) -> ApiResult<EmailResponse> {
    let request: EmailRequest = parse_body(body)?;
    let email = request
        .resolve(&state.email_from, &state.default_subject)
        .map_err(|e| ApiError::from_error(e, "Failed to send email"))?;

    let Some(mailer) = &state.mailer else {
        state.metrics.record_email("unconfigured");
        return Err(ApiError::Internal {
            error: "Email delivery is not configured: SMTP_USER and SMTP_PASS are not set"
                .to_string(),
            details: None,
        });
    };

    match mailer.send(&email).await {
        Ok(message_id) => {
            state.metrics.record_email("sent");
            info!(mailer = mailer.name(), message_id = %message_id, "Email sent");
            Ok(EmailResponse {
                success: true,
                message_id,
            })
        }
        Err(e) => {
            state.metrics.record_email("failed");
            error!(mailer = mailer.name(), error = %e, "Email send error");
            Err(ApiError::Internal {
                error: e.to_string(),
                details: None,
            })
        }
    }
}
