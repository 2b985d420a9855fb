//! Message types for the Christy Cares backend
//!
//! Defines the gateway request payloads and the message document persisted in
//! the `messages` collection, plus the email payloads exchanged with the
//! email-notifications function.

use crate::error::{CaresError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Receiver id stamped on broadcast messages
pub const BROADCAST_RECEIVER: &str = "broadcast";

/// Default delivery channel
pub const DEFAULT_CHANNEL: &str = "app";

/// Message-send or broadcast request
///
/// Every field is optional on the wire; required fields are checked by
/// [`MessageRequest::validate_direct`] and [`MessageRequest::validate_broadcast`].
/// Fields are read by JSON truthiness: scalars are coerced to strings and
/// falsy values (`null`, `false`, `0`, `""`) count as absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub sender_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sender_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sender_email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sender_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub receiver_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub recipient_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub recipient_email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub recipient_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subject: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub channel: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub attachments: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub send_email: bool,
}

/// Truthiness of a JSON value: null, false, zero and "" are falsy
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn coerce(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(truthy(&value).then(|| coerce(value)))
}

fn lenient_list<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(items.into_iter().map(coerce).collect()),
        value if truthy(&value) => Some(vec![coerce(value)]),
        _ => None,
    })
}

fn lenient_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(truthy(&Value::deserialize(deserializer)?))
}

/// Present and non-empty
fn given(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn or_empty(value: &Option<String>) -> String {
    given(value).unwrap_or_default().to_string()
}

impl MessageRequest {
    /// Check required fields of a direct message
    pub fn validate_direct(&self) -> Result<()> {
        let complete = [&self.sender_id, &self.sender_name, &self.receiver_id, &self.content]
            .iter()
            .all(|field| given(field).is_some());
        if complete {
            Ok(())
        } else {
            Err(CaresError::validation(
                "Missing required fields: senderId, senderName, receiverId, or content",
            ))
        }
    }

    /// Check required fields of a broadcast message
    pub fn validate_broadcast(&self) -> Result<()> {
        let complete = [&self.sender_id, &self.sender_name, &self.content]
            .iter()
            .all(|field| given(field).is_some());
        if complete {
            Ok(())
        } else {
            Err(CaresError::validation(
                "Missing required fields: senderId, senderName, or content",
            ))
        }
    }

    /// Recipient address when an email notification was requested
    pub fn email_target(&self) -> Option<&str> {
        if self.send_email {
            given(&self.recipient_email)
        } else {
            None
        }
    }
}

/// Document stored in the `messages` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDocument {
    pub sender_id: String,
    pub sender_name: String,
    pub sender_email: String,
    pub sender_phone: String,
    pub receiver_id: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub recipient_phone: String,
    pub content: String,
    pub subject: String,
    pub timestamp: String,
    pub created_at: String,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub channel: String,
    pub status: String,
    pub attachments: Vec<String>,
    /// JSON-encoded metadata object
    pub metadata: String,
}

/// ISO-8601 UTC with millisecond precision
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl MessageDocument {
    /// Build a direct message document from a validated request
    pub fn direct(request: &MessageRequest, now: DateTime<Utc>) -> Result<Self> {
        request.validate_direct()?;

        let sender_name = or_empty(&request.sender_name);
        let metadata = match &request.metadata {
            Some(value) if truthy(value) => serde_json::to_string(value)?,
            _ => "{}".to_string(),
        };
        let stamped = iso_timestamp(now);

        Ok(Self {
            sender_id: or_empty(&request.sender_id),
            subject: given(&request.subject)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Message from {sender_name}")),
            sender_name,
            sender_email: or_empty(&request.sender_email),
            sender_phone: or_empty(&request.sender_phone),
            receiver_id: or_empty(&request.receiver_id),
            recipient_name: or_empty(&request.recipient_name),
            recipient_email: or_empty(&request.recipient_email),
            recipient_phone: or_empty(&request.recipient_phone),
            content: or_empty(&request.content),
            timestamp: stamped.clone(),
            created_at: stamped,
            is_read: false,
            read_at: None,
            channel: given(&request.channel).unwrap_or(DEFAULT_CHANNEL).to_string(),
            status: "sent".to_string(),
            attachments: request.attachments.clone().unwrap_or_default(),
            metadata,
        })
    }

    /// Build a broadcast message document from a validated request
    ///
    /// Receiver, recipient, channel, status and metadata are fixed for
    /// broadcasts regardless of what the request carries.
    pub fn broadcast(request: &MessageRequest, now: DateTime<Utc>) -> Result<Self> {
        request.validate_broadcast()?;

        let sender_name = or_empty(&request.sender_name);
        let stamped = iso_timestamp(now);

        Ok(Self {
            sender_id: or_empty(&request.sender_id),
            subject: given(&request.subject)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Community message from {sender_name}")),
            sender_name,
            sender_email: or_empty(&request.sender_email),
            sender_phone: or_empty(&request.sender_phone),
            receiver_id: BROADCAST_RECEIVER.to_string(),
            recipient_name: "All Users".to_string(),
            recipient_email: String::new(),
            recipient_phone: String::new(),
            content: or_empty(&request.content),
            timestamp: stamped.clone(),
            created_at: stamped,
            is_read: false,
            read_at: None,
            channel: DEFAULT_CHANNEL.to_string(),
            status: "broadcast".to_string(),
            attachments: request.attachments.clone().unwrap_or_default(),
            metadata: r#"{"type":"broadcast"}"#.to_string(),
        })
    }
}

/// Fresh document id accepted by the store
///
/// UUIDv7 in simple form: 32 hex chars, time-ordered.
pub fn unique_id() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Payload handed to the email-notifications function
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmailRequest {
    pub to: Option<String>,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub from: Option<String>,
}

impl EmailRequest {
    /// Notification for a persisted direct message
    pub fn for_message(to: &str, document: &MessageDocument) -> Self {
        Self {
            to: Some(to.to_string()),
            subject: Some(document.subject.clone()),
            content: Some(document.content.clone()),
            from: Some(document.sender_email.clone()).filter(|f| !f.is_empty()),
        }
    }

    /// Resolve defaults into a sendable email
    pub fn resolve(&self, default_from: &str, default_subject: &str) -> Result<OutgoingEmail> {
        let (Some(to), Some(content)) = (given(&self.to), given(&self.content)) else {
            return Err(CaresError::validation("Missing required fields: to or content"));
        };

        Ok(OutgoingEmail {
            to: to.to_string(),
            from: given(&self.from).unwrap_or(default_from).to_string(),
            subject: given(&self.subject).unwrap_or(default_subject).to_string(),
            content: content.to_string(),
        })
    }
}

/// Fully resolved email ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 26, 53).unwrap()
    }

    fn request(value: Value) -> MessageRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_direct_defaults() {
        let req = request(json!({
            "senderId": "u1",
            "senderName": "Ana",
            "receiverId": "u2",
            "content": "Dinner at six"
        }));

        let doc = MessageDocument::direct(&req, fixed_now()).unwrap();

        assert_eq!(doc.subject, "Message from Ana");
        assert_eq!(doc.channel, "app");
        assert_eq!(doc.status, "sent");
        assert_eq!(doc.metadata, "{}");
        assert_eq!(doc.sender_email, "");
        assert_eq!(doc.timestamp, "2025-03-14T09:26:53.000Z");
        assert_eq!(doc.timestamp, doc.created_at);
        assert!(!doc.is_read);
        assert!(doc.attachments.is_empty());
    }

    #[test]
    fn test_direct_keeps_supplied_values() {
        let req = request(json!({
            "senderId": "u1",
            "senderName": "Ana",
            "receiverId": "u2",
            "content": "See attached",
            "subject": "Care plan",
            "channel": "sms",
            "attachments": ["https://files/1.pdf"],
            "metadata": {"priority": "high"}
        }));

        let doc = MessageDocument::direct(&req, fixed_now()).unwrap();

        assert_eq!(doc.subject, "Care plan");
        assert_eq!(doc.channel, "sms");
        assert_eq!(doc.attachments, vec!["https://files/1.pdf"]);
        assert_eq!(doc.metadata, r#"{"priority":"high"}"#);
    }

    #[test]
    fn test_loose_json_types_are_coerced() {
        let req = request(json!({
            "senderId": 42,
            "senderName": "Ana",
            "receiverId": "u2",
            "content": "hi",
            "attachments": [7, "https://files/2.pdf"],
            "metadata": "",
            "sendEmail": 1
        }));

        let doc = MessageDocument::direct(&req, fixed_now()).unwrap();

        assert_eq!(doc.sender_id, "42");
        assert_eq!(doc.attachments, vec!["7", "https://files/2.pdf"]);
        assert_eq!(doc.metadata, "{}");
        assert!(req.send_email);
    }

    #[test]
    fn test_falsy_values_are_absent() {
        let req = request(json!({
            "senderId": 0,
            "senderName": "Ana",
            "receiverId": false,
            "content": "hi",
            "attachments": null,
            "metadata": false,
            "sendEmail": ""
        }));

        assert!(req.sender_id.is_none());
        assert!(req.receiver_id.is_none());
        assert!(req.attachments.is_none());
        assert!(!req.send_email);
        assert!(matches!(
            MessageDocument::direct(&req, fixed_now()),
            Err(CaresError::Validation { .. })
        ));
    }

    #[test]
    fn test_empty_required_field_is_missing() {
        let req = request(json!({
            "senderId": "u1",
            "senderName": "",
            "receiverId": "u2",
            "content": "hi"
        }));

        let err = MessageDocument::direct(&req, fixed_now()).unwrap_err();
        assert!(matches!(err, CaresError::Validation { .. }));
    }

    #[test]
    fn test_broadcast_ignores_receiver_fields() {
        let req = request(json!({
            "senderId": "admin",
            "senderName": "Front Desk",
            "content": "Office closed Monday",
            "receiverId": "u9",
            "channel": "sms"
        }));

        let doc = MessageDocument::broadcast(&req, fixed_now()).unwrap();

        assert_eq!(doc.receiver_id, BROADCAST_RECEIVER);
        assert_eq!(doc.recipient_name, "All Users");
        assert_eq!(doc.subject, "Community message from Front Desk");
        assert_eq!(doc.channel, "app");
        assert_eq!(doc.status, "broadcast");
        assert_eq!(doc.metadata, r#"{"type":"broadcast"}"#);
    }

    #[test]
    fn test_document_wire_names() {
        let req = request(json!({
            "senderId": "u1", "senderName": "Ana", "receiverId": "u2", "content": "hi"
        }));
        let value = serde_json::to_value(MessageDocument::direct(&req, fixed_now()).unwrap()).unwrap();

        assert_eq!(value["receiverId"], "u2");
        assert_eq!(value["isRead"], false);
        assert!(value["readAt"].is_null());
    }

    #[test]
    fn test_email_target_requires_flag_and_address() {
        let mut req = request(json!({"recipientEmail": "kin@example.com"}));
        assert_eq!(req.email_target(), None);

        req.send_email = true;
        assert_eq!(req.email_target(), Some("kin@example.com"));

        req.recipient_email = Some(String::new());
        assert_eq!(req.email_target(), None);
    }

    #[test]
    fn test_email_request_resolution() {
        let email = EmailRequest {
            to: Some("kin@example.com".into()),
            content: Some("hello".into()),
            ..Default::default()
        }
        .resolve("noreply@christy-cares.com", "Notification from Christy Cares")
        .unwrap();

        assert_eq!(email.from, "noreply@christy-cares.com");
        assert_eq!(email.subject, "Notification from Christy Cares");

        let missing = EmailRequest::default().resolve("a@b.c", "s");
        assert!(matches!(missing, Err(CaresError::Validation { .. })));
    }
}
