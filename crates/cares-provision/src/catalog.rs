//! Built-in collection catalog
//!
//! The schema the message gateway and the mobile app rely on. Every
//! collection is publicly readable and writable by signed-in users, with
//! document-level security enabled.

use cares_core::prelude::*;

fn collection(id: &str, name: &str) -> ResourceSpec {
    ResourceSpec::new(id, name).with_permissions(PermissionRule::public_read_user_write())
}

fn text(key: &str, size: u32) -> AttributeSpec {
    AttributeSpec::string(key, size)
}

pub fn messages() -> ResourceSpec {
    collection("messages", "Messages")
        .attribute(text("senderId", 255).required())
        .attribute(text("senderName", 255).required())
        .attribute(text("senderEmail", 255))
        .attribute(text("senderPhone", 50))
        .attribute(text("receiverId", 255).required())
        .attribute(text("recipientName", 255))
        .attribute(text("recipientEmail", 255))
        .attribute(text("recipientPhone", 50))
        .attribute(text("content", 5000).required())
        .attribute(text("subject", 500))
        .attribute(AttributeSpec::datetime("timestamp").required())
        .attribute(AttributeSpec::datetime("createdAt").required())
        .attribute(AttributeSpec::boolean("isRead").default_bool(false))
        .attribute(AttributeSpec::datetime("readAt"))
        .attribute(text("channel", 50))
        .attribute(text("status", 50))
        .attribute(text("attachments", 2000).array())
        .attribute(text("metadata", 2000))
        .index(IndexSpec::key("sender_idx").asc("senderId"))
        .index(IndexSpec::key("receiver_idx").asc("receiverId"))
        .index(IndexSpec::key("timestamp_idx").desc("timestamp"))
        .index(IndexSpec::key("status_idx").asc("status"))
}

pub fn conversations() -> ResourceSpec {
    collection("conversations", "Conversations")
        .attribute(text("participant1Id", 255).required())
        .attribute(text("participant1Name", 255).required())
        .attribute(text("participant2Id", 255).required())
        .attribute(text("participant2Name", 255).required())
        .attribute(text("lastMessage", 1000))
        .attribute(AttributeSpec::datetime("lastMessageTime"))
        .attribute(AttributeSpec::datetime("createdAt").required())
        .attribute(AttributeSpec::integer("unreadCount1").default_int(0).min(0))
        .attribute(AttributeSpec::integer("unreadCount2").default_int(0).min(0))
        .attribute(AttributeSpec::boolean("isActive").default_bool(true))
        .index(IndexSpec::key("participant1_idx").asc("participant1Id"))
        .index(IndexSpec::key("participant2_idx").asc("participant2Id"))
        .index(IndexSpec::key("lastMessage_idx").desc("lastMessageTime"))
}

pub fn notifications() -> ResourceSpec {
    collection("notifications", "Notifications")
        .attribute(text("userId", 255).required())
        .attribute(text("title", 255).required())
        .attribute(text("body", 1000).required())
        .attribute(AttributeSpec::datetime("timestamp").required())
        .attribute(AttributeSpec::datetime("createdAt").required())
        .attribute(AttributeSpec::boolean("isRead").default_bool(false))
        .attribute(text("type", 50))
        .attribute(text("data", 2000))
        .attribute(text("actionUrl", 500))
        .index(IndexSpec::key("user_idx").asc("userId"))
        .index(IndexSpec::key("timestamp_idx").desc("timestamp"))
        .index(IndexSpec::key("isRead_idx").asc("isRead"))
}

pub fn profiles() -> ResourceSpec {
    collection("profiles", "User Profiles")
        .attribute(text("userId", 255).required())
        .attribute(text("name", 255).required())
        .attribute(text("email", 255).required())
        .attribute(text("phone", 50))
        .attribute(text("role", 50).required())
        .attribute(text("avatar", 500))
        .attribute(text("bio", 1000))
        .attribute(text("address", 500))
        .attribute(text("city", 100))
        .attribute(text("state", 50))
        .attribute(text("zipCode", 20))
        .attribute(AttributeSpec::datetime("createdAt").required())
        .attribute(AttributeSpec::datetime("updatedAt"))
        .attribute(AttributeSpec::boolean("isActive").default_bool(true))
        .attribute(text("metadata", 2000))
        .index(IndexSpec::key("userId_idx").asc("userId"))
        .index(IndexSpec::key("email_idx").asc("email"))
        .index(IndexSpec::key("role_idx").asc("role"))
}

pub fn appointments() -> ResourceSpec {
    collection("appointments", "Appointments")
        .attribute(text("patientId", 255).required())
        .attribute(text("patientName", 255).required())
        .attribute(text("caregiverId", 255).required())
        .attribute(text("caregiverName", 255).required())
        .attribute(AttributeSpec::datetime("date").required())
        .attribute(text("startTime", 10).required())
        .attribute(text("endTime", 10).required())
        .attribute(text("service", 255).required())
        .attribute(text("status", 50).required())
        .attribute(text("notes", 2000))
        .attribute(text("location", 500))
        .attribute(AttributeSpec::integer("price").min(0))
        .attribute(AttributeSpec::datetime("createdAt").required())
        .attribute(AttributeSpec::datetime("updatedAt"))
        .attribute(AttributeSpec::datetime("cancelledAt"))
        .attribute(text("cancelReason", 500))
        .index(IndexSpec::key("patient_idx").asc("patientId"))
        .index(IndexSpec::key("caregiver_idx").asc("caregiverId"))
        .index(IndexSpec::key("date_idx").desc("date"))
        .index(IndexSpec::key("status_idx").asc("status"))
}

/// All collections, in provisioning order
pub fn catalog() -> Vec<ResourceSpec> {
    vec![
        messages(),
        conversations(),
        notifications(),
        profiles(),
        appointments(),
    ]
}

/// Restrict `specs` to the named collections, keeping catalog order
///
/// An empty selection keeps everything. Unknown ids are rejected.
pub fn select(specs: Vec<ResourceSpec>, ids: &[String]) -> Result<Vec<ResourceSpec>> {
    if ids.is_empty() {
        return Ok(specs);
    }

    if let Some(unknown) = ids.iter().find(|id| !specs.iter().any(|s| &s.id == *id)) {
        let known: Vec<&str> = specs.iter().map(|s| s.id.as_str()).collect();
        return Err(CaresError::config(format!(
            "unknown collection '{unknown}' (known: {})",
            known.join(", ")
        )));
    }

    Ok(specs.into_iter().filter(|s| ids.contains(&s.id)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_consistent() {
        for spec in catalog() {
            spec.validate().unwrap();
            assert_eq!(spec.permissions.len(), 4, "{}", spec.id);
        }
    }

    #[test]
    fn test_messages_matches_document_shape() {
        let messages = messages();
        let keys: Vec<&str> = messages.attributes.iter().map(|a| a.key.as_str()).collect();

        for field in ["senderId", "receiverId", "content", "timestamp", "isRead", "metadata"] {
            assert!(keys.contains(&field), "missing {field}");
        }
        assert_eq!(messages.indexes.len(), 4);
    }

    #[test]
    fn test_select_keeps_catalog_order() {
        let selected = select(
            catalog(),
            &["profiles".to_string(), "messages".to_string()],
        )
        .unwrap();
        let ids: Vec<&str> = selected.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["messages", "profiles"]);

        assert_eq!(select(catalog(), &[]).unwrap().len(), 5);
    }

    #[test]
    fn test_select_rejects_unknown() {
        let err = select(catalog(), &["invoices".to_string()]).unwrap_err();
        assert!(err.to_string().contains("invoices"));
    }
}
