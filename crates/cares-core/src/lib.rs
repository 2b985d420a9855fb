//! # Cares Core
//!
//! Core types, strategy traits, and configuration for the Christy Cares
//! backend.
//!
//! This crate defines the abstractions shared by the provisioner and the
//! message gateway:
//! - Declarative schema model (collections, attributes, indexes, permissions)
//! - Error taxonomy with a single classification function
//! - Store, function and mailer strategy traits
//! - Message documents and email payloads
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ Provisioner  │────►│ SchemaStore │────►│   Appwrite   │
//! └──────────────┘     └─────────────┘     │  (REST API)  │
//! ┌──────────────┐     ┌─────────────┐     │              │
//! │   Gateway    │────►│DocumentStore│────►│              │
//! └──────┬───────┘     └─────────────┘     └──────────────┘
//!        │             ┌─────────────┐
//!        └────────────►│   Mailer    │────► SMTP
//!                      └─────────────┘
//! ```

pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod schema;
pub mod strategy;

pub use self::config::*;
pub use self::error::*;
pub use self::message::*;
pub use self::metrics::*;
pub use self::schema::*;
pub use self::strategy::*;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::CaresConfig;
    pub use crate::error::{CaresError, ErrorClass, Result};
    pub use crate::message::{EmailRequest, MessageDocument, MessageRequest, OutgoingEmail};
    pub use crate::schema::{
        AttributeKind, AttributeSpec, Collection, CollectionUpdate, IndexSpec, PermissionRule,
        Principal, ResourceSpec,
    };
    pub use crate::strategy::{DocumentStore, FunctionRunner, Mailer, SchemaStore};
}
