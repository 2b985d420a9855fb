//! Strategy traits for the Christy Cares backend
//!
//! Each trait is a seam between the business logic and an external
//! collaborator. The Appwrite client implements the store traits, the
//! in-memory store implements them for tests, and the SMTP
//! mailer implements [`Mailer`].
//!
//! ```text
//! Provisioner ──► SchemaStore
//!
//! Gateway ──────► DocumentStore
//!            ├──► FunctionRunner ──► email-notifications
//!            └──► Mailer
//! ```

use crate::error::Result;
use crate::message::OutgoingEmail;
use crate::schema::{AttributeSpec, Collection, CollectionUpdate, IndexSpec, PermissionRule};
use async_trait::async_trait;
use serde_json::Value;

/// Schema management operations of the remote store
///
/// Errors are reported through [`crate::CaresError`]; implementations must
/// answer `NotFound` and `AlreadyExists` for the matching store conditions so
/// that callers can classify them.
#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Fetch a collection by id
    async fn get_collection(&self, database_id: &str, collection_id: &str) -> Result<Collection>;

    /// Create a collection
    async fn create_collection(
        &self,
        database_id: &str,
        collection_id: &str,
        name: &str,
        permissions: &[PermissionRule],
    ) -> Result<Collection>;

    /// Replace a collection's name, permissions and flags
    async fn update_collection(
        &self,
        database_id: &str,
        update: &CollectionUpdate,
    ) -> Result<Collection>;

    /// Create one attribute with its kind-specific parameters
    async fn create_attribute(
        &self,
        database_id: &str,
        collection_id: &str,
        attribute: &AttributeSpec,
    ) -> Result<()>;

    /// Create one index
    async fn create_index(
        &self,
        database_id: &str,
        collection_id: &str,
        index: &IndexSpec,
    ) -> Result<()>;
}

/// Document persistence
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document and return the stored representation
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: &Value,
    ) -> Result<Value>;
}

/// Serverless function execution
#[async_trait]
pub trait FunctionRunner: Send + Sync {
    /// Start an execution of `function_id` with a JSON body
    async fn create_execution(&self, function_id: &str, body: &Value) -> Result<Value>;
}

/// Email delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver one email and return its message id
    async fn send(&self, email: &OutgoingEmail) -> Result<String>;

    /// Component name for logging
    fn name(&self) -> &'static str;
}
