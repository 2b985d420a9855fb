//! In-memory store
//!
//! Implements the store traits with Appwrite's observable behaviour: 404 for
//! missing collections, 409 for duplicate keys, 400 for indexes over unknown
//! attributes. Used by tests; supports failure injection.

use async_trait::async_trait;
use cares_core::prelude::*;
use cares_core::{iso_timestamp, render_permissions};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// A collection held by the memory store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCollection {
    pub collection: Collection,
    pub attributes: Vec<AttributeSpec>,
    pub indexes: Vec<IndexSpec>,
}

impl StoredCollection {
    pub fn attribute_keys(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.key.as_str()).collect()
    }

    pub fn index_keys(&self) -> Vec<&str> {
        self.indexes.iter().map(|i| i.key.as_str()).collect()
    }
}

/// Remote call observed by the memory store, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    GetCollection(String),
    CreateCollection(String),
    UpdateCollection(String),
    CreateAttribute { collection: String, key: String },
    CreateIndex { collection: String, key: String },
    CreateDocument { collection: String, id: String },
    CreateExecution(String),
}

/// Failure planted for one resource
#[derive(Debug, Clone)]
enum Injected {
    Remote(String),
    TimedOut,
    /// Lookup misses while a concurrent creator inserts the collection
    Race,
}

#[derive(Default)]
struct State {
    /// (database, collection) → collection
    collections: BTreeMap<(String, String), StoredCollection>,
    documents: Vec<(String, Value)>,
    executions: Vec<(String, Value)>,
    calls: Vec<StoreCall>,
    /// resource name → injected failure
    failures: HashMap<String, Injected>,
    reject_credentials: bool,
}

impl State {
    fn record(&mut self, call: StoreCall) -> Result<()> {
        self.calls.push(call);
        if self.reject_credentials {
            return Err(CaresError::authentication("Invalid API key"));
        }
        Ok(())
    }

    fn injected(&self, resource: &str) -> Result<()> {
        match self.failures.get(resource) {
            Some(Injected::Remote(message)) => Err(CaresError::remote(500, message.clone())),
            Some(Injected::TimedOut) => Err(CaresError::transport_with_source(
                format!("{resource} request failed"),
                std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out"),
            )),
            Some(Injected::Race) | None => Ok(()),
        }
    }

    fn collection_mut(&mut self, database_id: &str, collection_id: &str) -> Result<&mut StoredCollection> {
        self.collections
            .get_mut(&(database_id.to_string(), collection_id.to_string()))
            .ok_or_else(|| CaresError::not_found(format!("collection {collection_id}")))
    }
}

/// In-memory implementation of the store traits
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a collection with all attributes and indexes of `spec`
    ///
    /// Seeding bypasses call recording and failure injection.
    pub async fn seed(&self, database_id: &str, spec: &ResourceSpec) {
        let stored = StoredCollection {
            collection: Collection {
                id: spec.id.clone(),
                name: spec.display_name.clone(),
                permissions: render_permissions(&spec.permissions),
                document_security: spec.document_security,
                enabled: spec.enabled,
            },
            attributes: spec.attributes.clone(),
            indexes: spec.indexes.clone(),
        };
        self.state
            .write()
            .await
            .collections
            .insert((database_id.to_string(), spec.id.clone()), stored);
    }

    /// Make creation of one collection fail
    pub async fn fail_collection(&self, collection_id: &str, message: impl Into<String>) {
        self.inject(format!("collection {collection_id}"), message).await;
    }

    /// Make creation of one attribute fail
    pub async fn fail_attribute(&self, collection_id: &str, key: &str, message: impl Into<String>) {
        self.inject(format!("attribute {collection_id}.{key}"), message).await;
    }

    /// Make creation of one index fail
    pub async fn fail_index(&self, collection_id: &str, key: &str, message: impl Into<String>) {
        self.inject(format!("index {collection_id}.{key}"), message).await;
    }

    /// Make document creation in a collection fail
    pub async fn fail_documents(&self, collection_id: &str, message: impl Into<String>) {
        self.inject(format!("documents {collection_id}"), message).await;
    }

    /// Make executions of a function fail
    pub async fn fail_function(&self, function_id: &str, message: impl Into<String>) {
        self.inject(format!("function {function_id}"), message).await;
    }

    /// Make the request for one index time out
    pub async fn time_out_index(&self, collection_id: &str, key: &str) {
        self.plant(format!("index {collection_id}.{key}"), Injected::TimedOut).await;
    }

    /// Make the lookup of one collection time out
    pub async fn time_out_lookup(&self, collection_id: &str) {
        self.plant(format!("lookup {collection_id}"), Injected::TimedOut).await;
    }

    /// Lose the race for one collection
    ///
    /// The next lookup answers 404 while another writer creates the
    /// collection, so the following create answers 409.
    pub async fn race_collection(&self, collection_id: &str) {
        self.plant(format!("lookup {collection_id}"), Injected::Race).await;
    }

    async fn inject(&self, resource: String, message: impl Into<String>) {
        self.plant(resource, Injected::Remote(message.into())).await;
    }

    async fn plant(&self, resource: String, failure: Injected) {
        self.state.write().await.failures.insert(resource, failure);
    }

    /// Answer every call with an authentication failure
    pub async fn reject_credentials(&self) {
        self.state.write().await.reject_credentials = true;
    }

    /// Collections of one database, keyed by id
    pub async fn snapshot(&self, database_id: &str) -> BTreeMap<String, StoredCollection> {
        self.state
            .read()
            .await
            .collections
            .iter()
            .filter(|((db, _), _)| db == database_id)
            .map(|((_, id), stored)| (id.clone(), stored.clone()))
            .collect()
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.read().await.calls.clone()
    }

    /// Created documents as `(collection, stored document)`
    pub async fn documents(&self) -> Vec<(String, Value)> {
        self.state.read().await.documents.clone()
    }

    /// Started executions as `(function, body)`
    pub async fn executions(&self) -> Vec<(String, Value)> {
        self.state.read().await.executions.clone()
    }
}

#[async_trait]
impl SchemaStore for MemoryStore {
    async fn get_collection(&self, database_id: &str, collection_id: &str) -> Result<Collection> {
        let mut state = self.state.write().await;
        state.record(StoreCall::GetCollection(collection_id.to_string()))?;

        let lookup = format!("lookup {collection_id}");
        if matches!(state.failures.get(&lookup), Some(Injected::Race)) {
            state.failures.remove(&lookup);
            let winner = Collection {
                id: collection_id.to_string(),
                name: collection_id.to_string(),
                permissions: Vec::new(),
                document_security: true,
                enabled: true,
            };
            state.collections.insert(
                (database_id.to_string(), collection_id.to_string()),
                StoredCollection {
                    collection: winner,
                    attributes: Vec::new(),
                    indexes: Vec::new(),
                },
            );
            return Err(CaresError::not_found(format!("collection {collection_id}")));
        }
        state.injected(&lookup)?;

        Ok(state.collection_mut(database_id, collection_id)?.collection.clone())
    }

    async fn create_collection(
        &self,
        database_id: &str,
        collection_id: &str,
        name: &str,
        permissions: &[PermissionRule],
    ) -> Result<Collection> {
        let mut state = self.state.write().await;
        state.record(StoreCall::CreateCollection(collection_id.to_string()))?;
        state.injected(&format!("collection {collection_id}"))?;

        let key = (database_id.to_string(), collection_id.to_string());
        if state.collections.contains_key(&key) {
            return Err(CaresError::already_exists(format!("collection {collection_id}")));
        }

        let collection = Collection {
            id: collection_id.to_string(),
            name: name.to_string(),
            permissions: render_permissions(permissions),
            document_security: true,
            enabled: true,
        };
        state.collections.insert(
            key,
            StoredCollection {
                collection: collection.clone(),
                attributes: Vec::new(),
                indexes: Vec::new(),
            },
        );
        Ok(collection)
    }

    async fn update_collection(
        &self,
        database_id: &str,
        update: &CollectionUpdate,
    ) -> Result<Collection> {
        let mut state = self.state.write().await;
        state.record(StoreCall::UpdateCollection(update.collection_id.clone()))?;
        state.injected(&format!("collection {}", update.collection_id))?;

        let stored = state.collection_mut(database_id, &update.collection_id)?;
        stored.collection.name = update.name.clone();
        stored.collection.permissions = render_permissions(&update.permissions);
        stored.collection.document_security = update.document_security;
        stored.collection.enabled = update.enabled;
        Ok(stored.collection.clone())
    }

    async fn create_attribute(
        &self,
        database_id: &str,
        collection_id: &str,
        attribute: &AttributeSpec,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.record(StoreCall::CreateAttribute {
            collection: collection_id.to_string(),
            key: attribute.key.clone(),
        })?;
        let resource = format!("attribute {collection_id}.{}", attribute.key);
        state.injected(&resource)?;

        let stored = state.collection_mut(database_id, collection_id)?;
        if stored.attributes.iter().any(|a| a.key == attribute.key) {
            return Err(CaresError::already_exists(resource));
        }
        stored.attributes.push(attribute.clone());
        Ok(())
    }

    async fn create_index(
        &self,
        database_id: &str,
        collection_id: &str,
        index: &IndexSpec,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.record(StoreCall::CreateIndex {
            collection: collection_id.to_string(),
            key: index.key.clone(),
        })?;
        let resource = format!("index {collection_id}.{}", index.key);
        state.injected(&resource)?;

        let stored = state.collection_mut(database_id, collection_id)?;
        if stored.indexes.iter().any(|i| i.key == index.key) {
            return Err(CaresError::already_exists(resource));
        }
        if let Some(missing) = index
            .attributes()
            .into_iter()
            .find(|key| !stored.attributes.iter().any(|a| a.key == *key))
        {
            return Err(CaresError::remote(400, format!("Attribute not found: {missing}")));
        }
        stored.indexes.push(index.clone());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_document(
        &self,
        database_id: &str,
        collection_id: &str,
        document_id: &str,
        data: &Value,
    ) -> Result<Value> {
        let mut state = self.state.write().await;
        state.record(StoreCall::CreateDocument {
            collection: collection_id.to_string(),
            id: document_id.to_string(),
        })?;
        state.injected(&format!("documents {collection_id}"))?;
        state.collection_mut(database_id, collection_id)?;

        let mut document = json!({
            "$id": document_id,
            "$collectionId": collection_id,
            "$databaseId": database_id,
            "$createdAt": iso_timestamp(chrono::Utc::now()),
        });
        if let (Some(target), Some(fields)) = (document.as_object_mut(), data.as_object()) {
            target.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        state.documents.push((collection_id.to_string(), document.clone()));
        Ok(document)
    }
}

#[async_trait]
impl FunctionRunner for MemoryStore {
    async fn create_execution(&self, function_id: &str, body: &Value) -> Result<Value> {
        let mut state = self.state.write().await;
        state.record(StoreCall::CreateExecution(function_id.to_string()))?;
        state.injected(&format!("function {function_id}"))?;

        state.executions.push((function_id.to_string(), body.clone()));
        Ok(json!({
            "$id": cares_core::unique_id(),
            "functionId": function_id,
            "status": "completed",
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collection_lifecycle() {
        let store = MemoryStore::new();

        let missing = store.get_collection("db", "profiles").await.unwrap_err();
        assert_eq!(missing.class(), ErrorClass::NotFound);

        store
            .create_collection("db", "profiles", "User Profiles", &PermissionRule::public_read_user_write())
            .await
            .unwrap();
        let again = store
            .create_collection("db", "profiles", "User Profiles", &[])
            .await
            .unwrap_err();
        assert_eq!(again.class(), ErrorClass::AlreadyExists);

        let found = store.get_collection("db", "profiles").await.unwrap();
        assert_eq!(found.permissions.len(), 4);
    }

    #[tokio::test]
    async fn test_index_requires_attribute() {
        let store = MemoryStore::new();
        store.seed("db", &ResourceSpec::new("profiles", "User Profiles")).await;

        let err = store
            .create_index("db", "profiles", &IndexSpec::key("email_idx").asc("email"))
            .await
            .unwrap_err();
        assert!(matches!(err, CaresError::Remote { status: 400, .. }));

        store
            .create_attribute("db", "profiles", &AttributeSpec::string("email", 255))
            .await
            .unwrap();
        store
            .create_index("db", "profiles", &IndexSpec::key("email_idx").asc("email"))
            .await
            .unwrap();

        let snapshot = store.snapshot("db").await;
        assert_eq!(snapshot["profiles"].index_keys(), vec!["email_idx"]);
    }

    #[tokio::test]
    async fn test_rejected_credentials_fail_every_call() {
        let store = MemoryStore::new();
        store.reject_credentials().await;

        let err = store.get_collection("db", "messages").await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(store.calls().await, vec![StoreCall::GetCollection("messages".into())]);
    }

    #[tokio::test]
    async fn test_race_answers_missing_then_conflict() {
        let store = MemoryStore::new();
        store.race_collection("messages").await;

        let lookup = store.get_collection("db", "messages").await.unwrap_err();
        assert_eq!(lookup.class(), ErrorClass::NotFound);
        let create = store
            .create_collection("db", "messages", "Messages", &[])
            .await
            .unwrap_err();
        assert_eq!(create.class(), ErrorClass::AlreadyExists);

        assert!(store.get_collection("db", "messages").await.is_ok());
    }

    #[tokio::test]
    async fn test_timed_out_index_is_transport_error() {
        let store = MemoryStore::new();
        store.seed("db", &ResourceSpec::new("messages", "Messages")).await;
        store.time_out_index("messages", "status_idx").await;

        let err = store
            .create_index("db", "messages", &IndexSpec::key("status_idx").asc("status"))
            .await
            .unwrap_err();
        assert!(matches!(err, CaresError::Transport { .. }));
    }

    #[tokio::test]
    async fn test_document_merges_system_fields() {
        let store = MemoryStore::new();
        store.seed("db", &ResourceSpec::new("messages", "Messages")).await;

        let doc = store
            .create_document("db", "messages", "abc", &json!({"content": "hi"}))
            .await
            .unwrap();

        assert_eq!(doc["$id"], "abc");
        assert_eq!(doc["content"], "hi");
        assert_eq!(store.documents().await.len(), 1);
    }
}
