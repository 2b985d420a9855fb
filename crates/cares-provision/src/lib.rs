//! # Cares Provision
//!
//! Brings the remote store's schema in line with a declarative list of
//! collections.
//!
//! ## Operations
//!
//! - `Provisioner::provision`: create missing collections, attributes and indexes
//! - `Provisioner::fix_permissions`: reset collection permissions to the catalog's
//!
//! ## Features
//!
//! - Safe to re-run: existing resources are reported, never altered
//! - Per-resource failure isolation with an ordered report
//! - Rejected credentials abort the whole run, as does an unreachable store
//!   on the first call

pub mod catalog;
pub mod permissions;
pub mod report;

pub use self::permissions::*;
pub use self::report::*;

use cares_core::prelude::*;
use cares_core::{LatencyTimer, ProvisionMetrics};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Sequential schema provisioner
pub struct Provisioner<S>
where
    S: SchemaStore + ?Sized,
{
    store: Arc<S>,
    database_id: String,
    metrics: ProvisionMetrics,
}

impl<S> Provisioner<S>
where
    S: SchemaStore + ?Sized,
{
    pub fn new(store: Arc<S>, database_id: impl Into<String>) -> Self {
        Self {
            store,
            database_id: database_id.into(),
            metrics: ProvisionMetrics::new(),
        }
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    /// Ensure every collection in `specs` exists with its attributes and indexes
    ///
    /// Specs are processed in order, one remote call at a time. Attributes of
    /// a collection are attempted before its indexes. Only rejected
    /// credentials, or a transport failure on the very first call, end the
    /// run early; everything else lands in the report.
    pub async fn provision(&self, specs: &[ResourceSpec]) -> Result<ProvisionReport> {
        let _timer = LatencyTimer::start(|d| self.metrics.record_run_duration(d));
        info!(
            database_id = %self.database_id,
            collections = specs.len(),
            "Starting provisioning run"
        );

        let mut report = ProvisionReport::new();

        for (position, spec) in specs.iter().enumerate() {
            let outcome = self.ensure_collection(spec, position == 0).await?;
            let skip_children = outcome.is_failed();
            self.record(&mut report, ResourceKind::Collection, &spec.id, &spec.id, outcome);

            if skip_children {
                warn!(collection = %spec.id, "Skipping attributes and indexes");
                continue;
            }

            for attribute in &spec.attributes {
                let outcome = settle(
                    self.store
                        .create_attribute(&self.database_id, &spec.id, attribute)
                        .await,
                    false,
                )?;
                self.record(&mut report, ResourceKind::Attribute, &spec.id, &attribute.key, outcome);
            }

            for index in &spec.indexes {
                let outcome = settle(
                    self.store
                        .create_index(&self.database_id, &spec.id, index)
                        .await,
                    false,
                )?;
                self.record(&mut report, ResourceKind::Index, &spec.id, &index.key, outcome);
            }
        }

        let summary = report.summary();
        info!(
            created = summary.created,
            already_exists = summary.already_exists,
            failed = summary.failed,
            "Provisioning run finished"
        );
        Ok(report)
    }

    async fn ensure_collection(
        &self,
        spec: &ResourceSpec,
        first_call: bool,
    ) -> Result<ProvisionResult> {
        match self.store.get_collection(&self.database_id, &spec.id).await {
            Ok(_) => Ok(ProvisionResult::AlreadyExists),
            Err(e) if e.aborts_run(first_call) => Err(e),
            Err(e) => match e.class() {
                ErrorClass::NotFound => {
                    debug!(collection = %spec.id, "Collection absent, creating");
                    let created = self
                        .store
                        .create_collection(
                            &self.database_id,
                            &spec.id,
                            &spec.display_name,
                            &spec.permissions,
                        )
                        .await;
                    settle(created.map(|_| ()), false)
                }
                _ => Ok(ProvisionResult::failed(e.to_string())),
            },
        }
    }

    fn record(
        &self,
        report: &mut ProvisionReport,
        kind: ResourceKind,
        collection_id: &str,
        resource_id: &str,
        result: ProvisionResult,
    ) {
        match &result {
            ProvisionResult::Created => {
                info!(kind = kind.as_str(), collection = collection_id, resource = resource_id, "Created");
            }
            ProvisionResult::AlreadyExists => {
                debug!(kind = kind.as_str(), collection = collection_id, resource = resource_id, "Already exists");
            }
            ProvisionResult::Failed(reason) => {
                warn!(
                    kind = kind.as_str(),
                    collection = collection_id,
                    resource = resource_id,
                    reason = %reason,
                    "Failed"
                );
            }
        }
        self.metrics.record_resource(kind.as_str(), result.label());
        report.push(ReportEntry::new(kind, collection_id, resource_id, result));
    }
}

/// Classify the outcome of a create call
///
/// Run-ending errors propagate; already-exists counts as success.
fn settle(outcome: Result<()>, first_call: bool) -> Result<ProvisionResult> {
    match outcome {
        Ok(()) => Ok(ProvisionResult::Created),
        Err(e) if e.aborts_run(first_call) => Err(e),
        Err(e) if e.class() == ErrorClass::AlreadyExists => Ok(ProvisionResult::AlreadyExists),
        Err(e) => Ok(ProvisionResult::failed(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cares_appwrite::{MemoryStore, StoreCall};

    const DB: &str = "christy-cares-db";

    fn notifications() -> ResourceSpec {
        ResourceSpec::new("notifications", "Notifications")
            .with_permissions(PermissionRule::public_read_user_write())
            .attribute(AttributeSpec::string("userId", 255).required())
            .attribute(AttributeSpec::boolean("isRead").required().default_bool(false))
            .index(IndexSpec::key("user_idx").asc("userId"))
    }

    fn entry(kind: ResourceKind, id: &str, result: ProvisionResult) -> ReportEntry {
        ReportEntry::new(kind, "notifications", id, result)
    }

    #[tokio::test]
    async fn test_empty_store_creates_everything() {
        let store = Arc::new(MemoryStore::new());
        let provisioner = Provisioner::new(store.clone(), DB);

        let report = provisioner.provision(&[notifications()]).await.unwrap();

        assert_eq!(
            report.entries(),
            &[
                entry(ResourceKind::Collection, "notifications", ProvisionResult::Created),
                entry(ResourceKind::Attribute, "userId", ProvisionResult::Created),
                entry(ResourceKind::Attribute, "isRead", ProvisionResult::Created),
                entry(ResourceKind::Index, "user_idx", ProvisionResult::Created),
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_store_is_completed() {
        let store = Arc::new(MemoryStore::new());
        let existing = ResourceSpec::new("notifications", "Notifications")
            .attribute(AttributeSpec::string("userId", 255).required());
        store.seed(DB, &existing).await;

        let provisioner = Provisioner::new(store.clone(), DB);
        let report = provisioner.provision(&[notifications()]).await.unwrap();

        assert_eq!(
            report.entries(),
            &[
                entry(ResourceKind::Collection, "notifications", ProvisionResult::AlreadyExists),
                entry(ResourceKind::Attribute, "userId", ProvisionResult::AlreadyExists),
                entry(ResourceKind::Attribute, "isRead", ProvisionResult::Created),
                entry(ResourceKind::Index, "user_idx", ProvisionResult::Created),
            ]
        );
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let provisioner = Provisioner::new(store.clone(), DB);
        let specs = catalog::catalog();

        let first = provisioner.provision(&specs).await.unwrap();
        assert!(!first.has_failures());
        let after_first = store.snapshot(DB).await;

        let second = provisioner.provision(&specs).await.unwrap();
        assert_eq!(second.len(), first.len());
        assert!(second
            .entries()
            .iter()
            .all(|e| e.result == ProvisionResult::AlreadyExists));
        assert_eq!(store.snapshot(DB).await, after_first);
    }

    #[tokio::test]
    async fn test_existing_resources_are_left_alone() {
        let store = Arc::new(MemoryStore::new());
        let customised = ResourceSpec::new("notifications", "Inbox")
            .attribute(AttributeSpec::string("userId", 64))
            .attribute(AttributeSpec::string("legacyFlag", 10))
            .index(IndexSpec::key("user_idx").desc("userId"));
        store.seed(DB, &customised).await;
        let before = store.snapshot(DB).await["notifications"].clone();

        Provisioner::new(store.clone(), DB)
            .provision(&[notifications()])
            .await
            .unwrap();

        let after = store.snapshot(DB).await["notifications"].clone();
        assert_eq!(after.collection, before.collection);
        assert_eq!(after.attributes[..2], before.attributes[..]);
        assert_eq!(after.indexes, before.indexes);
        assert_eq!(after.attribute_keys(), vec!["userId", "legacyFlag", "isRead"]);
    }

    #[tokio::test]
    async fn test_attribute_failure_is_isolated() {
        let store = Arc::new(MemoryStore::new());
        store
            .fail_attribute("messages", "senderId", "Invalid attribute size")
            .await;

        let report = Provisioner::new(store.clone(), DB)
            .provision(&[catalog::messages()])
            .await
            .unwrap();

        let failures: Vec<&str> = report.failures().map(|e| e.resource_id.as_str()).collect();
        // sender_idx depends on the failed attribute
        assert_eq!(failures, vec!["senderId", "sender_idx"]);

        let created_attributes = report
            .entries()
            .iter()
            .filter(|e| e.kind == ResourceKind::Attribute && e.result == ProvisionResult::Created)
            .count();
        assert_eq!(created_attributes, catalog::messages().attributes.len() - 1);

        let receiver = report
            .entries()
            .iter()
            .find(|e| e.resource_id == "receiver_idx")
            .unwrap();
        assert_eq!(receiver.result, ProvisionResult::Created);
    }

    #[tokio::test]
    async fn test_attributes_precede_indexes() {
        let store = Arc::new(MemoryStore::new());
        Provisioner::new(store.clone(), DB)
            .provision(&[catalog::messages()])
            .await
            .unwrap();

        let calls = store.calls().await;
        let last_attribute = calls
            .iter()
            .rposition(|c| matches!(c, StoreCall::CreateAttribute { .. }))
            .unwrap();
        let first_index = calls
            .iter()
            .position(|c| matches!(c, StoreCall::CreateIndex { .. }))
            .unwrap();
        assert!(last_attribute < first_index);
        assert_eq!(calls[0], StoreCall::GetCollection("messages".into()));
    }

    #[tokio::test]
    async fn test_failed_collection_skips_children() {
        let store = Arc::new(MemoryStore::new());
        store.fail_collection("messages", "Collection limit reached").await;

        let report = Provisioner::new(store.clone(), DB)
            .provision(&[catalog::messages(), notifications()])
            .await
            .unwrap();

        let messages: Vec<&ReportEntry> = report
            .entries()
            .iter()
            .filter(|e| e.collection_id == "messages")
            .collect();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].result.is_failed());

        assert_eq!(report.summary().created, 4);
    }

    #[tokio::test]
    async fn test_authentication_failure_aborts_run() {
        let store = Arc::new(MemoryStore::new());
        store.reject_credentials().await;

        let err = Provisioner::new(store.clone(), DB)
            .provision(&catalog::catalog())
            .await
            .unwrap_err();

        assert!(matches!(err, CaresError::Authentication { .. }));
        assert_eq!(store.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_mid_run_is_isolated() {
        let store = Arc::new(MemoryStore::new());
        store.time_out_index("messages", "status_idx").await;
        let specs = catalog::catalog();

        let report = Provisioner::new(store.clone(), DB)
            .provision(&specs)
            .await
            .unwrap();

        let failures: Vec<&ReportEntry> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].collection_id, "messages");
        assert_eq!(failures[0].resource_id, "status_idx");
        assert!(failures[0].result.to_string().contains("Transport error"));

        let snapshot = store.snapshot(DB).await;
        assert_eq!(snapshot.len(), specs.len());
        for spec in &specs[1..] {
            assert_eq!(snapshot[&spec.id].indexes.len(), spec.indexes.len());
        }
    }

    #[tokio::test]
    async fn test_unreachable_store_aborts_on_first_call() {
        let store = Arc::new(MemoryStore::new());
        store.time_out_lookup("messages").await;

        let err = Provisioner::new(store.clone(), DB)
            .provision(&catalog::catalog())
            .await
            .unwrap_err();

        assert!(matches!(err, CaresError::Transport { .. }));
        assert_eq!(store.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_lost_creation_race_is_already_exists() {
        let store = Arc::new(MemoryStore::new());
        store.race_collection("notifications").await;

        let report = Provisioner::new(store.clone(), DB)
            .provision(&[notifications()])
            .await
            .unwrap();

        assert_eq!(
            report.entries(),
            &[
                entry(ResourceKind::Collection, "notifications", ProvisionResult::AlreadyExists),
                entry(ResourceKind::Attribute, "userId", ProvisionResult::Created),
                entry(ResourceKind::Attribute, "isRead", ProvisionResult::Created),
                entry(ResourceKind::Index, "user_idx", ProvisionResult::Created),
            ]
        );
        assert_eq!(
            store.calls().await[..2],
            [
                StoreCall::GetCollection("notifications".into()),
                StoreCall::CreateCollection("notifications".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_collections_only() {
        let store = Arc::new(MemoryStore::new());
        let specs: Vec<ResourceSpec> = catalog::catalog()
            .iter()
            .map(ResourceSpec::collection_only)
            .collect();

        let report = Provisioner::new(store.clone(), DB)
            .provision(&specs)
            .await
            .unwrap();

        assert_eq!(report.len(), 5);
        assert!(report.entries().iter().all(|e| e.kind == ResourceKind::Collection));
        assert!(store.snapshot(DB).await.values().all(|c| c.attributes.is_empty()));
    }
}
