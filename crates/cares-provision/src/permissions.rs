//! Collection permission repair
//!
//! Resets each collection's permissions, document security and enabled flag
//! to what the catalog declares, keeping the collection's current name.

use crate::Provisioner;
use cares_core::prelude::*;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// Outcome for one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "kebab-case")]
pub enum PermissionOutcome {
    Updated,
    Unchanged,
    Missing,
    Failed(String),
}

impl PermissionOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, PermissionOutcome::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            PermissionOutcome::Updated => "updated",
            PermissionOutcome::Unchanged => "unchanged",
            PermissionOutcome::Missing => "missing",
            PermissionOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for PermissionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionOutcome::Failed(reason) => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionEntry {
    pub collection_id: String,
    #[serde(flatten)]
    pub outcome: PermissionOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionReport {
    entries: Vec<PermissionEntry>,
}

impl PermissionReport {
    pub fn entries(&self) -> &[PermissionEntry] {
        &self.entries
    }

    pub fn outcome(&self, collection_id: &str) -> Option<&PermissionOutcome> {
        self.entries
            .iter()
            .find(|e| e.collection_id == collection_id)
            .map(|e| &e.outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.entries.iter().any(|e| e.outcome.is_failed())
    }
}

impl fmt::Display for PermissionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{:<20} {}", entry.collection_id, entry.outcome)?;
        }
        Ok(())
    }
}

impl<S> Provisioner<S>
where
    S: SchemaStore + ?Sized,
{
    /// Apply the declared permissions to every existing collection in `specs`
    ///
    /// Missing collections are reported, not created. Rejected credentials
    /// abort, as does a transport failure on the first call.
    pub async fn fix_permissions(&self, specs: &[ResourceSpec]) -> Result<PermissionReport> {
        info!(database_id = %self.database_id, collections = specs.len(), "Updating collection permissions");

        let mut report = PermissionReport::default();
        for (position, spec) in specs.iter().enumerate() {
            let outcome = self.fix_collection(spec, position == 0).await?;
            match &outcome {
                PermissionOutcome::Failed(reason) => {
                    warn!(collection = %spec.id, reason = %reason, "Permission update failed");
                }
                PermissionOutcome::Missing => warn!(collection = %spec.id, "Collection not found"),
                other => info!(collection = %spec.id, outcome = other.label(), "Permissions checked"),
            }
            report.entries.push(PermissionEntry {
                collection_id: spec.id.clone(),
                outcome,
            });
        }
        Ok(report)
    }

    async fn fix_collection(
        &self,
        spec: &ResourceSpec,
        first_call: bool,
    ) -> Result<PermissionOutcome> {
        let current = match self.store.get_collection(&self.database_id, &spec.id).await {
            Ok(collection) => collection,
            Err(e) => return classify(e, first_call),
        };

        let update = CollectionUpdate {
            collection_id: spec.id.clone(),
            name: current.name.clone(),
            permissions: spec.permissions.clone(),
            document_security: spec.document_security,
            enabled: spec.enabled,
        };
        if !update.differs_from(&current) {
            return Ok(PermissionOutcome::Unchanged);
        }

        match self.store.update_collection(&self.database_id, &update).await {
            Ok(_) => Ok(PermissionOutcome::Updated),
            Err(e) => classify(e, false),
        }
    }
}

fn classify(error: CaresError, first_call: bool) -> Result<PermissionOutcome> {
    if error.aborts_run(first_call) {
        return Err(error);
    }
    match error.class() {
        ErrorClass::NotFound => Ok(PermissionOutcome::Missing),
        _ => Ok(PermissionOutcome::Failed(error.to_string())),
    }
}
