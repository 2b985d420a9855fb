//! Provisioning report

use serde::Serialize;
use std::fmt;

/// Kind of provisioned resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Collection,
    Attribute,
    Index,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Collection => "collection",
            ResourceKind::Attribute => "attribute",
            ResourceKind::Index => "index",
        }
    }
}

/// Outcome for a single resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "kebab-case")]
pub enum ProvisionResult {
    Created,
    AlreadyExists,
    Failed(String),
}

impl ProvisionResult {
    pub fn failed(reason: impl Into<String>) -> Self {
        ProvisionResult::Failed(reason.into())
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ProvisionResult::Failed(_))
    }

    /// Metric label for this outcome
    pub fn label(&self) -> &'static str {
        match self {
            ProvisionResult::Created => "created",
            ProvisionResult::AlreadyExists => "already_exists",
            ProvisionResult::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ProvisionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionResult::Created => f.write_str("created"),
            ProvisionResult::AlreadyExists => f.write_str("already-exists"),
            ProvisionResult::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// One line of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub kind: ResourceKind,
    pub collection_id: String,
    /// Collection id, attribute key or index key
    pub resource_id: String,
    #[serde(flatten)]
    pub result: ProvisionResult,
}

impl ReportEntry {
    pub fn new(
        kind: ResourceKind,
        collection_id: impl Into<String>,
        resource_id: impl Into<String>,
        result: ProvisionResult,
    ) -> Self {
        Self {
            kind,
            collection_id: collection_id.into(),
            resource_id: resource_id.into(),
            result,
        }
    }
}

/// Summary counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub created: usize,
    pub already_exists: usize,
    pub failed: usize,
}

/// Ordered outcome of a provisioning run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    entries: Vec<ReportEntry>,
}

impl ProvisionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn summary(&self) -> ReportSummary {
        self.entries
            .iter()
            .fold(ReportSummary::default(), |mut summary, entry| {
                match entry.result {
                    ProvisionResult::Created => summary.created += 1,
                    ProvisionResult::AlreadyExists => summary.already_exists += 1,
                    ProvisionResult::Failed(_) => summary.failed += 1,
                }
                summary
            })
    }

    pub fn failures(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.result.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            let target = match entry.kind {
                ResourceKind::Collection => entry.collection_id.clone(),
                _ => format!("{}.{}", entry.collection_id, entry.resource_id),
            };
            writeln!(f, "{:<10} {:<40} {}", entry.kind.as_str(), target, entry.result)?;
        }
        let summary = self.summary();
        write!(
            f,
            "{} created, {} already existed, {} failed",
            summary.created, summary.already_exists, summary.failed
        )
    }
}
