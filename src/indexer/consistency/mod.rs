// Consistency checking for resources whose embeddings do not match their content


use std::fmt;

use tracing::{debug, error, info, warn};

use super::Indexer;
use crate::Result;
use crate::database::sqlite::Database;
use crate::database::sqlite::models::ResourceEmbeddingCount;
use crate::embeddings::chunk_count;

/// How a resource's stored embeddings differ from what its content chunks into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceIssueKind {
    /// Some, but not all, chunks have embeddings
    Partial,
    /// Chunks are expected but nothing is stored
    Orphaned,
    /// More embeddings than chunks
    Excess,
}

impl fmt::Display for ResourceIssueKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Partial => write!(f, "partial"),
            Self::Orphaned => write!(f, "orphaned"),
            Self::Excess => write!(f, "excess"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceIssue {
    pub resource_id: String,
    pub resource_type: String,
    pub product_id: Option<String>,
    pub expected_chunks: usize,
    pub stored_embeddings: usize,
    pub kind: ResourceIssueKind,
}

impl ResourceIssue {
    /// Classify one resource, or `None` when its counts agree
    #[inline]
    pub fn classify(expected_chunks: usize, stored_embeddings: usize) -> Option<ResourceIssueKind> {
        use std::cmp::Ordering;

        match stored_embeddings.cmp(&expected_chunks) {
            Ordering::Equal => None,
            Ordering::Greater => Some(ResourceIssueKind::Excess),
            Ordering::Less if stored_embeddings == 0 => Some(ResourceIssueKind::Orphaned),
            Ordering::Less => Some(ResourceIssueKind::Partial),
        }
    }

    fn from_count(count: ResourceEmbeddingCount) -> Option<Self> {
        let expected_chunks = chunk_count(&count.content);
        let stored_embeddings = usize::try_from(count.embedding_count).unwrap_or(0);
        let kind = Self::classify(expected_chunks, stored_embeddings)?;

        Some(Self {
            resource_id: count.resource_id,
            resource_type: count.resource_type,
            product_id: count.product_id,
            expected_chunks,
            stored_embeddings,
            kind,
        })
    }
}

/// Result of comparing every resource's chunk count with its stored embeddings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub resources_checked: usize,
    pub expected_embeddings: usize,
    pub stored_embeddings: usize,
    pub issues: Vec<ResourceIssue>,
    pub is_consistent: bool,
}

impl ConsistencyReport {
    #[inline]
    pub fn count(&self, kind: ResourceIssueKind) -> usize {
        self.issues.iter().filter(|issue| issue.kind == kind).count()
    }

    /// Get a human-readable summary of the consistency report
    #[inline]
    pub fn summary(&self) -> String {
        if self.is_consistent {
            format!(
                "Store is consistent: {} resources, {} embeddings",
                self.resources_checked, self.stored_embeddings
            )
        } else {
            format!(
                "Inconsistencies found in {} of {} resources: {} partial, {} orphaned, {} excess",
                self.issues.len(),
                self.resources_checked,
                self.count(ResourceIssueKind::Partial),
                self.count(ResourceIssueKind::Orphaned),
                self.count(ResourceIssueKind::Excess)
            )
        }
    }

    #[inline]
    pub fn total_issues(&self) -> usize {
        self.issues.len()
    }
}

/// Detects resources left in a partial ingestion state
pub struct ConsistencyValidator<'a> {
    database: &'a Database,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(database: &'a Database) -> Self {
        Self { database }
    }

    #[inline]
    pub async fn validate(&self) -> Result<ConsistencyReport> {
        info!("Starting resource consistency validation");

        let counts = self.database.resource_embedding_counts().await?;
        debug!("Checking {} resources", counts.len());

        let resources_checked = counts.len();
        let mut expected_embeddings = 0;
        let mut stored_embeddings = 0;
        let mut issues = Vec::new();

        for count in counts {
            expected_embeddings += chunk_count(&count.content);
            stored_embeddings += usize::try_from(count.embedding_count).unwrap_or(0);
            if let Some(issue) = ResourceIssue::from_count(count) {
                issues.push(issue);
            }
        }

        let report = ConsistencyReport {
            resources_checked,
            expected_embeddings,
            stored_embeddings,
            is_consistent: issues.is_empty(),
            issues,
        };

        if report.is_consistent {
            info!("Resource consistency validation passed");
        } else {
            warn!("{}", report.summary());
            for issue in &report.issues {
                warn!(
                    "Resource {} is {}: {} chunks, {} embeddings",
                    issue.resource_id, issue.kind, issue.expected_chunks, issue.stored_embeddings
                );
            }
        }

        Ok(report)
    }

    /// Re-embed every resource named in `report` through `indexer`; returns how many were repaired
    #[inline]
    pub async fn repair(&self, indexer: &Indexer, report: &ConsistencyReport) -> Result<usize> {
        if report.is_consistent {
            info!("Store is consistent, no repair needed");
            return Ok(0);
        }

        let mut repaired = 0;
        for issue in &report.issues {
            match indexer.repair_resource(&issue.resource_id).await {
                Ok(outcome) if outcome.is_complete() => {
                    repaired += 1;
                    debug!("Repaired resource {}", issue.resource_id);
                }
                Ok(outcome) => {
                    warn!(
                        "Resource {} still has {} embeddings for {} chunks",
                        issue.resource_id, outcome.embedding_count, outcome.chunk_count
                    );
                }
                Err(e) => {
                    error!("Failed to repair resource {}: {}", issue.resource_id, e);
                }
            }
        }

        info!(
            "Repaired {} of {} inconsistent resources",
            repaired,
            report.issues.len()
        );
        Ok(repaired)
    }
}
