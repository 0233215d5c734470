//! Garbage collection for stored objects that no submitted draft references.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::StorageError;
use crate::workflows::application::verification::{Clock, SystemClock};

/// One stored object as reported by a backend listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryEntry {
    pub locator: String,
    pub created_at: Option<DateTime<Utc>>,
    pub size: Option<u64>,
}

#[async_trait]
pub trait DocumentInventory: Send + Sync {
    async fn list(&self, prefix: &str) -> Result<Vec<InventoryEntry>, StorageError>;
    async fn delete(&self, locator: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub scanned: usize,
    pub referenced: usize,
    pub within_grace: usize,
    pub orphaned: Vec<String>,
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
    pub dry_run: bool,
}

/// Deletes objects under a prefix that are unreferenced and older than the grace period.
///
/// Objects without a creation time are never collected.
pub struct OrphanReconciler {
    inventory: Arc<dyn DocumentInventory>,
    prefix: String,
    grace: Duration,
    clock: Arc<dyn Clock>,
}

impl OrphanReconciler {
    pub fn new(inventory: Arc<dyn DocumentInventory>, prefix: impl Into<String>, grace: Duration) -> Self {
        Self {
            inventory,
            prefix: prefix.into(),
            grace,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn reconcile(
        &self,
        referenced: &HashSet<String>,
        dry_run: bool,
    ) -> Result<ReconciliationReport, StorageError> {
        let cutoff = self.clock.now() - self.grace;
        let entries = self.inventory.list(&self.prefix).await?;
        let mut report = ReconciliationReport {
            scanned: entries.len(),
            dry_run,
            ..ReconciliationReport::default()
        };

        for entry in entries {
            if referenced.contains(&entry.locator) {
                report.referenced += 1;
                continue;
            }
            match entry.created_at {
                Some(created_at) if created_at < cutoff => report.orphaned.push(entry.locator),
                _ => report.within_grace += 1,
            }
        }

        if dry_run {
            info!(
                orphaned = report.orphaned.len(),
                scanned = report.scanned,
                "dry run; no objects deleted"
            );
            return Ok(report);
        }

        for locator in &report.orphaned {
            match self.inventory.delete(locator).await {
                Ok(()) => report.deleted.push(locator.clone()),
                Err(err) => {
                    warn!(locator = %locator, error = %err, "failed to delete orphaned object");
                    report.failed.push(locator.clone());
                }
            }
        }

        info!(
            deleted = report.deleted.len(),
            failed = report.failed.len(),
            scanned = report.scanned,
            "orphan reconciliation finished"
        );
        Ok(report)
    }
}
