//! Reconciliation of a fetched delta against the store.
//!
//! Each category is handled independently: entries are partitioned into
//! removals and insertions, removals are applied first, then insertions.
//! The cursor moves only when the raw payload carried at least one entry.

use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::model::{Category, Cursor, DeltaEntry, UpdatePayload};
use crate::store::Store;
use crate::validation::validate_blacklist_ip;

/// Add/remove sets of one category, deduplicated, in payload order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub to_insert: Vec<String>,
    pub to_remove: Vec<String>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_remove.is_empty()
    }
}

/// Split raw payload entries into insert and remove sets.
///
/// Entries without the category's value field are dropped. Blacklist entries
/// that are not IPv4 addresses or CIDRs are dropped with a warning.
pub fn partition(category: Category, entries: &[Value]) -> Diff {
    let mut diff = Diff::default();
    let mut seen_insert = HashSet::new();
    let mut seen_remove = HashSet::new();

    for item in entries {
        let Some(entry) = DeltaEntry::from_value(category, item) else {
            debug!(category = %category, "Dropping entry without {}", category.value_field());
            continue;
        };

        if category == Category::BlacklistedIps {
            if let Err(e) = validate_blacklist_ip(&entry.value) {
                warn!(category = %category, error = %e, "Dropping blacklist entry");
                continue;
            }
        }

        if entry.removed {
            if seen_remove.insert(entry.value.clone()) {
                diff.to_remove.push(entry.value);
            }
        } else if seen_insert.insert(entry.value.clone()) {
            diff.to_insert.push(entry.value);
        }
    }

    diff
}

/// Outcome of one category within a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryChange {
    /// Size of the insert set sent to the store
    pub requested_inserts: usize,
    /// Size of the remove set sent to the store
    pub requested_removals: usize,
    /// Rows the store actually inserted
    pub inserted: u64,
    /// Rows the store actually removed
    pub removed: u64,
}

impl CategoryChange {
    /// True when the payload asked for any insert or removal, even if no row changed.
    pub fn changed(&self) -> bool {
        self.requested_inserts > 0 || self.requested_removals > 0
    }
}

/// What a cycle did to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSummary {
    pub signatures: CategoryChange,
    pub rules: CategoryChange,
    pub ips: CategoryChange,
    /// New cursor value, when it was advanced
    pub cursor: Option<Cursor>,
}

impl ChangeSummary {
    pub fn category(&self, category: Category) -> &CategoryChange {
        match category {
            Category::MalwareSignatures => &self.signatures,
            Category::YaraRules => &self.rules,
            Category::BlacklistedIps => &self.ips,
        }
    }

    fn category_mut(&mut self, category: Category) -> &mut CategoryChange {
        match category {
            Category::MalwareSignatures => &mut self.signatures,
            Category::YaraRules => &mut self.rules,
            Category::BlacklistedIps => &mut self.ips,
        }
    }

    /// The activation trigger: the blacklist had inserts or removals.
    pub fn ips_changed(&self) -> bool {
        self.ips.changed()
    }
}

/// Applies update payloads to a store.
pub struct ReconciliationEngine {
    store: Arc<dyn Store>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Apply `payload`, then advance the cursor to `now` if the payload was non-empty.
    ///
    /// Stops at the first storage failure: categories already written stay
    /// committed, the failing one is rolled back, the remaining ones and the
    /// cursor are left untouched.
    pub async fn apply(
        &self,
        payload: &UpdatePayload,
        now: Cursor,
    ) -> Result<ChangeSummary, SyncError> {
        let mut summary = ChangeSummary::default();

        for category in Category::ALL {
            let diff = partition(category, payload.entries(category));
            let change = self.apply_diff(category, &diff).await?;

            if change.changed() {
                info!(
                    category = %category,
                    inserted = change.inserted,
                    removed = change.removed,
                    requested_inserts = change.requested_inserts,
                    requested_removals = change.requested_removals,
                    "Applied delta"
                );
            }
            *summary.category_mut(category) = change;
        }

        if payload.is_empty() {
            debug!("Empty payload, cursor unchanged");
            return Ok(summary);
        }

        let previous = self
            .store
            .read_cursor()
            .await
            .map_err(|e| SyncError::storage("read cursor", e))?;

        // Never move backwards, even if the local clock does
        let next = match previous {
            Some(prev) if prev > now => prev,
            _ => now,
        };

        self.store
            .advance_cursor(next)
            .await
            .map_err(|e| SyncError::storage("advance cursor", e))?;

        debug!(cursor = %next, "Cursor advanced");
        summary.cursor = Some(next);

        Ok(summary)
    }

    async fn apply_diff(&self, category: Category, diff: &Diff) -> Result<CategoryChange, SyncError> {
        let mut change = CategoryChange {
            requested_inserts: diff.to_insert.len(),
            requested_removals: diff.to_remove.len(),
            ..Default::default()
        };

        if diff.is_empty() {
            return Ok(change);
        }

        // One transaction per category: removals strictly before insertions,
        // so a value removed and re-added in the same payload ends up present
        let counts = self
            .store
            .apply_batch(category, &diff.to_remove, &diff.to_insert)
            .await
            .map_err(|e| SyncError::storage(format!("apply batch to {}", category), e))?;
        change.removed = counts.removed;
        change.inserted = counts.inserted;

        Ok(change)
    }
}
