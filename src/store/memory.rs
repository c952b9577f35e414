//! In-process store backend.
//!
//! Holds each category in a `BTreeSet`, which gives the same lexical ordering
//! as the PostgreSQL backend. Used by tests and by `--memory` runs.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::{BatchCounts, Store};
use crate::model::{Category, Cursor};

#[derive(Default)]
struct MemoryState {
    sets: HashMap<Category, BTreeSet<String>>,
    cursor_log: Vec<Cursor>,
    mutations: u64,
    failing_inserts: HashSet<Category>,
}

/// Store backed by process memory; contents are lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a category without counting it as a mutation.
    pub fn with_values<I, S>(self, category: Category, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock()
            .sets
            .entry(category)
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Seed the cursor without counting it as a mutation.
    pub fn with_cursor(self, cursor: Cursor) -> Self {
        self.lock().cursor_log.push(cursor);
        self
    }

    /// Make every later insert into `category` fail, as a lost connection would.
    pub fn fail_inserts_into(self, category: Category) -> Self {
        self.lock().failing_inserts.insert(category);
        self
    }

    /// Current values of a category, in lexical order.
    pub fn snapshot(&self, category: Category) -> Vec<String> {
        self.lock()
            .sets
            .get(&category)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of committed writes (insert, delete, batch, cursor advance) so far.
    pub fn mutations(&self) -> u64 {
        self.lock().mutations
    }

    /// Every cursor value recorded, in write order.
    pub fn cursor_log(&self) -> Vec<Cursor> {
        self.lock().cursor_log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave a set half-updated
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn migrate(&self) -> Result<()> {
        Ok(())
    }

    async fn list(&self, category: Category) -> Result<Vec<String>> {
        Ok(self.snapshot(category))
    }

    async fn list_ips(&self) -> Result<Vec<String>> {
        Ok(self.snapshot(Category::BlacklistedIps))
    }

    async fn count(&self, category: Category) -> Result<u64> {
        Ok(self
            .lock()
            .sets
            .get(&category)
            .map_or(0, |set| set.len() as u64))
    }

    async fn insert_many(&self, category: Category, values: &[String]) -> Result<u64> {
        let mut state = self.lock();
        if state.failing_inserts.contains(&category) {
            bail!("insert into {} rejected", category);
        }
        state.mutations += 1;
        let set = state.sets.entry(category).or_default();
        let inserted = values.iter().filter(|v| set.insert((*v).clone())).count();
        Ok(inserted as u64)
    }

    async fn delete_many(&self, category: Category, values: &[String]) -> Result<u64> {
        let mut state = self.lock();
        state.mutations += 1;
        let removed = match state.sets.get_mut(&category) {
            Some(set) => values.iter().filter(|v| set.remove(v.as_str())).count(),
            None => 0,
        };
        Ok(removed as u64)
    }

    async fn apply_batch(
        &self,
        category: Category,
        to_remove: &[String],
        to_insert: &[String],
    ) -> Result<BatchCounts> {
        let mut state = self.lock();
        if !to_insert.is_empty() && state.failing_inserts.contains(&category) {
            bail!("insert into {} rejected", category);
        }

        // Work on a copy and swap it in only once the whole batch is applied
        let mut set = state.sets.get(&category).cloned().unwrap_or_default();
        let removed = to_remove.iter().filter(|v| set.remove(v.as_str())).count();
        let inserted = to_insert.iter().filter(|v| set.insert((*v).clone())).count();

        state.sets.insert(category, set);
        state.mutations += 1;
        Ok(BatchCounts {
            removed: removed as u64,
            inserted: inserted as u64,
        })
    }

    async fn read_cursor(&self) -> Result<Option<Cursor>> {
        Ok(self.lock().cursor_log.iter().max().copied())
    }

    async fn advance_cursor(&self, now: Cursor) -> Result<()> {
        let mut state = self.lock();
        state.mutations += 1;
        state.cursor_log.push(now);
        Ok(())
    }
}
