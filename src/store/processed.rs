use super::Batch;
use crate::feed::types::ProjectId;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

pub const DEFAULT_RECENCY_WINDOW_DAYS: i64 = 7;

/// In-memory "last processed" date per project, derived from stored batches.
///
/// Recency checks take the read lock; `mark_processed` and `rebuild` take the
/// write lock. Dates only ever move forward for a given identity.
pub struct ProcessedIndex {
    window_days: i64,
    entries: RwLock<HashMap<ProjectId, NaiveDate>>,
}

impl Default for ProcessedIndex {
    fn default() -> Self {
        Self::new(DEFAULT_RECENCY_WINDOW_DAYS)
    }
}

impl ProcessedIndex {
    pub fn new(window_days: i64) -> Self {
        Self {
            window_days: window_days.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_batches(batches: &[Batch], window_days: i64) -> Self {
        let index = Self::new(window_days);
        index.rebuild(batches);
        index
    }

    pub fn window_days(&self) -> i64 {
        self.window_days
    }

    /// Replace the index with the max batch date seen per identity.
    /// Result does not depend on batch order.
    pub fn rebuild(&self, batches: &[Batch]) {
        let mut fresh: HashMap<ProjectId, NaiveDate> = HashMap::new();
        for batch in batches {
            for project in &batch.projects {
                fresh
                    .entry(project.id())
                    .and_modify(|d| *d = (*d).max(batch.date))
                    .or_insert(batch.date);
            }
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        *entries = fresh;
    }

    /// True iff `id` was processed less than `window_days` days before `today`.
    /// A date later than `today` counts as recent.
    pub fn is_recently_processed(&self, id: &ProjectId, today: NaiveDate) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        match entries.get(id) {
            Some(&date) => (today - date).num_days() < self.window_days,
            None => false,
        }
    }

    /// Record `date` unless a later date is already stored.
    pub fn mark_processed(&self, id: ProjectId, date: NaiveDate) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(id)
            .and_modify(|d| *d = (*d).max(date))
            .or_insert(date);
    }

    pub fn last_processed(&self, id: &ProjectId) -> Option<NaiveDate> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
