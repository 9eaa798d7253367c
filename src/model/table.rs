use super::rows::{SubEntityId, Truncate, WorkItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A sub-entity table with a two-level ordered index: work item id first,
/// sub-entity id second.
///
/// The first index level makes selecting everything that belongs to one
/// work item cheap, and lets a work-item removal cascade in one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table<R> {
    rows: BTreeMap<WorkItemId, BTreeMap<SubEntityId, R>>,
}

impl<R> Default for Table<R> {
    fn default() -> Self {
        Self { rows: BTreeMap::new() }
    }
}

impl<R> Table<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row under `(item, sub)`, replacing any previous row with the
    /// same key.
    pub fn insert(&mut self, item: WorkItemId, sub: SubEntityId, row: R) {
        let _ = self.rows.entry(item).or_default().insert(sub, row);
    }

    /// Iterate the rows belonging to one work item.
    pub fn rows_for(&self, item: &WorkItemId) -> impl Iterator<Item = &R> {
        self.rows.get(item).into_iter().flat_map(BTreeMap::values)
    }

    /// Iterate every row together with its full key.
    pub fn iter(&self) -> impl Iterator<Item = (&WorkItemId, &SubEntityId, &R)> {
        self.rows
            .iter()
            .flat_map(|(item, subs)| subs.iter().map(move |(sub, row)| (item, sub, row)))
    }

    /// The distinct work item ids present in the first index level.
    pub fn item_ids(&self) -> impl Iterator<Item = &WorkItemId> {
        self.rows.keys()
    }

    /// Cascade-remove every row belonging to `item`.
    pub fn remove_item(&mut self, item: &WorkItemId) {
        let _ = self.rows.remove(item);
    }

    /// Keep only the rows whose work item id satisfies `keep`.
    pub fn retain_items(&mut self, mut keep: impl FnMut(&WorkItemId) -> bool) {
        self.rows.retain(|item, _| keep(item));
    }

    /// Total number of rows across all work items.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<R: Truncate> Table<R> {
    /// Null every timestamp past `horizon` in every row.
    pub fn truncate(&mut self, horizon: DateTime<Utc>) {
        for subs in self.rows.values_mut() {
            for row in subs.values_mut() {
                row.truncate(horizon);
            }
        }
    }
}

impl<R> FromIterator<(WorkItemId, SubEntityId, R)> for Table<R> {
    fn from_iter<I: IntoIterator<Item = (WorkItemId, SubEntityId, R)>>(iter: I) -> Self {
        let mut table = Self::new();
        for (item, sub, row) in iter {
            table.insert(item, sub, row);
        }
        table
    }
}
