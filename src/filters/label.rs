use core::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Label criteria: labels an item must carry and labels it must not.
///
/// Matching is case-insensitive; both sets are normalized to lowercase at
/// construction. An include entry may be a comma-joined AND-group
/// (`"bug,critical"` requires both labels); exclude entries are single
/// labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFilter {
    include: BTreeSet<String>,
    exclude: BTreeSet<String>,
}

impl LabelFilter {
    pub fn new(
        include: impl IntoIterator<Item = impl AsRef<str>>,
        exclude: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            include: include.into_iter().map(|s| s.as_ref().to_lowercase()).collect(),
            exclude: exclude.into_iter().map(|s| s.as_ref().to_lowercase()).collect(),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` when neither set constrains anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Whether a snapshot filtered by `self` can serve a request filtered by
    /// `other` without re-fetching.
    ///
    /// An unconstrained include serves anything; a constrained include can
    /// only narrow, so `other` must include a non-empty subset of it. The
    /// exclude side is mirrored: everything `self` excluded must also be
    /// excluded by `other`.
    #[must_use]
    pub fn compatible_with(&self, other: &Self) -> bool {
        (self.include.is_empty() || (!other.include.is_empty() && self.include.is_superset(&other.include)))
            && (self.exclude.is_empty() || (!other.exclude.is_empty() && self.exclude.is_subset(&other.exclude)))
    }

    /// Whether an item carrying `labels` (already lowercase) passes.
    #[must_use]
    pub fn passes(&self, labels: &BTreeSet<String>) -> bool {
        if !self.include.is_empty() {
            let matched = self.include.iter().any(|entry| {
                if entry.contains(',') {
                    entry.split(',').map(str::trim).all(|part| labels.contains(part))
                } else {
                    labels.contains(entry)
                }
            });
            if !matched {
                return false;
            }
        }
        !self.exclude.iter().any(|label| labels.contains(label))
    }
}

impl Display for LabelFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[{:?}, {:?}]", self.include, self.exclude)
    }
}
