use super::label::LabelFilter;
use crate::model::IssueLink;
use core::fmt::{Display, Formatter, Result as FmtResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Issue-tracker criteria for selecting work items by their linked issues.
///
/// An item passes when at least one linked issue satisfies *all* of the
/// non-empty criteria: the label filter against the issue's labels and
/// components, epic-key membership, and issue-type membership. Matching is
/// case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueFilter {
    labels: LabelFilter,
    epics: BTreeSet<String>,
    issue_types: BTreeSet<String>,
}

impl IssueFilter {
    pub fn new(
        labels: LabelFilter,
        epics: impl IntoIterator<Item = impl AsRef<str>>,
        issue_types: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        Self {
            labels,
            epics: epics.into_iter().map(|s| s.as_ref().to_lowercase()).collect(),
            issue_types: issue_types.into_iter().map(|s| s.as_ref().to_lowercase()).collect(),
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` when no criterion constrains anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty() && self.epics.is_empty() && self.issue_types.is_empty()
    }

    /// Whether a snapshot filtered by `self` can serve a request filtered by
    /// `other` without re-fetching. Same direction as
    /// [`LabelFilter::compatible_with`] on every axis.
    #[must_use]
    pub fn compatible_with(&self, other: &Self) -> bool {
        if !self.labels.compatible_with(&other.labels) {
            return false;
        }
        if !self.epics.is_empty() && (other.epics.is_empty() || !self.epics.is_superset(&other.epics)) {
            return false;
        }
        if !self.issue_types.is_empty()
            && (other.issue_types.is_empty() || !self.issue_types.is_superset(&other.issue_types))
        {
            return false;
        }
        true
    }

    /// Whether one linked issue satisfies every non-empty criterion.
    #[must_use]
    pub fn matches(&self, issue: &IssueLink) -> bool {
        let issue_labels: BTreeSet<String> = issue
            .labels
            .iter()
            .chain(issue.components.iter())
            .map(|l| l.to_lowercase())
            .collect();
        if !self.labels.passes(&issue_labels) {
            return false;
        }
        if !self.epics.is_empty() {
            let in_epic = issue
                .epic_key
                .as_ref()
                .is_some_and(|epic| self.epics.contains(&epic.to_lowercase()));
            if !in_epic {
                return false;
            }
        }
        if !self.issue_types.is_empty() {
            let typed = issue
                .issue_type
                .as_ref()
                .is_some_and(|t| self.issue_types.contains(&t.to_lowercase()));
            if !typed {
                return false;
            }
        }
        true
    }
}

impl Display for IssueFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "[{}, {:?}, {:?}]", self.labels, self.epics, self.issue_types)
    }
}
