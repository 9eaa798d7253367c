use crate::model::UserId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use strum::{Display, EnumIter, EnumString};

/// The ways a user can participate in a work item's lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Author,
    Merger,
    Releaser,
    Reviewer,
    Commenter,
    CommitAuthor,
    CommitCommitter,
}

/// A participant filter: per-role sets of user identities.
///
/// An item matches when *any* requested role matches one of its identities.
/// An empty map means "keep all".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Participants(BTreeMap<Role, BTreeSet<UserId>>);

impl Participants {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeSet::is_empty)
    }

    /// Add identities under a role, merging with any already present.
    pub fn add(&mut self, role: Role, users: impl IntoIterator<Item = impl Into<UserId>>) -> &mut Self {
        self.0.entry(role).or_default().extend(users.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn get(&self, role: Role) -> Option<&BTreeSet<UserId>> {
        self.0.get(&role).filter(|users| !users.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, &BTreeSet<UserId>)> {
        self.0.iter().filter(|(_, users)| !users.is_empty()).map(|(role, users)| (*role, users))
    }

    /// Whether a snapshot filtered by `self` can serve a request filtered by
    /// `other` without re-fetching.
    ///
    /// An unfiltered snapshot serves anything. A filtered snapshot cannot
    /// serve an unfiltered request, and otherwise every requested role's
    /// identity set must be a subset of what the snapshot was built with.
    #[must_use]
    pub fn compatible_with(&self, other: &Self) -> bool {
        if self.is_empty() {
            return true;
        }
        if other.is_empty() {
            return false;
        }
        other
            .iter()
            .all(|(role, users)| self.get(role).is_some_and(|own| own.is_superset(users)))
    }
}
