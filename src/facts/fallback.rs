use crate::Result;
use core::cmp::Ordering;
use ohno::app_err;
use serde::{Deserialize, Serialize};

/// A value with a "plan B".
///
/// [`best`](Self::best) resolves to the primary value when present, else to
/// the backup chain's best. Whether the *primary* reading exists is a
/// separate question answered by [`value`](Self::value); the distinction
/// matters because later extraction layers may revise a primary while
/// keeping the backup intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fallback<T> {
    value: Option<T>,
    backup: Option<Box<Fallback<T>>>,
}

impl<T: Copy> Fallback<T> {
    /// No value and no backup.
    #[must_use]
    pub const fn absent() -> Self {
        Self { value: None, backup: None }
    }

    /// A primary reading with no backup.
    #[must_use]
    pub const fn from_value(value: Option<T>) -> Self {
        Self { value, backup: None }
    }

    /// A primary reading backed by another fallback.
    #[must_use]
    pub fn with_backup(value: Option<T>, backup: Self) -> Self {
        Self {
            value,
            backup: Some(Box::new(backup)),
        }
    }

    /// The primary reading, if any.
    #[must_use]
    pub const fn value(&self) -> Option<T> {
        self.value
    }

    /// The best-effort reading: the primary value, else the backup's best.
    #[must_use]
    pub fn best(&self) -> Option<T> {
        match (self.value, &self.backup) {
            (Some(value), _) => Some(value),
            (None, Some(backup)) => backup.best(),
            (None, None) => None,
        }
    }

    /// Returns `true` when either the primary or a backup resolves.
    #[must_use]
    pub fn has_best(&self) -> bool {
        self.best().is_some()
    }
}

impl<T: Copy + Ord> Fallback<T> {
    /// The minimum over the arguments' bests, ignoring absent ones; absent
    /// when all are absent.
    #[must_use]
    pub fn min(args: impl IntoIterator<Item = Self>) -> Self {
        Self::from_value(args.into_iter().filter_map(|arg| arg.best()).min())
    }

    /// The maximum over the arguments' bests, ignoring absent ones; absent
    /// when all are absent.
    #[must_use]
    pub fn max(args: impl IntoIterator<Item = Self>) -> Self {
        Self::from_value(args.into_iter().filter_map(|arg| arg.best()).max())
    }

    /// Compare two fallbacks by their bests.
    ///
    /// Comparing when either side has no resolvable best is an error, not an
    /// ordering.
    pub fn try_cmp(&self, other: &Self) -> Result<Ordering> {
        match (self.best(), other.best()) {
            (Some(a), Some(b)) => Ok(a.cmp(&b)),
            _ => Err(app_err!("cannot compare a fallback with no resolvable value")),
        }
    }
}
