//! External configuration
//!
//! Everything the core consumes but does not interpret lives here: cache
//! TTLs, the known-bots allow-list, and the per-repository release-matching
//! policy. The release policy is opaque to the assembly pipeline — it is
//! passed through to the metadata-store queries and participates in cache
//! keys by value.

use crate::Result;
use crate::model::UserId;
use core::fmt::{Display, Formatter, Result as FmtResult};
use core::time::Duration;
use ohno::IntoAppError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use strum::{Display as StrumDisplay, EnumString};

/// How releases are matched to a repository's merged work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, StrumDisplay, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReleaseMatch {
    Branch,
    Tag,
    TagOrBranch,
}

/// The matching strategy for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseMatchSetting {
    /// Branch name pattern for branch-matched releases.
    #[serde(default)]
    pub branches: String,
    /// Tag name pattern for tag-matched releases.
    #[serde(default)]
    pub tags: String,
    #[serde(rename = "match")]
    pub match_kind: ReleaseMatch,
}

impl Display for ReleaseMatchSetting {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}|{}|{}", self.match_kind, self.branches, self.tags)
    }
}

/// Per-repository release-matching strategies.
///
/// Ordered by repository name so that the [`Display`] form — which cache
/// keys hash — is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleasePolicy(BTreeMap<Arc<str>, ReleaseMatchSetting>);

impl ReleasePolicy {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn set(&mut self, repository: impl Into<Arc<str>>, setting: ReleaseMatchSetting) -> &mut Self {
        let _ = self.0.insert(repository.into(), setting);
        self
    }

    #[must_use]
    pub fn get(&self, repository: &str) -> Option<&ReleaseMatchSetting> {
        self.0.get(repository)
    }
}

impl Display for ReleasePolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        for (i, (repository, setting)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{repository}:{setting}")?;
        }
        Ok(())
    }
}

/// The known-bots allow-list, consulted when deciding whether a comment or
/// review counts as external. Case-insensitive; external configuration, not
/// hard-coded behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotRegistry {
    logins: BTreeSet<String>,
}

impl BotRegistry {
    #[must_use]
    pub fn new(logins: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self {
            logins: logins.into_iter().map(|l| l.as_ref().to_lowercase()).collect(),
        }
    }

    #[must_use]
    pub fn is_bot(&self, user: &UserId) -> bool {
        self.logins.contains(&user.as_str().to_lowercase())
    }
}

/// Configuration for a [`Miner`](crate::Miner).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MinerConfig {
    /// How long assembled snapshots stay cached.
    #[serde(default = "default_snapshot_ttl", with = "humantime_serde")]
    pub snapshot_cache_ttl: Duration,

    /// How long extracted facts of still-open items stay cached.
    #[serde(default = "default_snapshot_ttl", with = "humantime_serde")]
    pub facts_cache_ttl_open: Duration,

    /// How long extracted facts of closed items stay cached. Closed items
    /// can no longer change, so this is typically much longer.
    #[serde(default = "default_closed_facts_ttl", with = "humantime_serde")]
    pub facts_cache_ttl_closed: Duration,

    /// Logins treated as bots when classifying external comments.
    #[serde(default)]
    pub bots: Vec<String>,

    /// Release-matching strategy per repository.
    #[serde(default)]
    pub release_policy: ReleasePolicy,
}

const fn default_snapshot_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

const fn default_closed_facts_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            snapshot_cache_ttl: default_snapshot_ttl(),
            facts_cache_ttl_open: default_snapshot_ttl(),
            facts_cache_ttl_closed: default_closed_facts_ttl(),
            bots: Vec::new(),
            release_policy: ReleasePolicy::empty(),
        }
    }
}

impl MinerConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).into_app_err_with(|| "parsing miner configuration".to_string())
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .into_app_err_with(|| format!("reading configuration file '{}'", path.display()))?;
        Self::from_toml(&text)
    }

    /// The bot registry derived from the configured logins.
    #[must_use]
    pub fn bot_registry(&self) -> BotRegistry {
        BotRegistry::new(self.bots.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_an_empty_document() {
        let config = MinerConfig::from_toml("").unwrap();
        assert_eq!(config, MinerConfig::default());
        assert_eq!(config.snapshot_cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn full_document_round_trips() {
        let text = r#"
            snapshot_cache_ttl = "10m"
            facts_cache_ttl_open = "2m"
            facts_cache_ttl_closed = "7d"
            bots = ["dependabot", "Renovate"]

            [release_policy."org/repo"]
            branches = "master"
            tags = "v.*"
            match = "tag_or_branch"
        "#;
        let config = MinerConfig::from_toml(text).unwrap();
        assert_eq!(config.snapshot_cache_ttl, Duration::from_secs(600));
        assert_eq!(config.facts_cache_ttl_closed, Duration::from_secs(7 * 24 * 3600));
        assert!(config.bot_registry().is_bot(&UserId::from("renovate")));
        let setting = config.release_policy.get("org/repo").unwrap();
        assert_eq!(setting.match_kind, ReleaseMatch::TagOrBranch);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(MinerConfig::from_toml("nonsense = 1").is_err());
    }

    #[test]
    fn load_reads_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("miner.toml");
        std::fs::write(&path, "bots = [\"dependabot\"]\n").unwrap();

        let config = MinerConfig::load(&path).unwrap();
        assert!(config.bot_registry().is_bot(&UserId::from("dependabot")));
        assert!(MinerConfig::load(tmp.path().join("missing.toml")).is_err());
    }

    #[test]
    fn bot_matching_is_case_insensitive() {
        let bots = BotRegistry::new(["CI-Bot"]);
        assert!(bots.is_bot(&UserId::from("ci-bot")));
        assert!(bots.is_bot(&UserId::from("CI-BOT")));
        assert!(!bots.is_bot(&UserId::from("alice")));
    }

    #[test]
    fn release_policy_display_is_deterministic() {
        let mut policy = ReleasePolicy::empty();
        let _ = policy
            .set(
                "b/repo",
                ReleaseMatchSetting {
                    branches: "main".into(),
                    tags: String::new(),
                    match_kind: ReleaseMatch::Branch,
                },
            )
            .set(
                "a/repo",
                ReleaseMatchSetting {
                    branches: String::new(),
                    tags: "v.*".into(),
                    match_kind: ReleaseMatch::Tag,
                },
            );
        assert_eq!(policy.to_string(), "a/repo:tag||v.*,b/repo:branch|main|");
    }
}
