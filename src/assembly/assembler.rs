use super::store::{Dialect, MetadataStore, WorkItemQuery};
use super::window::coarsen_window;
use crate::Result;
use crate::cache::{Json, Memo, ObjectCache, Postprocess};
use crate::config::ReleasePolicy;
use crate::filters::{IssueFilter, LabelFilter, Participants, Role, engine};
use crate::model::{Snapshot, Truncate, WorkItem, WorkItemId};
use chrono::{DateTime, Utc};
use core::time::Duration;
use ohno::EnrichableExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use strum::Display;

const LOG_TARGET: &str = "  assembly";
const ASSEMBLE_OP: &str = "assembly.assemble";

/// Identity of one concurrent fetch inside an assembly.
///
/// The first wave is submitted in declaration order, heaviest first, so the
/// critical path bounds overall latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "snake_case")]
enum FetchTask {
    ReleaseMap,
    DirectQuery,
    MergedUnreleased,
    Reviews,
    ReviewComments,
    ReviewRequests,
    IssueComments,
    Commits,
    ReleaseJoin,
    Labels,
    IssueLinks,
}

/// Everything [`assemble`] needs to produce one snapshot.
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub time_from: DateTime<Utc>,
    pub time_to: DateTime<Utc>,
    pub repositories: BTreeSet<Arc<str>>,
    pub participants: Participants,
    pub labels: LabelFilter,
    pub issues: IssueFilter,
    pub exclude_inactive: bool,
    pub release_policy: ReleasePolicy,
    pub blacklist: BTreeSet<WorkItemId>,
    pub truncate: bool,
    /// Keep only the most-recently-updated N items when set.
    pub limit: Option<usize>,
}

impl AssemblyRequest {
    /// A request over a window and repository set with no filtering beyond
    /// the window, truncation on.
    #[must_use]
    pub fn new(
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
        repositories: impl IntoIterator<Item = impl Into<Arc<str>>>,
    ) -> Self {
        Self {
            time_from,
            time_to,
            repositories: repositories.into_iter().map(Into::into).collect(),
            participants: Participants::empty(),
            labels: LabelFilter::empty(),
            issues: IssueFilter::empty(),
            exclude_inactive: false,
            release_policy: ReleasePolicy::empty(),
            blacklist: BTreeSet::new(),
            truncate: true,
            limit: None,
        }
    }
}

/// What the snapshot cache stores: the coarse assembly plus the filters it
/// was built under, so a later narrower request can be served by pruning.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAssembly {
    repositories: BTreeSet<Arc<str>>,
    participants: Participants,
    labels: LabelFilter,
    issues: IssueFilter,
    snapshot: Snapshot,
}

/// Assemble the snapshot for `req`, memoized through `cache`.
///
/// The memoized unit is the coarse (whole-day) assembly; the precise window
/// is restored afterward by truncation at `time_to`, precise out-of-window
/// removal, and the inactivity filter. An empty repository set or window
/// yields an empty snapshot without touching the store.
pub async fn assemble<S: MetadataStore, C: ObjectCache>(
    store: &S,
    cache: Option<&C>,
    req: &AssemblyRequest,
    cache_ttl: Duration,
) -> Result<Snapshot> {
    if req.repositories.is_empty() || req.time_from >= req.time_to {
        return Ok(Snapshot::empty(req.time_from, req.time_to));
    }

    let (coarse_from, coarse_to) = coarsen_window(req.time_from, req.time_to);
    let memo = Memo::new(ASSEMBLE_OP, cache);
    let window_key = format!("{}..{}", coarse_from.format("%Y-%m-%d"), coarse_to.format("%Y-%m-%d"));
    let blacklist_key = req.blacklist.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
    let limit_key = req.limit.map_or_else(|| "none".to_string(), |limit| limit.to_string());
    let key = memo.key(&[
        &window_key,
        &req.exclude_inactive,
        &req.release_policy,
        &blacklist_key,
        &req.truncate,
        &limit_key,
    ]);

    let cached = memo
        .fetch(
            &key,
            &Json,
            |_| cache_ttl,
            |entry: CachedAssembly| narrow(entry, req),
            || assemble_coarse(store, req, coarse_from, coarse_to),
        )
        .await?;

    let mut snapshot = cached.snapshot;
    remove_out_of_window(&mut snapshot, req.time_from, req.time_to);
    if req.truncate {
        snapshot.truncate(req.time_to);
    }
    if req.exclude_inactive {
        let inactive = engine::dropped_by_inactivity(&snapshot, req.time_from, req.time_to);
        if !inactive.is_empty() {
            log::debug!(target: LOG_TARGET, "Dropping {} inactive work items", inactive.len());
            snapshot.remove_items(&inactive);
        }
    }
    snapshot.time_from = req.time_from;
    snapshot.time_to = req.time_to;
    Ok(snapshot)
}

/// The postprocess hook: serve a narrower request from the cached assembly
/// by pruning, or reject to force a fresh fetch.
fn narrow(mut entry: CachedAssembly, req: &AssemblyRequest) -> Postprocess<CachedAssembly> {
    let compatible = req.repositories.is_subset(&entry.repositories)
        && entry.participants.compatible_with(&req.participants)
        && entry.labels.compatible_with(&req.labels)
        && entry.issues.compatible_with(&req.issues);
    if !compatible {
        log::debug!(target: LOG_TARGET, "Cached snapshot is too narrow for this request");
        return Postprocess::Reject;
    }

    entry.snapshot.retain_items(|item| req.repositories.contains(&item.repository));
    engine::apply(&mut entry.snapshot, &req.participants, &req.labels, &req.issues, None);
    Postprocess::Accept(CachedAssembly {
        repositories: req.repositories.clone(),
        participants: req.participants.clone(),
        labels: req.labels.clone(),
        issues: req.issues.clone(),
        snapshot: entry.snapshot,
    })
}

/// The cache-miss path: fetch and filter the coarse-window assembly.
async fn assemble_coarse<S: MetadataStore>(
    store: &S,
    req: &AssemblyRequest,
    coarse_from: DateTime<Utc>,
    coarse_to: DateTime<Utc>,
) -> Result<CachedAssembly> {
    log::info!(
        target: LOG_TARGET,
        "Assembling snapshot for {} repositories over {coarse_from}..{coarse_to}",
        req.repositories.len()
    );

    // The author set is pushed into the query only when it is the sole
    // participant filter; anything richer is resolved by the filter engine.
    let authors = match req.participants.iter().collect::<Vec<_>>().as_slice() {
        [(Role::Author, users)] => (*users).clone(),
        _ => BTreeSet::new(),
    };
    let issues_pushdown = match store.dialect() {
        Dialect::Full if !req.issues.is_empty() => Some(req.issues.clone()),
        _ => None,
    };
    let query = WorkItemQuery {
        repositories: req.repositories.clone(),
        time_from: coarse_from,
        time_to: coarse_to,
        authors,
        blacklist: req.blacklist.clone(),
        issues: issues_pushdown,
    };

    for task in [FetchTask::ReleaseMap, FetchTask::DirectQuery, FetchTask::MergedUnreleased] {
        log::debug!(target: LOG_TARGET, "Dispatching {task}");
    }
    let (released, direct, merged_unreleased) = tokio::join!(
        store.released_work_items(&req.repositories, coarse_from, coarse_to, &req.release_policy, &req.blacklist),
        store.work_items(&query),
        async {
            if req.exclude_inactive {
                Ok(Vec::new())
            } else {
                store
                    .merged_unreleased_work_items(&req.repositories, coarse_from, coarse_to, &req.release_policy, &req.blacklist)
                    .await
            }
        },
    );
    let released = released.map_err(|e| e.enrich_with(|| format!("fetching {}", FetchTask::ReleaseMap)))?;
    let direct = direct.map_err(|e| e.enrich_with(|| format!("fetching {}", FetchTask::DirectQuery)))?;
    let merged_unreleased =
        merged_unreleased.map_err(|e| e.enrich_with(|| format!("fetching {}", FetchTask::MergedUnreleased)))?;

    // Concatenate and de-duplicate; later sources win ties.
    let mut items: BTreeMap<WorkItemId, WorkItem> = BTreeMap::new();
    for item in released.into_iter().chain(direct).chain(merged_unreleased) {
        if item.hidden {
            continue;
        }
        let _ = items.insert(item.id.clone(), item);
    }

    if let Some(limit) = req.limit
        && items.len() > limit
    {
        log::debug!(target: LOG_TARGET, "Limiting {} work items to the {limit} most recently updated", items.len());
        let mut ranked: Vec<WorkItemId> = items.keys().cloned().collect();
        ranked.sort_by_key(|id| core::cmp::Reverse(items[id].updated_at));
        let keep: BTreeSet<WorkItemId> = ranked.into_iter().take(limit).collect();
        items.retain(|id, _| keep.contains(id));
    }

    let mut snapshot = Snapshot::empty(coarse_from, coarse_to);
    snapshot.items = items;
    if req.truncate {
        for item in snapshot.items.values_mut() {
            item.truncate(coarse_to);
        }
    }

    let ids: BTreeSet<WorkItemId> = snapshot.items.keys().cloned().collect();
    let merged_ids: BTreeSet<WorkItemId> = snapshot
        .items
        .values()
        .filter(|item| item.merged_at.is_some())
        .map(|item| item.id.clone())
        .collect();
    let created_before = req.truncate.then_some(coarse_to);

    let (reviews, review_comments, review_requests, comments, commits, releases, labels, issue_links) = tokio::join!(
        store.reviews(&ids, created_before),
        store.review_comments(&ids, created_before),
        store.review_requests(&ids, created_before),
        store.issue_comments(&ids, created_before),
        store.commits(&ids, created_before),
        store.releases(&merged_ids, coarse_to, &req.release_policy),
        store.labels(&ids),
        store.issue_links(&ids),
    );
    snapshot.reviews = reviews
        .map_err(|e| e.enrich_with(|| format!("fetching {}", FetchTask::Reviews)))?
        .into_iter()
        .collect();
    snapshot.review_comments = review_comments
        .map_err(|e| e.enrich_with(|| format!("fetching {}", FetchTask::ReviewComments)))?
        .into_iter()
        .collect();
    snapshot.review_requests = review_requests
        .map_err(|e| e.enrich_with(|| format!("fetching {}", FetchTask::ReviewRequests)))?
        .into_iter()
        .collect();
    snapshot.comments = comments
        .map_err(|e| e.enrich_with(|| format!("fetching {}", FetchTask::IssueComments)))?
        .into_iter()
        .collect();
    snapshot.commits = commits
        .map_err(|e| e.enrich_with(|| format!("fetching {}", FetchTask::Commits)))?
        .into_iter()
        .collect();
    snapshot.releases = releases
        .map_err(|e| e.enrich_with(|| format!("fetching {}", FetchTask::ReleaseJoin)))?
        .into_iter()
        .collect();
    snapshot.labels = labels
        .map_err(|e| e.enrich_with(|| format!("fetching {}", FetchTask::Labels)))?
        .into_iter()
        .collect();
    snapshot.issues = issue_links
        .map_err(|e| e.enrich_with(|| format!("fetching {}", FetchTask::IssueLinks)))?
        .into_iter()
        .collect();

    if req.truncate {
        snapshot.truncate(coarse_to);
    }
    snapshot.prune_orphans();
    engine::apply(&mut snapshot, &req.participants, &req.labels, &req.issues, None);

    log::info!(target: LOG_TARGET, "Assembled {} work items", snapshot.items.len());
    Ok(CachedAssembly {
        repositories: req.repositories.clone(),
        participants: req.participants.clone(),
        labels: req.labels.clone(),
        issues: req.issues.clone(),
        snapshot,
    })
}

/// Remove items the precise window excludes: released before `time_from`,
/// closed-but-not-merged before `time_from`, created at or after `time_to`.
fn remove_out_of_window(snapshot: &mut Snapshot, time_from: DateTime<Utc>, time_to: DateTime<Utc>) {
    let drop: BTreeSet<WorkItemId> = snapshot
        .items
        .values()
        .filter(|item| {
            let released_before = snapshot
                .releases
                .get(&item.id)
                .is_some_and(|release| release.published_at.is_some_and(|ts| ts < time_from));
            let rejected_before = item.merged_at.is_none() && item.closed_at.is_some_and(|ts| ts < time_from);
            let created_after = item.created_at.is_some_and(|ts| ts >= time_to);
            released_before || rejected_before || created_after
        })
        .map(|item| item.id.clone())
        .collect();
    if !drop.is_empty() {
        log::debug!(target: LOG_TARGET, "Removing {} work items outside the precise window", drop.len());
        snapshot.remove_items(&drop);
    }
}
