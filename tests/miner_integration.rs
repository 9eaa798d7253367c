//! End-to-end tests for snapshot assembly, cache narrowing, and fact
//! extraction against an in-memory metadata store.

use chrono::{DateTime, TimeZone, Utc};
use pr_loom::Miner;
use pr_loom::assembly::{AssemblyRequest, MetadataStore, WorkItemQuery};
use pr_loom::cache::MemoryCache;
use pr_loom::config::{BotRegistry, MinerConfig, ReleasePolicy};
use pr_loom::filters::Role;
use pr_loom::model::{
    Commit, IssueComment, IssueLink, LabelRow, ReleaseRow, Review, ReviewComment, ReviewRequest, ReviewState,
    SubEntityId, UserId, WorkItem, WorkItemId,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn ts(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).single().unwrap()
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// In-memory [`MetadataStore`] with a query counter, so tests can tell a
/// pruned cache hit apart from a re-fetch.
#[derive(Debug, Default)]
struct FixtureStore {
    items: Vec<WorkItem>,
    reviews: Vec<(WorkItemId, SubEntityId, Review)>,
    review_comments: Vec<(WorkItemId, SubEntityId, ReviewComment)>,
    review_requests: Vec<(WorkItemId, SubEntityId, ReviewRequest)>,
    comments: Vec<(WorkItemId, SubEntityId, IssueComment)>,
    commits: Vec<(WorkItemId, SubEntityId, Commit)>,
    releases: Vec<(WorkItemId, ReleaseRow)>,
    issue_links: Vec<(WorkItemId, SubEntityId, IssueLink)>,
    labels: Vec<(WorkItemId, SubEntityId, LabelRow)>,
    queries: AtomicUsize,
}

impl FixtureStore {
    fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn count(&self) {
        let _ = self.queries.fetch_add(1, Ordering::SeqCst);
    }

    fn release_of(&self, id: &WorkItemId) -> Option<&ReleaseRow> {
        self.releases.iter().find(|(rid, _)| rid == id).map(|(_, row)| row)
    }

    fn sub_rows<R: Clone>(
        &self,
        rows: &[(WorkItemId, SubEntityId, R)],
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
        created_at: impl Fn(&R) -> Option<DateTime<Utc>>,
    ) -> Vec<(WorkItemId, SubEntityId, R)> {
        self.count();
        rows.iter()
            .filter(|(id, _, row)| {
                ids.contains(id)
                    && created_before.is_none_or(|bound| created_at(row).is_none_or(|ts| ts < bound))
            })
            .cloned()
            .collect()
    }
}

impl MetadataStore for FixtureStore {
    async fn work_items(&self, query: &WorkItemQuery) -> pr_loom::Result<Vec<WorkItem>> {
        self.count();
        Ok(self
            .items
            .iter()
            .filter(|item| {
                query.repositories.contains(&item.repository)
                    && !query.blacklist.contains(&item.id)
                    && !item.hidden
                    && (query.authors.is_empty()
                        || item.author.as_ref().is_some_and(|author| query.authors.contains(author)))
                    && item.created_at.is_some_and(|created| created < query.time_to)
                    && item.closed_at.is_none_or(|closed| closed > query.time_from)
            })
            .cloned()
            .collect())
    }

    async fn released_work_items(
        &self,
        repositories: &BTreeSet<Arc<str>>,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
        _policy: &ReleasePolicy,
        blacklist: &BTreeSet<WorkItemId>,
    ) -> pr_loom::Result<Vec<WorkItem>> {
        self.count();
        Ok(self
            .items
            .iter()
            .filter(|item| {
                repositories.contains(&item.repository)
                    && !blacklist.contains(&item.id)
                    && !item.hidden
                    && self.release_of(&item.id).is_some_and(|release| {
                        release.published_at.is_some_and(|ts| ts >= time_from && ts < time_to)
                    })
            })
            .cloned()
            .collect())
    }

    async fn merged_unreleased_work_items(
        &self,
        repositories: &BTreeSet<Arc<str>>,
        _time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
        _policy: &ReleasePolicy,
        blacklist: &BTreeSet<WorkItemId>,
    ) -> pr_loom::Result<Vec<WorkItem>> {
        self.count();
        Ok(self
            .items
            .iter()
            .filter(|item| {
                repositories.contains(&item.repository)
                    && !blacklist.contains(&item.id)
                    && !item.hidden
                    && item.merged_at.is_some_and(|ts| ts < time_to)
                    && self.release_of(&item.id).is_none()
            })
            .cloned()
            .collect())
    }

    async fn reviews(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, Review)>> {
        Ok(self.sub_rows(&self.reviews, ids, created_before, |r| r.submitted_at))
    }

    async fn review_comments(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, ReviewComment)>> {
        Ok(self.sub_rows(&self.review_comments, ids, created_before, |c| c.created_at))
    }

    async fn review_requests(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, ReviewRequest)>> {
        Ok(self.sub_rows(&self.review_requests, ids, created_before, |r| r.created_at))
    }

    async fn issue_comments(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, IssueComment)>> {
        Ok(self.sub_rows(&self.comments, ids, created_before, |c| c.created_at))
    }

    async fn commits(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, Commit)>> {
        Ok(self.sub_rows(&self.commits, ids, created_before, |c| c.committed_at))
    }

    async fn releases(
        &self,
        ids: &BTreeSet<WorkItemId>,
        horizon: DateTime<Utc>,
        _policy: &ReleasePolicy,
    ) -> pr_loom::Result<Vec<(WorkItemId, ReleaseRow)>> {
        self.count();
        Ok(self
            .releases
            .iter()
            .filter(|(id, row)| ids.contains(id) && row.published_at.is_none_or(|ts| ts < horizon))
            .cloned()
            .collect())
    }

    async fn labels(
        &self,
        ids: &BTreeSet<WorkItemId>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, LabelRow)>> {
        Ok(self.sub_rows(&self.labels, ids, None, |_| None))
    }

    async fn issue_links(
        &self,
        ids: &BTreeSet<WorkItemId>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, IssueLink)>> {
        Ok(self.sub_rows(&self.issue_links, ids, None, |_| None))
    }
}

fn item(id: &str, repo: &str, author: &str, created: DateTime<Utc>) -> WorkItem {
    WorkItem {
        id: WorkItemId::from(id),
        repository: repo.into(),
        number: 1,
        author: Some(UserId::from(author)),
        created_at: Some(created),
        updated_at: Some(created),
        closed_at: None,
        merged_at: None,
        merged_by: None,
        additions: 10,
        deletions: 5,
        hidden: false,
    }
}

fn sub(id: &str) -> SubEntityId {
    SubEntityId::from(id)
}

fn wid(id: &str) -> WorkItemId {
    WorkItemId::from(id)
}

/// Six work items with at least one event inside 2017-01-01..2017-01-11 and
/// three stale ones without.
fn scenario_store() -> FixtureStore {
    let mut store = FixtureStore::default();
    let repo = "src-d/go-git";

    // Created inside the window.
    store.items.push(item("w1", repo, "alice", ts(2017, 1, 2, 10)));
    store.items.push(item("w2", repo, "bob", ts(2017, 1, 5, 9)));

    // Created earlier, commit inside the window.
    store.items.push(item("w3", repo, "carol", ts(2016, 11, 20, 8)));
    store.commits.push((
        wid("w3"),
        sub("w3c1"),
        Commit {
            authored_at: Some(ts(2017, 1, 3, 11)),
            committed_at: Some(ts(2017, 1, 3, 12)),
            author: Some(UserId::from("carol")),
            committer: Some(UserId::from("carol")),
        },
    ));

    // Created earlier, review inside the window.
    store.items.push(item("w4", repo, "dave", ts(2016, 12, 1, 8)));
    store.reviews.push((
        wid("w4"),
        sub("w4r1"),
        Review {
            submitted_at: Some(ts(2017, 1, 4, 15)),
            user: Some(UserId::from("erin")),
            state: ReviewState::Approved,
        },
    ));

    // Created earlier, comment inside the window.
    store.items.push(item("w5", repo, "erin", ts(2016, 12, 10, 8)));
    store.comments.push((
        wid("w5"),
        sub("w5ic1"),
        IssueComment {
            created_at: Some(ts(2017, 1, 6, 18)),
            user: Some(UserId::from("alice")),
        },
    ));

    // Merged before the window, released inside it.
    let mut shipped = item("w6", repo, "frank", ts(2016, 12, 20, 8));
    shipped.merged_at = Some(ts(2016, 12, 28, 12));
    shipped.closed_at = Some(ts(2016, 12, 28, 12));
    shipped.merged_by = Some(UserId::from("grace"));
    store.items.push(shipped);
    store.releases.push((
        wid("w6"),
        ReleaseRow {
            published_at: Some(ts(2017, 1, 8, 0)),
            published_by: Some(UserId::from("grace")),
            url: None,
            force_push_dropped: false,
        },
    ));

    // Open but stale: no event anywhere near the window.
    store.items.push(item("w7", repo, "alice", ts(2016, 9, 1, 8)));
    store.items.push(item("w8", repo, "bob", ts(2016, 9, 2, 8)));
    store.items.push(item("w9", repo, "carol", ts(2016, 10, 1, 8)));

    store
}

fn scenario_request() -> AssemblyRequest {
    AssemblyRequest::new(ts(2017, 1, 1, 0), ts(2017, 1, 11, 0), ["src-d/go-git"])
}

fn miner<'a>(
    store: &'a FixtureStore,
    cache: Option<&'a MemoryCache>,
    bots: &'a BotRegistry,
) -> Miner<'a, FixtureStore, MemoryCache> {
    Miner::new(store, cache, bots, &MinerConfig::default())
}

#[tokio::test]
async fn empty_repository_set_yields_empty_snapshot_without_queries() {
    let store = FixtureStore::default();
    let bots = BotRegistry::default();
    let m = miner(&store, None, &bots);
    let req = AssemblyRequest::new(ts(2017, 1, 1, 0), ts(2017, 1, 11, 0), None::<&str>);

    let snapshot = m.snapshot(&req).await.unwrap();
    assert!(snapshot.is_empty());
    assert_eq!(store.query_count(), 0);
}

#[tokio::test]
async fn empty_window_yields_empty_snapshot_without_queries() {
    let store = scenario_store();
    let bots = BotRegistry::default();
    let m = miner(&store, None, &bots);
    let req = AssemblyRequest::new(ts(2017, 1, 11, 0), ts(2017, 1, 1, 0), ["src-d/go-git"]);

    let snapshot = m.snapshot(&req).await.unwrap();
    assert!(snapshot.is_empty());
    assert_eq!(store.query_count(), 0);
}

#[tokio::test]
async fn excluding_inactive_items_keeps_exactly_the_active_six() {
    init_logging();
    let store = scenario_store();
    let bots = BotRegistry::default();
    let m = miner(&store, None, &bots);
    let mut req = scenario_request();
    req.exclude_inactive = true;

    let (facts, snapshot) = m.facts(&req).await.unwrap();
    assert_eq!(facts.len(), 6);
    assert_eq!(snapshot.items.len(), 6);
    for f in &facts {
        assert!(snapshot.items.contains_key(&f.work_item_id));
    }

    // Without the flag the stale-but-open items surface too.
    let (all_facts, _) = m.facts(&scenario_request()).await.unwrap();
    assert_eq!(all_facts.len(), 9);
}

#[tokio::test]
async fn truncation_prevents_future_leakage() {
    let mut store = scenario_store();
    // Events after the horizon on an in-window item.
    let mut racing = item("w10", "src-d/go-git", "alice", ts(2017, 1, 9, 0));
    racing.updated_at = Some(ts(2017, 2, 1, 0));
    racing.closed_at = Some(ts(2017, 2, 2, 0));
    racing.merged_at = Some(ts(2017, 2, 2, 0));
    store.items.push(racing);
    store.commits.push((
        wid("w10"),
        sub("w10c1"),
        Commit {
            authored_at: Some(ts(2017, 1, 9, 6)),
            committed_at: Some(ts(2017, 2, 1, 6)),
            author: Some(UserId::from("alice")),
            committer: Some(UserId::from("alice")),
        },
    ));

    let bots = BotRegistry::default();
    let m = miner(&store, None, &bots);
    let snapshot = m.snapshot(&scenario_request()).await.unwrap();

    let horizon = snapshot.time_to;
    for item in snapshot.items.values() {
        for ts in [item.created_at, item.updated_at, item.closed_at, item.merged_at] {
            assert!(ts.is_none_or(|ts| ts <= horizon));
        }
    }
    for (_, _, review) in snapshot.reviews.iter() {
        assert!(review.submitted_at.is_none_or(|ts| ts <= horizon));
    }
    for (_, _, commit) in snapshot.commits.iter() {
        assert!(commit.authored_at.is_none_or(|ts| ts <= horizon));
        assert!(commit.committed_at.is_none_or(|ts| ts <= horizon));
    }
    for release in snapshot.releases.values() {
        assert!(release.published_at.is_none_or(|ts| ts <= horizon));
    }

    // The racing item survives with its future fields nulled.
    let racing = &snapshot.items[&wid("w10")];
    assert_eq!(racing.created_at, Some(ts(2017, 1, 9, 0)));
    assert_eq!(racing.closed_at, None);
    assert_eq!(racing.merged_at, None);
}

#[tokio::test]
async fn warm_cache_returns_identical_results_without_new_queries() {
    init_logging();
    let store = scenario_store();
    let cache = MemoryCache::new();
    let bots = BotRegistry::default();
    let m = miner(&store, Some(&cache), &bots);
    let req = scenario_request();

    let (first_facts, first_snapshot) = m.facts(&req).await.unwrap();
    let cold_queries = store.query_count();
    assert!(cold_queries > 0);

    let (second_facts, second_snapshot) = m.facts(&req).await.unwrap();
    assert_eq!(store.query_count(), cold_queries);
    assert_eq!(first_snapshot, second_snapshot);
    assert_eq!(first_facts, second_facts);
}

#[tokio::test]
async fn narrower_repository_request_is_served_by_pruning() {
    let mut store = FixtureStore::default();
    store.items.push(item("a1", "org/a", "alice", ts(2017, 1, 2, 0)));
    store.items.push(item("b1", "org/b", "bob", ts(2017, 1, 3, 0)));
    store.items.push(item("c1", "org/c", "carol", ts(2017, 1, 4, 0)));
    let cache = MemoryCache::new();
    let bots = BotRegistry::default();
    let m = miner(&store, Some(&cache), &bots);

    let wide = AssemblyRequest::new(ts(2017, 1, 1, 0), ts(2017, 1, 11, 0), ["org/a", "org/b"]);
    let snapshot = m.snapshot(&wide).await.unwrap();
    assert_eq!(snapshot.items.len(), 2);
    let warm_queries = store.query_count();

    // {A} ⊆ {A,B}: pruned from the cache, no store traffic.
    let narrow = AssemblyRequest::new(ts(2017, 1, 1, 0), ts(2017, 1, 11, 0), ["org/a"]);
    let snapshot = m.snapshot(&narrow).await.unwrap();
    assert_eq!(store.query_count(), warm_queries);
    assert_eq!(snapshot.items.len(), 1);
    assert!(snapshot.items.contains_key(&wid("a1")));

    // {A,C} ⊄ {A,B}: the entry is rejected and the store is queried again.
    let wider = AssemblyRequest::new(ts(2017, 1, 1, 0), ts(2017, 1, 11, 0), ["org/a", "org/c"]);
    let snapshot = m.snapshot(&wider).await.unwrap();
    assert!(store.query_count() > warm_queries);
    assert_eq!(snapshot.items.len(), 2);
    assert!(snapshot.items.contains_key(&wid("c1")));
}

#[tokio::test]
async fn participant_filter_cascades_through_sub_tables() {
    let store = scenario_store();
    let bots = BotRegistry::default();
    let m = miner(&store, None, &bots);
    let mut req = scenario_request();
    let _ = req.participants.add(Role::Author, ["carol"]);

    let snapshot = m.snapshot(&req).await.unwrap();
    let kept: BTreeSet<WorkItemId> = snapshot.item_ids();
    assert_eq!(kept, [wid("w3"), wid("w9")].into_iter().collect());
    // No sub-table row references a dropped id.
    for id in snapshot.reviews.item_ids() {
        assert!(kept.contains(id));
    }
    for id in snapshot.commits.item_ids() {
        assert!(kept.contains(id));
    }
    for id in snapshot.comments.item_ids() {
        assert!(kept.contains(id));
    }
    assert!(snapshot.releases.keys().all(|id| kept.contains(id)));
}

#[tokio::test]
async fn blacklisted_items_never_surface() {
    let store = scenario_store();
    let bots = BotRegistry::default();
    let m = miner(&store, None, &bots);
    let mut req = scenario_request();
    let _ = req.blacklist.insert(wid("w1"));

    let snapshot = m.snapshot(&req).await.unwrap();
    assert!(!snapshot.items.contains_key(&wid("w1")));
    assert!(snapshot.items.contains_key(&wid("w2")));
}

#[tokio::test]
async fn merged_item_without_closure_is_closed_at_merge_time() {
    let mut store = FixtureStore::default();
    let mut dangling = item("m1", "org/a", "alice", ts(2017, 1, 2, 0));
    dangling.merged_at = Some(ts(2017, 1, 5, 0));
    dangling.closed_at = None;
    store.items.push(dangling);

    let bots = BotRegistry::default();
    let m = miner(&store, None, &bots);
    let req = AssemblyRequest::new(ts(2017, 1, 1, 0), ts(2017, 1, 11, 0), ["org/a"]);
    let (facts, _) = m.facts(&req).await.unwrap();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].closed.best(), facts[0].merged.best());
    assert_eq!(facts[0].closed.best(), Some(ts(2017, 1, 5, 0)));
}

#[tokio::test]
async fn released_facts_carry_the_release_time() {
    let store = scenario_store();
    let bots = BotRegistry::default();
    let m = miner(&store, None, &bots);
    let (facts, _) = m.facts(&scenario_request()).await.unwrap();
    let shipped = facts.iter().find(|f| f.work_item_id == wid("w6")).unwrap();
    assert_eq!(shipped.released.best(), Some(ts(2017, 1, 8, 0)));
    assert_eq!(shipped.merged.best(), Some(ts(2016, 12, 28, 12)));
}

/// A store whose review fetch always fails, for fail-fast coverage.
#[derive(Debug)]
struct BrokenReviews(FixtureStore);

impl MetadataStore for BrokenReviews {
    async fn work_items(&self, query: &WorkItemQuery) -> pr_loom::Result<Vec<WorkItem>> {
        self.0.work_items(query).await
    }

    async fn released_work_items(
        &self,
        repositories: &BTreeSet<Arc<str>>,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
        policy: &ReleasePolicy,
        blacklist: &BTreeSet<WorkItemId>,
    ) -> pr_loom::Result<Vec<WorkItem>> {
        self.0.released_work_items(repositories, time_from, time_to, policy, blacklist).await
    }

    async fn merged_unreleased_work_items(
        &self,
        repositories: &BTreeSet<Arc<str>>,
        time_from: DateTime<Utc>,
        time_to: DateTime<Utc>,
        policy: &ReleasePolicy,
        blacklist: &BTreeSet<WorkItemId>,
    ) -> pr_loom::Result<Vec<WorkItem>> {
        self.0
            .merged_unreleased_work_items(repositories, time_from, time_to, policy, blacklist)
            .await
    }

    async fn reviews(
        &self,
        _ids: &BTreeSet<WorkItemId>,
        _created_before: Option<DateTime<Utc>>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, Review)>> {
        Err(ohno::app_err!("connection reset"))
    }

    async fn review_comments(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, ReviewComment)>> {
        self.0.review_comments(ids, created_before).await
    }

    async fn review_requests(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, ReviewRequest)>> {
        self.0.review_requests(ids, created_before).await
    }

    async fn issue_comments(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, IssueComment)>> {
        self.0.issue_comments(ids, created_before).await
    }

    async fn commits(
        &self,
        ids: &BTreeSet<WorkItemId>,
        created_before: Option<DateTime<Utc>>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, Commit)>> {
        self.0.commits(ids, created_before).await
    }

    async fn releases(
        &self,
        ids: &BTreeSet<WorkItemId>,
        horizon: DateTime<Utc>,
        policy: &ReleasePolicy,
    ) -> pr_loom::Result<Vec<(WorkItemId, ReleaseRow)>> {
        self.0.releases(ids, horizon, policy).await
    }

    async fn labels(
        &self,
        ids: &BTreeSet<WorkItemId>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, LabelRow)>> {
        self.0.labels(ids).await
    }

    async fn issue_links(
        &self,
        ids: &BTreeSet<WorkItemId>,
    ) -> pr_loom::Result<Vec<(WorkItemId, SubEntityId, IssueLink)>> {
        self.0.issue_links(ids).await
    }
}

#[tokio::test]
async fn sub_fetch_failure_aborts_the_whole_assembly() {
    let store = BrokenReviews(scenario_store());
    let bots = BotRegistry::default();
    let m: Miner<'_, BrokenReviews, MemoryCache> = Miner::new(&store, None, &bots, &MinerConfig::default());

    // A hard failure, distinguishable from "no matching items".
    assert!(m.snapshot(&scenario_request()).await.is_err());
}
