use crate::Result;
use crate::assembly::{AssemblyRequest, MetadataStore, assemble};
use crate::cache::{Json, Memo, ObjectCache, Postprocess};
use crate::config::{BotRegistry, MinerConfig};
use crate::facts::{Facts, FactsExtractor};
use crate::model::{Snapshot, WorkItemId};
use core::time::Duration;
use std::collections::BTreeSet;

const LOG_TARGET: &str = "     miner";
const FACTS_OP: &str = "facts.extract";

/// The orchestrator: assembles snapshots through the cache layer, prunes
/// them, and extracts per-item lifecycle facts.
///
/// Holds the metadata store, the optional object cache, and the configured
/// knobs. Cheap to construct; all state lives behind the references.
#[derive(Debug)]
pub struct Miner<'a, S, C> {
    store: &'a S,
    cache: Option<&'a C>,
    bots: &'a BotRegistry,
    snapshot_cache_ttl: Duration,
    facts_cache_ttl_open: Duration,
    facts_cache_ttl_closed: Duration,
}

impl<'a, S: MetadataStore, C: ObjectCache> Miner<'a, S, C> {
    #[must_use]
    pub fn new(store: &'a S, cache: Option<&'a C>, bots: &'a BotRegistry, config: &MinerConfig) -> Self {
        Self {
            store,
            cache,
            bots,
            snapshot_cache_ttl: config.snapshot_cache_ttl,
            facts_cache_ttl_open: config.facts_cache_ttl_open,
            facts_cache_ttl_closed: config.facts_cache_ttl_closed,
        }
    }

    /// Assemble the pruned snapshot for `req`.
    pub async fn snapshot(&self, req: &AssemblyRequest) -> Result<Snapshot> {
        assemble(self.store, self.cache, req, self.snapshot_cache_ttl).await
    }

    /// Assemble the snapshot and extract lifecycle facts for every item.
    ///
    /// Facts are memoized per `(work item id, snapshot horizon)`; items
    /// whose facts are already closed stay cached longer, since they can no
    /// longer change. Impossible records are dropped from both the facts and
    /// the returned snapshot, so every fact's id resolves in the snapshot.
    pub async fn facts(&self, req: &AssemblyRequest) -> Result<(Vec<Facts>, Snapshot)> {
        let mut snapshot = self.snapshot(req).await?;
        let extractor = FactsExtractor::new(self.bots);
        let memo = Memo::new(FACTS_OP, self.cache);
        let horizon = req.time_to.to_rfc3339();
        let ttl = |facts: &Option<Facts>| match facts {
            Some(f) if !f.closed.has_best() => self.facts_cache_ttl_open,
            _ => self.facts_cache_ttl_closed,
        };

        let mut facts = Vec::with_capacity(snapshot.items.len());
        let mut impossible: BTreeSet<WorkItemId> = BTreeSet::new();
        let results = {
            let horizon = &horizon;
            let ttl = &ttl;
            futures_util::future::join_all(snapshot.iter().map(|view| async move {
                let key = memo.key(&[&view.item.id, horizon]);
                let extracted = memo
                    .fetch(&key, &Json, ttl, Postprocess::Accept, || async {
                        match extractor.extract(&view) {
                            Ok(f) => Ok(Some(f)),
                            Err(e) => {
                                log::warn!(target: LOG_TARGET, "Dropping impossible record: {e}");
                                Ok(None)
                            }
                        }
                    })
                    .await;
                (view.item.id.clone(), extracted)
            }))
            .await
        };
        for (id, extracted) in results {
            match extracted? {
                Some(f) => facts.push(f),
                None => {
                    let _ = impossible.insert(id);
                }
            }
        }
        snapshot.remove_items(&impossible);

        log::info!(
            target: LOG_TARGET,
            "Extracted facts for {} work items ({} impossible)",
            facts.len(),
            impossible.len()
        );
        Ok((facts, snapshot))
    }
}
