use super::codec::Codec;
use super::key::CacheKey;
use super::store::ObjectCache;
use crate::Result;
use core::time::Duration;
use ohno::bail;

const LOG_TARGET: &str = "      memo";

/// Outcome of postprocessing a cache hit.
///
/// The hook receives the deserialized value together with whatever the
/// caller closed over from the current call's arguments. It may accept the
/// value as-is, accept a narrowed/rewritten value, or reject the entry
/// entirely, which forces a fresh fetch whose result then overwrites the
/// stale entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Postprocess<T> {
    /// Use this value as the call result.
    Accept(T),
    /// The entry cannot serve the current call; fetch fresh.
    Reject,
}

/// A memoized asynchronous fetch against an [`ObjectCache`].
///
/// Wraps one named operation with at-most-one-executed-per-key semantics:
/// a warm cache answers without running the underlying fetch. Without a
/// cache handle the wrapper is a pass-through, unless the handle was marked
/// [`required`](Self::required), in which case its absence is a
/// configuration error raised at call time.
///
/// Cache I/O and codec failures are logged and treated as misses; they are
/// never allowed to fail the wrapped operation.
#[derive(Debug)]
pub struct Memo<'a, C> {
    name: &'static str,
    cache: Option<&'a C>,
    required: bool,
    refresh_on_access: bool,
}

// Not derived: the derives would demand `C: Clone`/`C: Copy`, but only the
// reference is copied.
impl<C> Clone for Memo<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Memo<'_, C> {}

impl<'a, C: ObjectCache> Memo<'a, C> {
    /// Wrap the operation `name` over an optional cache handle.
    #[must_use]
    pub const fn new(name: &'static str, cache: Option<&'a C>) -> Self {
        Self {
            name,
            cache,
            required: false,
            refresh_on_access: false,
        }
    }

    /// Make the cache handle mandatory: calling [`fetch`](Self::fetch)
    /// without one becomes a configuration error instead of a pass-through.
    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Reset the entry's TTL on every hit instead of only on write.
    #[must_use]
    pub const fn refresh_on_access(mut self) -> Self {
        self.refresh_on_access = true;
        self
    }

    /// Compose the cache key for this operation from the projected argument
    /// parts.
    #[must_use]
    pub fn key(&self, parts: &[&dyn core::fmt::Display]) -> CacheKey {
        CacheKey::compose(self.name, parts)
    }

    /// Resolve the call through the cache, falling back to `fetch`.
    ///
    /// `ttl` computes the expiration from the (possibly fresh) result, so a
    /// caller can e.g. keep finished work cached longer than live work.
    /// `postprocess` runs on every hit and may narrow or reject the entry.
    pub async fn fetch<T, D, TtlFn, P, F, Fut>(
        &self,
        key: &CacheKey,
        codec: &D,
        ttl: TtlFn,
        postprocess: P,
        fetch: F,
    ) -> Result<T>
    where
        D: Codec<T>,
        TtlFn: Fn(&T) -> Duration,
        P: FnOnce(T) -> Postprocess<T>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let Some(client) = self.cache else {
            if self.required {
                bail!("no cache handle configured for '{}', which requires one", self.name);
            }
            return fetch().await;
        };

        if let Some(value) = self.lookup(client, key, codec).await {
            match postprocess(value) {
                Postprocess::Accept(value) => {
                    if self.refresh_on_access {
                        let t = ttl(&value);
                        if let Err(e) = client.touch(key, t).await {
                            log::warn!(target: LOG_TARGET, "Could not refresh '{}' entry {key}: {e:#}", self.name);
                        }
                    }
                    return Ok(value);
                }
                Postprocess::Reject => {
                    log::debug!(target: LOG_TARGET, "Cached entry for '{}' rejected by postprocess, fetching fresh", self.name);
                }
            }
        }

        let value = fetch().await?;
        let t = ttl(&value);
        match codec.encode(&value) {
            Ok(payload) => {
                if let Err(e) = client.set(key, &payload, t).await {
                    log::warn!(target: LOG_TARGET, "Could not store {} bytes for '{}': {e:#}", payload.len(), self.name);
                }
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not serialize result of '{}': {e:#}", self.name);
            }
        }
        Ok(value)
    }

    /// Fetch and decode the entry under `key`, degrading every failure to a
    /// miss.
    async fn lookup<T, D: Codec<T>>(&self, client: &C, key: &CacheKey, codec: &D) -> Option<T> {
        let payload = match client.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                log::debug!(target: LOG_TARGET, "Cache miss for '{}'", self.name);
                return None;
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not fetch '{}' entry {key}: {e:#}", self.name);
                return None;
            }
        };
        match codec.decode(&payload) {
            Ok(value) => {
                log::debug!(target: LOG_TARGET, "Cache hit for '{}'", self.name);
                Some(value)
            }
            Err(e) => {
                log::warn!(target: LOG_TARGET, "Could not deserialize '{}' entry {key}: {e:#}", self.name);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{Json, MemoryCache};
    use core::cell::Cell;

    const TTL: Duration = Duration::from_secs(60);

    fn fixed_ttl<T>(_: &T) -> Duration {
        TTL
    }

    #[tokio::test]
    async fn second_call_served_from_cache() {
        let cache = MemoryCache::new();
        let memo = Memo::new("test.add_one", Some(&cache));
        let key = memo.key(&[&1u64]);
        let evaluated = Cell::new(0u32);

        for _ in 0..2 {
            let result = memo
                .fetch(&key, &Json, fixed_ttl, Postprocess::Accept, || async {
                    evaluated.set(evaluated.get() + 1);
                    Ok(2u64)
                })
                .await
                .unwrap();
            assert_eq!(result, 2);
        }
        assert_eq!(evaluated.get(), 1);
    }

    #[tokio::test]
    async fn no_handle_is_a_pass_through() {
        let memo: Memo<'_, MemoryCache> = Memo::new("test.plain", None);
        let key = memo.key(&[]);
        let evaluated = Cell::new(0u32);

        for _ in 0..2 {
            let result = memo
                .fetch(&key, &Json, fixed_ttl, Postprocess::Accept, || async {
                    evaluated.set(evaluated.get() + 1);
                    Ok(7u64)
                })
                .await
                .unwrap();
            assert_eq!(result, 7);
        }
        assert_eq!(evaluated.get(), 2);
    }

    #[tokio::test]
    async fn required_handle_missing_is_a_configuration_error() {
        let memo: Memo<'_, MemoryCache> = Memo::new("test.required", None).required();
        let key = memo.key(&[]);

        let result = memo
            .fetch(&key, &Json, fixed_ttl, Postprocess::Accept, || async { Ok(1u64) })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn reject_forces_fresh_fetch_and_overwrites() {
        let cache = MemoryCache::new();
        let memo = Memo::new("test.reject", Some(&cache));
        let key = memo.key(&[]);

        let first = memo
            .fetch(&key, &Json, fixed_ttl, Postprocess::Accept, || async { Ok(1u64) })
            .await
            .unwrap();
        assert_eq!(first, 1);

        // The stale entry is rejected, the fresh value replaces it.
        let second = memo
            .fetch(&key, &Json, fixed_ttl, |_| Postprocess::Reject, || async { Ok(2u64) })
            .await
            .unwrap();
        assert_eq!(second, 2);

        let third = memo
            .fetch(&key, &Json, fixed_ttl, Postprocess::Accept, || async { Ok(3u64) })
            .await
            .unwrap();
        assert_eq!(third, 2);
    }

    #[tokio::test]
    async fn postprocess_can_narrow_the_value() {
        let cache = MemoryCache::new();
        let memo = Memo::new("test.narrow", Some(&cache));
        let key = memo.key(&[]);

        let _ = memo
            .fetch(&key, &Json, fixed_ttl, Postprocess::Accept, || async { Ok(vec![1u64, 2, 3]) })
            .await
            .unwrap();

        let narrowed = memo
            .fetch(
                &key,
                &Json,
                fixed_ttl,
                |mut v: Vec<u64>| {
                    v.retain(|&x| x > 1);
                    Postprocess::Accept(v)
                },
                || async { Ok(vec![]) },
            )
            .await
            .unwrap();
        assert_eq!(narrowed, vec![2, 3]);

        // Narrowing must not overwrite the wider entry.
        let full: Vec<u64> = memo
            .fetch(&key, &Json, fixed_ttl, Postprocess::Accept, || async { Ok(vec![]) })
            .await
            .unwrap();
        assert_eq!(full, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failing_codec_degrades_to_fetch() {
        struct Broken;
        impl Codec<u64> for Broken {
            fn encode(&self, _: &u64) -> crate::Result<Vec<u8>> {
                Err(ohno::app_err!("encode crashed"))
            }
            fn decode(&self, _: &[u8]) -> crate::Result<u64> {
                Err(ohno::app_err!("decode crashed"))
            }
        }

        let cache = MemoryCache::new();
        let memo = Memo::new("test.broken", Some(&cache));
        let key = memo.key(&[]);

        // Encode failure: result still returned, nothing stored.
        let result = memo
            .fetch(&key, &Broken, fixed_ttl, Postprocess::Accept, || async { Ok(5u64) })
            .await
            .unwrap();
        assert_eq!(result, 5);
        assert!(cache.is_empty());

        // Decode failure on a poisoned payload: degrades to a fresh fetch.
        cache.set(&key, b"garbage", TTL).await.unwrap();
        let result = memo
            .fetch(&key, &Broken, fixed_ttl, Postprocess::Accept, || async { Ok(6u64) })
            .await
            .unwrap();
        assert_eq!(result, 6);
    }

    #[tokio::test]
    async fn refresh_on_access_resets_the_ttl() {
        let cache = MemoryCache::new();
        let memo = Memo::new("test.refresh", Some(&cache)).refresh_on_access();
        let key = memo.key(&[]);
        cache.set(&key, &serde_json::to_vec(&5u64).unwrap(), TTL).await.unwrap();

        // The hit recomputes a zero TTL and touches the entry with it,
        // expiring it for the next call.
        let first = memo
            .fetch(&key, &Json, |_| Duration::ZERO, Postprocess::Accept, || async { Ok(9u64) })
            .await
            .unwrap();
        assert_eq!(first, 5);

        let second = memo
            .fetch(&key, &Json, fixed_ttl, Postprocess::Accept, || async { Ok(9u64) })
            .await
            .unwrap();
        assert_eq!(second, 9);
    }

    #[tokio::test]
    async fn ttl_sees_the_result() {
        let cache = MemoryCache::new();
        let memo = Memo::new("test.ttl", Some(&cache));
        let key = memo.key(&[]);

        // A zero TTL derived from the result makes the entry expire
        // immediately, so the next call fetches again.
        let evaluated = Cell::new(0u32);
        for _ in 0..2 {
            let _ = memo
                .fetch(
                    &key,
                    &Json,
                    |v: &u64| if *v == 0 { Duration::ZERO } else { TTL },
                    Postprocess::Accept,
                    || async {
                        evaluated.set(evaluated.get() + 1);
                        Ok(0u64)
                    },
                )
                .await
                .unwrap();
        }
        assert_eq!(evaluated.get(), 2);
    }
}
