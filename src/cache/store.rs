use super::key::CacheKey;
use crate::Result;
use core::time::Duration;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

/// The boundary to an external key/value object cache.
///
/// Values are opaque byte payloads with a time-to-live. Implementations are
/// expected to be shared, read-mostly resources; writes are last-writer-wins
/// per key, which is acceptable because values are pure functions of the key.
pub trait ObjectCache {
    /// Fetch the payload stored under `key`, or `None` when absent or expired.
    fn get(&self, key: &CacheKey) -> impl Future<Output = Result<Option<Vec<u8>>>>;

    /// Store `payload` under `key` for `ttl`.
    fn set(&self, key: &CacheKey, payload: &[u8], ttl: Duration) -> impl Future<Output = Result<()>>;

    /// Reset the expiration of an existing entry to `ttl` from now.
    fn touch(&self, key: &CacheKey, ttl: Duration) -> impl Future<Output = Result<()>>;
}

struct Entry {
    payload: Vec<u8>,
    expires_at: Instant,
}

/// An in-process [`ObjectCache`] with per-entry TTLs.
///
/// Expired entries read as misses and are evicted lazily on access.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl core::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryCache").finish_non_exhaustive()
    }
}

impl MemoryCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of live (unexpired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.expires_at > now).count())
            .unwrap_or(0)
    }

    /// Returns `true` when no live entry exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock().map_err(|_| ohno::app_err!("cache mutex poisoned"))?;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.payload.clone())),
            Some(_) => {
                let _ = entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &CacheKey, payload: &[u8], ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| ohno::app_err!("cache mutex poisoned"))?;
        let _ = entries.insert(
            key.clone(),
            Entry {
                payload: payload.to_vec(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn touch(&self, key: &CacheKey, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| ohno::app_err!("cache mutex poisoned"))?;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Instant::now() + ttl;
        }
        Ok(())
    }
}
