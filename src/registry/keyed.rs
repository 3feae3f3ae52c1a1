//! Registry implementation over a sharded concurrent map.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::join_all;
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::error::RegistryError;
use crate::pool::{PoolManager, PooledStream};

/// Concurrency-safe keyed registry of pooled byte streams.
///
/// Each identifier maps to exactly one live [`PooledStream`]. The registry
/// owns the stream while it is in the map and guarantees its backing buffer
/// is released back to the pool exactly once: when the entry is removed,
/// replaced, cleared, or disposed.
///
/// # Lifecycle
///
/// A registry is `Active` until [`dispose_all`](StreamRegistry::dispose_all)
/// runs, after which it is permanently `Disposed`: mutating operations fail
/// with [`RegistryError::Disposed`], while [`get`](StreamRegistry::get) and
/// [`len`](StreamRegistry::len) keep working (and find nothing). Reuse after
/// disposal means constructing a new registry.
///
/// # Example
///
/// ```no_run
/// use memvault::{StreamRegistry, Uuid};
///
/// # async fn demo() -> Result<(), memvault::RegistryError> {
/// let registry = StreamRegistry::new();
///
/// let id = Uuid::new_v4();
/// registry.add(id, b"payload").await?;
///
/// assert_eq!(registry.get(id).await?.as_deref(), Some(&b"payload"[..]));
/// assert!(registry.remove(id).await?);
///
/// registry.dispose_all().await?;
/// # Ok(())
/// # }
/// ```
pub struct StreamRegistry {
    pool: PoolManager,
    entries: DashMap<Uuid, Arc<PooledStream>>,
    disposed: AtomicBool,
}

impl StreamRegistry {
    /// Creates a registry with a default pool configuration.
    pub fn new() -> Self {
        Self::with_pool(PoolManager::default())
    }

    /// Creates a registry with a custom pool configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] if the configuration fails
    /// [`PoolConfig::validate`].
    pub fn with_config(config: PoolConfig) -> Result<Self, RegistryError> {
        Ok(Self::with_pool(PoolManager::new(config)?))
    }

    /// Creates a registry on top of an existing pool manager.
    ///
    /// Useful for sharing one pool's free lists between several registries.
    pub fn with_pool(pool: PoolManager) -> Self {
        Self {
            pool,
            entries: DashMap::new(),
            disposed: AtomicBool::new(false),
        }
    }

    /// Returns the pool manager backing this registry.
    pub fn pool(&self) -> &PoolManager {
        &self.pool
    }

    /// Registers `data` under `id`.
    ///
    /// Returns `Ok(id)` on success. If `id` is already present the existing
    /// entry is left untouched, the speculatively acquired stream is released
    /// back to the pool, and the nil UUID is returned as a collision
    /// sentinel.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Disposed`] after disposal, or a pool error if
    /// acquisition fails (e.g. [`RegistryError::PayloadTooLarge`]).
    pub async fn add(&self, id: Uuid, data: &[u8]) -> Result<Uuid, RegistryError> {
        self.ensure_active()?;

        let stream = Arc::new(self.pool.acquire(id, data).await?);

        // Atomic insert-if-absent; the shard guard never crosses an await
        let clash = match self.entries.entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(stream);
                None
            }
            Entry::Occupied(_) => Some(stream),
        };

        match clash {
            None => {
                // A disposal may have flipped the flag and drained the map
                // between ensure_active and the insert, stranding the fresh
                // entry in a registry nothing can mutate anymore. Back it
                // out; if the drain already took it, the drain releases it.
                if self.is_disposed() {
                    if let Some((_, stream)) = self.entries.remove(&id) {
                        stream.release().await?;
                    }
                    return Err(RegistryError::Disposed);
                }
                Ok(id)
            }
            Some(stream) => {
                // Collision: the speculative stream never entered the map,
                // so its release responsibility stays here
                stream.release().await?;
                Ok(Uuid::nil())
            }
        }
    }

    /// Registers `data` under a freshly generated identifier and returns it.
    ///
    /// # Errors
    ///
    /// Same as [`add`](StreamRegistry::add); a v4 UUID collision does not
    /// happen in practice.
    pub async fn add_new(&self, data: &[u8]) -> Result<Uuid, RegistryError> {
        self.add(Uuid::new_v4(), data).await
    }

    /// Retrieves a copy of the payload stored under `id`.
    ///
    /// Returns `Ok(None)` when the identifier is unknown; a miss is not an
    /// error. The copy is taken in one shot without touching the stream's
    /// cursor, so reads are repeatable and concurrent `get`s on the same
    /// identifier cannot interfere with each other.
    pub async fn get(&self, id: Uuid) -> Result<Option<Bytes>, RegistryError> {
        let stream = match self.entries.get(&id) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Ok(None),
        };

        match stream.to_bytes() {
            Ok(data) => Ok(Some(data)),
            // Lost the race against a concurrent remove: report a plain miss
            Err(RegistryError::AlreadyReleased) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Replaces the payload stored under `id` with `data`.
    ///
    /// Returns `Ok(false)` without side effects when the identifier is
    /// unknown. The swap is CAS-guarded: it succeeds only if the
    /// entry still holds the stream observed at lookup time, so exactly one
    /// of several concurrent updates wins. The replaced stream is released on
    /// success; the speculative replacement is released on a lost race.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Disposed`] after disposal, or a pool error if
    /// acquisition fails.
    pub async fn update(&self, id: Uuid, data: &[u8]) -> Result<bool, RegistryError> {
        self.ensure_active()?;

        let observed = match self.entries.get(&id) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Ok(false),
        };

        let replacement = Arc::new(self.pool.acquire(id, data).await?);

        // No disposal re-check needed here: the swap only lands in a slot
        // that still holds `observed`, so a drain that already emptied the
        // slot fails the guard below, and a drain that runs afterwards
        // removes and releases the replacement like any resident entry.
        let swapped = match self.entries.entry(id) {
            Entry::Occupied(mut slot) if Arc::ptr_eq(slot.get(), &observed) => {
                slot.insert(Arc::clone(&replacement));
                true
            }
            _ => false,
        };

        if swapped {
            observed.release().await?;
            Ok(true)
        } else {
            // A concurrent remove/update got here first; whoever took the
            // observed stream out of the map also owns releasing it. Only
            // the unused replacement is ours to return.
            replacement.release().await?;
            Ok(false)
        }
    }

    /// Removes the entry stored under `id`.
    ///
    /// Returns `Ok(true)` and releases the stream if the entry existed,
    /// `Ok(false)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Disposed`] after disposal.
    pub async fn remove(&self, id: Uuid) -> Result<bool, RegistryError> {
        self.ensure_active()?;

        match self.entries.remove(&id) {
            Some((_, stream)) => {
                stream.release().await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Releases every resident stream and empties the map.
    ///
    /// All releases run concurrently and are awaited before returning. Safe
    /// to call repeatedly; the registry stays usable for further `add`s.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Disposed`] after disposal, or
    /// [`RegistryError::ReleaseFailed`] aggregating any releases that failed
    /// (every release is still attempted).
    pub async fn clear(&self) -> Result<(), RegistryError> {
        self.ensure_active()?;
        self.drain_entries().await
    }

    /// Returns the number of live entries.
    ///
    /// A point-in-time snapshot under concurrent mutation.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Disposes the registry: releases every resident stream concurrently,
    /// awaits all releases, and empties the map.
    ///
    /// Idempotent: exactly one caller performs the teardown; every other
    /// call, including calls racing the first, returns immediately. After
    /// disposal the registry is terminal: `add`, `update`, `remove`, and
    /// `clear` fail with [`RegistryError::Disposed`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ReleaseFailed`] aggregating any releases that
    /// failed (every release is still attempted).
    pub async fn dispose_all(&self) -> Result<(), RegistryError> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(entries = self.entries.len(), "disposing stream registry");

        self.drain_entries().await
    }

    /// Returns true once [`dispose_all`](StreamRegistry::dispose_all) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_active(&self) -> Result<(), RegistryError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(RegistryError::Disposed);
        }
        Ok(())
    }

    /// Removes every entry and fans the releases out concurrently, awaiting
    /// all of them and aggregating failures.
    async fn drain_entries(&self) -> Result<(), RegistryError> {
        let ids: Vec<Uuid> = self.entries.iter().map(|entry| *entry.key()).collect();

        let mut victims: Vec<Arc<PooledStream>> = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((_, stream)) = self.entries.remove(&id) {
                victims.push(stream);
            }
        }

        // Teardown latency is bounded by the slowest release, not the sum
        let results = join_all(victims.iter().map(|stream| stream.release())).await;

        let errors: Vec<RegistryError> = results.into_iter().filter_map(Result::err).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::ReleaseFailed { errors })
        }
    }

}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("entries", &self.entries.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_then_get_round_trip() {
        let registry = StreamRegistry::new();
        let id = registry.add_new(b"round trip").await.unwrap();

        assert_ne!(id, Uuid::nil());
        assert_eq!(
            registry.get(id).await.unwrap().as_deref(),
            Some(&b"round trip"[..])
        );
    }

    #[tokio::test]
    async fn test_add_collision_returns_nil_sentinel() {
        let registry = StreamRegistry::new();
        let id = Uuid::new_v4();

        assert_eq!(registry.add(id, b"first").await.unwrap(), id);
        assert_eq!(registry.add(id, b"second").await.unwrap(), Uuid::nil());

        // First entry untouched, speculative buffer recycled not leaked
        assert_eq!(
            registry.get(id).await.unwrap().as_deref(),
            Some(&b"first"[..])
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.pool().free_blocks(), 1);
    }

    #[tokio::test]
    async fn test_update_replaces_and_releases_old_stream() {
        let registry = StreamRegistry::new();
        let id = registry.add_new(b"v1").await.unwrap();

        assert!(registry.update(id, b"v2").await.unwrap());
        assert_eq!(registry.get(id).await.unwrap().as_deref(), Some(&b"v2"[..]));

        // One buffer freed per successful swap
        assert_eq!(registry.pool().free_blocks(), 1);
    }

    #[tokio::test]
    async fn test_disposed_registry_is_terminal() {
        let registry = StreamRegistry::new();
        let id = registry.add_new(b"data").await.unwrap();

        registry.dispose_all().await.unwrap();
        assert!(registry.is_disposed());
        assert!(registry.is_empty());

        assert!(matches!(
            registry.add_new(b"more").await,
            Err(RegistryError::Disposed)
        ));
        assert!(matches!(
            registry.update(id, b"more").await,
            Err(RegistryError::Disposed)
        ));
        assert!(matches!(
            registry.remove(id).await,
            Err(RegistryError::Disposed)
        ));
        assert!(matches!(
            registry.clear().await,
            Err(RegistryError::Disposed)
        ));

        // Reads stay callable and simply miss
        assert_eq!(registry.get(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_shared_pool_between_registries() {
        let pool = PoolManager::default();
        let a = StreamRegistry::with_pool(pool.clone());
        let b = StreamRegistry::with_pool(pool.clone());

        let id = a.add_new(b"from a").await.unwrap();
        a.remove(id).await.unwrap();

        // Registry B reuses the block A just freed
        assert_eq!(pool.free_blocks(), 1);
        b.add_new(b"from b").await.unwrap();
        assert_eq!(pool.free_blocks(), 0);
    }
}
