//! The pool manager: tiered free lists of recyclable backing buffers.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::error::RegistryError;
use crate::pool::stream::PooledStream;

/// Maximum number of free blocks kept for reuse.
const MAX_FREE_BLOCKS: usize = 64;

/// Maximum number of free large buffers kept per size class.
const MAX_FREE_PER_CLASS: usize = 8;

/// A backing buffer plus the pooling tier it was checked out from.
pub(crate) struct Backing {
    pub(crate) buf: Vec<u8>,
    capacity: usize,
    pooled: bool,
}

/// Free lists shared between the manager and every live stream.
pub(crate) struct PoolShared {
    config: PoolConfig,
    blocks: Mutex<Vec<Vec<u8>>>,
    large: DashMap<usize, Vec<Vec<u8>>>,
}

impl PoolShared {
    fn new(config: PoolConfig) -> Self {
        Self {
            config,
            blocks: Mutex::new(Vec::new()),
            large: DashMap::new(),
        }
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Rounds a requested length up to the capacity tier the pool hands out.
    ///
    /// Returns the capacity and whether buffers of that capacity are pooled.
    pub(crate) fn capacity_for(&self, len: usize) -> (usize, bool) {
        if len <= self.config.block_size() {
            return (self.config.block_size(), true);
        }

        let unit = self.config.large_buffer_multiple();
        let capacity = if self.config.use_exponential_growth() {
            let mut capacity = unit;
            while capacity < len {
                capacity = capacity.saturating_mul(2);
            }
            capacity
        } else {
            len.div_ceil(unit).saturating_mul(unit)
        };

        if capacity <= self.config.max_pooled_size() {
            (capacity, true)
        } else {
            // Above the pooling ceiling: exact-size, never recycled
            (len, false)
        }
    }

    /// Checks out a zeroed buffer large enough for `len` bytes, reusing a
    /// free one when available.
    pub(crate) fn checkout(&self, len: usize) -> Backing {
        let (capacity, pooled) = self.capacity_for(len);

        let mut buf = if pooled {
            let reused = if capacity == self.config.block_size() {
                self.blocks.lock().pop()
            } else {
                self.large.get_mut(&capacity).and_then(|mut list| list.pop())
            };
            reused.unwrap_or_else(|| Vec::with_capacity(capacity))
        } else {
            Vec::with_capacity(capacity)
        };

        buf.clear();
        buf.resize(capacity, 0);
        Backing {
            buf,
            capacity,
            pooled,
        }
    }

    /// Returns a backing buffer to its free list. Free lists are bounded;
    /// overflow and unpooled buffers simply drop.
    pub(crate) fn recycle(&self, backing: Backing) {
        if !backing.pooled {
            return;
        }

        if backing.capacity == self.config.block_size() {
            let mut blocks = self.blocks.lock();
            if blocks.len() < MAX_FREE_BLOCKS {
                blocks.push(backing.buf);
            }
        } else {
            let mut list = self.large.entry(backing.capacity).or_default();
            if list.len() < MAX_FREE_PER_CLASS {
                list.push(backing.buf);
            }
        }
    }
}

/// Allocator that hands out [`PooledStream`]s backed by recyclable buffers.
///
/// The manager is cheap to clone (shared internals) and is usually shared
/// between a registry and any code that wants to acquire streams directly.
///
/// # Example
///
/// ```no_run
/// use memvault::{PoolConfig, PoolManager, Uuid};
///
/// # async fn demo() -> Result<(), memvault::RegistryError> {
/// let pool = PoolManager::new(PoolConfig::default())?;
/// let stream = pool.acquire(Uuid::new_v4(), b"payload").await?;
///
/// assert_eq!(stream.len()?, 7);
/// stream.release().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PoolManager {
    shared: Arc<PoolShared>,
}

impl PoolManager {
    /// Creates a pool manager with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] if the configuration fails
    /// [`PoolConfig::validate`].
    pub fn new(config: PoolConfig) -> Result<Self, RegistryError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(PoolShared::new(config)),
        })
    }

    /// Returns the pool's configuration.
    pub fn config(&self) -> &PoolConfig {
        self.shared.config()
    }

    /// Acquires a new stream seeded with `initial_data`, cursor at the start.
    ///
    /// The backing buffer is recycled from the pool when a free one of the
    /// right capacity exists, otherwise freshly allocated.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::PayloadTooLarge`] if `initial_data` exceeds
    /// the configured maximum stream size.
    pub async fn acquire(
        &self,
        id: Uuid,
        initial_data: &[u8],
    ) -> Result<PooledStream, RegistryError> {
        let max = self.shared.config.max_stream_size();
        if initial_data.len() > max {
            return Err(RegistryError::PayloadTooLarge {
                actual: initial_data.len(),
                max,
            });
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(
            stream = %id,
            len = initial_data.len(),
            "acquiring pooled stream"
        );

        let mut backing = self.shared.checkout(initial_data.len());
        backing.buf[..initial_data.len()].copy_from_slice(initial_data);

        Ok(PooledStream::new(
            id,
            Arc::clone(&self.shared),
            backing,
            initial_data.len(),
        ))
    }

    /// Number of free fixed-size blocks currently held for reuse.
    pub fn free_blocks(&self) -> usize {
        self.shared.blocks.lock().len()
    }

    /// Number of free large buffers currently held for the given capacity.
    pub fn free_large_buffers(&self, capacity: usize) -> usize {
        self.shared
            .large
            .get(&capacity)
            .map_or(0, |list| list.len())
    }
}

impl Default for PoolManager {
    fn default() -> Self {
        // The default configuration is always valid
        Self {
            shared: Arc::new(PoolShared::new(PoolConfig::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool() -> PoolManager {
        // 16-byte blocks, 64-byte large unit, 256-byte pooling ceiling
        PoolManager::new(PoolConfig::new(16, 64, 256).unwrap()).unwrap()
    }

    #[test]
    fn test_capacity_rounding_linear() {
        let pool = small_pool();
        assert_eq!(pool.shared.capacity_for(0), (16, true));
        assert_eq!(pool.shared.capacity_for(16), (16, true));
        assert_eq!(pool.shared.capacity_for(17), (64, true));
        assert_eq!(pool.shared.capacity_for(65), (128, true));
        assert_eq!(pool.shared.capacity_for(256), (256, true));
        // Above the ceiling: exact size, unpooled
        assert_eq!(pool.shared.capacity_for(257), (257, false));
    }

    #[test]
    fn test_capacity_rounding_exponential() {
        let config = PoolConfig::new(16, 64, 256)
            .unwrap()
            .with_exponential_growth(true);
        let pool = PoolManager::new(config).unwrap();

        assert_eq!(pool.shared.capacity_for(17), (64, true));
        assert_eq!(pool.shared.capacity_for(65), (128, true));
        // 129..=256 all round to 256 (64 * 2^2)
        assert_eq!(pool.shared.capacity_for(130), (256, true));
        assert_eq!(pool.shared.capacity_for(300), (300, false));
    }

    #[tokio::test]
    async fn test_acquire_seeds_data() {
        let pool = small_pool();
        let stream = pool.acquire(Uuid::new_v4(), b"abc").await.unwrap();

        assert_eq!(stream.len().unwrap(), 3);
        assert_eq!(stream.position().unwrap(), 0);

        let mut buf = [0u8; 3];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 3);
        assert_eq!(&buf, b"abc");
    }

    #[tokio::test]
    async fn test_acquire_rejects_oversized_payload() {
        let config = PoolConfig::new(16, 64, 256)
            .unwrap()
            .with_max_stream_size(32);
        let pool = PoolManager::new(config).unwrap();

        let result = pool.acquire(Uuid::new_v4(), &[0u8; 33]).await;
        assert!(matches!(
            result,
            Err(RegistryError::PayloadTooLarge { actual: 33, max: 32 })
        ));
    }

    #[tokio::test]
    async fn test_release_recycles_block() {
        let pool = small_pool();
        assert_eq!(pool.free_blocks(), 0);

        let stream = pool.acquire(Uuid::new_v4(), b"x").await.unwrap();
        stream.release().await.unwrap();
        assert_eq!(pool.free_blocks(), 1);

        // The next acquire reuses the freed block
        let _stream = pool.acquire(Uuid::new_v4(), b"y").await.unwrap();
        assert_eq!(pool.free_blocks(), 0);
    }

    #[tokio::test]
    async fn test_release_recycles_large_buffer_by_class() {
        let pool = small_pool();
        let stream = pool.acquire(Uuid::new_v4(), &[7u8; 100]).await.unwrap();
        stream.release().await.unwrap();

        assert_eq!(pool.free_large_buffers(128), 1);
        assert_eq!(pool.free_large_buffers(64), 0);
    }

    #[tokio::test]
    async fn test_unpooled_buffer_not_recycled() {
        let pool = small_pool();
        let stream = pool.acquire(Uuid::new_v4(), &[1u8; 300]).await.unwrap();
        stream.release().await.unwrap();

        assert_eq!(pool.free_blocks(), 0);
        assert_eq!(pool.free_large_buffers(300), 0);
    }

    #[tokio::test]
    async fn test_recycled_buffer_is_zeroed_on_checkout() {
        let pool = small_pool();
        let stream = pool.acquire(Uuid::new_v4(), &[0xFF; 16]).await.unwrap();
        stream.release().await.unwrap();

        // Reuse the same block with a shorter payload; the tail must not
        // expose the previous stream's bytes
        let stream = pool.acquire(Uuid::new_v4(), b"ab").await.unwrap();
        let mut buf = [0u8; 2];
        stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ab");
        assert_eq!(stream.len().unwrap(), 2);
    }
}
