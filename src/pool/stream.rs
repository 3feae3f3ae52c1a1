//! The pooled stream handle: a cursor over a recyclable backing buffer.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::pool::manager::{Backing, PoolShared};

/// A pooled, sequentially readable/writable byte stream.
///
/// Each stream exclusively owns one backing buffer checked out from the
/// [`PoolManager`](crate::PoolManager). The buffer returns to the pool on
/// [`release`](PooledStream::release), which succeeds at most once; any
/// operation after release fails with [`RegistryError::AlreadyReleased`].
///
/// Reads and writes are sequential, moving a single cursor. Writes past the
/// current capacity grow the stream through the pool's sizing tiers, with the
/// outgrown buffer recycled.
pub struct PooledStream {
    id: Uuid,
    shared: Arc<PoolShared>,
    state: Mutex<StreamState>,
}

struct StreamState {
    /// `None` once the buffer has been released back to the pool.
    backing: Option<Backing>,
    len: usize,
    pos: usize,
}

impl PooledStream {
    pub(crate) fn new(id: Uuid, shared: Arc<PoolShared>, backing: Backing, len: usize) -> Self {
        Self {
            id,
            shared,
            state: Mutex::new(StreamState {
                backing: Some(backing),
                len,
                pos: 0,
            }),
        }
    }

    /// Returns the identifier this stream was acquired under.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the current length of the stream's content.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyReleased`] after release.
    pub fn len(&self) -> Result<usize, RegistryError> {
        let state = self.state.lock();
        if state.backing.is_none() {
            return Err(RegistryError::AlreadyReleased);
        }
        Ok(state.len)
    }

    /// Returns true if the stream holds no content.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyReleased`] after release.
    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }

    /// Returns the current read/write cursor position.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyReleased`] after release.
    pub fn position(&self) -> Result<usize, RegistryError> {
        let state = self.state.lock();
        if state.backing.is_none() {
            return Err(RegistryError::AlreadyReleased);
        }
        Ok(state.pos)
    }

    /// Moves the read/write cursor.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyReleased`] after release, or
    /// [`RegistryError::InvalidState`] if `pos` is past the end of content.
    pub fn set_position(&self, pos: usize) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        if state.backing.is_none() {
            return Err(RegistryError::AlreadyReleased);
        }
        if pos > state.len {
            return Err(RegistryError::InvalidState {
                message: "cursor cannot be set past the end of content",
            });
        }
        state.pos = pos;
        Ok(())
    }

    /// Reads sequentially from the cursor into `buf`, advancing the cursor.
    ///
    /// Returns the number of bytes read; 0 once the cursor reaches the end.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyReleased`] after release.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize, RegistryError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let backing = state
            .backing
            .as_ref()
            .ok_or(RegistryError::AlreadyReleased)?;

        let n = buf.len().min(state.len - state.pos);
        buf[..n].copy_from_slice(&backing.buf[state.pos..state.pos + n]);
        state.pos += n;
        Ok(n)
    }

    /// Copies the entire content into a freshly allocated [`Bytes`].
    ///
    /// The copy happens under one lock acquisition and leaves the cursor
    /// untouched, so concurrent readers of the same stream never interfere
    /// with each other or with in-flight sequential reads.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyReleased`] after release.
    pub fn to_bytes(&self) -> Result<Bytes, RegistryError> {
        let state = self.state.lock();
        let backing = state
            .backing
            .as_ref()
            .ok_or(RegistryError::AlreadyReleased)?;
        Ok(Bytes::copy_from_slice(&backing.buf[..state.len]))
    }

    /// Writes `data` sequentially at the cursor, advancing the cursor and
    /// extending the content length when writing past the end.
    ///
    /// Growth beyond the current capacity re-checks out a larger buffer from
    /// the pool and recycles the outgrown one.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyReleased`] after release, or
    /// [`RegistryError::PayloadTooLarge`] if the write would push the stream
    /// past the configured maximum size.
    pub async fn write(&self, data: &[u8]) -> Result<usize, RegistryError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let backing = state
            .backing
            .as_mut()
            .ok_or(RegistryError::AlreadyReleased)?;

        let max = self.shared.config().max_stream_size();
        let end = match state.pos.checked_add(data.len()) {
            Some(end) if end <= max => end,
            _ => {
                return Err(RegistryError::PayloadTooLarge {
                    actual: state.pos.saturating_add(data.len()),
                    max,
                });
            }
        };

        // Grow through the pool's sizing tiers when the write overruns
        if end > backing.buf.len() {
            let mut grown = self.shared.checkout(end);
            grown.buf[..state.len].copy_from_slice(&backing.buf[..state.len]);
            let outgrown = std::mem::replace(backing, grown);
            self.shared.recycle(outgrown);
        }

        backing.buf[state.pos..end].copy_from_slice(data);
        state.pos = end;
        state.len = state.len.max(end);
        Ok(data.len())
    }

    /// Returns the backing buffer to the pool.
    ///
    /// Succeeds at most once per stream; the buffer is gone afterwards and
    /// every other operation fails with [`RegistryError::AlreadyReleased`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AlreadyReleased`] if already released.
    pub async fn release(&self) -> Result<(), RegistryError> {
        let backing = self
            .state
            .lock()
            .backing
            .take()
            .ok_or(RegistryError::AlreadyReleased)?;

        #[cfg(feature = "tracing")]
        tracing::trace!(stream = %self.id, "releasing pooled stream");

        self.shared.recycle(backing);
        Ok(())
    }

    /// Returns true once the backing buffer has been released.
    pub fn is_released(&self) -> bool {
        self.state.lock().backing.is_none()
    }
}

impl std::fmt::Debug for PooledStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PooledStream")
            .field("id", &self.id)
            .field("len", &state.len)
            .field("pos", &state.pos)
            .field("released", &state.backing.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::PoolConfig;
    use crate::error::RegistryError;
    use crate::pool::PoolManager;
    use uuid::Uuid;

    fn small_pool() -> PoolManager {
        PoolManager::new(PoolConfig::new(16, 64, 256).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_sequential_read_advances_cursor() {
        let pool = small_pool();
        let stream = pool.acquire(Uuid::new_v4(), b"hello world").await.unwrap();

        let mut first = [0u8; 5];
        assert_eq!(stream.read(&mut first).await.unwrap(), 5);
        assert_eq!(&first, b"hello");
        assert_eq!(stream.position().unwrap(), 5);

        let mut rest = [0u8; 16];
        assert_eq!(stream.read(&mut rest).await.unwrap(), 6);
        assert_eq!(&rest[..6], b" world");

        // Exhausted
        assert_eq!(stream.read(&mut rest).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_position_bounds() {
        let pool = small_pool();
        let stream = pool.acquire(Uuid::new_v4(), b"abcd").await.unwrap();

        stream.set_position(4).unwrap();
        assert!(matches!(
            stream.set_position(5),
            Err(RegistryError::InvalidState { .. })
        ));

        stream.set_position(0).unwrap();
        let mut buf = [0u8; 4];
        stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abcd");
    }

    #[tokio::test]
    async fn test_write_overwrites_and_extends() {
        let pool = small_pool();
        let stream = pool.acquire(Uuid::new_v4(), b"aaaa").await.unwrap();

        stream.set_position(2).unwrap();
        assert_eq!(stream.write(b"BBBB").await.unwrap(), 4);
        assert_eq!(stream.len().unwrap(), 6);

        stream.set_position(0).unwrap();
        let mut buf = [0u8; 6];
        stream.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"aaBBBB");
    }

    #[tokio::test]
    async fn test_write_grows_across_tiers() {
        let pool = small_pool();
        // Starts in a 16-byte block
        let stream = pool.acquire(Uuid::new_v4(), &[1u8; 10]).await.unwrap();

        // Grow into the large tier, then past the pooling ceiling
        stream.set_position(10).unwrap();
        stream.write(&[2u8; 90]).await.unwrap();
        assert_eq!(stream.len().unwrap(), 100);
        // The outgrown block went back to its free list
        assert_eq!(pool.free_blocks(), 1);

        stream.write(&[3u8; 200]).await.unwrap();
        assert_eq!(stream.len().unwrap(), 300);

        stream.set_position(0).unwrap();
        let mut buf = vec![0u8; 300];
        let mut read = 0;
        while read < 300 {
            let n = stream.read(&mut buf[read..]).await.unwrap();
            assert!(n > 0);
            read += n;
        }
        assert!(buf[..10].iter().all(|&b| b == 1));
        assert!(buf[10..100].iter().all(|&b| b == 2));
        assert!(buf[100..].iter().all(|&b| b == 3));
    }

    #[tokio::test]
    async fn test_to_bytes_leaves_cursor_alone() {
        let pool = small_pool();
        let stream = pool.acquire(Uuid::new_v4(), b"snapshot me").await.unwrap();

        stream.set_position(4).unwrap();
        assert_eq!(&stream.to_bytes().unwrap()[..], b"snapshot me");
        assert_eq!(stream.position().unwrap(), 4);

        // Sequential reads pick up where they left off
        let mut rest = [0u8; 16];
        let n = stream.read(&mut rest).await.unwrap();
        assert_eq!(&rest[..n], b"shot me");
    }

    #[tokio::test]
    async fn test_write_respects_max_stream_size() {
        let config = PoolConfig::new(16, 64, 256)
            .unwrap()
            .with_max_stream_size(20);
        let pool = PoolManager::new(config).unwrap();
        let stream = pool.acquire(Uuid::new_v4(), &[0u8; 16]).await.unwrap();

        stream.set_position(16).unwrap();
        assert!(matches!(
            stream.write(&[0u8; 5]).await,
            Err(RegistryError::PayloadTooLarge { .. })
        ));
        // Failed write leaves the stream untouched
        assert_eq!(stream.len().unwrap(), 16);
    }

    #[tokio::test]
    async fn test_release_is_exactly_once() {
        let pool = small_pool();
        let stream = pool.acquire(Uuid::new_v4(), b"x").await.unwrap();

        assert!(!stream.is_released());
        stream.release().await.unwrap();
        assert!(stream.is_released());

        assert!(matches!(
            stream.release().await,
            Err(RegistryError::AlreadyReleased)
        ));
        assert_eq!(pool.free_blocks(), 1, "double release must not recycle twice");
    }

    #[tokio::test]
    async fn test_operations_after_release_fail() {
        let pool = small_pool();
        let stream = pool.acquire(Uuid::new_v4(), b"x").await.unwrap();
        stream.release().await.unwrap();

        assert!(matches!(stream.len(), Err(RegistryError::AlreadyReleased)));
        assert!(matches!(
            stream.position(),
            Err(RegistryError::AlreadyReleased)
        ));
        assert!(matches!(
            stream.set_position(0),
            Err(RegistryError::AlreadyReleased)
        ));
        assert!(matches!(
            stream.to_bytes(),
            Err(RegistryError::AlreadyReleased)
        ));

        let mut buf = [0u8; 1];
        assert!(matches!(
            stream.read(&mut buf).await,
            Err(RegistryError::AlreadyReleased)
        ));
        assert!(matches!(
            stream.write(b"y").await,
            Err(RegistryError::AlreadyReleased)
        ));
    }
}
