//! memvault
//!
//! Concurrency-safe keyed registry of pooled in-memory byte streams.
//!
//! `memvault` maps 128-bit identifiers to recyclable byte buffers. Payloads
//! are registered under a [`Uuid`], retrieved, replaced, or removed
//! concurrently from any number of tasks, and the whole registry is torn down
//! with a single awaited, idempotent disposal. Backing memory comes from a
//! block-pooling allocator so that repeated large-payload traffic does not
//! hammer the global allocator.
//!
//! The crate intentionally:
//! - does NOT persist anything across process restarts
//! - does NOT share buffers across processes
//! - does NOT compress payloads
//! - does NOT evict entries on its own (removal is always caller-driven)
//!
//! It only does one thing: **UUID in → pooled bytes out, released exactly once**
//!
//! # Example
//!
//! ```no_run
//! use memvault::{RegistryError, StreamRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RegistryError> {
//!     let registry = StreamRegistry::new();
//!
//!     let id = registry.add_new(b"hello world").await?;
//!     assert_eq!(registry.get(id).await?.as_deref(), Some(&b"hello world"[..]));
//!
//!     registry.update(id, b"replaced").await?;
//!     registry.remove(id).await?;
//!
//!     registry.dispose_all().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency
//!
//! All operations run concurrently against one registry; there is no global
//! lock. The keyed map's atomic insert-if-absent / remove-if-present /
//! compare-and-swap primitives are the sole synchronization surface, so
//! operations on unrelated identifiers never contend beyond a map shard.
//! Releasing a buffer back to the pool happens at most once per buffer, and
//! always after the buffer has left the map.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod registry;

mod pool; // pooled allocator + stream handle

//
// Public surface (intentionally tiny)
//

pub use config::PoolConfig;
pub use error::RegistryError;
pub use pool::{PoolManager, PooledStream};
pub use registry::StreamRegistry;

pub use uuid::Uuid;
