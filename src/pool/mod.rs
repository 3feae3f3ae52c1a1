//! Pooled allocation for stream backing buffers.
//!
//! - [`PoolManager`] - Hands out recyclable backing buffers in three size
//!   tiers (fixed blocks, large multiples, unpooled)
//! - [`PooledStream`] - A sequentially readable/writable byte stream whose
//!   backing buffer returns to the pool on release
//!
//! The registry consumes this module as a factory: it acquires one stream per
//! entry and releases it exactly once when the entry leaves the map.

mod manager;
mod stream;

pub use manager::PoolManager;
pub use stream::PooledStream;
