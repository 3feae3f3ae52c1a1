//! The keyed stream registry.
//!
//! - [`StreamRegistry`] - Concurrent map of identifiers to pooled streams,
//!   with exactly-once release of every stream that passes through it
//!
//! The registry relies on the keyed map's atomic insert-if-absent /
//! remove-if-present / compare-and-swap primitives for all synchronization;
//! there is no registry-wide lock.

mod keyed;

pub use keyed::StreamRegistry;
