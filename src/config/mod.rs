//! Configuration for the pooled allocator.
//!
//! This module provides [`PoolConfig`], which controls how the
//! [`PoolManager`](crate::PoolManager) sizes and recycles backing buffers:
//!
//! - Small payloads live in fixed-size pooled blocks
//! - Larger payloads get "large buffers" sized in multiples of a base unit,
//!   growing either linearly or exponentially
//! - Buffers above the pooling ceiling are handed out unpooled
//!
//! # Example
//!
//! ```
//! use memvault::PoolConfig;
//!
//! // Custom sizing: 4 KiB blocks, 64 KiB large-buffer unit, 1 MiB pool ceiling
//! let config = PoolConfig::new(4 * 1024, 64 * 1024, 1024 * 1024)?;
//!
//! // Exponential large-buffer growth
//! let config = PoolConfig::default().with_exponential_growth(true);
//!
//! # Ok::<(), memvault::RegistryError>(())
//! ```

use crate::error::RegistryError;

/// Default size of each pooled block (128 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 128 * 1024;

/// Default large-buffer size unit (1 MiB).
pub const DEFAULT_LARGE_BUFFER_MULTIPLE: usize = 1024 * 1024;

/// Default ceiling for pooled buffers (128 MiB). Larger buffers are unpooled.
pub const DEFAULT_MAX_POOLED_SIZE: usize = 128 * 1024 * 1024;

/// Default maximum stream size: just under 2 GiB (`i32::MAX`, the classic
/// 32-bit stream limit). Payloads above this are rejected.
pub const DEFAULT_MAX_STREAM_SIZE: usize = i32::MAX as usize;

/// Configuration for pooled buffer sizing and recycling.
///
/// `PoolConfig` controls the three size tiers the pool hands out:
///
/// - Block tier: payloads up to `block_size` use one pooled block
/// - Large tier: payloads up to `max_pooled_size` use a pooled large buffer
///   sized as a multiple of `large_buffer_multiple` (linear by default,
///   powers-of-two multiples with exponential growth enabled)
/// - Unpooled tier: anything bigger is allocated exactly and never recycled
///
/// # Size Constraints
///
/// - All sizes must be non-zero
/// - `block_size <= max_pooled_size`
/// - `max_pooled_size` must be reachable from `large_buffer_multiple` by the
///   active growth rule (an exact multiple, or a power-of-two multiple when
///   exponential growth is enabled)
///
/// # Example
///
/// ```
/// use memvault::PoolConfig;
///
/// // Use default configuration
/// let config = PoolConfig::default();
///
/// // Custom configuration
/// let config = PoolConfig::new(4096, 65536, 1048576)?;
///
/// // Builder pattern
/// let config = PoolConfig::default()
///     .with_block_size(64 * 1024)
///     .with_max_stream_size(256 * 1024 * 1024);
/// # Ok::<(), memvault::RegistryError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolConfig {
    /// Size of each pooled block in bytes.
    block_size: usize,

    /// Large buffers are sized in multiples of this value.
    large_buffer_multiple: usize,

    /// Ceiling for pooled buffers; larger buffers are unpooled.
    max_pooled_size: usize,

    /// Whether large buffers grow in powers-of-two multiples.
    use_exponential_growth: bool,

    /// Hard upper bound on a single stream's length.
    max_stream_size: usize,
}

impl PoolConfig {
    /// Creates a new configuration with the specified size tiers.
    ///
    /// # Arguments
    ///
    /// * `block_size` - Size of each pooled block in bytes
    /// * `large_buffer_multiple` - Base unit for large-buffer sizing
    /// * `max_pooled_size` - Ceiling for pooled buffers
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidConfig`] if:
    /// - Any size is zero
    /// - `block_size > max_pooled_size`
    /// - `max_pooled_size` is not an exact multiple of `large_buffer_multiple`
    ///
    /// # Example
    ///
    /// ```
    /// use memvault::PoolConfig;
    ///
    /// let config = PoolConfig::new(4096, 65536, 1048576)?;
    /// assert_eq!(config.block_size(), 4096);
    /// # Ok::<(), memvault::RegistryError>(())
    /// ```
    pub fn new(
        block_size: usize,
        large_buffer_multiple: usize,
        max_pooled_size: usize,
    ) -> Result<Self, RegistryError> {
        let config = Self {
            block_size,
            large_buffer_multiple,
            max_pooled_size,
            use_exponential_growth: false,
            max_stream_size: DEFAULT_MAX_STREAM_SIZE,
        };
        config.validate()?;
        Ok(config)
    }

    /// Sets the pooled block size.
    ///
    /// Note: This does not validate the configuration. Use
    /// [`PoolConfig::validate`] to check if the configuration is valid.
    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Sets the large-buffer size unit.
    ///
    /// Note: This does not validate the configuration. Use
    /// [`PoolConfig::validate`] to check if the configuration is valid.
    pub fn with_large_buffer_multiple(mut self, size: usize) -> Self {
        self.large_buffer_multiple = size;
        self
    }

    /// Sets the ceiling for pooled buffers.
    ///
    /// Note: This does not validate the configuration. Use
    /// [`PoolConfig::validate`] to check if the configuration is valid.
    pub fn with_max_pooled_size(mut self, size: usize) -> Self {
        self.max_pooled_size = size;
        self
    }

    /// Enables or disables exponential large-buffer growth.
    ///
    /// With exponential growth, large buffers are sized
    /// `large_buffer_multiple * 2^n`; otherwise they are sized
    /// `large_buffer_multiple * n`.
    pub fn with_exponential_growth(mut self, enabled: bool) -> Self {
        self.use_exponential_growth = enabled;
        self
    }

    /// Sets the hard upper bound on a single stream's length.
    ///
    /// Note: This does not validate the configuration. Use
    /// [`PoolConfig::validate`] to check if the configuration is valid.
    pub fn with_max_stream_size(mut self, size: usize) -> Self {
        self.max_stream_size = size;
        self
    }

    /// Returns the pooled block size.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the large-buffer size unit.
    pub fn large_buffer_multiple(&self) -> usize {
        self.large_buffer_multiple
    }

    /// Returns the ceiling for pooled buffers.
    pub fn max_pooled_size(&self) -> usize {
        self.max_pooled_size
    }

    /// Returns whether exponential large-buffer growth is enabled.
    pub fn use_exponential_growth(&self) -> bool {
        self.use_exponential_growth
    }

    /// Returns the hard upper bound on a single stream's length.
    pub fn max_stream_size(&self) -> usize {
        self.max_stream_size
    }

    /// Validates the current configuration.
    ///
    /// Returns an error if the configuration is invalid.
    ///
    /// # Example
    ///
    /// ```
    /// use memvault::PoolConfig;
    ///
    /// let config = PoolConfig::default().with_block_size(0);
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.block_size == 0
            || self.large_buffer_multiple == 0
            || self.max_pooled_size == 0
            || self.max_stream_size == 0
        {
            return Err(RegistryError::InvalidConfig {
                message: "pool sizes must be non-zero",
            });
        }

        if self.block_size > self.max_pooled_size {
            return Err(RegistryError::InvalidConfig {
                message: "block_size cannot be greater than max_pooled_size",
            });
        }

        if self.max_pooled_size % self.large_buffer_multiple != 0 {
            return Err(RegistryError::InvalidConfig {
                message: "max_pooled_size must be a multiple of large_buffer_multiple",
            });
        }

        if self.use_exponential_growth
            && !(self.max_pooled_size / self.large_buffer_multiple).is_power_of_two()
        {
            return Err(RegistryError::InvalidConfig {
                message: "max_pooled_size must be a power-of-two multiple of \
                          large_buffer_multiple with exponential growth",
            });
        }

        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            large_buffer_multiple: DEFAULT_LARGE_BUFFER_MULTIPLE,
            max_pooled_size: DEFAULT_MAX_POOLED_SIZE,
            use_exponential_growth: false,
            max_stream_size: DEFAULT_MAX_STREAM_SIZE,
        }
    }
}
