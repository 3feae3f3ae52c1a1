//! Error types for memvault.

use std::fmt;

/// Errors that can occur while operating the registry or its pooled streams.
///
/// Lookup misses are never errors: [`StreamRegistry::get`] yields `Ok(None)`
/// and [`StreamRegistry::remove`] yields `Ok(false)` for unknown identifiers.
///
/// [`StreamRegistry::get`]: crate::StreamRegistry::get
/// [`StreamRegistry::remove`]: crate::StreamRegistry::remove
#[derive(Debug)]
pub enum RegistryError {
    /// Invalid configuration parameter.
    InvalidConfig {
        /// Description of what was invalid.
        message: &'static str,
    },

    /// The payload (or a write past the cursor) exceeded the maximum stream size.
    PayloadTooLarge {
        /// The size that was requested.
        actual: usize,
        /// The maximum allowed size.
        max: usize,
    },

    /// Operation attempted on a stream whose backing buffer was already
    /// returned to the pool.
    AlreadyReleased,

    /// The stream is in a state that does not support the requested action.
    InvalidState {
        /// Description of the state violation.
        message: &'static str,
    },

    /// Mutating operation attempted on a registry after `dispose_all`.
    Disposed,

    /// One or more buffer releases failed during bulk disposal.
    ///
    /// Disposal attempts every release even when some fail; the individual
    /// failures are collected here rather than aborting early.
    ReleaseFailed {
        /// The failures observed, one per stream that could not be released.
        errors: Vec<RegistryError>,
    },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidConfig { message } => {
                write!(f, "invalid config: {}", message)
            }
            RegistryError::PayloadTooLarge { actual, max } => {
                write!(f, "payload too large: {} bytes (max {})", actual, max)
            }
            RegistryError::AlreadyReleased => {
                write!(f, "stream already released back to the pool")
            }
            RegistryError::InvalidState { message } => {
                write!(f, "invalid stream state: {}", message)
            }
            RegistryError::Disposed => write!(f, "registry has been disposed"),
            RegistryError::ReleaseFailed { errors } => {
                write!(f, "{} release(s) failed during disposal", errors.len())
            }
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::ReleaseFailed { errors } => {
                errors.first().map(|e| e as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = RegistryError::PayloadTooLarge {
            actual: 100,
            max: 50,
        };
        assert!(err.to_string().contains("payload too large"));
    }

    #[test]
    fn test_release_failed_source() {
        let err = RegistryError::ReleaseFailed {
            errors: vec![RegistryError::AlreadyReleased],
        };
        assert!(err.to_string().contains("1 release(s)"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_disposed_display() {
        assert!(RegistryError::Disposed.to_string().contains("disposed"));
    }
}
