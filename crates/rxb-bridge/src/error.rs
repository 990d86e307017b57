#![forbid(unsafe_code)]

//! Bridge errors.

use rxb_registry::RegistryError;

/// Errors raised by bridge operations.
///
/// Registry errors pass through unchanged as [`BridgeError::Registry`].
/// Asynchronous failures are not errors here: they stay data inside
/// [`AsyncResult::Failure`](rxb_registry::AsyncResult::Failure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A strict lookup found no registry in scope.
    MissingRegistry,
    /// The registry rejected the call.
    Registry(RegistryError),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRegistry => f.write_str("no registry provided in this scope"),
            Self::Registry(err) => write!(f, "registry error: {err}"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::MissingRegistry => None,
            Self::Registry(err) => Some(err),
        }
    }
}

impl From<RegistryError> for BridgeError {
    fn from(err: RegistryError) -> Self {
        Self::Registry(err)
    }
}

/// Convenience alias for bridge results.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
