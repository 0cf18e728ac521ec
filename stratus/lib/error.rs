//! Error types for stratus operations.

use std::{
    error::Error,
    fmt::{self, Display},
};

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a stratus-related operation.
pub type StratusResult<T> = Result<T, StratusError>;

/// An error surfaced by a provider operation or a compound flow.
///
/// Every observable failure maps to exactly one of these variants, whatever
/// the backend. Backend diagnostics are preserved verbatim inside
/// [`StratusError::Backend`].
#[derive(Debug, Error, PartialEq)]
pub enum StratusError {
    /// The referenced resource does not exist.
    #[error("unable to find {resource} {name}")]
    NotFound {
        /// The kind of resource that was looked up.
        resource: String,

        /// The id or name used for the lookup.
        name: String,
    },

    /// A resource with the same identity already exists.
    #[error("{resource} {name} already exists")]
    AlreadyExists {
        /// The kind of resource that collided.
        resource: String,

        /// The id or name that collided.
        name: String,
    },

    /// A bounded wait elapsed before the target condition was observed.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The request is malformed or references state that cannot satisfy it.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An opaque failure reported by the backend, wrapped verbatim.
    #[error("backend failure: {0}")]
    Backend(#[from] AnyError),
}

/// An error that can represent any error.
#[derive(Debug)]
pub struct AnyError {
    error: anyhow::Error,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StratusError {
    /// Creates a *not-found* error for the given resource kind and identifier.
    pub fn not_found(resource: impl Into<String>, name: impl Into<String>) -> StratusError {
        StratusError::NotFound {
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Creates an *already-exists* error for the given resource kind and identifier.
    pub fn already_exists(resource: impl Into<String>, name: impl Into<String>) -> StratusError {
        StratusError::AlreadyExists {
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// Wraps a backend diagnostic as a *backend-failure*.
    pub fn backend(error: impl Into<anyhow::Error>) -> StratusError {
        StratusError::Backend(AnyError {
            error: error.into(),
        })
    }

    /// Wraps a backend diagnostic with an operation context message.
    pub fn backend_msg(msg: impl Display, error: impl Into<anyhow::Error>) -> StratusError {
        StratusError::Backend(AnyError {
            error: error.into().context(msg.to_string()),
        })
    }

    /// Creates a *backend-failure* from a bare message.
    pub fn backend_str(msg: impl Display) -> StratusError {
        StratusError::Backend(AnyError {
            error: anyhow::anyhow!("{}", msg),
        })
    }

    /// Returns true if this error is a *not-found*.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StratusError::NotFound { .. })
    }

    /// Returns true if this error is an *already-exists*.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StratusError::AlreadyExists { .. })
    }

    /// Returns true if this error is a *timeout*.
    pub fn is_timeout(&self) -> bool {
        matches!(self, StratusError::Timeout(_))
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Creates an `Ok` `StratusResult`.
#[allow(non_snake_case)]
pub fn Ok<T>(value: T) -> StratusResult<T> {
    Result::Ok(value)
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl PartialEq for AnyError {
    fn eq(&self, other: &Self) -> bool {
        self.error.to_string() == other.error.to_string()
    }
}

impl Display for AnyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl Error for AnyError {}

impl From<reqwest::Error> for StratusError {
    fn from(error: reqwest::Error) -> Self {
        StratusError::backend(error)
    }
}

impl From<reqwest_middleware::Error> for StratusError {
    fn from(error: reqwest_middleware::Error) -> Self {
        StratusError::backend(error)
    }
}

impl From<serde_json::Error> for StratusError {
    fn from(error: serde_json::Error) -> Self {
        StratusError::backend(error)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy_predicates() {
        let err = StratusError::not_found("network", "net-1");
        assert!(err.is_not_found());
        assert!(!err.is_timeout());
        assert_eq!(err.to_string(), "unable to find network net-1");

        let err = StratusError::already_exists("vm", "web-0");
        assert!(err.is_already_exists());
        assert_eq!(err.to_string(), "vm web-0 already exists");

        let err = StratusError::Timeout("wait vm state timeout".into());
        assert!(err.is_timeout());
    }

    #[test]
    fn test_backend_errors_compare_by_message() {
        let a = StratusError::backend_str("code 503: service unavailable");
        let b = StratusError::backend_str("code 503: service unavailable");
        assert_eq!(a, b);

        let c = StratusError::backend_str("code 500: boom");
        assert_ne!(a, c);
    }

    #[test]
    fn test_backend_msg_keeps_context() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let err = StratusError::backend_msg("error creating vm web-0", io);
        assert!(err.to_string().contains("error creating vm web-0"));
    }
}
