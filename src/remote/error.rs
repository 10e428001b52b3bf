//! Error types for remote store calls.

use thiserror::Error;

/// RPC error code the store uses for missing entries.
pub const CODE_NOT_FOUND: &str = "not_found";

/// RPC error code the store uses for permission failures.
pub const CODE_PERMISSION_DENIED: &str = "permission_denied";

/// Errors returned by a [`RemoteStore`](super::RemoteStore).
///
/// None of these are retried by the engine; only a `pending` block status
/// is transient.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The store answered with an RPC error.
    #[error("{method} failed ({code}): {message}")]
    Rpc {
        /// RPC method name.
        method: &'static str,
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error calling {method}: {source}")]
    Transport {
        /// RPC method name.
        method: &'static str,
        /// Underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The request timed out.
    #[error("timeout calling {method}")]
    Timeout {
        /// RPC method name.
        method: &'static str,
    },

    /// The response could not be decoded or was missing required fields.
    #[error("invalid response from {method}: {message}")]
    InvalidResponse {
        /// RPC method name.
        method: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// The configured endpoint is not a usable base URL.
    #[error("invalid remote endpoint: {endpoint}")]
    InvalidEndpoint {
        /// The rejected endpoint.
        endpoint: String,
    },

    /// The HTTP client could not be built.
    #[error("failed to build remote client: {0}")]
    Client(#[source] reqwest::Error),
}

impl RemoteError {
    /// Creates an RPC error.
    pub fn rpc(method: &'static str, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rpc {
            method,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Creates a transport error, promoting timeouts to [`RemoteError::Timeout`].
    #[must_use]
    pub fn transport(method: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { method }
        } else {
            Self::Transport { method, source }
        }
    }

    /// Creates an invalid-response error.
    pub fn invalid_response(method: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            method,
            message: message.into(),
        }
    }

    /// RPC error code, if the store answered with one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rpc { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the store reported the entry as missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code() == Some(CODE_NOT_FOUND)
    }
}
