//! Error types for the reconciliation core.
//!
//! Identity errors are raised before any network call. Transport and remote
//! failures abort a wait immediately. [`ProviderError::Timeout`] means the
//! outcome is unknown and must be re-checked with a read; it is never a report
//! that the requested change failed.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while reconciling a resource.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The network or HTTP layer failed before a business outcome was known.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The control plane explicitly reported failure.
    #[error("Remote operation failed: {reason}")]
    RemoteOperationFailed {
        /// HTTP status code, if the failure came from a response rather than a job.
        status: Option<u16>,
        /// Reason supplied by the control plane, verbatim.
        reason: String,
    },

    /// A wait exceeded its budget without reaching a terminal state.
    #[error("Timed out after {waited:?} (outcome unknown, last observed: {last_observed})")]
    Timeout {
        /// How long the wait ran.
        waited: Duration,
        /// The last observed state, for diagnostics.
        last_observed: String,
    },

    /// The wait was aborted by an external cancellation signal.
    #[error("Operation cancelled")]
    Cancelled,

    /// A composite identifier lacked the parent segment required by its type.
    #[error("Missing parent identifier in: {0}")]
    MissingParentIdentifier(String),

    /// A composite identifier could not be parsed.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The control plane answered with a shape the caller did not expect.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The requested change cannot be applied in place.
    #[error("Replacement required: {} cannot change in place", .attributes.join(", "))]
    ReplacementRequired {
        /// Attributes that force replacement.
        attributes: Vec<String>,
    },

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request from the caller.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Build a [`ProviderError::RemoteOperationFailed`] without a status code.
    pub fn remote(reason: impl Into<String>) -> Self {
        Self::RemoteOperationFailed {
            status: None,
            reason: reason.into(),
        }
    }

    /// Get the error message as a string.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport(msg) => msg,
            Self::RemoteOperationFailed { reason, .. } => reason,
            Self::Timeout { last_observed, .. } => last_observed,
            Self::Cancelled => "cancelled",
            Self::MissingParentIdentifier(msg) => msg,
            Self::InvalidIdentifier(msg) => msg,
            Self::NotFound(msg) => msg,
            Self::UnexpectedResponse(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::ReplacementRequired { .. } => "replacement required",
            Self::Configuration(msg) => msg,
            Self::InvalidRequest(msg) => msg,
        }
    }

    /// Whether this error means "we stopped waiting", not "the change failed".
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether the wait was cancelled from outside.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the control plane reported the object as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether this error was raised locally, before any remote call.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::MissingParentIdentifier(_)
                | Self::InvalidIdentifier(_)
                | Self::ReplacementRequired { .. }
                | Self::Configuration(_)
                | Self::InvalidRequest(_)
        )
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
