//! The seam between the reconciliation core and the control plane.
//!
//! The core needs three primitives from the outside world: submit an operation,
//! fetch an object's current state, and fetch an async job's status. Anything
//! that speaks the control plane's protocol implements [`ControlPlane`]; see
//! [`crate::client::HttpControlPlane`] for the HTTP implementation and
//! [`crate::testing::MockControlPlane`] for a scripted one.
//!
//! Implementations are shared across orchestrators running concurrently and
//! must be safe for concurrent use.

use serde_json::Value;

use crate::error::ProviderError;
use crate::identity::RemoteResourceRef;
use crate::job::JobHandle;
use crate::types::Operation;

/// What the control plane answered to a submitted operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// The operation was accepted synchronously.
    Accepted {
        /// Identifier of the affected object, when the control plane returned one.
        resource_id: Option<String>,
        /// Response payload, if any (204 carries none).
        body: Option<Value>,
    },
    /// The operation continues asynchronously as a job.
    Job {
        /// The job to track.
        handle: JobHandle,
        /// Identifier of the object being created, when already known.
        resource_id: Option<String>,
    },
}

impl Submission {
    /// Synchronous acceptance with no payload.
    pub fn empty() -> Self {
        Self::Accepted {
            resource_id: None,
            body: None,
        }
    }

    /// The object identifier carried by the answer, if any.
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::Accepted { resource_id, .. } | Self::Job { resource_id, .. } => {
                resource_id.as_deref()
            }
        }
    }
}

/// Raw answer to a fetch, before drift classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Decoded payload; `None` for an empty body.
    pub body: Option<Value>,
}

impl RemoteResponse {
    /// 200 with a payload.
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    /// 404 with no payload.
    pub fn not_found() -> Self {
        Self {
            status: 404,
            body: None,
        }
    }

    /// Whether the status is in the 2xx family.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Operations the reconciliation core needs from a control plane.
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync {
    /// Submit an operation and return the immediate answer.
    ///
    /// A 404 answer must be reported as [`ProviderError::NotFound`].
    async fn submit(&self, operation: &Operation) -> Result<Submission, ProviderError>;

    /// Fetch the current state of an object.
    ///
    /// Non-2xx answers are returned as responses, not errors, so that they can
    /// be classified; only transport failures are errors.
    async fn fetch(
        &self,
        resource_type: &str,
        reference: &RemoteResourceRef,
    ) -> Result<RemoteResponse, ProviderError>;

    /// Fetch the current status of an async job.
    async fn job_status(&self, job_id: &str) -> Result<JobHandle, ProviderError>;
}
