//! Tracking of asynchronous control plane jobs.
//!
//! Some operations answer with a job reference instead of a result. The
//! [`JobTracker`] polls the job's status until it is terminal.
//!
//! A timed-out wait does not mean the job failed: the control plane may still
//! finish it after we stop watching. The timeout error carries the last known
//! status so callers can re-poll later instead of guessing.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::ProviderError;
use crate::poller::{Poller, Probe};
use crate::remote::{ControlPlane, Submission};
use crate::types::Operation;

/// Status of an async job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued, not started.
    Pending,
    /// In progress.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with a failure.
    Failed,
}

impl JobStatus {
    /// Whether the job will not change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A remote job and its last observed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobHandle {
    /// Job identifier.
    #[serde(alias = "id")]
    pub job_id: String,
    /// Last observed status.
    pub status: JobStatus,
    /// Reason reported by the control plane when the job failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl JobHandle {
    /// Create a handle without a failure reason.
    pub fn new(job_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            failure_reason: None,
        }
    }

    /// Create a failed handle carrying `reason`.
    pub fn failed(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Failed,
            failure_reason: Some(reason.into()),
        }
    }

    /// The error a failed job surfaces, with the reason verbatim.
    pub fn into_failure(self) -> ProviderError {
        let reason = match self.failure_reason {
            Some(reason) => reason,
            None => format!("job {} failed without a reason", self.job_id),
        };
        ProviderError::RemoteOperationFailed {
            status: None,
            reason,
        }
    }
}

/// Submits operations and drives their jobs to a terminal status.
pub struct JobTracker<C: ?Sized> {
    client: Arc<C>,
    poller: Poller,
}

impl<C: ControlPlane + ?Sized> JobTracker<C> {
    /// Create a tracker over `client`, waiting with `poller`.
    pub fn new(client: Arc<C>, poller: Poller) -> Self {
        Self { client, poller }
    }

    /// Submit an operation to the control plane.
    pub async fn submit(&self, operation: &Operation) -> Result<Submission, ProviderError> {
        self.client.submit(operation).await
    }

    /// Fetch the job's current status once.
    pub async fn poll_status(&self, job_id: &str) -> Result<JobHandle, ProviderError> {
        self.client.job_status(job_id).await
    }

    /// Wait until the job succeeds.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::RemoteOperationFailed`] with the job's failure reason verbatim
    /// - [`ProviderError::Timeout`] with the last known status
    /// - [`ProviderError::Cancelled`], or any error from the status fetch
    #[instrument(skip(self))]
    pub async fn await_job(&self, job_id: &str) -> Result<JobHandle, ProviderError> {
        let label = format!("job {}", job_id);
        let client = self.client.as_ref();
        let handle = self
            .poller
            .wait(&label, || probe_job(client, job_id))
            .await?;
        info!(job_id = %handle.job_id, "Job succeeded");
        Ok(handle)
    }

    /// Drive a job returned by a submit to completion.
    ///
    /// Handles that are already terminal are resolved without polling.
    pub async fn settle(&self, handle: JobHandle) -> Result<JobHandle, ProviderError> {
        match handle.status {
            JobStatus::Succeeded => Ok(handle),
            JobStatus::Failed => Err(handle.into_failure()),
            JobStatus::Pending | JobStatus::Running => self.await_job(&handle.job_id).await,
        }
    }
}

async fn probe_job<C: ControlPlane + ?Sized>(
    client: &C,
    job_id: &str,
) -> Result<Probe<JobHandle>, ProviderError> {
    let handle = client.job_status(job_id).await?;
    match handle.status {
        JobStatus::Succeeded => Ok(Probe::Done(handle)),
        JobStatus::Failed => Err(handle.into_failure()),
        JobStatus::Pending | JobStatus::Running => {
            Ok(Probe::Pending(format!("job {} status={}", job_id, handle.status)))
        }
    }
}
