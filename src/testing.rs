//! Testing utilities for code built on the reconciliation core.
//!
//! [`MockControlPlane`] is a scripted [`ControlPlane`]: each call pops the next
//! queued answer, falling back to a fixed answer once the queue is empty, and
//! every call is counted. Combine it with tokio's paused clock to test waits
//! without sleeping.
//!
//! # Example
//!
//! ```ignore
//! use hemmer_reconciler::testing::MockControlPlane;
//! use hemmer_reconciler::remote::RemoteResponse;
//! use serde_json::json;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_waits_for_ready() {
//!     let mock = Arc::new(MockControlPlane::new());
//!     mock.push_fetch(Ok(RemoteResponse::ok(json!({"ready": false}))));
//!     mock.push_fetch(Ok(RemoteResponse::ok(json!({"ready": true}))));
//!
//!     // ... run an orchestrator over `mock` ...
//!
//!     assert_eq!(mock.fetch_calls(), 2);
//! }
//! ```

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard};

use crate::error::ProviderError;
use crate::identity::RemoteResourceRef;
use crate::job::JobHandle;
use crate::remote::{ControlPlane, RemoteResponse, Submission};
use crate::types::{Operation, ReadOutcome, UpdateOutcome};

#[derive(Default)]
struct MockState {
    submits: VecDeque<Result<Submission, ProviderError>>,
    fetches: VecDeque<Result<RemoteResponse, ProviderError>>,
    jobs: VecDeque<JobHandle>,
    fetch_fallback: Option<RemoteResponse>,
    job_fallback: Option<JobHandle>,
    submitted: Vec<Operation>,
    fetched: Vec<(String, RemoteResourceRef)>,
    job_status_calls: usize,
}

/// A scripted control plane for tests.
///
/// Defaults once the queues are drained:
/// - `submit` answers [`Submission::empty`]
/// - `fetch` answers the fetch fallback, or 404
/// - `job_status` answers the job fallback, or [`ProviderError::NotFound`]
#[derive(Default)]
pub struct MockControlPlane {
    state: Mutex<MockState>,
}

impl MockControlPlane {
    /// Create a mock with empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue an answer for the next `submit`.
    pub fn push_submit(&self, answer: Result<Submission, ProviderError>) {
        self.state().submits.push_back(answer);
    }

    /// Queue an answer for the next `fetch`.
    pub fn push_fetch(&self, answer: Result<RemoteResponse, ProviderError>) {
        self.state().fetches.push_back(answer);
    }

    /// Queue `count` copies of a fetch answer.
    pub fn push_fetches(&self, response: RemoteResponse, count: usize) {
        let mut state = self.state();
        for _ in 0..count {
            state.fetches.push_back(Ok(response.clone()));
        }
    }

    /// Answer every `fetch` with `response` once the queue is drained.
    pub fn set_fetch_fallback(&self, response: RemoteResponse) {
        self.state().fetch_fallback = Some(response);
    }

    /// Queue a status for the next `job_status`.
    pub fn push_job_status(&self, handle: JobHandle) {
        self.state().jobs.push_back(handle);
    }

    /// Answer every `job_status` with `handle` once the queue is drained.
    pub fn set_job_status_fallback(&self, handle: JobHandle) {
        self.state().job_fallback = Some(handle);
    }

    /// Operations submitted so far, in order.
    pub fn submitted(&self) -> Vec<Operation> {
        self.state().submitted.clone()
    }

    /// Number of `submit` calls.
    pub fn submit_calls(&self) -> usize {
        self.state().submitted.len()
    }

    /// Number of `fetch` calls.
    pub fn fetch_calls(&self) -> usize {
        self.state().fetched.len()
    }

    /// References fetched so far, with their resource type.
    pub fn fetched(&self) -> Vec<(String, RemoteResourceRef)> {
        self.state().fetched.clone()
    }

    /// Number of `job_status` calls.
    pub fn job_status_calls(&self) -> usize {
        self.state().job_status_calls
    }
}

#[async_trait::async_trait]
impl ControlPlane for MockControlPlane {
    async fn submit(&self, operation: &Operation) -> Result<Submission, ProviderError> {
        let mut state = self.state();
        state.submitted.push(operation.clone());
        state.submits.pop_front().unwrap_or_else(|| Ok(Submission::empty()))
    }

    async fn fetch(
        &self,
        resource_type: &str,
        reference: &RemoteResourceRef,
    ) -> Result<RemoteResponse, ProviderError> {
        let mut state = self.state();
        state
            .fetched
            .push((resource_type.to_string(), reference.clone()));
        match state.fetches.pop_front() {
            Some(answer) => answer,
            None => Ok(state
                .fetch_fallback
                .clone()
                .unwrap_or_else(RemoteResponse::not_found)),
        }
    }

    async fn job_status(&self, job_id: &str) -> Result<JobHandle, ProviderError> {
        let mut state = self.state();
        state.job_status_calls += 1;
        match state.jobs.pop_front().or_else(|| state.job_fallback.clone()) {
            Some(handle) => Ok(handle),
            None => Err(ProviderError::NotFound(format!("job {}", job_id))),
        }
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a wait timed out and its last observation contains `observed`.
///
/// # Panics
///
/// Panics if the result is not a [`ProviderError::Timeout`] or the observation
/// does not match.
pub fn assert_timed_out<T: Debug>(result: &Result<T, ProviderError>, observed: &str) {
    match result {
        Err(ProviderError::Timeout { last_observed, .. }) => assert!(
            last_observed.contains(observed),
            "Expected last observation to contain '{}', got '{}'",
            observed,
            last_observed
        ),
        other => panic!("Expected a timeout, got {:?}", other),
    }
}

/// Assert that the control plane reported failure with exactly `reason`.
///
/// # Panics
///
/// Panics if the result is not a [`ProviderError::RemoteOperationFailed`] with
/// the given reason.
pub fn assert_remote_failure<T: Debug>(result: &Result<T, ProviderError>, reason: &str) {
    match result {
        Err(ProviderError::RemoteOperationFailed { reason: actual, .. }) => assert_eq!(
            actual, reason,
            "Expected remote failure reason '{}', got '{}'",
            reason, actual
        ),
        other => panic!("Expected a remote operation failure, got {:?}", other),
    }
}

/// Assert that a wait was cancelled.
///
/// # Panics
///
/// Panics if the result is not [`ProviderError::Cancelled`].
pub fn assert_cancelled<T: Debug>(result: &Result<T, ProviderError>) {
    assert!(
        matches!(result, Err(ProviderError::Cancelled)),
        "Expected cancellation, got {:?}",
        result
    );
}

/// Assert that a read found the object absent.
///
/// # Panics
///
/// Panics if the outcome is present.
pub fn assert_absent(outcome: &ReadOutcome) {
    assert!(
        outcome.is_absent(),
        "Expected the object to be absent, but it is present: {:?}",
        outcome
    );
}

/// Assert that an update was refused because `attribute` forces replacement.
///
/// # Panics
///
/// Panics if the outcome is not [`UpdateOutcome::ReplacementRequired`] naming
/// the attribute.
pub fn assert_replacement_required(outcome: &UpdateOutcome, attribute: &str) {
    match outcome {
        UpdateOutcome::ReplacementRequired { attributes } => assert!(
            attributes.iter().any(|a| a == attribute),
            "Expected '{}' to force replacement, but only {:?} do",
            attribute,
            attributes
        ),
        other => panic!("Expected replacement to be required, got {:?}", other),
    }
}
