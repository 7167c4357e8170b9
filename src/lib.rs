//! Hemmer Reconciler
//!
//! This crate is the reconciliation core for Hemmer providers whose control
//! plane is eventually consistent: a submit that returns success does not mean
//! the object is usable yet. The crate bridges the gap by polling until the
//! remote state converges, classifying drift on reads, and refusing in-place
//! updates of attributes that force replacement.
//!
//! # Overview
//!
//! - **Identity**: composite `"{resource_id},{parent_id}"` identifiers for
//!   objects that live under a parent ([`identity`])
//! - **Polling**: a fixed-interval wait with timeout and cancellation ([`Poller`])
//! - **Jobs**: tracking of async jobs to a terminal status ([`JobTracker`])
//! - **Attribute waits**: re-fetching an object until a field holds ([`AttributeWaiter`])
//! - **Drift**: 404 and empty payloads mean "gone upstream", not failure ([`drift`])
//! - **Replacement**: per-attribute replace-vs-update rules ([`ReplacementRules`])
//! - **Orchestration**: create/read/update/delete/import per type ([`ResourceOrchestrator`])
//! - **Transport**: an HTTP control plane client ([`HttpControlPlane`]) behind the
//!   [`ControlPlane`] trait
//!
//! # Quick Start
//!
//! ```ignore
//! use hemmer_reconciler::{init_logging, Operation, Provider, TimeoutPolicy};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = Provider::configure(json!({
//!         "api_key": std::env::var("API_KEY")?,
//!         "resources": { "instance": { "sleep": 30, "timeout": 3600 } }
//!     }))?;
//!
//!     let params = serde_json::from_value(json!({"name": "orders", "plan": "bunny"}))?;
//!     let result = provider
//!         .reconcile(Operation::create("instance", None, params))
//!         .await;
//!     let state = result.into_result(TimeoutPolicy::Fail)?;
//!     println!("{:?}", state);
//!     Ok(())
//! }
//! ```
//!
//! # Timeouts
//!
//! A wait that runs out of budget returns [`ProviderError::Timeout`]. The
//! remote operation may still complete afterwards; the outcome is unknown
//! until the next read. Callers choose whether that is fatal with
//! [`TimeoutPolicy`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod client;
pub mod config;
pub mod drift;
pub mod error;
pub mod identity;
pub mod job;
pub mod logging;
pub mod orchestrator;
pub mod poller;
pub mod provider;
pub mod remote;
pub mod replacement;
pub mod testing;
pub mod types;
pub mod waiter;

// Re-export main types at crate root
pub use client::{Endpoint, HttpControlPlane};
pub use config::{OrchestratorConfig, PollConfig, ProviderConfig};
pub use drift::Drift;
pub use error::ProviderError;
pub use identity::{format_id, parse_id, RemoteResourceRef};
pub use job::{JobHandle, JobStatus, JobTracker};
pub use logging::{
    init_logging, init_logging_with_default, init_logging_with_format, try_init_logging,
    LogFormat,
};
pub use orchestrator::{ResourceOrchestrator, ResourceSpec};
pub use poller::{Poller, Probe};
pub use provider::Provider;
pub use remote::{ControlPlane, RemoteResponse, Submission};
pub use replacement::{ChangeKind, ReplacementRules, Rule};
pub use types::{
    AttributeChange, Operation, OperationKind, ReadOutcome, ReconciliationResult, TimeoutPolicy,
    UpdateOutcome,
};
pub use waiter::{AttributeWaiter, Expectation, ReadyCondition};

// Re-export dependencies that implementors need
pub use async_trait::async_trait;
pub use serde_json;
pub use tokio_util::sync::CancellationToken;
pub use tracing;
