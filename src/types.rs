//! Value types passed between the orchestrator and its callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ProviderError;
use crate::identity::RemoteResourceRef;

/// The kind of change an [`Operation`] requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Provision a new remote object.
    Create,
    /// Change an existing remote object in place.
    Update,
    /// Remove an existing remote object.
    Delete,
}

/// A single request against the control plane. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// What to do.
    pub kind: OperationKind,
    /// The resource type the operation applies to.
    pub resource_type: String,
    /// Request parameters.
    #[serde(default)]
    pub params: Map<String, Value>,
    /// The object acted on. For creates this carries only the parent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<RemoteResourceRef>,
}

impl Operation {
    /// Create operation; `parent_id` scopes the new object.
    pub fn create(
        resource_type: impl Into<String>,
        parent_id: Option<String>,
        params: Map<String, Value>,
    ) -> Self {
        Self {
            kind: OperationKind::Create,
            resource_type: resource_type.into(),
            params,
            target: parent_id.map(|parent| RemoteResourceRef {
                resource_id: String::new(),
                parent_id: Some(parent),
            }),
        }
    }

    /// Update operation against `target`.
    pub fn update(
        resource_type: impl Into<String>,
        target: RemoteResourceRef,
        params: Map<String, Value>,
    ) -> Self {
        Self {
            kind: OperationKind::Update,
            resource_type: resource_type.into(),
            params,
            target: Some(target),
        }
    }

    /// Delete operation against `target`.
    pub fn delete(resource_type: impl Into<String>, target: RemoteResourceRef) -> Self {
        Self {
            kind: OperationKind::Delete,
            resource_type: resource_type.into(),
            params: Map::new(),
            target: Some(target),
        }
    }

    /// The parent identifier, for creates and scoped targets alike.
    pub fn parent_id(&self) -> Option<&str> {
        self.target.as_ref().and_then(|t| t.parent_id.as_deref())
    }

    /// The target, or an error naming the operation kind if there is none.
    pub fn require_target(&self) -> Result<&RemoteResourceRef, ProviderError> {
        self.target
            .as_ref()
            .filter(|t| !t.resource_id.is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidRequest(format!(
                    "{:?} on {} requires a target",
                    self.kind, self.resource_type
                ))
            })
    }
}

/// A change to a single attribute during an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The attribute that changed.
    pub path: String,
    /// The value before the change (None if the attribute is being set).
    pub before: Option<Value>,
    /// The value after the change (None if the attribute is being cleared).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }

    /// Whether the change actually alters the value.
    pub fn is_effective(&self) -> bool {
        self.before != self.after
    }

    /// Diff two flat JSON objects into changes, sorted by path.
    ///
    /// Keys present on only one side become set/clear changes.
    pub fn diff(before: &Map<String, Value>, after: &Map<String, Value>) -> Vec<Self> {
        let mut paths: Vec<&String> = before.keys().chain(after.keys()).collect();
        paths.sort();
        paths.dedup();
        paths
            .into_iter()
            .map(|path| Self::new(path.clone(), before.get(path).cloned(), after.get(path).cloned()))
            .filter(Self::is_effective)
            .collect()
    }
}

/// Read outcome after drift classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    /// The object exists upstream; carries its state unchanged.
    Present(Value),
    /// The object no longer exists upstream. The caller should drop it from
    /// local tracking so the next pass recreates it.
    Absent,
}

impl ReadOutcome {
    /// Whether the object was not found.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The fetched state, if present.
    pub fn into_state(self) -> Option<Value> {
        match self {
            Self::Present(state) => Some(state),
            Self::Absent => None,
        }
    }
}

/// Update outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update was submitted and reached its expected state.
    Applied,
    /// No attribute actually changed; nothing was submitted.
    NoChange,
    /// At least one attribute cannot change in place. Nothing was submitted;
    /// the caller must destroy and recreate the object.
    ReplacementRequired {
        /// Attributes that force replacement, in the order they were given.
        attributes: Vec<String>,
    },
}

/// How a caller treats a wait that ran out of budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Surface the timeout as an error.
    #[default]
    Fail,
    /// Log a warning and treat the operation as accepted.
    Warn,
}

/// Outcome of a single orchestrator call.
#[derive(Debug)]
pub struct ReconciliationResult {
    /// The object acted on. Set for creates as soon as the control plane
    /// assigned an identifier, even if the wait that followed timed out.
    pub reference: Option<RemoteResourceRef>,
    /// The observed state after the operation, if one was read.
    pub final_state: Option<Value>,
    /// Whether the wait ran out of budget; the true end state is unknown.
    pub timed_out: bool,
    /// The error, if the operation did not complete.
    pub err: Option<ProviderError>,
}

impl ReconciliationResult {
    /// Successful completion.
    pub fn completed(final_state: Option<Value>) -> Self {
        Self {
            reference: None,
            final_state,
            timed_out: false,
            err: None,
        }
    }

    /// Build from the outcome of an operation. Timeouts set `timed_out`.
    pub fn from_outcome(outcome: Result<Option<Value>, ProviderError>) -> Self {
        match outcome {
            Ok(state) => Self::completed(state),
            Err(err) => Self {
                reference: None,
                final_state: None,
                timed_out: err.is_timeout(),
                err: Some(err),
            },
        }
    }

    /// Attach the object reference.
    pub fn with_reference(mut self, reference: Option<RemoteResourceRef>) -> Self {
        self.reference = reference;
        self
    }

    /// Whether the operation completed without error.
    pub fn is_success(&self) -> bool {
        self.err.is_none()
    }

    /// Collapse into a `Result`, applying `policy` to timeouts.
    pub fn into_result(self, policy: TimeoutPolicy) -> Result<Option<Value>, ProviderError> {
        match self.err {
            None => Ok(self.final_state),
            Some(err) if self.timed_out && policy == TimeoutPolicy::Warn => {
                warn!(error = %err, "Wait timed out, continuing without confirmation");
                Ok(self.final_state)
            }
            Some(err) => Err(err),
        }
    }
}
