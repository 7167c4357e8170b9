//! Waiting on a resource's own fields.
//!
//! When the control plane has no job concept, the only way to know an
//! operation landed is to re-fetch the object and watch one of its fields:
//! a plugin's `enabled` flag, an instance's `ready` flag, a node's version
//! after an upgrade. The same machinery waits for an object to disappear
//! after a delete.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::drift::{classify, Drift};
use crate::error::ProviderError;
use crate::identity::RemoteResourceRef;
use crate::poller::{Poller, Probe};
use crate::remote::ControlPlane;

/// Accepted values for a watched field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// The field must equal this value.
    Equals(Value),
    /// The field must equal one of these values.
    OneOf(Vec<Value>),
    /// The field must equal the submitted parameter of this name.
    MatchesParam(String),
}

impl Expectation {
    /// Resolve into the list of accepted values, given the submitted params.
    pub fn resolve(&self, params: &Map<String, Value>) -> Result<Vec<Value>, ProviderError> {
        match self {
            Self::Equals(value) => Ok(vec![value.clone()]),
            Self::OneOf(values) => Ok(values.clone()),
            Self::MatchesParam(name) => params.get(name).cloned().map(|v| vec![v]).ok_or_else(|| {
                ProviderError::InvalidRequest(format!(
                    "expected value comes from parameter '{}', which was not submitted",
                    name
                ))
            }),
        }
    }
}

/// A field that must reach an accepted value before an operation counts as applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyCondition {
    /// Dotted path to the field, e.g. `ready` or `nodes.0.running`.
    pub field: String,
    /// What the field must become.
    pub expectation: Expectation,
}

impl ReadyCondition {
    /// Wait until `field` equals `value`.
    pub fn equals(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            expectation: Expectation::Equals(value),
        }
    }

    /// Wait until `field` equals the submitted parameter of the same name.
    pub fn matches_param(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            expectation: Expectation::MatchesParam(field.clone()),
            field,
        }
    }
}

/// Look up a dotted path in a JSON value. Numeric segments index arrays.
pub fn field_value<'a>(state: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(state, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Polls an object's state until a field condition holds, or until it is gone.
pub struct AttributeWaiter<C: ?Sized> {
    client: Arc<C>,
    poller: Poller,
    resource_type: String,
}

impl<C: ControlPlane + ?Sized> AttributeWaiter<C> {
    /// Create a waiter for objects of `resource_type`.
    pub fn new(client: Arc<C>, poller: Poller, resource_type: impl Into<String>) -> Self {
        Self {
            client,
            poller,
            resource_type: resource_type.into(),
        }
    }

    /// Wait until `field` holds one of `accepted`. Returns the state that satisfied it.
    ///
    /// An object that is briefly absent counts as pending. On timeout the last
    /// fetched value of the field is reported.
    #[instrument(skip(self, reference, accepted), fields(resource_type = %self.resource_type, id = %reference))]
    pub async fn await_field(
        &self,
        reference: &RemoteResourceRef,
        field: &str,
        accepted: &[Value],
    ) -> Result<Value, ProviderError> {
        let label = format!("{} {}", self.resource_type, reference);
        let client = self.client.as_ref();
        let resource_type = self.resource_type.as_str();
        let state = self
            .poller
            .wait(&label, || {
                probe_field(client, resource_type, reference, field, accepted)
            })
            .await?;
        info!(field, "Field reached expected value");
        Ok(state)
    }

    /// Wait until `condition` holds, resolving parameter-based expectations from `params`.
    pub async fn await_ready(
        &self,
        reference: &RemoteResourceRef,
        condition: &ReadyCondition,
        params: &Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        let accepted = condition.expectation.resolve(params)?;
        self.await_field(reference, &condition.field, &accepted).await
    }

    /// Wait until the object is reported absent.
    #[instrument(skip(self, reference), fields(resource_type = %self.resource_type, id = %reference))]
    pub async fn await_absence(&self, reference: &RemoteResourceRef) -> Result<(), ProviderError> {
        let label = format!("{} {}", self.resource_type, reference);
        let client = self.client.as_ref();
        let resource_type = self.resource_type.as_str();
        self.poller
            .wait(&label, || probe_absence(client, resource_type, reference))
            .await?;
        info!("Object is gone upstream");
        Ok(())
    }
}

async fn probe_field<C: ControlPlane + ?Sized>(
    client: &C,
    resource_type: &str,
    reference: &RemoteResourceRef,
    field: &str,
    accepted: &[Value],
) -> Result<Probe<Value>, ProviderError> {
    match classify(client.fetch(resource_type, reference).await)? {
        Drift::Absent => Ok(Probe::Pending(format!("{}=<object absent>", field))),
        Drift::Present(state) => match field_value(&state, field) {
            Some(observed) if accepted.contains(observed) => Ok(Probe::Done(state)),
            Some(observed) => Ok(Probe::Pending(format!("{}={}", field, observed))),
            None => Ok(Probe::Pending(format!("{}=<missing>", field))),
        },
    }
}

async fn probe_absence<C: ControlPlane + ?Sized>(
    client: &C,
    resource_type: &str,
    reference: &RemoteResourceRef,
) -> Result<Probe<()>, ProviderError> {
    match classify(client.fetch(resource_type, reference).await)? {
        Drift::Absent => Ok(Probe::Done(())),
        Drift::Present(_) => Ok(Probe::Pending("object still present".to_string())),
    }
}
