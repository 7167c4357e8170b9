//! Create, read, update, and delete for one resource type.
//!
//! A [`ResourceOrchestrator`] composes the pieces of this crate into the
//! lifecycle a host drives: identity checks up front, the submit, then either
//! a job wait or an attribute wait until the control plane has converged.
//! Reads classify drift so a vanished object is reported instead of failing.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hemmer_reconciler::{catalog, OrchestratorConfig, ResourceOrchestrator};
//!
//! let orchestrator = ResourceOrchestrator::new(
//!     Arc::new(client),
//!     catalog::alarm(),
//!     OrchestratorConfig::default(),
//! );
//! let reference = orchestrator.create(Some("1234"), params).await?;
//! orchestrator.delete(&reference).await?;
//! ```

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{OrchestratorConfig, PollConfig};
use crate::drift::{classify, Drift};
use crate::error::ProviderError;
use crate::identity::{parse_id, validate_parent_id, validate_resource_id, RemoteResourceRef};
use crate::job::JobTracker;
use crate::poller::Poller;
use crate::remote::{ControlPlane, Submission};
use crate::replacement::ReplacementRules;
use crate::types::{
    AttributeChange, Operation, OperationKind, ReadOutcome, ReconciliationResult, UpdateOutcome,
};
use crate::waiter::{AttributeWaiter, Expectation, ReadyCondition};

/// Everything the orchestrator needs to know about one resource type.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    /// Resource type name, as carried by [`Operation::resource_type`].
    pub type_name: String,
    /// Whether objects of this type live under a parent.
    pub parent_scoped: bool,
    /// Poll interval and wait budget.
    pub poll: PollConfig,
    /// Which attributes force replacement.
    pub rules: ReplacementRules,
    /// Field to wait on after a synchronous create or update. `None` means
    /// an accepted submit is already final.
    pub ready: Option<ReadyCondition>,
    /// Create parameter that names the object, for types whose create
    /// response may carry no identifier.
    pub id_param: Option<String>,
}

impl ResourceSpec {
    /// A type with no parent, no replacement rules, and no ready wait.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            parent_scoped: false,
            poll: PollConfig::default(),
            rules: ReplacementRules::default(),
            ready: None,
            id_param: None,
        }
    }

    /// Mark the type as living under a parent.
    pub fn parent_scoped(mut self) -> Self {
        self.parent_scoped = true;
        self
    }

    /// Set the poll configuration.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Set the replacement rules.
    pub fn with_rules(mut self, rules: ReplacementRules) -> Self {
        self.rules = rules;
        self
    }

    /// Wait on `condition` after synchronous creates and updates.
    pub fn with_ready(mut self, condition: ReadyCondition) -> Self {
        self.ready = Some(condition);
        self
    }

    /// Take the identifier from create parameter `name` when the control
    /// plane returns none.
    pub fn with_id_param(mut self, name: impl Into<String>) -> Self {
        self.id_param = Some(name.into());
        self
    }

    fn identifier_in(&self, params: &Map<String, Value>) -> Option<String> {
        let value = params.get(self.id_param.as_deref()?)?;
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// An object the control plane has assigned an identifier to, plus the
/// outcome of waiting for it to settle.
struct Provisioned {
    reference: RemoteResourceRef,
    settled: Result<(), ProviderError>,
}

/// Drives create/read/update/delete for one resource type.
pub struct ResourceOrchestrator<C: ?Sized> {
    client: Arc<C>,
    spec: ResourceSpec,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl<C: ControlPlane + ?Sized> ResourceOrchestrator<C> {
    /// Create an orchestrator for the type described by `spec`.
    pub fn new(client: Arc<C>, spec: ResourceSpec, config: OrchestratorConfig) -> Self {
        Self {
            client,
            spec,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The resource type this orchestrator manages.
    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    fn poller(&self) -> Poller {
        Poller::new(self.spec.poll).with_cancellation(self.cancel.clone())
    }

    fn jobs(&self) -> JobTracker<C> {
        JobTracker::new(self.client.clone(), self.poller())
    }

    fn waiter(&self) -> AttributeWaiter<C> {
        AttributeWaiter::new(self.client.clone(), self.poller(), &self.spec.type_name)
    }

    fn check_parent(&self, parent_id: Option<&str>) -> Result<(), ProviderError> {
        match parent_id {
            None if self.spec.parent_scoped => Err(ProviderError::MissingParentIdentifier(
                format!("{} requires a parent identifier", self.spec.type_name),
            )),
            Some(parent) if !self.spec.parent_scoped => Err(ProviderError::InvalidRequest(
                format!(
                    "{} is not scoped to a parent, got parent '{}'",
                    self.spec.type_name, parent
                ),
            )),
            Some(parent) => validate_parent_id(parent),
            None => Ok(()),
        }
    }

    fn check_reference(&self, reference: &RemoteResourceRef) -> Result<(), ProviderError> {
        reference.validate(self.spec.parent_scoped)?;
        self.check_parent(reference.parent_id.as_deref())
    }

    fn missing_identifier(&self) -> ProviderError {
        ProviderError::UnexpectedResponse(format!(
            "create of {} returned no resource identifier",
            self.spec.type_name
        ))
    }

    /// Submit a create and wait for it to settle.
    ///
    /// Errors returned directly mean no object identifier is known. Once an
    /// identifier is known, the wait outcome is carried in
    /// [`Provisioned::settled`] so callers can keep tracking the object.
    async fn provision(
        &self,
        parent_id: Option<&str>,
        params: Map<String, Value>,
    ) -> Result<Provisioned, ProviderError> {
        self.check_parent(parent_id)?;

        // A missing or unusable parameter must fail before anything is created.
        let accepted = match &self.spec.ready {
            Some(condition) => Some(condition.expectation.resolve(&params)?),
            None => None,
        };
        let named = self.spec.identifier_in(&params);
        if let Some(name) = &named {
            validate_resource_id(name)?;
        }

        let operation =
            Operation::create(&self.spec.type_name, parent_id.map(str::to_string), params);
        let (job, returned) = match self.jobs().submit(&operation).await? {
            Submission::Job {
                handle,
                resource_id,
            } => (Some(handle), resource_id),
            Submission::Accepted { resource_id, .. } => (None, resource_id),
        };

        let resource_id = match returned.filter(|id| !id.is_empty()).or(named) {
            Some(id) => id,
            None => {
                if let Some(handle) = job {
                    // A failed job explains more than the missing identifier does.
                    self.jobs().settle(handle).await?;
                }
                return Err(self.missing_identifier());
            }
        };
        validate_resource_id(&resource_id)?;
        let reference = RemoteResourceRef {
            resource_id,
            parent_id: parent_id.map(str::to_string),
        };

        let settled = match (job, &self.spec.ready, &accepted) {
            (Some(handle), _, _) => self.jobs().settle(handle).await.map(drop),
            (None, Some(condition), Some(accepted)) => self
                .waiter()
                .await_field(&reference, &condition.field, accepted)
                .await
                .map(drop),
            (None, _, _) => Ok(()),
        };
        Ok(Provisioned { reference, settled })
    }

    /// Create an object and wait until it is ready.
    ///
    /// # Errors
    ///
    /// - [`ProviderError::MissingParentIdentifier`] before any remote call, when
    ///   the type is parent-scoped and `parent_id` is `None`
    /// - [`ProviderError::InvalidRequest`] when the ready condition depends on a
    ///   parameter that was not supplied
    /// - [`ProviderError::UnexpectedResponse`] when the response carries no
    ///   identifier and [`ResourceSpec::id_param`] is unset or missing from `params`
    /// - any submit, job, or wait error
    #[instrument(skip(self, params), fields(resource_type = %self.spec.type_name))]
    pub async fn create(
        &self,
        parent_id: Option<&str>,
        params: Map<String, Value>,
    ) -> Result<RemoteResourceRef, ProviderError> {
        let provisioned = self.provision(parent_id, params).await?;
        if let Err(err) = &provisioned.settled {
            warn!(id = %provisioned.reference, error = %err, "Created object did not settle");
        }
        provisioned.settled?;
        info!(id = %provisioned.reference, "Created");
        Ok(provisioned.reference)
    }

    async fn fetch_drift(&self, reference: &RemoteResourceRef) -> Result<Drift, ProviderError> {
        self.check_reference(reference)?;
        let drift = classify(self.client.fetch(&self.spec.type_name, reference).await)?;
        if drift.is_absent() {
            info!(id = %reference, "Object no longer exists upstream");
        }
        Ok(drift)
    }

    /// Fetch the object's current state.
    ///
    /// A missing object is [`ReadOutcome::Absent`], not an error; the caller
    /// should drop it from its state.
    #[instrument(skip(self, reference), fields(resource_type = %self.spec.type_name, id = %reference))]
    pub async fn read(&self, reference: &RemoteResourceRef) -> Result<ReadOutcome, ProviderError> {
        Ok(match self.fetch_drift(reference).await? {
            Drift::Present(state) => ReadOutcome::Present(state),
            Drift::Absent => ReadOutcome::Absent,
        })
    }

    /// Fetch the object and decode it into `T`. `None` if it is absent.
    pub async fn read_as<T: DeserializeOwned>(
        &self,
        reference: &RemoteResourceRef,
    ) -> Result<Option<T>, ProviderError> {
        match self.fetch_drift(reference).await? {
            Drift::Absent => Ok(None),
            drift => drift.decode().map(Some),
        }
    }

    /// Apply attribute changes in place.
    ///
    /// Nothing is submitted when no change is effective, or when any changed
    /// attribute forces replacement.
    #[instrument(skip(self, reference, changes), fields(resource_type = %self.spec.type_name, id = %reference))]
    pub async fn update(
        &self,
        reference: &RemoteResourceRef,
        changes: &[AttributeChange],
    ) -> Result<UpdateOutcome, ProviderError> {
        self.check_reference(reference)?;

        let effective: Vec<AttributeChange> = changes
            .iter()
            .filter(|change| change.is_effective())
            .cloned()
            .collect();
        if effective.is_empty() {
            debug!("No effective changes");
            return Ok(UpdateOutcome::NoChange);
        }

        let replacing = self.spec.rules.replacing_attributes(&effective);
        if !replacing.is_empty() {
            info!(attributes = ?replacing, "Change requires replacement");
            return Ok(UpdateOutcome::ReplacementRequired {
                attributes: replacing,
            });
        }

        let params: Map<String, Value> = effective
            .into_iter()
            .map(|change| (change.path, change.after.unwrap_or(Value::Null)))
            .collect();
        let operation = Operation::update(&self.spec.type_name, reference.clone(), params);

        match self.jobs().submit(&operation).await? {
            Submission::Job { handle, .. } => {
                self.jobs().settle(handle).await?;
            }
            Submission::Accepted { .. } => {
                if let Some(condition) = &self.spec.ready {
                    if waits_on(condition, &operation.params) {
                        self.waiter()
                            .await_ready(reference, condition, &operation.params)
                            .await?;
                    }
                }
            }
        }

        info!("Updated");
        Ok(UpdateOutcome::Applied)
    }

    /// Delete the object and wait until it is gone.
    ///
    /// With fast destroy enabled, parent-scoped objects are left for the
    /// parent's teardown and no remote call is made.
    #[instrument(skip(self, reference), fields(resource_type = %self.spec.type_name, id = %reference))]
    pub async fn delete(&self, reference: &RemoteResourceRef) -> Result<(), ProviderError> {
        self.check_reference(reference)?;

        if self.config.fast_destroy {
            if self.spec.parent_scoped {
                info!("Fast destroy enabled, leaving removal to the parent's teardown");
                return Ok(());
            }
            debug!("Fast destroy has no effect on types without a parent");
        }

        let operation = Operation::delete(&self.spec.type_name, reference.clone());
        match self.jobs().submit(&operation).await {
            Err(err) if err.is_not_found() => {
                info!("Object already gone upstream");
                return Ok(());
            }
            Err(err) => return Err(err),
            Ok(Submission::Job { handle, .. }) => {
                self.jobs().settle(handle).await?;
            }
            Ok(Submission::Accepted { .. }) => {
                self.waiter().await_absence(reference).await?;
            }
        }

        info!("Deleted");
        Ok(())
    }

    /// Adopt an existing object from its composite identifier.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotFound`] if the object does not exist, plus any
    /// identity or fetch error.
    #[instrument(skip(self), fields(resource_type = %self.spec.type_name))]
    pub async fn import(&self, raw_id: &str) -> Result<(RemoteResourceRef, Value), ProviderError> {
        let reference = parse_id(raw_id, self.spec.parent_scoped)?;
        match self.read(&reference).await? {
            ReadOutcome::Present(state) => Ok((reference, state)),
            ReadOutcome::Absent => Err(ProviderError::NotFound(format!(
                "{} {}",
                self.spec.type_name, raw_id
            ))),
        }
    }

    /// Run one operation end to end and report the outcome.
    ///
    /// Creates and updates re-read the object afterwards to report its final
    /// state. An update whose params force replacement fails with
    /// [`ProviderError::ReplacementRequired`].
    #[instrument(skip(self, operation), fields(resource_type = %operation.resource_type, kind = ?operation.kind))]
    pub async fn reconcile(&self, operation: Operation) -> ReconciliationResult {
        if operation.resource_type != self.spec.type_name {
            return ReconciliationResult::from_outcome(Err(ProviderError::InvalidRequest(
                format!(
                    "operation on {} sent to the {} orchestrator",
                    operation.resource_type, self.spec.type_name
                ),
            )));
        }

        let result = match operation.kind {
            OperationKind::Create => {
                let parent_id = operation.parent_id().map(str::to_string);
                match self.provision(parent_id.as_deref(), operation.params).await {
                    Err(err) => ReconciliationResult::from_outcome(Err(err)),
                    Ok(Provisioned { reference, settled }) => {
                        let outcome = match settled {
                            Ok(()) => self.final_state(&reference).await,
                            Err(err) => Err(err),
                        };
                        ReconciliationResult::from_outcome(outcome).with_reference(Some(reference))
                    }
                }
            }
            OperationKind::Update => {
                let outcome = self.reconcile_update(&operation).await;
                ReconciliationResult::from_outcome(outcome).with_reference(operation.target)
            }
            OperationKind::Delete => {
                let outcome = match operation.require_target() {
                    Ok(target) => self.delete(target).await.map(|()| None),
                    Err(err) => Err(err),
                };
                ReconciliationResult::from_outcome(outcome).with_reference(operation.target)
            }
        };

        if result.timed_out {
            warn!("Wait ran out of budget; the outcome is unknown until the next read");
        }
        result
    }

    async fn reconcile_update(&self, operation: &Operation) -> Result<Option<Value>, ProviderError> {
        let target = operation.require_target()?;
        let current = match self.read(target).await? {
            ReadOutcome::Present(state) => state,
            ReadOutcome::Absent => {
                return Err(ProviderError::NotFound(format!(
                    "{} {}",
                    self.spec.type_name, target
                )))
            }
        };

        let changes: Vec<AttributeChange> = operation
            .params
            .iter()
            .map(|(path, after)| {
                AttributeChange::new(path.clone(), current.get(path).cloned(), Some(after.clone()))
            })
            .collect();

        match self.update(target, &changes).await? {
            UpdateOutcome::NoChange => Ok(Some(current)),
            UpdateOutcome::Applied => self.final_state(target).await,
            UpdateOutcome::ReplacementRequired { attributes } => {
                Err(ProviderError::ReplacementRequired { attributes })
            }
        }
    }

    async fn final_state(&self, reference: &RemoteResourceRef) -> Result<Option<Value>, ProviderError> {
        Ok(self.read(reference).await?.into_state())
    }
}

/// Whether an update touching `params` should wait on `condition`.
///
/// A condition tied to a parameter only applies when that parameter changed.
fn waits_on(condition: &ReadyCondition, params: &Map<String, Value>) -> bool {
    match &condition.expectation {
        Expectation::MatchesParam(name) => params.contains_key(name),
        Expectation::Equals(_) | Expectation::OneOf(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobHandle, JobStatus};
    use crate::remote::RemoteResponse;
    use crate::replacement::plan_tier_rule;
    use crate::testing::{
        assert_absent, assert_cancelled, assert_remote_failure, assert_replacement_required,
        MockControlPlane,
    };
    use serde::Deserialize;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn poll(interval: u64, timeout: u64) -> PollConfig {
        PollConfig::from_secs(interval, timeout).unwrap()
    }

    fn instance_spec() -> ResourceSpec {
        ResourceSpec::new("instance")
            .with_poll(poll(10, 1800))
            .with_ready(ReadyCondition::equals("ready", json!(true)))
            .with_rules(
                ReplacementRules::new()
                    .with_rule("plan", plan_tier_rule())
                    .replace("region"),
            )
    }

    fn alarm_spec() -> ResourceSpec {
        ResourceSpec::new("alarm")
            .parent_scoped()
            .with_poll(poll(10, 1800))
            .with_rules(ReplacementRules::new().replace("type"))
    }

    fn plugin_spec() -> ResourceSpec {
        ResourceSpec::new("plugin")
            .parent_scoped()
            .with_poll(poll(10, 1800))
            .with_ready(ReadyCondition::matches_param("enabled"))
    }

    fn orchestrator(
        mock: &Arc<MockControlPlane>,
        spec: ResourceSpec,
    ) -> ResourceOrchestrator<MockControlPlane> {
        ResourceOrchestrator::new(mock.clone(), spec, OrchestratorConfig::default())
    }

    fn accepted(id: &str) -> Submission {
        Submission::Accepted {
            resource_id: Some(id.to_string()),
            body: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_until_ready() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(accepted("1234")));
        mock.push_fetch(Ok(RemoteResponse::ok(json!({"id": 1234, "ready": false}))));
        mock.push_fetch(Ok(RemoteResponse::ok(json!({"id": 1234, "ready": true}))));

        let reference = orchestrator(&mock, instance_spec())
            .create(None, params(json!({"name": "orders", "plan": "bunny"})))
            .await
            .unwrap();

        assert_eq!(reference, RemoteResourceRef::new("1234"));
        assert_eq!(mock.fetch_calls(), 2);
        let submitted = mock.submitted();
        assert_eq!(submitted[0].kind, OperationKind::Create);
        assert_eq!(submitted[0].params["plan"], json!("bunny"));
    }

    #[tokio::test]
    async fn test_create_without_parent_fails_before_any_call() {
        let mock = Arc::new(MockControlPlane::new());

        let err = orchestrator(&mock, alarm_spec())
            .create(None, params(json!({"type": "cpu"})))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::MissingParentIdentifier(_)));
        assert_eq!(mock.submit_calls(), 0);
        assert_eq!(mock.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_parent_for_unscoped_type() {
        let mock = Arc::new(MockControlPlane::new());

        let err = orchestrator(&mock, instance_spec())
            .create(Some("42"), Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert_eq!(mock.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_missing_ready_param_fails_before_submit() {
        let mock = Arc::new(MockControlPlane::new());

        let err = orchestrator(&mock, plugin_spec())
            .create(Some("42"), params(json!({"name": "rabbitmq_top"})))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert_eq!(mock.submit_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_through_job() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(Submission::Job {
            handle: JobHandle::new("job-9", JobStatus::Pending),
            resource_id: Some("cpu".to_string()),
        }));
        mock.push_job_status(JobHandle::new("job-9", JobStatus::Running));
        mock.push_job_status(JobHandle::new("job-9", JobStatus::Succeeded));

        let reference = orchestrator(&mock, alarm_spec())
            .create(Some("42"), params(json!({"type": "cpu", "value_threshold": 90})))
            .await
            .unwrap();

        assert_eq!(reference, RemoteResourceRef::scoped("cpu", "42"));
        assert_eq!(mock.job_status_calls(), 2);
        assert_eq!(mock.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_job_failure_is_reported_verbatim() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(Submission::Job {
            handle: JobHandle::failed("job-1", "plan not available in region"),
            resource_id: None,
        }));

        let result = orchestrator(&mock, alarm_spec())
            .create(Some("42"), params(json!({"type": "cpu"})))
            .await;

        assert_remote_failure(&result, "plan not available in region");
        assert_eq!(mock.job_status_calls(), 0);
    }

    #[tokio::test]
    async fn test_create_without_identifier_is_unexpected() {
        let mock = Arc::new(MockControlPlane::new());

        let err = orchestrator(&mock, alarm_spec())
            .create(Some("42"), params(json!({"type": "cpu"})))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::UnexpectedResponse(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_without_body_uses_named_identifier() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(Submission::empty()));
        mock.push_fetch(Ok(RemoteResponse::ok(json!({"name": "rabbitmq_top", "enabled": false}))));
        mock.push_fetch(Ok(RemoteResponse::ok(json!({"name": "rabbitmq_top", "enabled": true}))));

        let reference = orchestrator(&mock, plugin_spec().with_id_param("name"))
            .create(Some("42"), params(json!({"name": "rabbitmq_top", "enabled": true})))
            .await
            .unwrap();

        assert_eq!(reference, RemoteResourceRef::scoped("rabbitmq_top", "42"));
        assert_eq!(mock.fetch_calls(), 2);
        assert_eq!(mock.fetched()[1].1, reference);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_job_without_identifier_uses_named_identifier() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(Submission::Job {
            handle: JobHandle::new("job-4", JobStatus::Pending),
            resource_id: None,
        }));
        mock.push_job_status(JobHandle::new("job-4", JobStatus::Succeeded));

        let reference = orchestrator(&mock, plugin_spec().with_id_param("name"))
            .create(Some("42"), params(json!({"name": "rabbitmq_top", "enabled": true})))
            .await
            .unwrap();

        assert_eq!(reference, RemoteResourceRef::scoped("rabbitmq_top", "42"));
        assert_eq!(mock.job_status_calls(), 1);
    }

    #[tokio::test]
    async fn test_returned_identifier_wins_over_named_one() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(accepted("top")));
        mock.push_fetch(Ok(RemoteResponse::ok(json!({"enabled": true}))));

        let reference = orchestrator(&mock, plugin_spec().with_id_param("name"))
            .create(Some("42"), params(json!({"name": "rabbitmq_top", "enabled": true})))
            .await
            .unwrap();

        assert_eq!(reference, RemoteResourceRef::scoped("top", "42"));
    }

    #[tokio::test]
    async fn test_create_rejects_separator_in_name_before_submit() {
        let mock = Arc::new(MockControlPlane::new());

        let err = orchestrator(&mock, plugin_spec().with_id_param("name"))
            .create(Some("42"), params(json!({"name": "top,7", "enabled": true})))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidIdentifier(_)));
        assert_eq!(mock.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_returned_identifier_with_separator_is_rejected() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(accepted("cpu,9")));

        let err = orchestrator(&mock, alarm_spec())
            .create(Some("42"), params(json!({"type": "cpu"})))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::InvalidIdentifier(_)));
        assert_eq!(mock.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_classifies_absent() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_fetch(Ok(RemoteResponse::not_found()));

        let outcome = orchestrator(&mock, alarm_spec())
            .read(&RemoteResourceRef::scoped("cpu", "42"))
            .await
            .unwrap();

        assert_absent(&outcome);
        assert_eq!(mock.fetched()[0].0, "alarm");
    }

    #[tokio::test]
    async fn test_read_returns_state_unchanged() {
        let mock = Arc::new(MockControlPlane::new());
        let state = json!({"type": "cpu", "value_threshold": 90, "enabled": true});
        mock.push_fetch(Ok(RemoteResponse::ok(state.clone())));

        let outcome = orchestrator(&mock, alarm_spec())
            .read(&RemoteResourceRef::scoped("cpu", "42"))
            .await
            .unwrap();

        assert_eq!(outcome, ReadOutcome::Present(state));
    }

    #[tokio::test]
    async fn test_read_propagates_remote_errors() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_fetch(Ok(RemoteResponse {
            status: 500,
            body: Some(json!({"error": "internal"})),
        }));

        let result = orchestrator(&mock, alarm_spec())
            .read(&RemoteResourceRef::scoped("cpu", "42"))
            .await;

        assert_remote_failure(&result, "internal");
    }

    #[tokio::test]
    async fn test_read_scoped_without_parent_makes_no_call() {
        let mock = Arc::new(MockControlPlane::new());

        let err = orchestrator(&mock, alarm_spec())
            .read(&RemoteResourceRef::new("cpu"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::MissingParentIdentifier(_)));
        assert_eq!(mock.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_as_decodes() {
        #[derive(Debug, Deserialize)]
        struct Alarm {
            #[serde(rename = "type")]
            kind: String,
            value_threshold: u32,
        }

        let mock = Arc::new(MockControlPlane::new());
        mock.push_fetch(Ok(RemoteResponse::ok(json!({"type": "cpu", "value_threshold": 90}))));
        mock.push_fetch(Ok(RemoteResponse::not_found()));

        let orchestrator = orchestrator(&mock, alarm_spec());
        let reference = RemoteResourceRef::scoped("cpu", "42");

        let alarm: Alarm = orchestrator.read_as(&reference).await.unwrap().unwrap();
        assert_eq!(alarm.kind, "cpu");
        assert_eq!(alarm.value_threshold, 90);

        let gone: Option<Alarm> = orchestrator.read_as(&reference).await.unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_update_plan_across_tiers_requires_replacement() {
        let mock = Arc::new(MockControlPlane::new());
        let changes = [AttributeChange::modified("plan", json!("lemur"), json!("bunny"))];

        let outcome = orchestrator(&mock, instance_spec())
            .update(&RemoteResourceRef::new("1234"), &changes)
            .await
            .unwrap();

        assert_replacement_required(&outcome, "plan");
        assert_eq!(mock.submit_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_in_place_waits_until_ready() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_fetch(Ok(RemoteResponse::ok(json!({"plan": "rabbit", "ready": false}))));
        mock.push_fetch(Ok(RemoteResponse::ok(json!({"plan": "rabbit", "ready": true}))));
        let changes = [
            AttributeChange::modified("plan", json!("bunny"), json!("rabbit")),
            AttributeChange::modified("name", json!("orders"), json!("orders")),
        ];

        let outcome = orchestrator(&mock, instance_spec())
            .update(&RemoteResourceRef::new("1234"), &changes)
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Applied);
        let submitted = mock.submitted();
        assert_eq!(submitted[0].kind, OperationKind::Update);
        assert_eq!(submitted[0].params.len(), 1);
        assert_eq!(submitted[0].params["plan"], json!("rabbit"));
        assert_eq!(mock.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn test_update_without_effective_change_submits_nothing() {
        let mock = Arc::new(MockControlPlane::new());
        let changes = [AttributeChange::modified("name", json!("orders"), json!("orders"))];

        let outcome = orchestrator(&mock, instance_spec())
            .update(&RemoteResourceRef::new("1234"), &changes)
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::NoChange);
        assert_eq!(mock.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_update_skips_wait_when_watched_param_unchanged() {
        let mock = Arc::new(MockControlPlane::new());
        let changes = [AttributeChange::modified("name", json!("top"), json!("top2"))];

        let outcome = orchestrator(&mock, plugin_spec())
            .update(&RemoteResourceRef::scoped("rabbitmq_top", "42"), &changes)
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Applied);
        assert_eq!(mock.fetch_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_through_job() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(Submission::Job {
            handle: JobHandle::new("job-5", JobStatus::Pending),
            resource_id: None,
        }));
        mock.push_job_status(JobHandle::new("job-5", JobStatus::Running));
        mock.push_job_status(JobHandle::new("job-5", JobStatus::Succeeded));
        let changes = [AttributeChange::modified("plan", json!("bunny"), json!("rabbit"))];

        let outcome = orchestrator(&mock, instance_spec())
            .update(&RemoteResourceRef::new("1234"), &changes)
            .await
            .unwrap();

        assert_eq!(outcome, UpdateOutcome::Applied);
        assert_eq!(mock.job_status_calls(), 2);
        assert_eq!(mock.fetch_calls(), 0);
        assert_eq!(mock.submitted()[0].kind, OperationKind::Update);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_job_failure_is_reported_verbatim() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(Submission::Job {
            handle: JobHandle::new("job-6", JobStatus::Running),
            resource_id: None,
        }));
        mock.push_job_status(JobHandle::failed("job-6", "plan change already in progress"));
        let changes = [AttributeChange::modified("plan", json!("bunny"), json!("rabbit"))];

        let result = orchestrator(&mock, instance_spec())
            .update(&RemoteResourceRef::new("1234"), &changes)
            .await;

        assert_remote_failure(&result, "plan change already in progress");
        assert_eq!(mock.job_status_calls(), 1);
        assert_eq!(mock.fetch_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_waits_for_absence() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_fetches(RemoteResponse::ok(json!({"type": "cpu"})), 2);
        mock.push_fetch(Ok(RemoteResponse::not_found()));

        let start = Instant::now();
        orchestrator(&mock, alarm_spec())
            .delete(&RemoteResourceRef::scoped("cpu", "42"))
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(mock.submit_calls(), 1);
        assert_eq!(mock.fetch_calls(), 3);
        assert!(elapsed >= Duration::from_secs(20));
        assert!(elapsed < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_fast_destroy_skips_scoped_delete() {
        let mock = Arc::new(MockControlPlane::new());
        let orchestrator = ResourceOrchestrator::new(
            mock.clone(),
            alarm_spec(),
            OrchestratorConfig::default().with_fast_destroy(true),
        );

        orchestrator
            .delete(&RemoteResourceRef::scoped("cpu", "42"))
            .await
            .unwrap();

        assert_eq!(mock.submit_calls(), 0);
        assert_eq!(mock.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_fast_destroy_ignored_for_unscoped_type() {
        let mock = Arc::new(MockControlPlane::new());
        let orchestrator = ResourceOrchestrator::new(
            mock.clone(),
            instance_spec(),
            OrchestratorConfig::default().with_fast_destroy(true),
        );

        orchestrator.delete(&RemoteResourceRef::new("1234")).await.unwrap();

        assert_eq!(mock.submit_calls(), 1);
        assert_eq!(mock.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_missing_object_succeeds() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Err(ProviderError::NotFound("alarm cpu".to_string())));

        orchestrator(&mock, alarm_spec())
            .delete(&RemoteResourceRef::scoped("cpu", "42"))
            .await
            .unwrap();

        assert_eq!(mock.fetch_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_job_failure() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(Submission::Job {
            handle: JobHandle::new("job-3", JobStatus::Running),
            resource_id: None,
        }));
        mock.push_job_status(JobHandle::failed("job-3", "instance is locked"));

        let result = orchestrator(&mock, instance_spec())
            .delete(&RemoteResourceRef::new("1234"))
            .await;

        assert_remote_failure(&result, "instance is locked");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_cancelled_mid_wait() {
        let mock = Arc::new(MockControlPlane::new());
        mock.set_fetch_fallback(RemoteResponse::ok(json!({"type": "cpu"})));
        let token = CancellationToken::new();
        let orchestrator = orchestrator(&mock, alarm_spec()).with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(25)).await;
            token.cancel();
        });
        let result = orchestrator
            .delete(&RemoteResourceRef::scoped("cpu", "42"))
            .await;
        canceller.await.unwrap();

        assert_cancelled(&result);
    }

    #[tokio::test]
    async fn test_import_composite_identifier() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_fetch(Ok(RemoteResponse::ok(json!({"name": "rabbitmq_top", "enabled": true}))));

        let (reference, state) = orchestrator(&mock, plugin_spec())
            .import("rabbitmq_top,42")
            .await
            .unwrap();

        assert_eq!(reference, RemoteResourceRef::scoped("rabbitmq_top", "42"));
        assert_eq!(state["enabled"], json!(true));
    }

    #[tokio::test]
    async fn test_import_requires_parent_for_scoped_type() {
        let mock = Arc::new(MockControlPlane::new());

        let err = orchestrator(&mock, plugin_spec())
            .import("rabbitmq_top")
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::MissingParentIdentifier(_)));
        assert_eq!(mock.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn test_import_missing_object() {
        let mock = Arc::new(MockControlPlane::new());

        let err = orchestrator(&mock, instance_spec())
            .import("1234")
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_create_timeout_keeps_reference() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(accepted("77")));
        mock.set_fetch_fallback(RemoteResponse::ok(json!({"ready": false})));
        let spec = instance_spec().with_poll(poll(10, 30));

        let result = orchestrator(&mock, spec)
            .reconcile(Operation::create("instance", None, Map::new()))
            .await;

        assert!(result.timed_out);
        assert_eq!(result.reference, Some(RemoteResourceRef::new("77")));
        assert!(result.final_state.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconcile_create_reports_final_state() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_submit(Ok(accepted("77")));
        mock.set_fetch_fallback(RemoteResponse::ok(json!({"id": 77, "ready": true})));

        let result = orchestrator(&mock, instance_spec())
            .reconcile(Operation::create("instance", None, Map::new()))
            .await;

        assert!(result.is_success());
        assert_eq!(result.final_state, Some(json!({"id": 77, "ready": true})));
    }

    #[tokio::test]
    async fn test_reconcile_update_requiring_replacement() {
        let mock = Arc::new(MockControlPlane::new());
        mock.push_fetch(Ok(RemoteResponse::ok(json!({"region": "amazon-web-services::us-east-1"}))));

        let result = orchestrator(&mock, instance_spec())
            .reconcile(Operation::update(
                "instance",
                RemoteResourceRef::new("1234"),
                params(json!({"region": "amazon-web-services::eu-west-1"})),
            ))
            .await;

        assert!(matches!(
            result.err,
            Some(ProviderError::ReplacementRequired { ref attributes })
                if attributes == &vec!["region".to_string()]
        ));
        assert_eq!(mock.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_update_of_vanished_object() {
        let mock = Arc::new(MockControlPlane::new());

        let result = orchestrator(&mock, instance_spec())
            .reconcile(Operation::update(
                "instance",
                RemoteResourceRef::new("1234"),
                params(json!({"name": "renamed"})),
            ))
            .await;

        assert!(result.err.as_ref().is_some_and(ProviderError::is_not_found));
    }

    #[tokio::test]
    async fn test_reconcile_rejects_foreign_type() {
        let mock = Arc::new(MockControlPlane::new());

        let result = orchestrator(&mock, alarm_spec())
            .reconcile(Operation::delete("instance", RemoteResourceRef::new("1")))
            .await;

        assert!(matches!(result.err, Some(ProviderError::InvalidRequest(_))));
        assert_eq!(mock.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_delete_without_target() {
        let mock = Arc::new(MockControlPlane::new());
        let mut operation = Operation::delete("alarm", RemoteResourceRef::scoped("cpu", "1"));
        operation.target = None;

        let result = orchestrator(&mock, alarm_spec()).reconcile(operation).await;

        assert!(matches!(result.err, Some(ProviderError::InvalidRequest(_))));
    }
}
