//! HTTP implementation of [`ControlPlane`].
//!
//! Objects live at REST paths derived from an [`Endpoint`] per resource type:
//! `{collection}/{id}` for top-level objects and
//! `{parent_collection}/{parent_id}/{collection}/{id}` for parent-scoped ones.
//! Creates are `POST` to the collection, updates `PUT` and deletes `DELETE`
//! against the object. A response carrying a `job_id` is tracked as a job.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::config::ProviderConfig;
use crate::drift::{error_reason, NOT_FOUND};
use crate::error::ProviderError;
use crate::identity::RemoteResourceRef;
use crate::job::{JobHandle, JobStatus};
use crate::remote::{ControlPlane, RemoteResponse, Submission};
use crate::types::{Operation, OperationKind};

/// Collection that job status is read from.
pub const DEFAULT_JOBS_COLLECTION: &str = "jobs";

/// Maximum length of a response body written to the log.
const MAX_LOG_BODY_LENGTH: usize = 200;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Truncate a response body and strip control characters before logging it.
fn sanitize_for_log(body: &str) -> String {
    let truncated: String = body.chars().take(MAX_LOG_BODY_LENGTH).collect();
    let truncated = if truncated.len() < body.len() {
        format!("{}... [truncated, {} bytes total]", truncated, body.len())
    } else {
        truncated
    };
    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Where objects of one resource type live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Collection segment, e.g. `instances` or `alarms`.
    pub collection: String,
    /// Parent collection segment for parent-scoped types.
    pub parent_collection: Option<String>,
    /// Field of a create response that carries the new object's identifier.
    pub id_field: String,
}

impl Endpoint {
    /// Top-level collection.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            parent_collection: None,
            id_field: "id".to_string(),
        }
    }

    /// Collection nested under objects of `parent_collection`.
    pub fn nested(parent_collection: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            parent_collection: Some(parent_collection.into()),
            ..Self::new(collection)
        }
    }

    /// Read the new object's identifier from `field` instead of `id`.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Path of the collection, under `parent_id` when nested.
    pub fn collection_path(&self, parent_id: Option<&str>) -> Result<String, ProviderError> {
        match (&self.parent_collection, parent_id) {
            (Some(parent_collection), Some(parent)) => {
                Ok(format!("{}/{}/{}", parent_collection, parent, self.collection))
            }
            (None, None) => Ok(self.collection.clone()),
            (Some(_), None) => Err(ProviderError::MissingParentIdentifier(self.collection.clone())),
            (None, Some(parent)) => Err(ProviderError::InvalidRequest(format!(
                "{} is not nested, got parent '{}'",
                self.collection, parent
            ))),
        }
    }

    /// Path of a single object.
    pub fn object_path(&self, reference: &RemoteResourceRef) -> Result<String, ProviderError> {
        let collection = self.collection_path(reference.parent_id.as_deref())?;
        Ok(format!("{}/{}", collection, reference.resource_id))
    }
}

/// A [`ControlPlane`] reached over HTTPS with basic auth.
#[derive(Clone)]
pub struct HttpControlPlane {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    endpoints: HashMap<String, Endpoint>,
    jobs_collection: String,
}

impl HttpControlPlane {
    /// Create a client for `base_url` with no endpoints registered.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(concat!("hemmer-reconciler/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            endpoints: HashMap::new(),
            jobs_collection: DEFAULT_JOBS_COLLECTION.to_string(),
        })
    }

    /// Create a client from provider configuration.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Self::new(config.base_url.clone(), config.api_key.clone())
    }

    /// Register where objects of `resource_type` live.
    pub fn with_endpoint(mut self, resource_type: impl Into<String>, endpoint: Endpoint) -> Self {
        self.endpoints.insert(resource_type.into(), endpoint);
        self
    }

    /// Read job status from `collection` instead of [`DEFAULT_JOBS_COLLECTION`].
    pub fn with_jobs_collection(mut self, collection: impl Into<String>) -> Self {
        self.jobs_collection = collection.into();
        self
    }

    /// The registered endpoint for `resource_type`.
    pub fn endpoint(&self, resource_type: &str) -> Result<&Endpoint, ProviderError> {
        self.endpoints.get(resource_type).ok_or_else(|| {
            ProviderError::InvalidRequest(format!("no endpoint registered for {}", resource_type))
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request and return the status with the decoded body.
    ///
    /// Error bodies that are not JSON are kept as a string so their text can
    /// still be reported.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Map<String, Value>>,
    ) -> Result<(u16, Option<Value>), ProviderError> {
        debug!(%method, path, "Sending request");

        let mut request = self.client.request(method, self.url(path));
        if let Some(key) = &self.api_key {
            request = request.basic_auth("", Some(key));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() && status.as_u16() != NOT_FOUND {
            error!(status = status.as_u16(), body = %sanitize_for_log(&text), "API error");
        }

        let body = if text.trim().is_empty() {
            None
        } else {
            match serde_json::from_str(&text) {
                Ok(value) => Some(value),
                Err(_) if !status.is_success() => Some(Value::String(text)),
                Err(e) => {
                    return Err(ProviderError::UnexpectedResponse(format!(
                        "invalid JSON from {}: {}",
                        path, e
                    )))
                }
            }
        };

        Ok((status.as_u16(), body))
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Interpret a successful submit response.
fn submission_from(body: Option<Value>, id_field: &str) -> Result<Submission, ProviderError> {
    let body = match body {
        None | Some(Value::Null) => return Ok(Submission::empty()),
        Some(body) => body,
    };

    let resource_id = body.get(id_field).and_then(id_string);
    match body.get("job_id").and_then(id_string) {
        Some(job_id) => {
            let status = match body.get("status") {
                Some(status) => serde_json::from_value::<JobStatus>(status.clone())?,
                None => JobStatus::Pending,
            };
            let failure_reason = body
                .get("failure_reason")
                .and_then(Value::as_str)
                .map(str::to_string);
            Ok(Submission::Job {
                handle: JobHandle {
                    job_id,
                    status,
                    failure_reason,
                },
                resource_id,
            })
        }
        None => Ok(Submission::Accepted {
            resource_id,
            body: Some(body),
        }),
    }
}

fn remote_failure(status: u16, body: Option<&Value>) -> ProviderError {
    ProviderError::RemoteOperationFailed {
        status: Some(status),
        reason: error_reason(status, body),
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn submit(&self, operation: &Operation) -> Result<Submission, ProviderError> {
        let endpoint = self.endpoint(&operation.resource_type)?;
        let (method, path, body) = match operation.kind {
            OperationKind::Create => (
                Method::POST,
                endpoint.collection_path(operation.parent_id())?,
                Some(&operation.params),
            ),
            OperationKind::Update => (
                Method::PUT,
                endpoint.object_path(operation.require_target()?)?,
                Some(&operation.params),
            ),
            OperationKind::Delete => (
                Method::DELETE,
                endpoint.object_path(operation.require_target()?)?,
                None,
            ),
        };

        let (status, body) = self.send(method, &path, body).await?;
        if status == NOT_FOUND {
            return Err(ProviderError::NotFound(path));
        }
        if !(200..300).contains(&status) {
            return Err(remote_failure(status, body.as_ref()));
        }
        submission_from(body, &endpoint.id_field)
    }

    async fn fetch(
        &self,
        resource_type: &str,
        reference: &RemoteResourceRef,
    ) -> Result<RemoteResponse, ProviderError> {
        let path = self.endpoint(resource_type)?.object_path(reference)?;
        let (status, body) = self.send(Method::GET, &path, None).await?;
        Ok(RemoteResponse { status, body })
    }

    async fn job_status(&self, job_id: &str) -> Result<JobHandle, ProviderError> {
        let path = format!("{}/{}", self.jobs_collection, job_id);
        let (status, body) = self.send(Method::GET, &path, None).await?;
        if status == NOT_FOUND {
            return Err(ProviderError::NotFound(format!("job {}", job_id)));
        }
        if !(200..300).contains(&status) {
            return Err(remote_failure(status, body.as_ref()));
        }
        let body = body.ok_or_else(|| {
            ProviderError::UnexpectedResponse(format!("empty status for job {}", job_id))
        })?;
        Ok(serde_json::from_value(body)?)
    }
}
