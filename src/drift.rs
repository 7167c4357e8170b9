//! Classification of fetch results into present / absent / error.
//!
//! A 404, or an empty payload, means the object no longer exists upstream.
//! That is a signal for the caller to stop tracking the object, not a failure.
//! Everything else that is not a 2xx with a payload is an error.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::ProviderError;
use crate::remote::RemoteResponse;

/// Status code that signals absence.
pub const NOT_FOUND: u16 = 404;

/// Whether a fetched object exists upstream.
#[derive(Debug, Clone, PartialEq)]
pub enum Drift {
    /// The object exists; carries the fetched state unchanged.
    Present(Value),
    /// The object does not exist upstream.
    Absent,
}

impl Drift {
    /// Whether the object was absent.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Decode the fetched state into a typed record.
    ///
    /// Use `#[serde(deny_unknown_fields)]` on `T` to fail on unexpected shapes.
    ///
    /// # Errors
    ///
    /// [`ProviderError::NotFound`] if the object is absent, and
    /// [`ProviderError::Serialization`] if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, ProviderError> {
        match self {
            Self::Present(state) => Ok(serde_json::from_value(state)?),
            Self::Absent => Err(ProviderError::NotFound(
                "cannot decode an absent object".to_string(),
            )),
        }
    }
}

/// Classify the result of a fetch.
///
/// - transport errors are propagated unchanged
/// - 404, 204, or an empty / `null` 2xx payload is [`Drift::Absent`]
/// - any other 2xx is [`Drift::Present`]
/// - any other status is [`ProviderError::RemoteOperationFailed`]
pub fn classify(fetched: Result<RemoteResponse, ProviderError>) -> Result<Drift, ProviderError> {
    let response = fetched?;

    if response.status == NOT_FOUND {
        debug!(status = response.status, "Object not found upstream");
        return Ok(Drift::Absent);
    }

    if !response.is_success() {
        return Err(ProviderError::RemoteOperationFailed {
            status: Some(response.status),
            reason: error_reason(response.status, response.body.as_ref()),
        });
    }

    match response.body {
        None | Some(Value::Null) => {
            debug!(status = response.status, "Empty payload, treating object as absent");
            Ok(Drift::Absent)
        }
        Some(body) => Ok(Drift::Present(body)),
    }
}

/// Extract the control plane's reason from an error payload.
///
/// Accepts `{"error": "..."}`, `{"message": "..."}` and bare strings; falls back
/// to the serialized payload or the status code.
pub fn error_reason(status: u16, body: Option<&Value>) -> String {
    match body {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(map)) => map
            .get("error")
            .or_else(|| map.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        Some(other) if !other.is_null() => other.to_string(),
        _ => format!("status {}", status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_not_found_is_absent() {
        let drift = classify(Ok(RemoteResponse::not_found())).unwrap();
        assert_eq!(drift, Drift::Absent);
    }

    #[test]
    fn test_payload_is_present_and_unchanged() {
        let payload = json!({"id": 1234, "name": "broker", "ready": true});
        let drift = classify(Ok(RemoteResponse::ok(payload.clone()))).unwrap();
        assert_eq!(drift, Drift::Present(payload));
    }

    #[test]
    fn test_transport_error_propagates() {
        let err = classify(Err(ProviderError::Transport("dns failure".to_string()))).unwrap_err();
        assert!(matches!(err, ProviderError::Transport(ref msg) if msg == "dns failure"));
    }

    #[test]
    fn test_empty_success_is_absent() {
        let no_content = RemoteResponse { status: 204, body: None };
        assert!(classify(Ok(no_content)).unwrap().is_absent());

        let null_body = RemoteResponse { status: 200, body: Some(Value::Null) };
        assert!(classify(Ok(null_body)).unwrap().is_absent());
    }

    #[test]
    fn test_other_status_is_remote_failure() {
        let response = RemoteResponse {
            status: 500,
            body: Some(json!({"error": "internal error"})),
        };
        match classify(Ok(response)) {
            Err(ProviderError::RemoteOperationFailed { status, reason }) => {
                assert_eq!(status, Some(500));
                assert_eq!(reason, "internal error");
            }
            other => panic!("expected remote failure, got {:?}", other),
        }
    }

    #[test]
    fn test_error_reason_fallbacks() {
        assert_eq!(error_reason(400, Some(&json!({"message": "bad"}))), "bad");
        assert_eq!(error_reason(400, Some(&json!("plain"))), "plain");
        assert_eq!(error_reason(400, Some(&json!({"code": 7}))), r#"{"code":7}"#);
        assert_eq!(error_reason(502, None), "status 502");
    }

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(deny_unknown_fields)]
    struct Alarm {
        id: u64,
        #[serde(rename = "type")]
        kind: String,
    }

    #[test]
    fn test_decode_typed_state() {
        let alarm: Alarm = Drift::Present(json!({"id": 5, "type": "cpu"})).decode().unwrap();
        assert_eq!(alarm, Alarm { id: 5, kind: "cpu".to_string() });

        let err = Drift::Present(json!({"id": 5, "type": "cpu", "extra": 1}))
            .decode::<Alarm>()
            .unwrap_err();
        assert!(matches!(err, ProviderError::Serialization(_)));

        assert!(Drift::Absent.decode::<Alarm>().unwrap_err().is_not_found());
    }
}
