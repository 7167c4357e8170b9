//! Composite resource identity.
//!
//! Resources that live under a parent (an alarm on an instance, a plugin on an
//! instance) cannot be looked up by their own ID alone. Their identifier is the
//! composite string `"{resource_id},{parent_id}"`, which is also the format
//! accepted when importing existing infrastructure.
//!
//! ```
//! use hemmer_reconciler::identity::{format_id, parse_id};
//!
//! let raw = format_id("cpu-alarm", Some("1234"));
//! assert_eq!(raw, "cpu-alarm,1234");
//!
//! let reference = parse_id(&raw, true).unwrap();
//! assert_eq!(reference.resource_id, "cpu-alarm");
//! assert_eq!(reference.parent_id.as_deref(), Some("1234"));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Separator between the resource and parent segments.
pub const ID_SEPARATOR: char = ',';

/// Reference to a remote object, owned by the caller's persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteResourceRef {
    /// The object's own identifier.
    pub resource_id: String,
    /// The parent's identifier, for parent-scoped types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl RemoteResourceRef {
    /// Reference to an object that is not scoped to a parent.
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            parent_id: None,
        }
    }

    /// Reference to an object scoped to `parent_id`.
    pub fn scoped(resource_id: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            parent_id: Some(parent_id.into()),
        }
    }

    /// Check the reference against its type's scoping before any remote call.
    pub fn validate(&self, parent_required: bool) -> Result<(), ProviderError> {
        validate_resource_id(&self.resource_id)?;
        match &self.parent_id {
            None if parent_required => {
                Err(ProviderError::MissingParentIdentifier(self.resource_id.clone()))
            }
            Some(parent) => validate_parent_id(parent),
            None => Ok(()),
        }
    }

    /// The composite identifier for this reference.
    pub fn composite_id(&self) -> String {
        format_id(&self.resource_id, self.parent_id.as_deref())
    }
}

impl fmt::Display for RemoteResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.composite_id())
    }
}

/// Format a composite identifier.
///
/// Returns `resource_id` alone when there is no parent. The result only parses
/// back when `resource_id` passes [`validate_resource_id`].
pub fn format_id(resource_id: &str, parent_id: Option<&str>) -> String {
    match parent_id {
        Some(parent) => format!("{}{}{}", resource_id, ID_SEPARATOR, parent),
        None => resource_id.to_string(),
    }
}

/// Parse a composite identifier, splitting on the first comma.
///
/// # Errors
///
/// - [`ProviderError::MissingParentIdentifier`] if `parent_required` and there is no comma
/// - [`ProviderError::InvalidIdentifier`] if either segment is empty or the parent
///   segment is not a numeric ID
pub fn parse_id(raw: &str, parent_required: bool) -> Result<RemoteResourceRef, ProviderError> {
    let (resource_id, parent_id) = match raw.split_once(ID_SEPARATOR) {
        Some((resource, parent)) => (resource, Some(parent)),
        None => (raw, None),
    };

    if resource_id.is_empty() {
        return Err(ProviderError::InvalidIdentifier(format!(
            "empty resource segment in '{}'",
            raw
        )));
    }

    match parent_id {
        Some(parent) => {
            validate_parent_id(parent).map_err(|_| {
                ProviderError::InvalidIdentifier(format!(
                    "parent segment of '{}' is not a numeric identifier",
                    raw
                ))
            })?;
            Ok(RemoteResourceRef::scoped(resource_id, parent))
        }
        None if parent_required => Err(ProviderError::MissingParentIdentifier(raw.to_string())),
        None => Ok(RemoteResourceRef::new(resource_id)),
    }
}

/// Check that a resource identifier is non-empty and has no separator.
pub fn validate_resource_id(resource_id: &str) -> Result<(), ProviderError> {
    if resource_id.is_empty() {
        return Err(ProviderError::InvalidIdentifier(
            "resource identifier is empty".to_string(),
        ));
    }
    if resource_id.contains(ID_SEPARATOR) {
        return Err(ProviderError::InvalidIdentifier(format!(
            "resource identifier '{}' contains '{}'",
            resource_id, ID_SEPARATOR
        )));
    }
    Ok(())
}

/// Check that a parent identifier is made of ASCII digits only.
pub fn validate_parent_id(parent: &str) -> Result<(), ProviderError> {
    if !parent.is_empty() && parent.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ProviderError::InvalidIdentifier(format!(
            "'{}' is not a numeric identifier",
            parent
        )))
    }
}
