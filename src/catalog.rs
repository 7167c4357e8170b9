//! Built-in resource types.
//!
//! | type       | parent   | waits on                  | forces replacement         |
//! |------------|----------|---------------------------|----------------------------|
//! | `instance` | -        | `ready == true`           | `region`, `vpc_subnet`, plan tier |
//! | `alarm`    | instance | -                         | `type`                     |
//! | `plugin`   | instance | `enabled == params.enabled` | `name`                   |
//!
//! A plugin is identified by its `name` parameter, since its create may
//! answer with no body.
//! | `vpc`      | -        | -                         | `region`, `subnet`         |

use serde_json::json;

use crate::client::{Endpoint, HttpControlPlane};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::orchestrator::ResourceSpec;
use crate::replacement::{plan_tier_rule, ReplacementRules};
use crate::waiter::ReadyCondition;

/// Names of the built-in resource types.
pub const RESOURCE_TYPES: [&str; 4] = ["instance", "alarm", "plugin", "vpc"];

/// A message broker instance.
pub fn instance() -> ResourceSpec {
    ResourceSpec::new("instance")
        .with_ready(ReadyCondition::equals("ready", json!(true)))
        .with_rules(
            ReplacementRules::new()
                .with_rule("plan", plan_tier_rule())
                .force_new(["region", "vpc_subnet", "vpc_id"])
                .in_place("name")
                .in_place("tags"),
        )
}

/// A monitoring alarm on an instance.
pub fn alarm() -> ResourceSpec {
    ResourceSpec::new("alarm")
        .parent_scoped()
        .with_rules(ReplacementRules::new().replace("type"))
}

/// A broker plugin on an instance.
pub fn plugin() -> ResourceSpec {
    ResourceSpec::new("plugin")
        .parent_scoped()
        .with_ready(ReadyCondition::matches_param("enabled"))
        .with_rules(ReplacementRules::new().replace("name"))
        .with_id_param("name")
}

/// A standalone VPC.
pub fn vpc() -> ResourceSpec {
    ResourceSpec::new("vpc").with_rules(ReplacementRules::new().force_new(["region", "subnet"]))
}

/// Where the control plane serves each built-in type.
fn endpoint(resource_type: &str) -> Option<Endpoint> {
    match resource_type {
        "instance" => Some(Endpoint::new("instances")),
        "alarm" => Some(Endpoint::nested("instances", "alarms")),
        "plugin" => Some(Endpoint::nested("instances", "plugins").with_id_field("name")),
        "vpc" => Some(Endpoint::new("vpcs")),
        _ => None,
    }
}

/// The built-in spec for `resource_type`, with poll settings from `config`.
///
/// # Errors
///
/// [`ProviderError::InvalidRequest`] for an unknown type, and
/// [`ProviderError::Configuration`] if its poll settings are invalid.
pub fn spec_for(resource_type: &str, config: &ProviderConfig) -> Result<ResourceSpec, ProviderError> {
    let spec = match resource_type {
        "instance" => instance(),
        "alarm" => alarm(),
        "plugin" => plugin(),
        "vpc" => vpc(),
        other => {
            return Err(ProviderError::InvalidRequest(format!(
                "unknown resource type: {}",
                other
            )))
        }
    };
    let poll = config
        .poll_config_for(resource_type)
        .map_err(|e| ProviderError::Configuration(format!("{}: {}", resource_type, e.message())))?;
    Ok(spec.with_poll(poll))
}

/// Register the endpoints of every built-in type on `client`.
pub fn register_endpoints(client: HttpControlPlane) -> HttpControlPlane {
    RESOURCE_TYPES.iter().fold(client, |client, resource_type| {
        match endpoint(resource_type) {
            Some(endpoint) => client.with_endpoint(*resource_type, endpoint),
            None => client,
        }
    })
}
