//! Replace-vs-update classification.
//!
//! Each resource type declares, per attribute, whether a change can be applied
//! in place or forces the object to be destroyed and recreated. Classification
//! is pure: it never performs I/O, so the orchestrator can decide before
//! touching the network whether an update is legal at all.
//!
//! ```
//! use hemmer_reconciler::replacement::{classify, plan_tier_rule, ChangeKind, ReplacementRules};
//! use serde_json::json;
//!
//! let rules = ReplacementRules::new()
//!     .with_rule("plan", plan_tier_rule())
//!     .replace("region");
//!
//! let kind = classify("plan", Some(&json!("lemur")), Some(&json!("bunny")), &rules);
//! assert_eq!(kind, ChangeKind::RequiresReplace);
//!
//! let kind = classify("plan", Some(&json!("bunny")), Some(&json!("rabbit")), &rules);
//! assert_eq!(kind, ChangeKind::UpdateInPlace);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::types::AttributeChange;

/// Whether a change can be applied to the existing object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The change can be applied to the existing object.
    UpdateInPlace,
    /// The object must be destroyed and recreated.
    RequiresReplace,
}

/// Predicate over the old and new value; `true` forces replacement.
pub type ReplacePredicate = Arc<dyn Fn(Option<&Value>, Option<&Value>) -> bool + Send + Sync>;

/// How changes to one attribute are applied.
#[derive(Clone)]
pub enum Rule {
    /// Always in place.
    InPlace,
    /// Always forces replacement.
    Replace,
    /// Forces replacement when the predicate holds.
    When(ReplacePredicate),
}

impl Rule {
    /// Wrap a predicate; `true` forces replacement.
    pub fn when<F>(predicate: F) -> Self
    where
        F: Fn(Option<&Value>, Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Self::When(Arc::new(predicate))
    }

    fn evaluate(&self, old: Option<&Value>, new: Option<&Value>) -> ChangeKind {
        let replace = match self {
            Self::InPlace => false,
            Self::Replace => true,
            Self::When(predicate) => predicate(old, new),
        };
        if replace {
            ChangeKind::RequiresReplace
        } else {
            ChangeKind::UpdateInPlace
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InPlace => f.write_str("InPlace"),
            Self::Replace => f.write_str("Replace"),
            Self::When(_) => f.write_str("When(<predicate>)"),
        }
    }
}

/// Per-resource-type replacement rules. Unlisted attributes update in place.
#[derive(Debug, Clone, Default)]
pub struct ReplacementRules {
    rules: HashMap<String, Rule>,
}

impl ReplacementRules {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule for an attribute.
    pub fn with_rule(mut self, attribute: impl Into<String>, rule: Rule) -> Self {
        self.rules.insert(attribute.into(), rule);
        self
    }

    /// Mark an attribute as always replacing.
    pub fn replace(self, attribute: impl Into<String>) -> Self {
        self.with_rule(attribute, Rule::Replace)
    }

    /// Mark an attribute as always in place.
    pub fn in_place(self, attribute: impl Into<String>) -> Self {
        self.with_rule(attribute, Rule::InPlace)
    }

    /// Mark several attributes as always replacing.
    pub fn force_new<I, S>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        attributes
            .into_iter()
            .fold(self, |rules, attribute| rules.replace(attribute))
    }

    /// The rule for an attribute, if one is declared.
    pub fn rule(&self, attribute: &str) -> Option<&Rule> {
        self.rules.get(attribute)
    }

    /// Classify a single attribute change.
    pub fn classify(&self, attribute: &str, old: Option<&Value>, new: Option<&Value>) -> ChangeKind {
        if old == new {
            return ChangeKind::UpdateInPlace;
        }
        self.rules
            .get(attribute)
            .map(|rule| rule.evaluate(old, new))
            .unwrap_or(ChangeKind::UpdateInPlace)
    }

    /// Attributes among `changes` that force replacement, in order.
    pub fn replacing_attributes(&self, changes: &[AttributeChange]) -> Vec<String> {
        changes
            .iter()
            .filter(|c| {
                self.classify(&c.path, c.before.as_ref(), c.after.as_ref())
                    == ChangeKind::RequiresReplace
            })
            .map(|c| c.path.clone())
            .collect()
    }
}

/// Classify a change of `attribute` from `old` to `new` under `rules`.
pub fn classify(
    attribute: &str,
    old: Option<&Value>,
    new: Option<&Value>,
    rules: &ReplacementRules,
) -> ChangeKind {
    rules.classify(attribute, old, new)
}

/// Hosting tier a plan belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostingTier {
    /// Multi-tenant plans on shared servers.
    Shared,
    /// Plans with dedicated nodes.
    Dedicated,
}

/// Plans hosted on shared servers. Every other plan is dedicated.
pub const SHARED_PLANS: &[&str] = &["lemur", "tiger", "lemming"];

/// The hosting tier of a plan name.
pub fn hosting_tier(plan: &str) -> HostingTier {
    if SHARED_PLANS.contains(&plan) {
        HostingTier::Shared
    } else {
        HostingTier::Dedicated
    }
}

/// Rule for the `plan` attribute: moving between shared and dedicated hosting
/// forces replacement; upgrades within a tier are applied in place.
pub fn plan_tier_rule() -> Rule {
    Rule::when(|old, new| {
        let tier = |v: Option<&Value>| v.and_then(Value::as_str).map(hosting_tier);
        tier(old) != tier(new)
    })
}
