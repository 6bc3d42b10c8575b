//! Access control: which consumer may call which methods.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

/// Malformed access-control input.
#[derive(Debug, Error)]
pub enum AclError {
    /// The ACL is not a JSON object of `consumer -> [pattern, ...]`.
    #[error("invalid access control list: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable mapping from consumer to the method patterns it may call.
///
/// A pattern is either an exact method name (`/relay.Biz/Add`) or the
/// wildcard for a whole service (`/relay.Biz/*`).
///
/// ## Example
///
/// ```
/// use event_relay::acl::AccessPolicy;
///
/// let policy = AccessPolicy::from_json(r#"{"svc1": ["/relay.Biz/*"]}"#).unwrap();
/// assert!(policy.authorize("/relay.Biz/Add", "svc1"));
/// assert!(!policy.authorize("/relay.Admin/Logging", "svc1"));
/// assert!(!policy.authorize("/relay.Biz/Add", "stranger"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    rules: HashMap<String, HashSet<String>>,
}

impl AccessPolicy {
    /// Parse an ACL given as a JSON object.
    pub fn from_json(acl: &str) -> Result<Self, AclError> {
        let rules: HashMap<String, Vec<String>> = serde_json::from_str(acl)?;
        Ok(Self::from_map(rules))
    }

    /// Build a policy from an already-parsed mapping.
    pub fn from_map(rules: HashMap<String, Vec<String>>) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(consumer, patterns)| (consumer, patterns.into_iter().collect()))
                .collect(),
        }
    }

    /// Whether `consumer` may call `method`.
    ///
    /// True iff one of the consumer's patterns equals the method name or the
    /// method's service wildcard. Unknown consumers are always denied.
    pub fn authorize(&self, method: &str, consumer: &str) -> bool {
        let Some(patterns) = self.rules.get(consumer) else {
            return false;
        };
        if patterns.contains(method) {
            return true;
        }
        service_wildcard(method).is_some_and(|wildcard| patterns.contains(&wildcard))
    }
}

/// Wildcard pattern covering the service a method belongs to.
///
/// `/relay.Biz/Add` becomes `/relay.Biz/*`; a name without `/` has none.
pub fn service_wildcard(method: &str) -> Option<String> {
    method
        .rfind('/')
        .map(|slash| format!("{}*", &method[..=slash]))
}
