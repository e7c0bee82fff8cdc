//! Wire envelope.
//!
//! An envelope is what actually crosses the process boundary: an action tag
//! plus a flat map of string extras. There are two framings. Addressed
//! envelopes put the message action in the primary tag. Launch envelopes
//! reserve the primary tag for [`LAUNCH_ACTION`] and carry the message action
//! under [`ACTION_KEY`], together with the component to bring forward.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Extra carrying the sender's package name, stamped by the transport.
pub const SRC_APP_PACKAGE_NAME: &str = "src_app_package_name";

/// Extra carrying the message action in launch framing.
pub const ACTION_KEY: &str = "action_key";

/// Primary tag of every launch-framed envelope.
pub const LAUNCH_ACTION: &str = "handoff.intent.action.VIEW";

/// How an envelope is framed for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Framing {
    /// Steady-state, package-targeted delivery.
    Addressed,
    /// Launch a named component in the target app with the message as parameters.
    Launch { component: String },
}

/// A flat, string-keyed message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Primary dispatch tag.
    pub action: String,
    /// Target component, only for launch framing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl Envelope {
    /// Create an addressed envelope dispatched on `action`.
    pub fn addressed(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            component: None,
            extras: BTreeMap::new(),
        }
    }

    /// Create a launch envelope that opens `component` and carries `action` as an extra.
    pub fn launch(action: impl Into<String>, component: impl Into<String>) -> Self {
        let mut envelope = Self {
            action: LAUNCH_ACTION.to_string(),
            component: Some(component.into()),
            extras: BTreeMap::new(),
        };
        envelope.insert(ACTION_KEY, action);
        envelope
    }

    /// Create an envelope for `action` in the given framing.
    pub fn framed(action: impl Into<String>, framing: &Framing) -> Self {
        match framing {
            Framing::Addressed => Self::addressed(action),
            Framing::Launch { component } => Self::launch(action, component.clone()),
        }
    }

    /// The framing this envelope was built with.
    pub fn framing(&self) -> Framing {
        match (&self.component, self.action == LAUNCH_ACTION) {
            (Some(component), true) => Framing::Launch {
                component: component.clone(),
            },
            _ => Framing::Addressed,
        }
    }

    /// The action receivers dispatch on, regardless of framing.
    pub fn dispatch_action(&self) -> Option<&str> {
        if self.action == LAUNCH_ACTION {
            self.extra(ACTION_KEY)
        } else {
            Some(&self.action)
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.extras.insert(key.into(), value.into());
    }

    pub fn extra(&self, key: &str) -> Option<&str> {
        self.extras.get(key).map(String::as_str)
    }

    /// Look up an extra that a decoder cannot do without.
    pub fn require(&self, key: &'static str) -> Result<&str, DecodeError> {
        self.extra(key).ok_or_else(|| DecodeError::MissingField {
            action: self.dispatch_action().unwrap_or(&self.action).to_string(),
            field: key,
        })
    }

    /// Marshal for a byte-oriented transport.
    pub fn to_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        serde_json::to_vec(self).map_err(DecodeError::Malformed)
    }

    /// Unmarshal bytes produced by [`Envelope::to_bytes`].
    pub fn from_bytes(data: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(data).map_err(DecodeError::Malformed)
    }
}

/// Error decoding an inbound envelope.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("{action} is missing required field {field}")]
    MissingField { action: String, field: &'static str },
    #[error("invalid uuid in {action}: {value}")]
    InvalidUuid { action: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addressed_dispatches_on_primary_tag() {
        let envelope = Envelope::addressed("handoff.action.SP_LOGIN_REQUEST");
        assert_eq!(envelope.framing(), Framing::Addressed);
        assert_eq!(
            envelope.dispatch_action(),
            Some("handoff.action.SP_LOGIN_REQUEST")
        );
    }

    #[test]
    fn launch_dispatches_on_action_key() {
        let envelope = Envelope::launch("handoff.action.SP_LOGIN_REQUEST", "LoginSurface");
        assert_eq!(envelope.action, LAUNCH_ACTION);
        assert_eq!(
            envelope.framing(),
            Framing::Launch {
                component: "LoginSurface".to_string()
            }
        );
        assert_eq!(
            envelope.dispatch_action(),
            Some("handoff.action.SP_LOGIN_REQUEST")
        );
    }

    #[test]
    fn launch_without_action_key_has_no_dispatch_action() {
        let mut envelope = Envelope::launch("x", "LoginSurface");
        envelope.extras.remove(ACTION_KEY);
        assert_eq!(envelope.dispatch_action(), None);
    }

    #[test]
    fn require_reports_field_and_action() {
        let envelope = Envelope::addressed("handoff.action.IDP_LOGIN_REQUEST");
        let err = envelope.require("org_id").unwrap_err();
        assert_eq!(
            err.to_string(),
            "handoff.action.IDP_LOGIN_REQUEST is missing required field org_id"
        );
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        assert!(matches!(
            Envelope::from_bytes(b"not json"),
            Err(DecodeError::Malformed(_))
        ));
    }
}
