//! Protocol messages.
//!
//! Four variants make up the handshake. Each one is carried as an
//! [`Envelope`] whose extras are plain strings, so it survives any
//! cross-process marshalling. Decoding dispatches on the envelope's action;
//! an action this crate does not know is not an error, since other consumers
//! may share the transport.

use crate::envelope::{DecodeError, Envelope, Framing};
use uuid::Uuid;

pub const IDP_LOGIN_REQUEST: &str = "handoff.action.IDP_LOGIN_REQUEST";
pub const IDP_LOGIN_RESPONSE: &str = "handoff.action.IDP_LOGIN_RESPONSE";
pub const SP_LOGIN_REQUEST: &str = "handoff.action.SP_LOGIN_REQUEST";
pub const SP_LOGIN_RESPONSE: &str = "handoff.action.SP_LOGIN_RESPONSE";

/// Error text sent to an SP when the IDP has no signed-in user.
pub const IDP_NOT_LOGGED_IN: &str = "IDP app not logged in";

const UUID: &str = "uuid";
const ORG_ID: &str = "org_id";
const USER_ID: &str = "user_id";
const CODE_CHALLENGE: &str = "code_challenge";
const CODE: &str = "code";
const LOGIN_URL: &str = "login_url";
const ERROR: &str = "error";

/// IDP asks an SP to sign in the given user. IDP -> SP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpLoginRequest {
    pub uuid: Uuid,
    pub org_id: String,
    pub user_id: String,
}

/// SP acknowledges an [`IdpLoginRequest`]. SP -> IDP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpLoginResponse {
    pub uuid: Uuid,
}

/// SP asks the IDP for a login artifact bound to `code_challenge`. SP -> IDP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpLoginRequest {
    pub uuid: Uuid,
    pub code_challenge: String,
}

/// IDP answers an [`SpLoginRequest`]. IDP -> SP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpLoginResponse {
    pub uuid: Uuid,
    pub code: Option<String>,
    pub login_url: Option<String>,
    pub error: Option<String>,
}

impl IdpLoginRequest {
    pub fn new(org_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            org_id: org_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl SpLoginRequest {
    pub fn new(code_challenge: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            code_challenge: code_challenge.into(),
        }
    }
}

impl SpLoginResponse {
    /// A response carrying a freshly minted login artifact.
    pub fn success(uuid: Uuid, code: impl Into<String>, login_url: impl Into<String>) -> Self {
        Self {
            uuid,
            code: Some(code.into()),
            login_url: Some(login_url.into()),
            error: None,
        }
    }

    /// A response explaining why no artifact was minted.
    pub fn failure(uuid: Uuid, error: impl Into<String>) -> Self {
        Self {
            uuid,
            code: None,
            login_url: None,
            error: Some(error.into()),
        }
    }
}

/// Any handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    IdpLoginRequest(IdpLoginRequest),
    IdpLoginResponse(IdpLoginResponse),
    SpLoginRequest(SpLoginRequest),
    SpLoginResponse(SpLoginResponse),
}

impl Message {
    /// Correlation id of the handshake this message belongs to.
    pub fn uuid(&self) -> Uuid {
        match self {
            Message::IdpLoginRequest(m) => m.uuid,
            Message::IdpLoginResponse(m) => m.uuid,
            Message::SpLoginRequest(m) => m.uuid,
            Message::SpLoginResponse(m) => m.uuid,
        }
    }

    /// The namespaced action identifying this variant on the wire.
    pub fn action(&self) -> &'static str {
        match self {
            Message::IdpLoginRequest(_) => IDP_LOGIN_REQUEST,
            Message::IdpLoginResponse(_) => IDP_LOGIN_RESPONSE,
            Message::SpLoginRequest(_) => SP_LOGIN_REQUEST,
            Message::SpLoginResponse(_) => SP_LOGIN_RESPONSE,
        }
    }

    /// Encode with addressed framing.
    pub fn to_envelope(&self) -> Envelope {
        self.to_framed_envelope(&Framing::Addressed)
    }

    pub fn to_framed_envelope(&self, framing: &Framing) -> Envelope {
        let mut envelope = Envelope::framed(self.action(), framing);
        envelope.insert(UUID, self.uuid().to_string());
        match self {
            Message::IdpLoginRequest(m) => {
                envelope.insert(ORG_ID, m.org_id.clone());
                envelope.insert(USER_ID, m.user_id.clone());
            }
            Message::IdpLoginResponse(_) => {}
            Message::SpLoginRequest(m) => {
                envelope.insert(CODE_CHALLENGE, m.code_challenge.clone());
            }
            Message::SpLoginResponse(m) => {
                for (key, value) in [(CODE, &m.code), (LOGIN_URL, &m.login_url), (ERROR, &m.error)] {
                    if let Some(value) = value {
                        envelope.insert(key, value.clone());
                    }
                }
            }
        }
        envelope
    }

    /// Decode an envelope in either framing.
    ///
    /// Returns `Ok(None)` for actions that are not part of this protocol.
    pub fn from_envelope(envelope: &Envelope) -> Result<Option<Self>, DecodeError> {
        let Some(action) = envelope.dispatch_action() else {
            return Ok(None);
        };
        let message = match action {
            IDP_LOGIN_REQUEST => Message::IdpLoginRequest(IdpLoginRequest {
                uuid: read_uuid(envelope)?,
                org_id: envelope.require(ORG_ID)?.to_string(),
                user_id: envelope.require(USER_ID)?.to_string(),
            }),
            IDP_LOGIN_RESPONSE => Message::IdpLoginResponse(IdpLoginResponse {
                uuid: read_uuid(envelope)?,
            }),
            SP_LOGIN_REQUEST => Message::SpLoginRequest(SpLoginRequest {
                uuid: read_uuid(envelope)?,
                code_challenge: envelope.require(CODE_CHALLENGE)?.to_string(),
            }),
            SP_LOGIN_RESPONSE => Message::SpLoginResponse(SpLoginResponse {
                uuid: read_uuid(envelope)?,
                code: envelope.extra(CODE).map(str::to_string),
                login_url: envelope.extra(LOGIN_URL).map(str::to_string),
                error: envelope.extra(ERROR).map(str::to_string),
            }),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }
}

fn read_uuid(envelope: &Envelope) -> Result<Uuid, DecodeError> {
    let value = envelope.require(UUID)?;
    value.parse().map_err(|_| DecodeError::InvalidUuid {
        action: envelope.dispatch_action().unwrap_or_default().to_string(),
        value: value.to_string(),
    })
}

macro_rules! impl_from_variant {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for Message {
                fn from(m: $variant) -> Self {
                    Message::$variant(m)
                }
            }
        )*
    };
}

impl_from_variant!(IdpLoginRequest, IdpLoginResponse, SpLoginRequest, SpLoginResponse);
