//! Core types for handoff, the on-device login-delegation protocol.
//!
//! An identity-provider app (IDP) that already has a signed-in user mints
//! one-time login artifacts for trusted service-provider apps (SP) on the same
//! device, over addressed cross-process messages. This crate provides the
//! message model, its wire framing and the trust primitives; the runtime
//! managers live in `handoff-client`.

mod artifact;
mod envelope;
mod identity;
mod message;
mod pkce;
mod trust;

pub use artifact::{Credentials, LoginArtifact, UserAccount};
pub use envelope::{
    ACTION_KEY, DecodeError, Envelope, Framing, LAUNCH_ACTION, SRC_APP_PACKAGE_NAME,
};
pub use identity::{IdentityParseError, PackageName, SenderIdentityVerifier, TransportAttested};
pub use message::{
    IDP_LOGIN_REQUEST, IDP_LOGIN_RESPONSE, IDP_NOT_LOGGED_IN, IdpLoginRequest, IdpLoginResponse,
    Message, SP_LOGIN_REQUEST, SP_LOGIN_RESPONSE, SpLoginRequest, SpLoginResponse,
};
pub use pkce::CodeChallenge;
pub use trust::{SpConfig, TrustRegistry};

