//! Login artifacts exchanged during a handshake.

use serde::{Deserialize, Serialize};

/// A one-time login artifact minted by the IDP for an SP.
///
/// Only redeemable together with the verifier behind the code challenge it
/// was minted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginArtifact {
    /// One-time authorization code.
    pub code: String,
    /// Login server the code must be redeemed against.
    pub login_url: String,
}

impl LoginArtifact {
    pub fn new(code: impl Into<String>, login_url: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            login_url: login_url.into(),
        }
    }
}

/// The signed-in user an IDP vouches for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserAccount {
    pub org_id: String,
    pub user_id: String,
}

impl UserAccount {
    pub fn new(org_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Session credentials the SP obtains by redeeming a [`LoginArtifact`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub account: UserAccount,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub instance_url: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("instance_url", &self.instance_url)
            .finish_non_exhaustive()
    }
}
