//! Components the managers lean on but do not implement: the account session
//! and the OAuth code exchange.

use async_trait::async_trait;
use handoff_core::{Credentials, LoginArtifact, SpConfig, UserAccount};

/// Knows who is signed in to this app.
pub trait SessionManager: Send + Sync {
    fn current_user(&self) -> Option<UserAccount>;
}

/// Mints one-time login artifacts on the IDP side.
#[async_trait]
pub trait LoginArtifactMinter: Send + Sync {
    /// Mint an artifact for `sp`, bound to `code_challenge`.
    async fn mint_login_artifact(
        &self,
        code_challenge: &str,
        sp: &SpConfig,
    ) -> Result<LoginArtifact, CollaboratorError>;
}

/// Redeems login artifacts on the SP side.
#[async_trait]
pub trait ArtifactRedeemer: Send + Sync {
    /// Exchange `artifact` for session credentials, proving possession of
    /// `code_verifier`.
    async fn redeem(
        &self,
        artifact: &LoginArtifact,
        code_verifier: &str,
    ) -> Result<Credentials, CollaboratorError>;
}

/// Failure reported by a collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("no signed-in user")]
    NotAuthenticated,
    #[error("token exchange rejected: {0}")]
    Rejected(String),
    #[error("token exchange unavailable: {0}")]
    Unavailable(String),
}
