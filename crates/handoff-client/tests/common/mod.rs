#![allow(dead_code)]

use async_trait::async_trait;
use handoff_client::{
    ArtifactRedeemer, BusEndpoint, CollaboratorError, DirectedChannel, LoginArtifactMinter,
    MessageReceiver, Registration, SessionManager,
};
use handoff_core::{
    CodeChallenge, Credentials, LoginArtifact, Message, PackageName, SpConfig, TrustRegistry,
    UserAccount,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const IDP: &str = "com.example.idp";
pub const SP: &str = "com.example.sp";
pub const EVIL: &str = "com.evil.app";

pub fn pkg(s: &str) -> PackageName {
    s.parse().unwrap()
}

pub fn registry() -> TrustRegistry {
    TrustRegistry::new([SpConfig {
        package_name: pkg(SP),
        app_name: "Example SP".to_string(),
        client_id: "sp-client".to_string(),
        callback_url: "example://oauth/done".to_string(),
        scopes: vec!["api".to_string()],
    }])
}

pub struct FakeSession(Mutex<Option<UserAccount>>);

impl FakeSession {
    pub fn signed_in(org_id: &str, user_id: &str) -> Arc<Self> {
        Arc::new(Self(Mutex::new(Some(UserAccount::new(org_id, user_id)))))
    }

    pub fn signed_out() -> Arc<Self> {
        Arc::new(Self(Mutex::new(None)))
    }
}

impl SessionManager for FakeSession {
    fn current_user(&self) -> Option<UserAccount> {
        self.0.lock().unwrap().clone()
    }
}

/// Token exchange that remembers which challenge each code was minted for.
#[derive(Default)]
pub struct FakeOAuth {
    minted: Mutex<HashMap<String, (String, UserAccount)>>,
    fail_mint: bool,
    fail_redeem: bool,
    hang_redeem: bool,
}

impl FakeOAuth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_mint() -> Arc<Self> {
        Arc::new(Self {
            fail_mint: true,
            ..Self::default()
        })
    }

    pub fn failing_redeem() -> Arc<Self> {
        Arc::new(Self {
            fail_redeem: true,
            ..Self::default()
        })
    }

    /// Redemption never finishes.
    pub fn hanging_redeem() -> Arc<Self> {
        Arc::new(Self {
            hang_redeem: true,
            ..Self::default()
        })
    }
}

#[async_trait]
impl LoginArtifactMinter for FakeOAuth {
    async fn mint_login_artifact(
        &self,
        code_challenge: &str,
        sp: &SpConfig,
    ) -> Result<LoginArtifact, CollaboratorError> {
        if self.fail_mint {
            return Err(CollaboratorError::Unavailable("token endpoint down".to_string()));
        }
        let mut minted = self.minted.lock().unwrap();
        let code = format!("code-{}-{}", sp.client_id, minted.len());
        minted.insert(
            code.clone(),
            (code_challenge.to_string(), UserAccount::new("o1", "u1")),
        );
        Ok(LoginArtifact::new(code, "https://login.example.com"))
    }
}

#[async_trait]
impl ArtifactRedeemer for FakeOAuth {
    async fn redeem(
        &self,
        artifact: &LoginArtifact,
        code_verifier: &str,
    ) -> Result<Credentials, CollaboratorError> {
        if self.fail_redeem {
            return Err(CollaboratorError::Rejected("invalid_grant".to_string()));
        }
        if self.hang_redeem {
            std::future::pending::<()>().await;
        }
        let minted = self.minted.lock().unwrap();
        let (challenge, account) = minted
            .get(&artifact.code)
            .ok_or_else(|| CollaboratorError::Rejected("unknown code".to_string()))?;
        if !CodeChallenge::verify(code_verifier, challenge) {
            return Err(CollaboratorError::Rejected("verifier mismatch".to_string()));
        }
        Ok(Credentials {
            account: account.clone(),
            access_token: "access".to_string(),
            refresh_token: None,
            instance_url: artifact.login_url.clone(),
        })
    }
}

/// Collects statuses a manager reports.
pub fn recorder<S: Send + 'static>() -> (impl Fn(S) + Send + Sync + 'static, mpsc::UnboundedReceiver<S>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (move |status: S| {
        let _ = tx.send(status);
    }, rx)
}

struct Collect(mpsc::UnboundedSender<(PackageName, Message)>);

#[async_trait]
impl MessageReceiver for Collect {
    async fn on_message(&self, source: PackageName, message: Message) {
        let _ = self.0.send((source, message));
    }
}

/// A stand-in for the counterpart app: records what it receives and sends
/// whatever the test tells it to.
pub struct Probe {
    pub endpoint: BusEndpoint,
    inbox: mpsc::UnboundedReceiver<(PackageName, Message)>,
    _registration: Registration,
}

impl Probe {
    pub fn new(endpoint: BusEndpoint) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        let registration = endpoint.register_receiver(Arc::new(Collect(tx))).unwrap();
        Self {
            endpoint,
            inbox,
            _registration: registration,
        }
    }

    pub fn send(&self, target: &str, message: impl Into<Message>) {
        self.endpoint
            .send(&pkg(target), &message.into(), handoff_core::Framing::Addressed)
            .unwrap();
    }

    pub async fn recv(&mut self) -> (PackageName, Message) {
        tokio::time::timeout(Duration::from_secs(1), self.inbox.recv())
            .await
            .expect("probe timed out")
            .expect("probe inbox closed")
    }

    pub async fn assert_silent(&mut self) {
        let got = tokio::time::timeout(Duration::from_millis(50), self.inbox.recv()).await;
        assert!(got.is_err(), "unexpected message: {got:?}");
    }
}

pub async fn next<S>(rx: &mut mpsc::UnboundedReceiver<S>) -> S {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("status timed out")
        .expect("status channel closed")
}

pub async fn assert_no_status<S: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<S>) {
    let got = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
    assert!(got.is_err(), "unexpected status: {got:?}");
}
