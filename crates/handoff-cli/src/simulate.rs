//! In-process handshake simulation with stand-in session and token exchange.

use async_trait::async_trait;
use handoff_client::{
    ArtifactRedeemer, CollaboratorError, HandoffConfig, IdpManager, IdpStatus,
    LoginArtifactMinter, LocalBus, SessionManager, SpManager, SpStatus, Status,
};
use handoff_core::{
    CodeChallenge, Credentials, LoginArtifact, PackageName, SpConfig, UserAccount,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

const LOGIN_URL: &str = "https://login.handoff.local";

pub struct Options {
    pub sp: PackageName,
    pub user: Option<UserAccount>,
}

struct StaticSession(Option<UserAccount>);

impl SessionManager for StaticSession {
    fn current_user(&self) -> Option<UserAccount> {
        self.0.clone()
    }
}

/// Token exchange kept in memory: codes are only redeemable with the
/// verifier matching the challenge they were minted for.
struct MemoryExchange {
    user: Option<UserAccount>,
    codes: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl LoginArtifactMinter for MemoryExchange {
    async fn mint_login_artifact(
        &self,
        code_challenge: &str,
        sp: &SpConfig,
    ) -> Result<LoginArtifact, CollaboratorError> {
        let code = Uuid::new_v4().simple().to_string();
        self.codes
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("code store poisoned".into()))?
            .insert(code.clone(), code_challenge.to_string());
        tracing::info!("Minted code for {} with scopes {:?}", sp.client_id, sp.scopes);
        Ok(LoginArtifact::new(code, LOGIN_URL))
    }
}

#[async_trait]
impl ArtifactRedeemer for MemoryExchange {
    async fn redeem(
        &self,
        artifact: &LoginArtifact,
        code_verifier: &str,
    ) -> Result<Credentials, CollaboratorError> {
        let challenge = self
            .codes
            .lock()
            .map_err(|_| CollaboratorError::Unavailable("code store poisoned".into()))?
            .remove(&artifact.code)
            .ok_or_else(|| CollaboratorError::Rejected("unknown or reused code".into()))?;
        if !CodeChallenge::verify(code_verifier, &challenge) {
            return Err(CollaboratorError::Rejected("code verifier mismatch".into()));
        }
        let account = self.user.clone().ok_or(CollaboratorError::NotAuthenticated)?;
        Ok(Credentials {
            account,
            access_token: Uuid::new_v4().to_string(),
            refresh_token: None,
            instance_url: artifact.login_url.clone(),
        })
    }
}

struct Apps {
    idp: Arc<IdpManager>,
    sp: Arc<SpManager>,
}

fn install(config: &HandoffConfig, options: Options) -> anyhow::Result<Apps> {
    let bus = LocalBus::new();
    let exchange = Arc::new(MemoryExchange {
        user: options.user.clone(),
        codes: Mutex::new(HashMap::new()),
    });

    let idp = Arc::new(
        IdpManager::new(
            Arc::new(bus.endpoint(config.idp_package().clone())),
            config.trust_registry(),
            Arc::new(StaticSession(options.user)),
            exchange.clone(),
        )
        .with_response_timeout(config.response_timeout())
        .with_listener(|status: IdpStatus| println!("[idp] {status:?}")),
    );
    let sp = Arc::new(
        SpManager::new(
            Arc::new(bus.endpoint(options.sp)),
            config.idp_package().clone(),
            exchange,
        )
        .with_response_timeout(config.response_timeout())
        .with_launch_component(config.idp.launch_component.clone())
        .with_listener(|status: SpStatus| println!("[sp] {status:?}")),
    );
    idp.start()?;
    sp.start()?;
    Ok(Apps { idp, sp })
}

/// Print statuses until a terminal one arrives.
async fn drain<S: Status>(label: &str, mut statuses: mpsc::UnboundedReceiver<S>) -> Option<S> {
    while let Some(status) = statuses.recv().await {
        println!("[{label}] {status:?}");
        if status.is_terminal() {
            return Some(status);
        }
    }
    None
}

pub async fn idp_initiated(config: &HandoffConfig, options: Options) -> anyhow::Result<()> {
    let target = options.sp.clone();
    let apps = install(config, options)?;
    let (tx, rx) = mpsc::unbounded_channel();

    apps.idp.kickoff_idp_initiated_login_flow(&target, move |status: IdpStatus| {
        let _ = tx.send(status);
    });
    let outcome = drain("idp", rx).await;

    if let Some(flow) = apps.idp.active_flow() {
        println!("Flow {} exchanged {} messages", flow.uuid(), flow.messages().len());
    }
    apps.sp.stop();
    apps.idp.stop();
    match outcome {
        Some(IdpStatus::SpLoginComplete) => Ok(()),
        other => anyhow::bail!("handshake did not complete: {other:?}"),
    }
}

pub async fn sp_initiated(config: &HandoffConfig, options: Options) -> anyhow::Result<()> {
    let apps = install(config, options)?;
    let (tx, rx) = mpsc::unbounded_channel();

    let idp = apps.sp.idp_package().clone();
    apps.sp.kickoff_sp_initiated_login_flow(&idp, move |status: SpStatus| {
        let _ = tx.send(status);
    });
    let outcome = drain("sp", rx).await;

    if let Some(flow) = apps.sp.active_flow() {
        println!("Flow {} exchanged {} messages", flow.uuid(), flow.messages().len());
    }
    apps.sp.stop();
    apps.idp.stop();
    match outcome {
        Some(SpStatus::IdpLoginComplete) => Ok(()),
        other => anyhow::bail!("handshake did not complete: {other:?}"),
    }
}
