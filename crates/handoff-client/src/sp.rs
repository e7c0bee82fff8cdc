//! Service-provider side of the handshake.

use crate::channel::{ChannelError, DirectedChannel, MessageReceiver, Registration, WeakReceiver};
use crate::collaborators::ArtifactRedeemer;
use crate::config::DEFAULT_LAUNCH_COMPONENT;
use crate::flow::{Flow, FlowSlot};
use crate::lock;
use crate::status::{SpStatus, StatusOutbox, StatusUpdateCallback};
use async_trait::async_trait;
use handoff_core::{
    CodeChallenge, Framing, IdpLoginRequest, IdpLoginResponse, LoginArtifact, Message,
    PackageName, SpLoginRequest, SpLoginResponse,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

struct SpState {
    slot: FlowSlot<SpStatus>,
    /// PKCE pair of the active flow.
    code_challenge: Option<CodeChallenge>,
}

/// Runs inside an SP app.
///
/// Asks the IDP for a login artifact and redeems it, and acknowledges logins
/// the IDP pushes. An SP trusts exactly one IDP.
pub struct SpManager {
    channel: Arc<dyn DirectedChannel>,
    idp_package: PackageName,
    redeemer: Arc<dyn ArtifactRedeemer>,
    launch_component: String,
    response_timeout: Duration,
    listener: Option<Arc<dyn StatusUpdateCallback<SpStatus>>>,
    state: Mutex<SpState>,
    outbox: Arc<StatusOutbox<SpStatus>>,
    registration: Mutex<Option<Registration>>,
}

impl SpManager {
    pub fn new(
        channel: Arc<dyn DirectedChannel>,
        idp_package: PackageName,
        redeemer: Arc<dyn ArtifactRedeemer>,
    ) -> Self {
        let outbox = Arc::new(StatusOutbox::new());
        Self {
            channel,
            idp_package,
            redeemer,
            launch_component: DEFAULT_LAUNCH_COMPONENT.to_string(),
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            listener: None,
            state: Mutex::new(SpState {
                slot: FlowSlot::new(outbox.clone()),
                code_challenge: None,
            }),
            outbox,
            registration: Mutex::new(None),
        }
    }

    /// How long an SP-initiated login waits for the IDP, and then for the
    /// artifact to be redeemed.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// IDP component that login requests launch.
    pub fn with_launch_component(mut self, component: impl Into<String>) -> Self {
        self.launch_component = component.into();
        self
    }

    /// Receives statuses for IDP-initiated logins this SP answers.
    pub fn with_listener(mut self, listener: impl StatusUpdateCallback<SpStatus> + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn idp_package(&self) -> &PackageName {
        &self.idp_package
    }

    /// Begin receiving messages. Must be called within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<(), ChannelError> {
        let registration = self
            .channel
            .register_receiver(Arc::new(WeakReceiver::new(self)))?;
        *lock(&self.registration) = Some(registration);
        tracing::info!(
            "SP manager listening as {} (IDP: {})",
            self.channel.local_package(),
            self.idp_package
        );
        Ok(())
    }

    /// Stop receiving messages.
    pub fn stop(&self) {
        if let Some(registration) = lock(&self.registration).take() {
            registration.unregister();
        }
    }

    /// Snapshot of the tracked flow, if any.
    pub fn active_flow(&self) -> Option<Flow> {
        lock(&self.state).slot.flow().cloned()
    }

    /// Ask `idp` for a login artifact.
    ///
    /// The request launches the IDP's login surface. Returns immediately
    /// after the request is handed to the transport; progress is reported to
    /// `callback`. Only the configured IDP can be asked.
    pub fn kickoff_sp_initiated_login_flow(
        self: &Arc<Self>,
        idp: &PackageName,
        callback: impl StatusUpdateCallback<SpStatus> + 'static,
    ) -> Option<Uuid> {
        if *idp != self.idp_package {
            tracing::warn!(
                "Refusing to ask {} for a login, the trusted IDP is {}",
                idp,
                self.idp_package
            );
            callback.on_status_update(SpStatus::IdpNotTrusted(idp.clone()));
            return None;
        }

        let code_challenge = CodeChallenge::generate();
        let request = Message::from(SpLoginRequest::new(code_challenge.challenge()));
        let uuid = request.uuid();
        let framing = Framing::Launch {
            component: self.launch_component.clone(),
        };

        let sent = {
            let mut state = lock(&self.state);
            state.slot.begin(request.clone(), idp.clone(), Arc::new(callback));
            state.code_challenge = Some(code_challenge);
            match self.channel.send(idp, &request, framing) {
                Ok(()) => {
                    tracing::info!("Sent SP login request {} to {}", uuid, idp);
                    state.slot.emit(SpStatus::LoginRequestSentToIdp);
                    true
                }
                Err(e) => {
                    tracing::warn!("Failed to send login request to {}: {}", idp, e);
                    state.slot.abandon(SpStatus::FailedToSendRequest(e.to_string()));
                    state.code_challenge = None;
                    false
                }
            }
        };
        if sent {
            self.arm_timeout(uuid);
        }
        self.outbox.flush();
        sent.then_some(uuid)
    }

    fn arm_timeout(self: &Arc<Self>, uuid: Uuid) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime; flow {} has no response timeout", uuid);
            return;
        };
        let manager = Arc::downgrade(self);
        let timeout = self.response_timeout;
        handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(manager) = manager.upgrade() {
                {
                    let mut state = lock(&manager.state);
                    if state.slot.expire(uuid, SpStatus::NoResponseFromIdp) {
                        state.code_challenge = None;
                    }
                }
                manager.outbox.flush();
            }
        });
    }

    async fn handle_sp_login_response(&self, source: &PackageName, response: SpLoginResponse) {
        let uuid = response.uuid;
        let accepted = self.accept_sp_login_response(source, response);
        self.outbox.flush();
        let Some((artifact, code_challenge)) = accepted else {
            return;
        };

        let result = tokio::time::timeout(
            self.response_timeout,
            self.redeemer.redeem(&artifact, code_challenge.verifier()),
        )
        .await;

        {
            let mut state = lock(&self.state);
            if !state.slot.is_live(uuid) {
                tracing::debug!("Flow {} was superseded while redeeming", uuid);
                return;
            }
            match result {
                Ok(Ok(credentials)) => {
                    tracing::info!(
                        "Signed in {} of org {} via IDP",
                        credentials.account.user_id,
                        credentials.account.org_id
                    );
                    state.slot.emit(SpStatus::IdpLoginComplete);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Redeeming login artifact for flow {} failed: {}", uuid, e);
                    state.slot.emit(SpStatus::FailedToRedeem(e.to_string()));
                }
                Err(_) => {
                    tracing::warn!("Redeeming login artifact for flow {} timed out", uuid);
                    state
                        .slot
                        .emit(SpStatus::FailedToRedeem("token exchange timed out".to_string()));
                }
            }
        }
        self.outbox.flush();
    }

    /// Record `response` against the active flow. Returns what to redeem when
    /// it carries a login artifact.
    fn accept_sp_login_response(
        &self,
        source: &PackageName,
        response: SpLoginResponse,
    ) -> Option<(LoginArtifact, CodeChallenge)> {
        let uuid = response.uuid;
        let mut state = lock(&self.state);
        if !state
            .slot
            .accept_response(source, &Message::from(response.clone()))
        {
            return None;
        }
        if let Some(error) = response.error {
            tracing::info!("IDP refused flow {}: {}", uuid, error);
            state.slot.emit(SpStatus::ErrorReceivedFromIdp(error));
            state.code_challenge = None;
            return None;
        }
        let (Some(code), Some(login_url)) = (response.code, response.login_url) else {
            tracing::warn!("IDP response for flow {} carried no login artifact", uuid);
            state.slot.emit(SpStatus::ErrorReceivedFromIdp(
                "response carried no login artifact".to_string(),
            ));
            state.code_challenge = None;
            return None;
        };
        let Some(code_challenge) = state.code_challenge.take() else {
            state
                .slot
                .emit(SpStatus::FailedToRedeem("no code verifier for flow".to_string()));
            return None;
        };
        state.slot.emit(SpStatus::AuthCodeReceivedFromIdp);
        Some((LoginArtifact::new(code, login_url), code_challenge))
    }

    fn handle_idp_login_request(&self, source: &PackageName, request: IdpLoginRequest) {
        if *source != self.idp_package {
            tracing::debug!("Ignoring login push from {}, not our IDP", source);
            return;
        }
        tracing::info!(
            "IDP pushed login for user {} of org {}",
            request.user_id,
            request.org_id
        );
        let response = Message::from(IdpLoginResponse { uuid: request.uuid });
        if let Err(e) = self.channel.send(source, &response, Framing::Addressed) {
            tracing::warn!("Failed to answer {}: {}", source, e);
            return;
        }
        if let Some(listener) = &self.listener {
            listener.on_status_update(SpStatus::IdpLoginRequestAnswered);
        }
    }
}

#[async_trait]
impl MessageReceiver for SpManager {
    async fn on_message(&self, source: PackageName, message: Message) {
        match message {
            Message::SpLoginResponse(response) => {
                self.handle_sp_login_response(&source, response).await
            }
            Message::IdpLoginRequest(request) => self.handle_idp_login_request(&source, request),
            other => tracing::debug!("SP ignoring {} from {}", other.action(), source),
        }
    }
}
