//! Identity-provider side of the handshake.

use crate::channel::{ChannelError, DirectedChannel, MessageReceiver, Registration, WeakReceiver};
use crate::collaborators::{LoginArtifactMinter, SessionManager};
use crate::flow::{Flow, FlowSlot};
use crate::lock;
use crate::status::{IdpStatus, StatusOutbox, StatusUpdateCallback};
use async_trait::async_trait;
use handoff_core::{
    Framing, IDP_NOT_LOGGED_IN, IdpLoginRequest, IdpLoginResponse, Message, PackageName,
    SpLoginRequest, SpLoginResponse, TrustRegistry,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs inside the IDP app.
///
/// Answers SP-initiated login requests from allow-listed apps and pushes
/// IDP-initiated logins to a named SP.
pub struct IdpManager {
    channel: Arc<dyn DirectedChannel>,
    registry: TrustRegistry,
    session: Arc<dyn SessionManager>,
    minter: Arc<dyn LoginArtifactMinter>,
    response_timeout: Duration,
    listener: Option<Arc<dyn StatusUpdateCallback<IdpStatus>>>,
    slot: Mutex<FlowSlot<IdpStatus>>,
    outbox: Arc<StatusOutbox<IdpStatus>>,
    registration: Mutex<Option<Registration>>,
}

impl IdpManager {
    pub fn new(
        channel: Arc<dyn DirectedChannel>,
        registry: TrustRegistry,
        session: Arc<dyn SessionManager>,
        minter: Arc<dyn LoginArtifactMinter>,
    ) -> Self {
        let outbox = Arc::new(StatusOutbox::new());
        Self {
            channel,
            registry,
            session,
            minter,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            listener: None,
            slot: Mutex::new(FlowSlot::new(outbox.clone())),
            outbox,
            registration: Mutex::new(None),
        }
    }

    /// How long an IDP-initiated login waits for the SP.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Receives statuses for SP-initiated requests this IDP answers.
    pub fn with_listener(mut self, listener: impl StatusUpdateCallback<IdpStatus> + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Begin receiving messages. Must be called within a tokio runtime.
    pub fn start(self: &Arc<Self>) -> Result<(), ChannelError> {
        let registration = self
            .channel
            .register_receiver(Arc::new(WeakReceiver::new(self)))?;
        *lock(&self.registration) = Some(registration);
        tracing::info!("IDP manager listening as {}", self.channel.local_package());
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
        lock(&self.slot).flow().cloned()
    }

    /// Push a login for the current user to `target_sp`.
    ///
    /// Returns immediately after the request is handed to the transport;
    /// progress is reported to `callback`. Returns the flow's uuid when a
    /// request went out. Only messages are exchanged: bringing the SP's UI
    /// forward is up to a caller that can present UI.
    pub fn kickoff_idp_initiated_login_flow(
        self: &Arc<Self>,
        target_sp: &PackageName,
        callback: impl StatusUpdateCallback<IdpStatus> + 'static,
    ) -> Option<Uuid> {
        let callback: Arc<dyn StatusUpdateCallback<IdpStatus>> = Arc::new(callback);

        let Some(user) = self.session.current_user() else {
            tracing::info!("Cannot push login to {}: no signed-in user", target_sp);
            callback.on_status_update(IdpStatus::NoCurrentUser);
            return None;
        };
        if !self.registry.is_allowed(target_sp) {
            tracing::info!("Cannot push login to {}: not on the allow-list", target_sp);
            callback.on_status_update(IdpStatus::SpNotTrusted(target_sp.clone()));
            return None;
        }

        let request = Message::from(IdpLoginRequest::new(user.org_id, user.user_id));
        let uuid = request.uuid();

        let sent = {
            let mut slot = lock(&self.slot);
            slot.begin(request.clone(), target_sp.clone(), callback);
            match self.channel.send(target_sp, &request, Framing::Addressed) {
                Ok(()) => {
                    tracing::info!("Sent IDP login request {} to {}", uuid, target_sp);
                    slot.emit(IdpStatus::LoginRequestSentToSp);
                    true
                }
                Err(e) => {
                    tracing::warn!("Failed to send login request to {}: {}", target_sp, e);
                    slot.abandon(IdpStatus::FailedToSendRequest(e.to_string()));
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
                lock(&manager.slot).expire(uuid, IdpStatus::NoResponseFromSp);
                manager.outbox.flush();
            }
        });
    }

    fn handle_idp_login_response(&self, source: &PackageName, response: IdpLoginResponse) {
        {
            let mut slot = lock(&self.slot);
            if slot.accept_response(source, &Message::from(response.clone())) {
                tracing::info!("{} completed login for flow {}", source, response.uuid);
                slot.emit(IdpStatus::SpLoginComplete);
            }
        }
        self.outbox.flush();
    }

    async fn handle_sp_login_request(&self, source: &PackageName, request: SpLoginRequest) {
        // Untrusted callers get no answer at all, not even an error.
        let Some(sp) = self.registry.config_for(source) else {
            tracing::debug!("Ignoring login request from untrusted {}", source);
            return;
        };

        if self.session.current_user().is_none() {
            tracing::info!("Rejecting login request from {}: not logged in", source);
            self.reply(source, SpLoginResponse::failure(request.uuid, IDP_NOT_LOGGED_IN));
            self.notify(IdpStatus::SpRequestRejectedNotLoggedIn(source.clone()));
            return;
        }

        match self
            .minter
            .mint_login_artifact(&request.code_challenge, sp)
            .await
        {
            Ok(artifact) => {
                tracing::info!("Minted login artifact for {} ({})", sp.app_name, request.uuid);
                self.reply(
                    source,
                    SpLoginResponse::success(request.uuid, artifact.code, artifact.login_url),
                );
                self.notify(IdpStatus::LoginArtifactSentToSp(source.clone()));
            }
            Err(e) => {
                tracing::warn!("Minting for {} failed: {}", source, e);
                self.reply(source, SpLoginResponse::failure(request.uuid, e.to_string()));
                self.notify(IdpStatus::MintFailed(e.to_string()));
            }
        }
    }

    fn reply(&self, target: &PackageName, response: SpLoginResponse) {
        if let Err(e) = self
            .channel
            .send(target, &response.into(), Framing::Addressed)
        {
            tracing::warn!("Failed to answer {}: {}", target, e);
        }
    }

    fn notify(&self, status: IdpStatus) {
        if let Some(listener) = &self.listener {
            listener.on_status_update(status);
        }
    }
}

#[async_trait]
impl MessageReceiver for IdpManager {
    async fn on_message(&self, source: PackageName, message: Message) {
        match message {
            Message::SpLoginRequest(request) => self.handle_sp_login_request(&source, request).await,
            Message::IdpLoginResponse(response) => self.handle_idp_login_response(&source, response),
            other => tracing::debug!("IDP ignoring {} from {}", other.action(), source),
        }
    }
}

