//! Handshake statuses and the callback that observes them.

use crate::lock;
use handoff_core::PackageName;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

/// A lifecycle status of one handshake.
///
/// Statuses are ranked: within one flow, each emitted status outranks the
/// previous one, and nothing follows a terminal status.
pub trait Status: Clone + fmt::Debug + Send + Sync + 'static {
    fn rank(&self) -> u8;
    fn is_terminal(&self) -> bool;
}

/// Statuses reported by the identity-provider side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdpStatus {
    /// IDP-initiated login request handed to the transport.
    LoginRequestSentToSp,
    /// The SP acknowledged the login request.
    SpLoginComplete,
    /// Kickoff refused: nobody is signed in to the IDP.
    NoCurrentUser,
    /// Kickoff refused: the target is not on the allow-list.
    SpNotTrusted(PackageName),
    /// The transport rejected the request.
    FailedToSendRequest(String),
    /// The SP never answered.
    NoResponseFromSp,
    /// Answered an SP-initiated request with a login artifact.
    LoginArtifactSentToSp(PackageName),
    /// Answered an SP-initiated request with the not-logged-in error.
    SpRequestRejectedNotLoggedIn(PackageName),
    /// Minting failed; the SP was told why.
    MintFailed(String),
}

impl Status for IdpStatus {
    fn rank(&self) -> u8 {
        match self {
            IdpStatus::LoginRequestSentToSp
            | IdpStatus::NoCurrentUser
            | IdpStatus::SpNotTrusted(_)
            | IdpStatus::FailedToSendRequest(_)
            | IdpStatus::LoginArtifactSentToSp(_)
            | IdpStatus::SpRequestRejectedNotLoggedIn(_)
            | IdpStatus::MintFailed(_) => 1,
            IdpStatus::SpLoginComplete | IdpStatus::NoResponseFromSp => 2,
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, IdpStatus::LoginRequestSentToSp)
    }
}

/// Statuses reported by the service-provider side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpStatus {
    /// SP-initiated login request handed to the transport.
    LoginRequestSentToIdp,
    /// The IDP answered with a login artifact; redeeming it.
    AuthCodeReceivedFromIdp,
    /// The artifact was redeemed and the user is signed in.
    IdpLoginComplete,
    /// The IDP answered with an error.
    ErrorReceivedFromIdp(String),
    /// Redeeming the artifact failed.
    FailedToRedeem(String),
    /// The transport rejected the request.
    FailedToSendRequest(String),
    /// Kickoff refused: the target is not the configured IDP.
    IdpNotTrusted(PackageName),
    /// The IDP never answered.
    NoResponseFromIdp,
    /// Acknowledged an IDP-initiated login request.
    IdpLoginRequestAnswered,
}

impl Status for SpStatus {
    fn rank(&self) -> u8 {
        match self {
            SpStatus::LoginRequestSentToIdp
            | SpStatus::FailedToSendRequest(_)
            | SpStatus::IdpNotTrusted(_)
            | SpStatus::IdpLoginRequestAnswered => 1,
            SpStatus::AuthCodeReceivedFromIdp
            | SpStatus::ErrorReceivedFromIdp(_)
            | SpStatus::NoResponseFromIdp => 2,
            SpStatus::IdpLoginComplete | SpStatus::FailedToRedeem(_) => 3,
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(
            self,
            SpStatus::LoginRequestSentToIdp | SpStatus::AuthCodeReceivedFromIdp
        )
    }
}

/// Observer of handshake statuses.
///
/// Called after the manager has released its flow state, so a callback may
/// read `active_flow()` or kick off a new flow. Statuses reach callbacks in
/// the order they were emitted.
pub trait StatusUpdateCallback<S>: Send + Sync {
    fn on_status_update(&self, status: S);
}

impl<S, F> StatusUpdateCallback<S> for F
where
    F: Fn(S) + Send + Sync,
{
    fn on_status_update(&self, status: S) {
        self(status)
    }
}

/// A status bound for its callback.
pub(crate) struct Pending<S> {
    callback: Arc<dyn StatusUpdateCallback<S>>,
    status: S,
}

impl<S> Pending<S> {
    pub(crate) fn deliver(self) {
        self.callback.on_status_update(self.status);
    }
}

/// Emits statuses for one flow, enforcing rank order.
pub(crate) struct StatusProgress<S> {
    callback: Arc<dyn StatusUpdateCallback<S>>,
    last_rank: u8,
    finished: bool,
}

impl<S: Status> StatusProgress<S> {
    pub(crate) fn new(callback: Arc<dyn StatusUpdateCallback<S>>) -> Self {
        Self {
            callback,
            last_rank: 0,
            finished: false,
        }
    }

    /// Accept `status` unless it would repeat or reorder.
    pub(crate) fn emit(&mut self, status: S) -> Option<Pending<S>> {
        if self.finished || status.rank() <= self.last_rank {
            tracing::debug!("Suppressing out-of-order status {:?}", status);
            return None;
        }
        self.last_rank = status.rank();
        self.finished = status.is_terminal();
        Some(Pending {
            callback: self.callback.clone(),
            status,
        })
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Ordered hand-off of statuses from a manager's locked state to callbacks.
///
/// Statuses are queued while the flow lock is held and delivered by
/// [`StatusOutbox::flush`] once it is released. Only one caller drains at a
/// time; a flush from inside a callback returns at once and the outer drain
/// picks up whatever the callback queued.
pub(crate) struct StatusOutbox<S> {
    state: Mutex<OutboxState<S>>,
}

struct OutboxState<S> {
    queue: VecDeque<Pending<S>>,
    draining: bool,
}

impl<S> StatusOutbox<S> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(OutboxState {
                queue: VecDeque::new(),
                draining: false,
            }),
        }
    }

    pub(crate) fn push(&self, pending: Pending<S>) {
        lock(&self.state).queue.push_back(pending);
    }

    /// Deliver everything queued so far.
    pub(crate) fn flush(&self) {
        {
            let mut state = lock(&self.state);
            if state.draining {
                return;
            }
            state.draining = true;
        }
        let _drain = DrainGuard(&self.state);
        loop {
            let next = {
                let mut state = lock(&self.state);
                match state.queue.pop_front() {
                    Some(next) => next,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            next.deliver();
        }
    }
}

/// Releases the drain claim when a callback panics.
struct DrainGuard<'a, S>(&'a Mutex<OutboxState<S>>);

impl<S> Drop for DrainGuard<'_, S> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            lock(self.0).draining = false;
        }
    }
}
