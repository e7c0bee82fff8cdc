//! Flow tracking.
//!
//! A manager tracks at most one handshake at a time. Starting a new one
//! replaces whatever was in the slot; late responses for the replaced flow
//! fail the uuid check and are dropped.

use crate::status::{Status, StatusOutbox, StatusProgress, StatusUpdateCallback};
use handoff_core::{Message, PackageName};
use std::sync::Arc;
use uuid::Uuid;

/// One handshake: the message that opened it and everything since, in
/// receipt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    first_message: Message,
    messages: Vec<Message>,
}

impl Flow {
    fn new(first_message: Message) -> Self {
        Self {
            messages: vec![first_message.clone()],
            first_message,
        }
    }

    pub fn first_message(&self) -> &Message {
        &self.first_message
    }

    /// All messages of the flow, starting with the first one.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Correlation id shared by every message of the flow.
    pub fn uuid(&self) -> Uuid {
        self.first_message.uuid()
    }
}

/// Single-slot holder of the active [`Flow`].
#[derive(Debug, Default)]
pub struct FlowTracker {
    current: Option<Flow>,
}

impl FlowTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a flow, replacing any active one.
    pub fn start(&mut self, first_message: Message) -> &Flow {
        if let Some(previous) = &self.current {
            tracing::debug!("Flow {} superseded", previous.uuid());
        }
        self.current.insert(Flow::new(first_message))
    }

    /// Append to the active flow.
    pub fn append(&mut self, message: Message) -> Result<(), FlowError> {
        let flow = self.current.as_mut().ok_or(FlowError::NoActiveFlow)?;
        if message.uuid() != flow.uuid() {
            return Err(FlowError::UuidMismatch {
                expected: flow.uuid(),
                actual: message.uuid(),
            });
        }
        flow.messages.push(message);
        Ok(())
    }

    pub fn current(&self) -> Option<&Flow> {
        self.current.as_ref()
    }

    pub fn clear(&mut self) -> Option<Flow> {
        self.current.take()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("no active flow")]
    NoActiveFlow,
    #[error("message {actual} does not belong to flow {expected}")]
    UuidMismatch { expected: Uuid, actual: Uuid },
}

/// A manager's flow tracker together with who the flow talks to and who is
/// listening for its statuses.
///
/// Emitted statuses are queued on the outbox; the owner flushes it after
/// releasing the slot.
pub(crate) struct FlowSlot<S> {
    tracker: FlowTracker,
    peer: Option<PackageName>,
    progress: Option<StatusProgress<S>>,
    outbox: Arc<StatusOutbox<S>>,
}

impl<S: Status> FlowSlot<S> {
    pub(crate) fn new(outbox: Arc<StatusOutbox<S>>) -> Self {
        Self {
            tracker: FlowTracker::new(),
            peer: None,
            progress: None,
            outbox,
        }
    }

    /// Start tracking a flow opened by `first_message` towards `peer`.
    pub(crate) fn begin(
        &mut self,
        first_message: Message,
        peer: PackageName,
        callback: Arc<dyn StatusUpdateCallback<S>>,
    ) {
        self.tracker.start(first_message);
        self.peer = Some(peer);
        self.progress = Some(StatusProgress::new(callback));
    }

    pub(crate) fn flow(&self) -> Option<&Flow> {
        self.tracker.current()
    }

    /// Whether the active flow is `uuid` and has not finished.
    pub(crate) fn is_live(&self, uuid: Uuid) -> bool {
        self.flow().is_some_and(|flow| flow.uuid() == uuid)
            && self.progress.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Whether the active flow is `uuid`, unfinished, and still waiting for
    /// the peer's first answer.
    pub(crate) fn is_awaiting(&self, uuid: Uuid) -> bool {
        self.is_live(uuid) && self.flow().is_some_and(|flow| flow.messages().len() == 1)
    }

    /// Accept `response` from `source` if it answers the flow we are waiting on.
    pub(crate) fn accept_response(&mut self, source: &PackageName, response: &Message) -> bool {
        let uuid = response.uuid();
        if !self.is_awaiting(uuid) {
            tracing::debug!("Dropping {} for unknown or stale flow {}", response.action(), uuid);
            return false;
        }
        if self.peer.as_ref() != Some(source) {
            tracing::debug!("Dropping {} for flow {} from unexpected {}", response.action(), uuid, source);
            return false;
        }
        self.tracker.append(response.clone()).is_ok()
    }

    pub(crate) fn emit(&mut self, status: S) -> bool {
        let Some(pending) = self.progress.as_mut().and_then(|p| p.emit(status)) else {
            return false;
        };
        self.outbox.push(pending);
        true
    }

    /// Emit a terminal status and drop the flow.
    pub(crate) fn abandon(&mut self, status: S) {
        self.emit(status);
        self.clear();
    }

    /// Give up on `uuid` if it is still waiting for its peer.
    pub(crate) fn expire(&mut self, uuid: Uuid, status: S) -> bool {
        if !self.is_awaiting(uuid) {
            return false;
        }
        tracing::warn!("No response for flow {}, giving up", uuid);
        self.abandon(status);
        true
    }

    pub(crate) fn clear(&mut self) {
        self.tracker.clear();
        self.peer = None;
        self.progress = None;
    }
}
