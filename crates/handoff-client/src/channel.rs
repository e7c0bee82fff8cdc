//! Directed channel abstraction.
//!
//! A channel sends addressed messages to another app's package and delivers
//! messages addressed to the local package. Sends are fire-and-forget: there is
//! no delivery confirmation and no retry.

use async_trait::async_trait;
use handoff_core::{DecodeError, Framing, Message, PackageName};
use std::sync::{Arc, Weak};

/// Receives decoded messages from a channel.
///
/// A channel invokes its receiver once per inbound message, one message at a
/// time, with the sender identity already verified.
#[async_trait]
pub trait MessageReceiver: Send + Sync {
    async fn on_message(&self, source: PackageName, message: Message);
}

/// Addressed, package-targeted message transport.
pub trait DirectedChannel: Send + Sync {
    /// The package messages sent through this channel originate from.
    fn local_package(&self) -> &PackageName;

    /// Send `message` to `target`. Returns once handed to the transport.
    fn send(
        &self,
        target: &PackageName,
        message: &Message,
        framing: Framing,
    ) -> Result<(), ChannelError>;

    /// Start delivering inbound messages to `receiver` until the returned
    /// registration is dropped.
    fn register_receiver(
        &self,
        receiver: Arc<dyn MessageReceiver>,
    ) -> Result<Registration, ChannelError>;
}

/// Keeps a receiver registered. Unregisters on drop.
#[must_use = "dropping a Registration unregisters the receiver"]
pub struct Registration {
    unregister: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Registration {
    pub fn new(unregister: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// Unregister now.
    pub fn unregister(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("active", &self.unregister.is_some())
            .finish()
    }
}

/// Forwards to a receiver without keeping it alive.
///
/// Lets a manager register itself without the channel owning it; messages
/// arriving after the manager is gone are dropped.
pub struct WeakReceiver<T>(Weak<T>);

impl<T> WeakReceiver<T> {
    pub fn new(target: &Arc<T>) -> Self {
        Self(Arc::downgrade(target))
    }
}

#[async_trait]
impl<T: MessageReceiver + 'static> MessageReceiver for WeakReceiver<T> {
    async fn on_message(&self, source: PackageName, message: Message) {
        if let Some(target) = self.0.upgrade() {
            target.on_message(source, message).await;
        }
    }
}

/// Transport-level failure.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] DecodeError),
    #[error("receiver registration needs a running tokio runtime")]
    NoRuntime,
    #[error("channel closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn registration_unregisters_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registration = Registration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registration.unregister();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let counter = calls.clone();
        drop(Registration::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl MessageReceiver for Counter {
        async fn on_message(&self, _source: PackageName, _message: Message) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn weak_receiver_stops_after_target_drops() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let target = Arc::new(Counter(delivered.clone()));
        let weak = WeakReceiver::new(&target);
        let source: PackageName = "com.example.sp".parse().unwrap();
        let message = Message::from(handoff_core::SpLoginRequest::new("c"));

        weak.on_message(source.clone(), message.clone()).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);

        drop(target);
        weak.on_message(source, message).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }
}
