//! In-process transport.
//!
//! `LocalBus` routes envelopes between endpoints that share one process, for
//! hosts without an OS-mediated message bus and for tests. Every delivery is
//! marshalled to bytes and back, and the bus stamps the sender's package the
//! way an OS transport would.

use crate::channel::{ChannelError, DirectedChannel, MessageReceiver, Registration};
use crate::lock;
use handoff_core::{
    Envelope, Framing, Message, PackageName, SRC_APP_PACKAGE_NAME, SenderIdentityVerifier,
    TransportAttested,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

struct Delivery {
    source: PackageName,
    bytes: Vec<u8>,
}

struct Route {
    id: u64,
    tx: mpsc::UnboundedSender<Delivery>,
}

struct BusInner {
    routes: Mutex<HashMap<PackageName, Route>>,
    next_id: AtomicU64,
    verifier: Arc<dyn SenderIdentityVerifier>,
}

impl BusInner {
    fn routes(&self) -> MutexGuard<'_, HashMap<PackageName, Route>> {
        lock(&self.routes)
    }
}

/// A shared in-process message bus.
#[derive(Clone)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_verifier(Arc::new(TransportAttested))
    }

    /// Use a custom sender-identity check on every delivery.
    pub fn with_verifier(verifier: Arc<dyn SenderIdentityVerifier>) -> Self {
        Self {
            inner: Arc::new(BusInner {
                routes: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                verifier,
            }),
        }
    }

    /// A channel for the app installed as `package`.
    pub fn endpoint(&self, package: PackageName) -> BusEndpoint {
        BusEndpoint {
            package,
            inner: self.inner.clone(),
        }
    }

    /// Whether some endpoint is currently receiving for `package`.
    pub fn is_registered(&self, package: &PackageName) -> bool {
        self.inner.routes().contains_key(package)
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One app's view of a [`LocalBus`].
#[derive(Clone)]
pub struct BusEndpoint {
    package: PackageName,
    inner: Arc<BusInner>,
}

impl BusEndpoint {
    /// Send a prebuilt envelope. The bus still attests the real sender.
    pub fn send_envelope(&self, target: &PackageName, envelope: &Envelope) -> Result<(), ChannelError> {
        self.send_bytes(target, envelope.to_bytes()?);
        Ok(())
    }

    /// Send raw bytes, bypassing envelope encoding entirely.
    pub fn send_bytes(&self, target: &PackageName, bytes: Vec<u8>) {
        let routes = self.inner.routes();
        let Some(route) = routes.get(target) else {
            tracing::debug!("No receiver for {}, dropping message from {}", target, self.package);
            return;
        };
        let delivery = Delivery {
            source: self.package.clone(),
            bytes,
        };
        if route.tx.send(delivery).is_err() {
            tracing::debug!("Receiver for {} is gone, dropping message", target);
        }
    }
}

impl DirectedChannel for BusEndpoint {
    fn local_package(&self) -> &PackageName {
        &self.package
    }

    fn send(
        &self,
        target: &PackageName,
        message: &Message,
        framing: Framing,
    ) -> Result<(), ChannelError> {
        let mut envelope = message.to_framed_envelope(&framing);
        envelope.insert(SRC_APP_PACKAGE_NAME, self.package.as_str());
        tracing::debug!("{} -> {}: {}", self.package, target, message.action());
        self.send_envelope(target, &envelope)
    }

    fn register_receiver(
        &self,
        receiver: Arc<dyn MessageReceiver>,
    ) -> Result<Registration, ChannelError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ChannelError::NoRuntime)?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        if self
            .inner
            .routes()
            .insert(self.package.clone(), Route { id, tx })
            .is_some()
        {
            tracing::warn!("Replacing existing receiver for {}", self.package);
        }

        let verifier = self.inner.verifier.clone();
        let local = self.package.clone();
        handle.spawn(async move {
            while let Some(delivery) = rx.recv().await {
                dispatch(&local, verifier.as_ref(), receiver.as_ref(), delivery).await;
            }
            tracing::debug!("Dispatch for {} stopped", local);
        });

        let inner = self.inner.clone();
        let package = self.package.clone();
        Ok(Registration::new(move || {
            let mut routes = inner.routes();
            if routes.get(&package).is_some_and(|route| route.id == id) {
                routes.remove(&package);
            }
        }))
    }
}

async fn dispatch(
    local: &PackageName,
    verifier: &dyn SenderIdentityVerifier,
    receiver: &dyn MessageReceiver,
    delivery: Delivery,
) {
    let envelope = match Envelope::from_bytes(&delivery.bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Malformed delivery to {} from {}: {}", local, delivery.source, e);
            return;
        }
    };

    let Some(source) = verifier.verified_sender(&envelope, &delivery.source) else {
        tracing::debug!("Unverified sender {} for {}, dropping", delivery.source, local);
        return;
    };

    match Message::from_envelope(&envelope) {
        Ok(Some(message)) => receiver.on_message(source, message).await,
        Ok(None) => tracing::trace!("Ignoring unrelated action {:?}", envelope.action),
        Err(e) => tracing::warn!("Invalid message from {}: {}", source, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use handoff_core::{IdpLoginResponse, SpLoginRequest};
    use std::time::Duration;
    use tokio::time::timeout;
    use uuid::Uuid;

    struct Collect(mpsc::UnboundedSender<(PackageName, Message)>);

    #[async_trait]
    impl MessageReceiver for Collect {
        async fn on_message(&self, source: PackageName, message: Message) {
            let _ = self.0.send((source, message));
        }
    }

    fn pkg(s: &str) -> PackageName {
        s.parse().unwrap()
    }

    fn collector(endpoint: &BusEndpoint) -> (Registration, mpsc::UnboundedReceiver<(PackageName, Message)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registration = endpoint.register_receiver(Arc::new(Collect(tx))).unwrap();
        (registration, rx)
    }

    #[tokio::test]
    async fn delivers_with_attested_source() {
        let bus = LocalBus::new();
        let idp = bus.endpoint(pkg("com.example.idp"));
        let sp = bus.endpoint(pkg("com.example.sp"));
        let (_registration, mut rx) = collector(&idp);

        let message = Message::from(SpLoginRequest::new("challenge"));
        let launch = Framing::Launch {
            component: "LoginSurface".to_string(),
        };
        sp.send(idp.local_package(), &message, launch).unwrap();

        let (source, received) = rx.recv().await.unwrap();
        assert_eq!(source, pkg("com.example.sp"));
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn forged_hint_is_dropped() {
        let bus = LocalBus::new();
        let idp = bus.endpoint(pkg("com.example.idp"));
        let evil = bus.endpoint(pkg("com.evil.app"));
        let (_registration, mut rx) = collector(&idp);

        let mut envelope = Message::from(SpLoginRequest::new("c")).to_envelope();
        envelope.insert(SRC_APP_PACKAGE_NAME, "com.example.sp");
        evil.send_envelope(idp.local_package(), &envelope).unwrap();

        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn garbage_and_unknown_actions_do_not_stop_dispatch() {
        let bus = LocalBus::new();
        let idp = bus.endpoint(pkg("com.example.idp"));
        let sp = bus.endpoint(pkg("com.example.sp"));
        let (_registration, mut rx) = collector(&idp);

        sp.send_bytes(idp.local_package(), b"{not json".to_vec());
        sp.send_envelope(idp.local_package(), &Envelope::addressed("com.other.SYNC"))
            .unwrap();
        let message = Message::from(IdpLoginResponse { uuid: Uuid::new_v4() });
        sp.send(idp.local_package(), &message, Framing::Addressed).unwrap();

        let (_, received) = rx.recv().await.unwrap();
        assert_eq!(received, message);
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let bus = LocalBus::new();
        let idp = bus.endpoint(pkg("com.example.idp"));
        let sp = bus.endpoint(pkg("com.example.sp"));
        let (registration, mut rx) = collector(&idp);
        assert!(bus.is_registered(idp.local_package()));

        registration.unregister();
        assert!(!bus.is_registered(idp.local_package()));

        let message = Message::from(IdpLoginResponse { uuid: Uuid::new_v4() });
        sp.send(idp.local_package(), &message, Framing::Addressed).unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_to_missing_package_is_not_an_error() {
        let bus = LocalBus::new();
        let sp = bus.endpoint(pkg("com.example.sp"));
        let message = Message::from(SpLoginRequest::new("c"));
        assert!(sp.send(&pkg("com.not.installed"), &message, Framing::Addressed).is_ok());
    }

    #[test]
    fn registration_needs_runtime() {
        let bus = LocalBus::new();
        let idp = bus.endpoint(pkg("com.example.idp"));
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            idp.register_receiver(Arc::new(Collect(tx))),
            Err(ChannelError::NoRuntime)
        ));
    }
}
