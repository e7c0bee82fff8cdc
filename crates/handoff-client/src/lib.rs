//! Runtime side of handoff.
//!
//! [`IdpManager`] runs in the identity-provider app and [`SpManager`] in each
//! service-provider app. Both talk over a [`DirectedChannel`] and report
//! progress through a [`StatusUpdateCallback`]; neither blocks the caller.

mod bus;
mod channel;
mod collaborators;
mod config;
mod flow;
mod idp;
mod sp;
mod status;

pub use bus::{BusEndpoint, LocalBus};
pub use channel::{ChannelError, DirectedChannel, MessageReceiver, Registration, WeakReceiver};
pub use collaborators::{ArtifactRedeemer, CollaboratorError, LoginArtifactMinter, SessionManager};
pub use config::{ConfigError, DEFAULT_LAUNCH_COMPONENT, HandoffConfig, IdpConfig};
pub use flow::{Flow, FlowError, FlowTracker};
pub use idp::IdpManager;
pub use sp::SpManager;
pub use status::{IdpStatus, SpStatus, Status, StatusUpdateCallback};

use std::sync::{Mutex, MutexGuard};

/// Lock ignoring poison; state behind these mutexes stays consistent between
/// statements.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
