//! Endpoint notifications.
//!
//! Explicit broadcast channels instead of multicast delegate fields: emitters
//! never block, slow subscribers lag and drop, and every interested party
//! calls `subscribe()` for its own receiver.

use std::sync::Arc;

use standlink_core::{IdentityExtractor, StandInfo};
use tokio::sync::broadcast;
use tracing::warn;

// MARK: - EndpointEvent

/// Fire-and-forget lifecycle signal surfaced to UI/logging subscribers.
///
/// `Connectivity(false)` is the sole upward signal for any disconnect cause;
/// cause detail goes to the logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointEvent {
    /// Transport opened (`true`) or torn down (`false`).
    Connectivity(bool),
    /// Hub listener started (`true`) or stopped (`false`).
    ServerStatus(bool),
}

// MARK: - StandNotifier

/// A stand-level connect/disconnect notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandEvent {
    Connected(StandInfo),
    Disconnected(StandInfo),
}

/// Translates raw peer names into [`StandEvent`]s for subscribers that think
/// in stand numbers rather than transports.
pub struct StandNotifier {
    extractor: Arc<dyn IdentityExtractor>,
    events: broadcast::Sender<StandEvent>,
}

impl StandNotifier {
    pub fn new(extractor: Arc<dyn IdentityExtractor>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self { extractor, events }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StandEvent> {
        self.events.subscribe()
    }

    pub fn notify_connected(&self, peer_name_raw: &str) {
        self.notify(peer_name_raw, StandEvent::Connected as fn(StandInfo) -> StandEvent);
    }

    pub fn notify_disconnected(&self, peer_name_raw: &str) {
        self.notify(peer_name_raw, StandEvent::Disconnected as fn(StandInfo) -> StandEvent);
    }

    fn notify(&self, peer_name_raw: &str, wrap: fn(StandInfo) -> StandEvent) {
        match self.extractor.extract(peer_name_raw) {
            Ok(stand) => {
                let _ = self.events.send(wrap(stand));
            }
            Err(e) => warn!("Dropping stand notification for '{}': {}", peer_name_raw, e),
        }
    }
}
