//! Gateway event system.
//!
//! Operational signals (abuse flags, store degradation) travel here and to
//! the logs. None of them are ever returned to clients.

use crate::abuse::AbuseReason;
use tokio::sync::broadcast;

/// Events emitted by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum GateEvent {
    /// Gateway has started serving.
    Started {
        /// Bound listen address.
        address: String,
    },

    /// Gateway is shutting down.
    ShuttingDown,

    /// A capability token was issued.
    AccessGranted {
        /// Wallet identity.
        identity: String,
        /// Content identifier.
        content_id: String,
    },

    /// The gating rule was not satisfied or could not be evaluated.
    AccessDenied {
        /// Wallet identity.
        identity: String,
        /// Content identifier.
        content_id: String,
        /// `insufficient_balance` or `unavailable`.
        reason: &'static str,
    },

    /// A token was redeemed at the delivery endpoint.
    StreamStarted {
        /// Wallet identity.
        identity: String,
        /// Content identifier.
        content_id: String,
    },

    /// The abuse monitor flagged a playback pattern.
    SuspiciousActivity {
        /// Wallet identity.
        identity: String,
        /// Heuristics that fired.
        reasons: Vec<AbuseReason>,
    },

    /// The counter store failed and a component fell back to fail-open.
    StoreDegraded {
        /// `rate_limiter` or `abuse_monitor`.
        component: &'static str,
        /// Store error message.
        message: String,
    },
}

/// Channel for receiving gateway events.
pub type GateEventsChannel = broadcast::Receiver<GateEvent>;

/// Sender for gateway events.
pub type GateEventsSender = broadcast::Sender<GateEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (GateEventsSender, GateEventsChannel) {
    broadcast::channel(256)
}
