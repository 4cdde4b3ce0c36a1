//! Discovered peers and their lifecycle.
//!
//! An endpoint is a peer identified by a transport-assigned id. It enters the
//! registry when discovery reports it (or when it opens a negotiation with
//! us) and leaves it when the transport reports it lost, unless it is
//! connected.
//!
//! ## Endpoint States
//!
//! | State             | Meaning                                  |
//! |-------------------|------------------------------------------|
//! | `Discovered`      | Visible, no live negotiation             |
//! | `PendingOutgoing` | We asked to connect, awaiting outcome    |
//! | `PendingIncoming` | Peer asked to connect, awaiting outcome  |
//! | `Connected`       | Session established                      |
//! | `Rejected`        | We declined the peer's request           |
//! | `Lost`            | Transport lost sight of it (transient)   |

mod registry;

use serde::{Deserialize, Serialize};

pub use registry::EndpointRegistry;

/// Lifecycle state of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointState {
    /// Visible and idle
    Discovered,
    /// Outgoing request in flight
    PendingOutgoing,
    /// Incoming request awaiting resolution or outcome
    PendingIncoming,
    /// Session established
    Connected,
    /// Incoming request was declined locally
    Rejected,
    /// No longer visible
    Lost,
}

impl EndpointState {
    /// Whether a negotiation is in flight for the endpoint
    pub fn is_pending(self) -> bool {
        matches!(self, Self::PendingOutgoing | Self::PendingIncoming)
    }

    /// Whether discovery refreshes must leave this state alone
    pub fn is_sticky(self) -> bool {
        self.is_pending() || self == Self::Connected
    }
}

/// A discovered peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Transport-assigned id, stable while the peer stays visible
    pub id: String,
    /// Human-readable label, not unique
    pub display_name: String,
    /// Current lifecycle state
    pub state: EndpointState,
}

impl Endpoint {
    /// Create a freshly discovered endpoint
    pub fn discovered(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            state: EndpointState::Discovered,
        }
    }
}
