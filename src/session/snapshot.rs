//! Published session state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::endpoint::Endpoint;
use crate::negotiation::{Connection, ConnectionRequest, NegotiationOutcome, Resolution};
use crate::payload::{Direction, Payload, PayloadId, PayloadStatus};

/// An established connection with its transfers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionView {
    /// The connection
    #[serde(flatten)]
    pub connection: Connection,
    /// Transfers in creation order (most recent last)
    pub payloads: Vec<Payload>,
}

/// Point-in-time copy of everything observers render
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Advertising toggle
    pub advertising: bool,
    /// Discovery toggle
    pub discovering: bool,
    /// Known endpoints in discovery order
    pub endpoints: Vec<Endpoint>,
    /// Incoming requests awaiting an answer, in arrival order
    pub pending_requests: Vec<ConnectionRequest>,
    /// Established connections in the order they came up
    pub connections: Vec<ConnectionView>,
}

impl SessionSnapshot {
    /// Whether the session is in its initial, fully idle state
    pub fn is_idle(&self) -> bool {
        !self.advertising
            && !self.discovering
            && self.endpoints.is_empty()
            && self.pending_requests.is_empty()
            && self.connections.is_empty()
    }

    /// Look up a connection by endpoint id
    pub fn connection(&self, endpoint_id: &str) -> Option<&ConnectionView> {
        self.connections
            .iter()
            .find(|c| c.connection.endpoint_id == endpoint_id)
    }
}

/// What changed, delivered to observers alongside the new snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    /// Advertising started
    AdvertisingStarted,
    /// Advertising stopped
    AdvertisingStopped,
    /// Discovery started
    DiscoveryStarted,
    /// Discovery stopped
    DiscoveryStopped,
    /// Discovery reported a new or renamed peer
    EndpointFound {
        /// Endpoint id
        endpoint_id: String,
        /// Advertised name
        name: String,
    },
    /// Discovery lost a peer
    EndpointLost {
        /// Endpoint id
        endpoint_id: String,
    },
    /// We asked a peer to connect
    RequestSent {
        /// Endpoint id
        endpoint_id: String,
    },
    /// A request was already live for the peer
    DuplicateRequest {
        /// Endpoint id
        endpoint_id: String,
    },
    /// A peer asked to connect
    RequestReceived {
        /// Endpoint id
        endpoint_id: String,
        /// Remote name
        name: String,
        /// Code to compare
        pairing_code: String,
    },
    /// Handshake of our own request began
    HandshakeStarted {
        /// Endpoint id
        endpoint_id: String,
        /// Code to compare
        pairing_code: String,
    },
    /// The local user answered a request
    RequestResolved {
        /// Endpoint id
        endpoint_id: String,
        /// The answer
        resolution: Resolution,
    },
    /// A connection came up
    Connected {
        /// Endpoint id
        endpoint_id: String,
        /// Peer name
        name: String,
    },
    /// A negotiation ended without a connection
    NegotiationEnded {
        /// Endpoint id
        endpoint_id: String,
        /// How it ended
        outcome: NegotiationOutcome,
    },
    /// A connection was closed
    Disconnected {
        /// Endpoint id
        endpoint_id: String,
        /// Closed by the peer or transport rather than locally
        remote: bool,
    },
    /// A payload was handed to the transport
    PayloadQueued {
        /// Transfer id
        payload_id: PayloadId,
        /// Number of connections it goes to
        targets: usize,
    },
    /// A send had nowhere to go
    NoActiveConnections,
    /// The transport began a transfer
    PayloadStarted {
        /// Connection id
        connection_id: String,
        /// Transfer id
        payload_id: PayloadId,
        /// Incoming or outgoing
        direction: Direction,
    },
    /// A transfer progressed or finished
    PayloadUpdated {
        /// Connection id
        connection_id: String,
        /// Transfer id
        payload_id: PayloadId,
        /// New status
        status: PayloadStatus,
    },
    /// Bytes of an incoming payload arrived
    PayloadReceived {
        /// Connection id
        connection_id: String,
        /// Transfer id
        payload_id: PayloadId,
        /// Body length
        len: usize,
    },
    /// The transport reported something inconsistent; state unchanged
    ProtocolViolation {
        /// What was wrong
        detail: String,
    },
    /// The session returned to idle
    Reset,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdvertisingStarted => f.write_str("advertising started"),
            Self::AdvertisingStopped => f.write_str("advertising stopped"),
            Self::DiscoveryStarted => f.write_str("discovery started"),
            Self::DiscoveryStopped => f.write_str("discovery stopped"),
            Self::EndpointFound { endpoint_id, name } => write!(f, "endpoint found: {name} ({endpoint_id})"),
            Self::EndpointLost { endpoint_id } => write!(f, "endpoint lost: {endpoint_id}"),
            Self::RequestSent { endpoint_id } => write!(f, "connection requested: {endpoint_id}"),
            Self::DuplicateRequest { endpoint_id } => {
                write!(f, "request already in progress: {endpoint_id}")
            },
            Self::RequestReceived {
                endpoint_id,
                name,
                pairing_code,
            } => write!(f, "{name} ({endpoint_id}) wants to connect, code {pairing_code}"),
            Self::HandshakeStarted {
                endpoint_id,
                pairing_code,
            } => write!(f, "confirm code {pairing_code} with {endpoint_id}"),
            Self::RequestResolved {
                endpoint_id,
                resolution,
            } => match resolution {
                Resolution::Accepted => write!(f, "accepted {endpoint_id}"),
                Resolution::Rejected => write!(f, "rejected {endpoint_id}"),
            },
            Self::Connected { endpoint_id, name } => write!(f, "connected: {name} ({endpoint_id})"),
            Self::NegotiationEnded { endpoint_id, outcome } => {
                write!(f, "connection to {endpoint_id} {outcome}")
            },
            Self::Disconnected { endpoint_id, remote } => {
                if *remote {
                    write!(f, "{endpoint_id} disconnected")
                } else {
                    write!(f, "disconnected from {endpoint_id}")
                }
            },
            Self::PayloadQueued { payload_id, targets } => {
                write!(f, "sending payload {payload_id} to {targets} device(s)")
            },
            Self::NoActiveConnections => f.write_str("no devices to send to"),
            Self::PayloadStarted {
                connection_id,
                payload_id,
                direction,
            } => write!(f, "payload {payload_id} {direction:?} on {connection_id}"),
            Self::PayloadUpdated {
                connection_id,
                payload_id,
                status,
            } => write!(f, "payload {payload_id} on {connection_id}: {status:?}"),
            Self::PayloadReceived {
                connection_id,
                payload_id,
                len,
            } => write!(f, "received {len} bytes from {connection_id} (payload {payload_id})"),
            Self::ProtocolViolation { detail } => write!(f, "protocol violation: {detail}"),
            Self::Reset => f.write_str("reset"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_snapshot_is_idle() {
        assert!(SessionSnapshot::default().is_idle());
        let snapshot = SessionSnapshot {
            advertising: true,
            ..Default::default()
        };
        assert!(!snapshot.is_idle());
    }

    #[test]
    fn test_notice_status_lines() {
        let notice = Notice::RequestReceived {
            endpoint_id: "E1".into(),
            name: "Phone".into(),
            pairing_code: "482913".into(),
        };
        assert_eq!(notice.to_string(), "Phone (E1) wants to connect, code 482913");
        assert_eq!(Notice::NoActiveConnections.to_string(), "no devices to send to");
    }

    #[test]
    fn test_notice_serializes_tagged() {
        let json = serde_json::to_value(Notice::EndpointLost {
            endpoint_id: "E1".into(),
        })
        .unwrap();
        assert_eq!(json["notice"], "endpoint_lost");
        assert_eq!(json["endpoint_id"], "E1");
    }
}
