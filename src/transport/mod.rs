//! Transport adapter boundary.
//!
//! The radio technology (Bluetooth, Wi-Fi Direct, mDNS...) is opaque to the
//! session core. It is driven through the narrow [`TransportAdapter`]
//! command interface and reports back through [`TransportEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             SessionFacade               │
//! │        (transport-agnostic core)        │
//! └───────────┬─────────────────▲───────────┘
//!   commands  │                 │  TransportEvent
//!   (fire and │                 │  (mpsc, from any
//!    forget)  ▼                 │   background context)
//! ┌─────────────────────────────┴───────────┐
//! │          impl TransportAdapter          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Commands never block: an adapter queues the work and reports the outcome
//! later as an event. Returning `Err` from a command means the adapter
//! refused it outright; nothing was started.

mod recording;

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use recording::{CallLog, RecordingTransport, TransportCall};

use crate::error::Result;
use crate::payload::{Direction, PayloadId, PayloadKind, PayloadUpdate};

/// An outgoing payload handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingPayload {
    /// Transfer id, echoed back in progress events
    pub id: PayloadId,
    /// Content classification
    pub kind: PayloadKind,
    /// Body
    pub data: Bytes,
}

/// Command side of a transport.
///
/// Implementations must be cheap and non-blocking; results arrive later as
/// [`TransportEvent`]s.
pub trait TransportAdapter: Send {
    /// Start advertising `local_name` under `service_id`.
    fn advertise(&mut self, service_id: &str, local_name: &str) -> Result<()>;

    /// Stop advertising.
    fn stop_advertise(&mut self) -> Result<()>;

    /// Start discovering peers advertising `service_id`.
    fn discover(&mut self, service_id: &str) -> Result<()>;

    /// Stop discovering.
    fn stop_discover(&mut self) -> Result<()>;

    /// Ask a discovered peer for a connection.
    fn request_connection(&mut self, endpoint_id: &str) -> Result<()>;

    /// Accept a connection initiated by or with a peer.
    fn accept_connection(&mut self, endpoint_id: &str) -> Result<()>;

    /// Decline a connection initiated by a peer.
    fn reject_connection(&mut self, endpoint_id: &str) -> Result<()>;

    /// Tear down a connection or pending negotiation.
    fn disconnect(&mut self, endpoint_id: &str) -> Result<()>;

    /// Send one payload to every listed endpoint.
    fn send(&mut self, endpoint_ids: &[String], payload: &OutgoingPayload) -> Result<()>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;
}

/// Outcome of a negotiation as reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionResult {
    /// Both sides accepted, the connection is up
    Success,
    /// The attempt failed (timeout, radio error, remote cancel)
    Failure,
    /// The remote side declined
    Rejected,
}

/// Events delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// Discovery found a peer
    PeerFound {
        /// Endpoint id
        endpoint_id: String,
        /// Advertised name
        name: String,
    },
    /// Discovery lost a peer
    PeerLost {
        /// Endpoint id
        endpoint_id: String,
    },
    /// A negotiation started (remote request, or the handshake of our own)
    ConnectionInitiated {
        /// Endpoint id
        endpoint_id: String,
        /// Remote name
        name: String,
        /// Code both users compare out of band
        pairing_code: String,
    },
    /// A negotiation finished
    ConnectionResult {
        /// Endpoint id
        endpoint_id: String,
        /// Outcome
        result: ConnectionResult,
    },
    /// An established connection dropped
    Disconnected {
        /// Endpoint id
        endpoint_id: String,
    },
    /// A transfer started on a connection
    PayloadStarted {
        /// Connection (endpoint) id
        connection_id: String,
        /// Transfer id
        payload_id: PayloadId,
        /// Incoming or outgoing
        direction: Direction,
        /// Content classification
        kind: PayloadKind,
    },
    /// A transfer progressed or finished
    PayloadProgress {
        /// Connection (endpoint) id
        connection_id: String,
        /// Transfer id
        payload_id: PayloadId,
        /// Progress report
        #[serde(flatten)]
        update: PayloadUpdate,
    },
    /// The body of an incoming byte payload
    PayloadReceived {
        /// Connection (endpoint) id
        connection_id: String,
        /// Transfer id
        payload_id: PayloadId,
        /// Body
        data: Bytes,
    },
}

impl TransportEvent {
    /// Endpoint or connection id the event concerns
    pub fn endpoint_id(&self) -> &str {
        match self {
            Self::PeerFound { endpoint_id, .. }
            | Self::PeerLost { endpoint_id }
            | Self::ConnectionInitiated { endpoint_id, .. }
            | Self::ConnectionResult { endpoint_id, .. }
            | Self::Disconnected { endpoint_id } => endpoint_id,
            Self::PayloadStarted { connection_id, .. }
            | Self::PayloadProgress { connection_id, .. }
            | Self::PayloadReceived { connection_id, .. } => connection_id,
        }
    }
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerFound { endpoint_id, name } => write!(f, "peer found {endpoint_id} ({name})"),
            Self::PeerLost { endpoint_id } => write!(f, "peer lost {endpoint_id}"),
            Self::ConnectionInitiated { endpoint_id, .. } => {
                write!(f, "connection initiated {endpoint_id}")
            },
            Self::ConnectionResult { endpoint_id, result } => {
                write!(f, "connection result {endpoint_id}: {result:?}")
            },
            Self::Disconnected { endpoint_id } => write!(f, "disconnected {endpoint_id}"),
            Self::PayloadStarted {
                connection_id,
                payload_id,
                ..
            } => write!(f, "payload {payload_id} started on {connection_id}"),
            Self::PayloadProgress {
                connection_id,
                payload_id,
                update,
            } => write!(f, "payload {payload_id} on {connection_id}: {:?}", update.status),
            Self::PayloadReceived {
                connection_id,
                payload_id,
                data,
            } => write!(f, "payload {payload_id} on {connection_id}: {} bytes", data.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadStatus;

    #[test]
    fn test_event_from_json() {
        let json = r#"{"type":"connection_initiated","endpoint_id":"E1","name":"Phone","pairing_code":"482913"}"#;
        let event: TransportEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            TransportEvent::ConnectionInitiated {
                endpoint_id: "E1".into(),
                name: "Phone".into(),
                pairing_code: "482913".into(),
            }
        );
        assert_eq!(event.endpoint_id(), "E1");
    }

    #[test]
    fn test_progress_event_flattens_update() {
        let json = r#"{"type":"payload_progress","connection_id":"C1","payload_id":5,"status":"success","bytes_transferred":3}"#;
        let event: TransportEvent = serde_json::from_str(json).unwrap();
        match event {
            TransportEvent::PayloadProgress { update, payload_id, .. } => {
                assert_eq!(payload_id, PayloadId(5));
                assert_eq!(update.status, PayloadStatus::Success);
                assert_eq!(update.bytes_transferred, 3);
                assert_eq!(update.total_bytes, None);
            },
            other => panic!("unexpected event {other:?}"),
        }
    }
}
