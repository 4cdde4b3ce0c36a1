//! Per-endpoint negotiation state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::ConnectionRequest;
use crate::endpoint::EndpointState;
use crate::payload::Direction;

/// How a negotiation ended without a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NegotiationOutcome {
    /// The transport reported failure (timeout, radio error)
    Failed,
    /// One side declined
    Rejected,
    /// Torn down locally by `disconnect` or `reset`
    Canceled,
}

impl fmt::Display for NegotiationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Failed => "failed",
            Self::Rejected => "rejected",
            Self::Canceled => "canceled",
        };
        f.write_str(text)
    }
}

/// An established session with a peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Peer endpoint id (doubles as the connection id)
    pub endpoint_id: String,
    /// Peer name
    pub display_name: String,
    /// Who opened the negotiation
    pub initiated: Direction,
    /// Code confirmed during the handshake, if the transport supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
    /// When the connection came up
    pub established_at: DateTime<Utc>,
}

impl Connection {
    pub(crate) fn new(
        endpoint_id: &str,
        display_name: &str,
        initiated: Direction,
        pairing_code: Option<String>,
    ) -> Self {
        Self {
            endpoint_id: endpoint_id.to_string(),
            display_name: display_name.to_string(),
            initiated,
            pairing_code,
            established_at: Utc::now(),
        }
    }
}

/// Negotiation state of one endpoint.
///
/// An endpoint with no entry is `Idle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationState {
    /// We asked the peer to connect
    RequestSent {
        /// Peer name
        display_name: String,
        /// Handshake code, once the transport reports it
        pairing_code: Option<String>,
    },
    /// The peer asked us to connect, awaiting the local answer
    RequestReceived(ConnectionRequest),
    /// We accepted, awaiting the transport outcome
    Accepted(ConnectionRequest),
    /// Session established
    Connected(Connection),
    /// We declined (terminal)
    Rejected(ConnectionRequest),
    /// Ended without a connection (terminal)
    Canceled {
        /// Peer name
        display_name: String,
        /// The request, for negotiations the peer opened
        request: Option<ConnectionRequest>,
        /// Why it ended
        outcome: NegotiationOutcome,
    },
}

impl NegotiationState {
    /// Whether no further transition happens for this attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Canceled { .. })
    }

    /// Whether a handshake is in flight
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::RequestSent { .. } | Self::RequestReceived(_) | Self::Accepted(_)
        )
    }

    /// Peer name
    pub fn display_name(&self) -> &str {
        match self {
            Self::RequestSent { display_name, .. } | Self::Canceled { display_name, .. } => display_name,
            Self::RequestReceived(request) | Self::Accepted(request) | Self::Rejected(request) => {
                &request.display_name
            },
            Self::Connected(connection) => &connection.display_name,
        }
    }

    /// Endpoint state this negotiation implies, `None` once it no longer
    /// holds the endpoint
    pub fn endpoint_state(&self) -> Option<EndpointState> {
        match self {
            Self::RequestSent { .. } => Some(EndpointState::PendingOutgoing),
            Self::RequestReceived(_) | Self::Accepted(_) => Some(EndpointState::PendingIncoming),
            Self::Connected(_) => Some(EndpointState::Connected),
            Self::Rejected(_) => Some(EndpointState::Rejected),
            Self::Canceled { .. } => None,
        }
    }

    /// Short state name for logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::RequestSent { .. } => "RequestSent",
            Self::RequestReceived(_) => "RequestReceived",
            Self::Accepted(_) => "Accepted",
            Self::Connected(_) => "Connected",
            Self::Rejected(_) => "Rejected",
            Self::Canceled { .. } => "Canceled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_classification() {
        let sent = NegotiationState::RequestSent {
            display_name: "Phone".into(),
            pairing_code: None,
        };
        assert!(sent.is_pending());
        assert!(!sent.is_terminal());
        assert_eq!(sent.endpoint_state(), Some(EndpointState::PendingOutgoing));

        let rejected = NegotiationState::Rejected(ConnectionRequest::new("E1", "Phone", "1"));
        assert!(rejected.is_terminal());
        assert_eq!(rejected.endpoint_state(), Some(EndpointState::Rejected));

        let canceled = NegotiationState::Canceled {
            display_name: "Phone".into(),
            request: None,
            outcome: NegotiationOutcome::Failed,
        };
        assert!(canceled.is_terminal());
        assert_eq!(canceled.endpoint_state(), None);
        assert_eq!(canceled.display_name(), "Phone");
    }
}
