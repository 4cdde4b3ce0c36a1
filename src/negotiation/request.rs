//! Incoming connection requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local answer to a connection request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// The local user accepted
    Accepted,
    /// The local user declined
    Rejected,
}

impl From<bool> for Resolution {
    fn from(accept: bool) -> Self {
        if accept {
            Self::Accepted
        } else {
            Self::Rejected
        }
    }
}

/// A negotiation opened by a remote peer, awaiting the local user's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRequest {
    /// Requesting endpoint
    pub endpoint_id: String,
    /// Remote name
    pub display_name: String,
    /// Code shown to both users for visual confirmation
    pub pairing_code: String,
    /// When the request arrived
    pub received_at: DateTime<Utc>,
    resolution: Option<Resolution>,
}

impl ConnectionRequest {
    /// Create an unresolved request
    pub fn new(endpoint_id: &str, display_name: &str, pairing_code: &str) -> Self {
        Self {
            endpoint_id: endpoint_id.to_string(),
            display_name: display_name.to_string(),
            pairing_code: pairing_code.to_string(),
            received_at: Utc::now(),
            resolution: None,
        }
    }

    /// The answer, once given
    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    /// Whether the request has been answered
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Record the answer. Only the first call has an effect; every call
    /// returns the answer in force.
    pub fn resolve(&mut self, accept: bool) -> Resolution {
        *self.resolution.get_or_insert(Resolution::from(accept))
    }
}
