//! Payload transfers over established connections.
//!
//! Every send or receive creates one [`Payload`] record per connection. A
//! record is never deleted during the process lifetime; it only moves
//! through its status machine:
//!
//! ```text
//!                 ┌──> Success
//!   InProgress ───┼──> Failure
//!                 └──> Canceled
//! ```
//!
//! Terminal states are final. An adapter event that tries to move a payload
//! out of a terminal state is a protocol violation.

mod tracker;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use tracker::PayloadTracker;

/// Payload identifier, unique per transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayloadId(pub u64);

impl PayloadId {
    /// Generate a fresh random id for an outgoing transfer
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().as_u64_pair().0)
    }
}

impl fmt::Display for PayloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Received from the peer
    Incoming,
    /// Sent to the peer
    Outgoing,
}

/// Classification of payload content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// In-memory byte buffer
    #[default]
    Bytes,
    /// Open-ended stream
    Stream,
    /// File on disk
    File,
}

impl std::str::FromStr for PayloadKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bytes" => Ok(Self::Bytes),
            "stream" => Ok(Self::Stream),
            "file" => Ok(Self::File),
            _ => Err(format!("Unknown payload kind: {s}")),
        }
    }
}

/// Payload status machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadStatus {
    /// Transfer running
    InProgress,
    /// Completed (terminal)
    Success,
    /// Failed (terminal)
    Failure,
    /// Canceled (terminal)
    Canceled,
}

impl PayloadStatus {
    /// Whether no further transition is allowed
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }
}

/// Progress report delivered by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadUpdate {
    /// New status
    pub status: PayloadStatus,
    /// Bytes moved so far
    #[serde(default)]
    pub bytes_transferred: u64,
    /// Total size, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
}

impl PayloadUpdate {
    /// Status-only update
    pub fn status(status: PayloadStatus) -> Self {
        Self {
            status,
            bytes_transferred: 0,
            total_bytes: None,
        }
    }
}

/// One data transfer attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Transfer id
    pub id: PayloadId,
    /// Connection (endpoint id) the transfer belongs to
    pub connection_id: String,
    /// Incoming or outgoing
    pub direction: Direction,
    /// Content classification
    pub kind: PayloadKind,
    /// Current status
    pub status: PayloadStatus,
    /// Bytes moved so far
    pub bytes_transferred: u64,
    /// Total size, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// Received bytes (incoming `Bytes` payloads only)
    #[serde(skip)]
    pub data: Option<bytes::Bytes>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Tracker-assigned creation order
    #[serde(skip)]
    seq: u64,
}

impl Payload {
    fn new(id: PayloadId, connection_id: &str, direction: Direction, kind: PayloadKind) -> Self {
        Self {
            id,
            connection_id: connection_id.to_string(),
            direction,
            kind,
            status: PayloadStatus::InProgress,
            bytes_transferred: 0,
            total_bytes: None,
            data: None,
            created_at: Utc::now(),
            seq: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_terminal_statuses() {
        assert!(!PayloadStatus::InProgress.is_terminal());
        assert!(PayloadStatus::Success.is_terminal());
        assert!(PayloadStatus::Failure.is_terminal());
        assert!(PayloadStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!(PayloadKind::from_str("bytes").unwrap(), PayloadKind::Bytes);
        assert_eq!(PayloadKind::from_str("FILE").unwrap(), PayloadKind::File);
        assert!(PayloadKind::from_str("video").is_err());
    }

    #[test]
    fn test_random_ids_differ() {
        assert_ne!(PayloadId::random(), PayloadId::random());
    }
}
