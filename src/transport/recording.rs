//! Recording transport.
//!
//! Accepts every command and records it without touching a radio. Events
//! are never synthesized: whoever drives the session (a test, a replay
//! script) injects them explicitly.

use std::sync::{Arc, Mutex};

use tracing::debug;

use super::{OutgoingPayload, TransportAdapter};
use crate::error::{NearbyError, Result};
use crate::payload::{PayloadId, PayloadKind};

/// A command received by the recording transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    /// `advertise`
    Advertise {
        /// Service id
        service_id: String,
        /// Local name
        local_name: String,
    },
    /// `stop_advertise`
    StopAdvertise,
    /// `discover`
    Discover {
        /// Service id
        service_id: String,
    },
    /// `stop_discover`
    StopDiscover,
    /// `request_connection`
    RequestConnection(String),
    /// `accept_connection`
    AcceptConnection(String),
    /// `reject_connection`
    RejectConnection(String),
    /// `disconnect`
    Disconnect(String),
    /// `send`
    Send {
        /// Targets
        endpoint_ids: Vec<String>,
        /// Transfer id
        payload_id: PayloadId,
        /// Content classification
        kind: PayloadKind,
        /// Body length
        len: usize,
    },
}

/// Shared, cloneable view of the recorded calls
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl CallLog {
    /// Snapshot of all recorded calls, oldest first
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Whether `call` was recorded
    pub fn contains(&self, call: &TransportCall) -> bool {
        self.calls.lock().is_ok_and(|c| c.contains(call))
    }

    /// Forget recorded calls
    pub fn clear(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn push(&self, call: TransportCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

/// Transport that records commands
#[derive(Debug, Default)]
pub struct RecordingTransport {
    log: CallLog,
    refuse: bool,
}

impl RecordingTransport {
    /// Create a transport that accepts every command
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that refuses every command
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// Handle to the recorded calls, usable after the transport moved
    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn record(&mut self, call: TransportCall) -> Result<()> {
        if self.refuse {
            return Err(NearbyError::Transport(format!("refused {call:?}")));
        }
        debug!(?call, "Transport call");
        self.log.push(call);
        Ok(())
    }
}

impl TransportAdapter for RecordingTransport {
    fn advertise(&mut self, service_id: &str, local_name: &str) -> Result<()> {
        self.record(TransportCall::Advertise {
            service_id: service_id.to_string(),
            local_name: local_name.to_string(),
        })
    }

    fn stop_advertise(&mut self) -> Result<()> {
        self.record(TransportCall::StopAdvertise)
    }

    fn discover(&mut self, service_id: &str) -> Result<()> {
        self.record(TransportCall::Discover {
            service_id: service_id.to_string(),
        })
    }

    fn stop_discover(&mut self) -> Result<()> {
        self.record(TransportCall::StopDiscover)
    }

    fn request_connection(&mut self, endpoint_id: &str) -> Result<()> {
        self.record(TransportCall::RequestConnection(endpoint_id.to_string()))
    }

    fn accept_connection(&mut self, endpoint_id: &str) -> Result<()> {
        self.record(TransportCall::AcceptConnection(endpoint_id.to_string()))
    }

    fn reject_connection(&mut self, endpoint_id: &str) -> Result<()> {
        self.record(TransportCall::RejectConnection(endpoint_id.to_string()))
    }

    fn disconnect(&mut self, endpoint_id: &str) -> Result<()> {
        self.record(TransportCall::Disconnect(endpoint_id.to_string()))
    }

    fn send(&mut self, endpoint_ids: &[String], payload: &OutgoingPayload) -> Result<()> {
        self.record(TransportCall::Send {
            endpoint_ids: endpoint_ids.to_vec(),
            payload_id: payload.id,
            kind: payload.kind,
            len: payload.data.len(),
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls_in_order() {
        let mut transport = RecordingTransport::new();
        let log = transport.log();

        transport.advertise("svc", "me").unwrap();
        transport.request_connection("E1").unwrap();

        assert_eq!(
            log.calls(),
            vec![
                TransportCall::Advertise {
                    service_id: "svc".into(),
                    local_name: "me".into()
                },
                TransportCall::RequestConnection("E1".into()),
            ]
        );
        assert!(log.contains(&TransportCall::RequestConnection("E1".into())));

        log.clear();
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_refusing_transport() {
        let mut transport = RecordingTransport::refusing();
        let result = transport.discover("svc");
        assert!(matches!(result, Err(NearbyError::Transport(_))));
        assert!(transport.log().calls().is_empty());
    }
}
