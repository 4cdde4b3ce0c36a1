//! Scripted session replay.
//!
//! A script is a JSON document of ordered steps. Each step is either a local
//! command or a transport event injected as if the adapter had reported it.
//! Steps run through a [`SessionHandle`] one at a time, so every step sees
//! the effects of the ones before it.
//!
//! ```json
//! { "steps": [
//!     { "step": "start_discovery" },
//!     { "step": "event", "event": { "type": "peer_found", "endpoint_id": "E1", "name": "Phone" } },
//!     { "step": "request_connection", "endpoint_id": "E1" },
//!     { "step": "event", "event": { "type": "connection_result", "endpoint_id": "E1", "result": "success" } },
//!     { "step": "send_payload", "targets": ["E1"], "text": "hello" },
//!     { "step": "finish_sent", "status": "success" }
//! ] }
//! ```

use std::fmt;
use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{NearbyError, Result};
use crate::payload::{Direction, PayloadId, PayloadKind, PayloadStatus, PayloadUpdate};
use crate::runtime::SessionHandle;
use crate::transport::TransportEvent;

/// One replay step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Start advertising
    StartAdvertising,
    /// Stop advertising
    StopAdvertising,
    /// Start discovery
    StartDiscovery,
    /// Stop discovery
    StopDiscovery,
    /// Request a connection
    RequestConnection {
        /// Target endpoint
        endpoint_id: String,
    },
    /// Answer an incoming request
    ResolveRequest {
        /// Requesting endpoint
        endpoint_id: String,
        /// Accept or reject
        accept: bool,
    },
    /// Send a text payload
    SendPayload {
        /// Target connections
        targets: Vec<String>,
        /// Content classification
        #[serde(default)]
        kind: PayloadKind,
        /// UTF-8 body
        text: String,
    },
    /// Report the most recently sent payload finished on every target
    FinishSent {
        /// Final status
        status: PayloadStatus,
    },
    /// Simulate a complete incoming text payload
    Receive {
        /// Sending connection
        connection_id: String,
        /// Transfer id chosen by the sender
        payload_id: PayloadId,
        /// UTF-8 body
        text: String,
    },
    /// Close one connection or handshake
    Disconnect {
        /// Endpoint to drop
        endpoint_id: String,
    },
    /// Close everything
    DisconnectAll,
    /// Return to idle
    Reset,
    /// Inject a raw transport event
    Event {
        /// The event
        event: TransportEvent,
    },
}

impl fmt::Display for ScriptStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartAdvertising => f.write_str("start_advertising"),
            Self::StopAdvertising => f.write_str("stop_advertising"),
            Self::StartDiscovery => f.write_str("start_discovery"),
            Self::StopDiscovery => f.write_str("stop_discovery"),
            Self::RequestConnection { endpoint_id } => write!(f, "request_connection {endpoint_id}"),
            Self::ResolveRequest { endpoint_id, accept } => {
                write!(f, "resolve_request {endpoint_id} accept={accept}")
            },
            Self::SendPayload { targets, .. } => write!(f, "send_payload [{}]", targets.join(", ")),
            Self::FinishSent { status } => write!(f, "finish_sent {status:?}"),
            Self::Receive {
                connection_id,
                payload_id,
                ..
            } => write!(f, "receive {payload_id} from {connection_id}"),
            Self::Disconnect { endpoint_id } => write!(f, "disconnect {endpoint_id}"),
            Self::DisconnectAll => f.write_str("disconnect_all"),
            Self::Reset => f.write_str("reset"),
            Self::Event { event } => write!(f, "event {event}"),
        }
    }
}

/// Outcome of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// Position in the script, starting at 1
    pub index: usize,
    /// What the step did
    pub step: String,
    /// Error message if the step was refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "#{} {}: {}", self.index, self.step, error),
            None => write!(f, "#{} {}: ok", self.index, self.step),
        }
    }
}

/// Ordered replay steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Steps in execution order
    pub steps: Vec<ScriptStep>,
}

impl Script {
    /// Parse a script from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a script file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    /// Run every step against `handle`.
    ///
    /// A refused step is recorded and the run continues. Only a stopped
    /// owner task ends the run early.
    pub async fn run(&self, handle: &SessionHandle) -> Result<Vec<StepOutcome>> {
        let mut outcomes = Vec::with_capacity(self.steps.len());
        let mut last_sent: Option<PayloadId> = None;

        for (i, step) in self.steps.iter().enumerate() {
            debug!(index = i + 1, %step, "Replaying step");
            let result = match step {
                ScriptStep::StartAdvertising => handle.start_advertising().await,
                ScriptStep::StopAdvertising => handle.stop_advertising().await,
                ScriptStep::StartDiscovery => handle.start_discovery().await,
                ScriptStep::StopDiscovery => handle.stop_discovery().await,
                ScriptStep::RequestConnection { endpoint_id } => handle.request_connection(endpoint_id).await,
                ScriptStep::ResolveRequest { endpoint_id, accept } => {
                    handle.resolve_request(endpoint_id, *accept).await.map(|_| ())
                },
                ScriptStep::SendPayload { targets, kind, text } => handle
                    .send_payload(targets, *kind, Bytes::from(text.clone()))
                    .await
                    .map(|id| last_sent = Some(id)),
                ScriptStep::FinishSent { status } => finish_sent(handle, last_sent, *status).await,
                ScriptStep::Receive {
                    connection_id,
                    payload_id,
                    text,
                } => receive(handle, connection_id, *payload_id, text).await,
                ScriptStep::Disconnect { endpoint_id } => handle.disconnect(endpoint_id).await,
                ScriptStep::DisconnectAll => handle.disconnect_all().await.map(|_| ()),
                ScriptStep::Reset => handle.reset().await,
                ScriptStep::Event { event } => handle.apply_event(event.clone()).await,
            };

            if let Err(err @ NearbyError::Runtime(_)) = result {
                return Err(err);
            }

            outcomes.push(StepOutcome {
                index: i + 1,
                step: step.to_string(),
                error: result.err().map(|e| e.to_string()),
            });
        }

        info!(steps = outcomes.len(), "Script finished");
        Ok(outcomes)
    }
}

async fn finish_sent(handle: &SessionHandle, payload_id: Option<PayloadId>, status: PayloadStatus) -> Result<()> {
    let Some(payload_id) = payload_id else {
        debug!("No payload sent yet");
        return Ok(());
    };

    let targets: Vec<String> = handle
        .snapshot()
        .connections
        .iter()
        .filter(|view| {
            view.payloads
                .iter()
                .any(|p| p.id == payload_id && p.direction == Direction::Outgoing && !p.status.is_terminal())
        })
        .map(|view| view.connection.endpoint_id.clone())
        .collect();

    for connection_id in targets {
        handle
            .apply_event(TransportEvent::PayloadProgress {
                connection_id,
                payload_id,
                update: PayloadUpdate::status(status),
            })
            .await?;
    }
    Ok(())
}

async fn receive(handle: &SessionHandle, connection_id: &str, payload_id: PayloadId, text: &str) -> Result<()> {
    handle
        .apply_event(TransportEvent::PayloadStarted {
            connection_id: connection_id.to_string(),
            payload_id,
            direction: Direction::Incoming,
            kind: PayloadKind::Bytes,
        })
        .await?;
    handle
        .apply_event(TransportEvent::PayloadReceived {
            connection_id: connection_id.to_string(),
            payload_id,
            data: Bytes::from(text.to_string()),
        })
        .await?;
    handle
        .apply_event(TransportEvent::PayloadProgress {
            connection_id: connection_id.to_string(),
            payload_id,
            update: PayloadUpdate {
                status: PayloadStatus::Success,
                bytes_transferred: text.len() as u64,
                total_bytes: Some(text.len() as u64),
            },
        })
        .await
}
