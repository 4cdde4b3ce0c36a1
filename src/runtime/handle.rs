//! Cloneable handle to a running session.

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::error::Result;
use crate::negotiation::Resolution;
use crate::payload::{Payload, PayloadId, PayloadKind};
use crate::session::{Notice, SessionSnapshot};
use crate::transport::TransportEvent;

type Reply<T> = oneshot::Sender<Result<T>>;

/// Commands from handles to the owner task
#[derive(Debug)]
pub(crate) enum Command {
    StartAdvertising(Reply<()>),
    StopAdvertising(Reply<()>),
    StartDiscovery(Reply<()>),
    StopDiscovery(Reply<()>),
    RequestConnection {
        endpoint_id: String,
        reply: Reply<()>,
    },
    ResolveRequest {
        endpoint_id: String,
        accept: bool,
        reply: Reply<Resolution>,
    },
    SendPayload {
        targets: Vec<String>,
        kind: PayloadKind,
        data: Bytes,
        reply: Reply<PayloadId>,
    },
    Disconnect {
        endpoint_id: String,
        reply: Reply<()>,
    },
    DisconnectAll(oneshot::Sender<usize>),
    Reset(oneshot::Sender<()>),
    Apply {
        event: TransportEvent,
        reply: Reply<()>,
    },
    Received(oneshot::Sender<Vec<(String, Bytes)>>),
    History(oneshot::Sender<Vec<Payload>>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a session owned by a [`SessionRuntime`](super::SessionRuntime).
///
/// Every method is a round trip to the owner task, so the returned value
/// reflects the command having been applied.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) commands: mpsc::Sender<Command>,
    pub(crate) snapshots: watch::Receiver<SessionSnapshot>,
    pub(crate) notices: broadcast::Sender<Notice>,
}

impl SessionHandle {
    /// Start advertising
    pub async fn start_advertising(&self) -> Result<()> {
        self.call(Command::StartAdvertising).await?
    }

    /// Stop advertising
    pub async fn stop_advertising(&self) -> Result<()> {
        self.call(Command::StopAdvertising).await?
    }

    /// Start discovery
    pub async fn start_discovery(&self) -> Result<()> {
        self.call(Command::StartDiscovery).await?
    }

    /// Stop discovery
    pub async fn stop_discovery(&self) -> Result<()> {
        self.call(Command::StopDiscovery).await?
    }

    /// Ask a discovered endpoint for a connection
    pub async fn request_connection(&self, endpoint_id: &str) -> Result<()> {
        let endpoint_id = endpoint_id.to_string();
        self.call(|reply| Command::RequestConnection { endpoint_id, reply })
            .await?
    }

    /// Accept or reject a pending incoming request
    pub async fn resolve_request(&self, endpoint_id: &str, accept: bool) -> Result<Resolution> {
        let endpoint_id = endpoint_id.to_string();
        self.call(|reply| Command::ResolveRequest {
            endpoint_id,
            accept,
            reply,
        })
        .await?
    }

    /// Send bytes to the established connections among `targets`
    pub async fn send_payload(&self, targets: &[String], kind: PayloadKind, data: Bytes) -> Result<PayloadId> {
        let targets = targets.to_vec();
        self.call(|reply| Command::SendPayload {
            targets,
            kind,
            data,
            reply,
        })
        .await?
    }

    /// Close a connection or cancel a handshake
    pub async fn disconnect(&self, endpoint_id: &str) -> Result<()> {
        let endpoint_id = endpoint_id.to_string();
        self.call(|reply| Command::Disconnect { endpoint_id, reply })
            .await?
    }

    /// Close everything; returns how many connections and handshakes ended
    pub async fn disconnect_all(&self) -> Result<usize> {
        self.call(Command::DisconnectAll).await
    }

    /// Return the session to idle
    pub async fn reset(&self) -> Result<()> {
        self.call(Command::Reset).await
    }

    /// Apply a transport event in order with commands, returning the outcome.
    ///
    /// Adapters normally push events through the channel given to
    /// [`SessionRuntime::spawn`](super::SessionRuntime::spawn); this path is
    /// for replay and tests that need the result.
    pub async fn apply_event(&self, event: TransportEvent) -> Result<()> {
        self.call(|reply| Command::Apply { event, reply }).await?
    }

    /// Received byte payloads as `(endpoint id, data)`
    pub async fn received(&self) -> Result<Vec<(String, Bytes)>> {
        self.call(Command::Received).await
    }

    /// Every payload since the last reset
    pub async fn payload_history(&self) -> Result<Vec<Payload>> {
        self.call(Command::History).await
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Follow state changes
    pub fn watch_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Follow notices from now on
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Whether the owner task is still running
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Reset the session and stop the owner task
    pub async fn shutdown(&self) -> Result<()> {
        self.call(Command::Shutdown).await
    }

    async fn call<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.commands.send(command(tx)).await?;
        Ok(rx.await?)
    }
}
