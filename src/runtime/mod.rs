//! Session owner task.
//!
//! The facade is a plain `&mut self` state owner. [`SessionRuntime`] moves it
//! onto one tokio task that serializes the two inputs a session has:
//!
//! ```text
//!   SessionHandle ──Command──┐
//!                            ├──> owner task ──> SessionFacade ──> TransportAdapter
//!   transport ──Event────────┘          │
//!                                       ├──> watch<SessionSnapshot>
//!                                       └──> broadcast<Notice>
//! ```
//!
//! Commands are answered over oneshot channels after they are applied.
//! Transport events arrive on an mpsc channel whose sender the adapter clones
//! into whatever context delivers its callbacks.

mod handle;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

pub use handle::SessionHandle;
use handle::Command;

use crate::config::RuntimeConfig;
use crate::error::NearbyError;
use crate::session::{Notice, SessionFacade, SessionSnapshot};
use crate::transport::{TransportAdapter, TransportEvent};

/// Create the channel a transport adapter delivers its events on
pub fn event_channel(capacity: usize) -> (mpsc::Sender<TransportEvent>, mpsc::Receiver<TransportEvent>) {
    mpsc::channel(capacity.max(1))
}

/// Spawns session owner tasks
pub struct SessionRuntime;

impl SessionRuntime {
    /// Move `facade` onto a new task and return a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<T>(
        mut facade: SessionFacade<T>,
        events: mpsc::Receiver<TransportEvent>,
        config: &RuntimeConfig,
    ) -> SessionHandle
    where
        T: TransportAdapter + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(config.command_buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(facade.snapshot());
        let (notice_tx, _) = broadcast::channel::<Notice>(config.notice_buffer.max(1));

        let notices = notice_tx.clone();
        facade.subscribe(move |notice: &Notice, snapshot: &SessionSnapshot| {
            snapshot_tx.send_replace(snapshot.clone());
            // No receivers is fine
            let _ = notices.send(notice.clone());
        });

        info!(transport = facade.transport().name(), "Spawning session owner task");
        tokio::spawn(run_owner_loop(facade, cmd_rx, events));

        SessionHandle {
            commands: cmd_tx,
            snapshots: snapshot_rx,
            notices: notice_tx,
        }
    }
}

async fn run_owner_loop<T>(
    mut facade: SessionFacade<T>,
    mut commands: mpsc::Receiver<Command>,
    mut events: mpsc::Receiver<TransportEvent>,
) where
    T: TransportAdapter,
{
    debug!("Session owner loop running");
    let mut events_open = true;

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => match command {
                Some(command) => {
                    if !apply_command(&mut facade, command) {
                        break;
                    }
                },
                None => {
                    debug!("Every session handle dropped");
                    facade.reset();
                    break;
                },
            },

            event = events.recv(), if events_open => match event {
                Some(event) => {
                    if let Err(e) = facade.handle_event(event) {
                        log_event_error(&e);
                    }
                },
                None => {
                    debug!("Transport event channel closed");
                    events_open = false;
                },
            },
        }
    }

    debug!("Session owner loop stopped");
}

/// Apply one command; returns `false` once the loop should stop
fn apply_command<T: TransportAdapter>(facade: &mut SessionFacade<T>, command: Command) -> bool {
    // A dropped reply receiver means the caller gave up; the command still ran.
    match command {
        Command::StartAdvertising(reply) => {
            let _ = reply.send(facade.start_advertising());
        },
        Command::StopAdvertising(reply) => {
            let _ = reply.send(facade.stop_advertising());
        },
        Command::StartDiscovery(reply) => {
            let _ = reply.send(facade.start_discovery());
        },
        Command::StopDiscovery(reply) => {
            let _ = reply.send(facade.stop_discovery());
        },
        Command::RequestConnection { endpoint_id, reply } => {
            let _ = reply.send(facade.request_connection(&endpoint_id));
        },
        Command::ResolveRequest {
            endpoint_id,
            accept,
            reply,
        } => {
            let _ = reply.send(facade.resolve_request(&endpoint_id, accept));
        },
        Command::SendPayload {
            targets,
            kind,
            data,
            reply,
        } => {
            let _ = reply.send(facade.send_payload(&targets, kind, data));
        },
        Command::Disconnect { endpoint_id, reply } => {
            let _ = reply.send(facade.disconnect(&endpoint_id));
        },
        Command::DisconnectAll(reply) => {
            let _ = reply.send(facade.disconnect_all());
        },
        Command::Reset(reply) => {
            facade.reset();
            let _ = reply.send(());
        },
        Command::Apply { event, reply } => {
            let _ = reply.send(facade.handle_event(event));
        },
        Command::Received(reply) => {
            let _ = reply.send(facade.received());
        },
        Command::History(reply) => {
            let _ = reply.send(facade.payload_history());
        },
        Command::Shutdown(reply) => {
            info!("Session shutting down");
            facade.reset();
            let _ = reply.send(());
            return false;
        },
    }
    true
}

fn log_event_error(err: &NearbyError) {
    match err {
        // Already logged and published by the facade
        NearbyError::ProtocolViolation(_) => {},
        other => warn!(error = %other, "Failed to apply transport event"),
    }
}
