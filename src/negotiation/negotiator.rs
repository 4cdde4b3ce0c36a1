//! Connection negotiator.
//!
//! Drives one [`NegotiationState`] per endpoint id from the three sources of
//! input a handshake has: local commands, remote requests and transport
//! results. Every ordering of those inputs lands in a defined state.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::request::{ConnectionRequest, Resolution};
use super::state::{Connection, NegotiationOutcome, NegotiationState};
use crate::error::{NearbyError, Result};
use crate::payload::Direction;
use crate::transport::{ConnectionResult, TransportAdapter};

struct Entry {
    state: NegotiationState,
    seq: u64,
}

/// Effect of a `ConnectionInitiated` report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Initiated {
    /// The peer opened a negotiation; awaits local resolution
    Incoming(ConnectionRequest),
    /// Handshake of our own request; accepted implicitly
    Outgoing {
        /// Code for the handshake
        pairing_code: String,
    },
}

/// Effect of a `resolve` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// First answer, forwarded to the transport
    Applied(Resolution),
    /// Already answered; nothing changed
    Repeated(Resolution),
}

impl ResolveOutcome {
    /// The answer in force
    pub fn resolution(self) -> Resolution {
        match self {
            Self::Applied(r) | Self::Repeated(r) => r,
        }
    }
}

/// Effect of a `ConnectionResult` report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultEffect {
    /// The negotiation produced a connection
    Connected(Connection),
    /// The negotiation ended without one
    Ended {
        /// Peer name
        display_name: String,
        /// How it ended
        outcome: NegotiationOutcome,
    },
    /// No live negotiation; a success must be torn down at the transport
    Stale {
        /// Whether the transport believes a connection is up
        disconnect: bool,
    },
}

/// Effect of a local `disconnect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Teardown {
    /// An established connection was closed
    Closed(Connection),
    /// A handshake in flight was canceled
    Aborted {
        /// Peer name
        display_name: String,
    },
}

/// Per-endpoint negotiation state machine
#[derive(Default)]
pub struct Negotiator {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl Negotiator {
    /// Create with no negotiations
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state for an endpoint (`None` is idle)
    pub fn state(&self, endpoint_id: &str) -> Option<&NegotiationState> {
        self.entries.get(endpoint_id).map(|e| &e.state)
    }

    /// Ask the transport to connect to `endpoint_id`.
    ///
    /// Only valid when no negotiation is live; otherwise reports
    /// `DuplicateRequest` and leaves state unchanged.
    pub fn request_connection<T>(&mut self, endpoint_id: &str, display_name: &str, transport: &mut T) -> Result<()>
    where
        T: TransportAdapter + ?Sized,
    {
        if let Some(state) = self.state(endpoint_id) {
            if !state.is_terminal() {
                info!(endpoint_id = %endpoint_id, state = state.label(), "Duplicate connection request");
                return Err(NearbyError::DuplicateRequest(endpoint_id.to_string()));
            }
        }

        transport.request_connection(endpoint_id)?;
        self.enter(
            endpoint_id,
            NegotiationState::RequestSent {
                display_name: display_name.to_string(),
                pairing_code: None,
            },
        );
        info!(endpoint_id = %endpoint_id, "Connection requested");
        Ok(())
    }

    /// Apply a `ConnectionInitiated` report.
    ///
    /// For our own request the local side accepts implicitly; otherwise a new
    /// [`ConnectionRequest`] is opened.
    pub fn on_initiated<T>(
        &mut self,
        endpoint_id: &str,
        display_name: &str,
        pairing_code: &str,
        transport: &mut T,
    ) -> Result<Initiated>
    where
        T: TransportAdapter + ?Sized,
    {
        match self.state(endpoint_id) {
            Some(NegotiationState::RequestSent { pairing_code: None, .. }) => {
                transport.accept_connection(endpoint_id)?;
                if let Some(Entry {
                    state: NegotiationState::RequestSent { pairing_code: code, .. },
                    ..
                }) = self.entries.get_mut(endpoint_id)
                {
                    *code = Some(pairing_code.to_string());
                }
                info!(endpoint_id = %endpoint_id, "Outgoing handshake accepted");
                Ok(Initiated::Outgoing {
                    pairing_code: pairing_code.to_string(),
                })
            },
            Some(state) if !state.is_terminal() => Err(NearbyError::ProtocolViolation(format!(
                "connection initiated for {endpoint_id} while {}",
                state.label()
            ))),
            _ => {
                let request = ConnectionRequest::new(endpoint_id, display_name, pairing_code);
                self.enter(endpoint_id, NegotiationState::RequestReceived(request.clone()));
                info!(endpoint_id = %endpoint_id, "Connection request received");
                Ok(Initiated::Incoming(request))
            },
        }
    }

    /// Answer a pending incoming request.
    ///
    /// A second call returns the first answer without side effects. An
    /// endpoint with no request to answer is `UnknownEndpoint`.
    pub fn resolve<T>(&mut self, endpoint_id: &str, accept: bool, transport: &mut T) -> Result<ResolveOutcome>
    where
        T: TransportAdapter + ?Sized,
    {
        let unknown = || NearbyError::UnknownEndpoint(endpoint_id.to_string());
        let entry = self.entries.get_mut(endpoint_id).ok_or_else(unknown)?;

        let prior = match &entry.state {
            NegotiationState::Accepted(request)
            | NegotiationState::Rejected(request)
            | NegotiationState::Canceled {
                request: Some(request),
                ..
            } => request.resolution(),
            NegotiationState::Connected(connection) if connection.initiated == Direction::Incoming => {
                Some(Resolution::Accepted)
            },
            NegotiationState::RequestReceived(_) => None,
            _ => return Err(unknown()),
        };
        if let Some(resolution) = prior {
            debug!(endpoint_id = %endpoint_id, ?resolution, "Request already resolved");
            return Ok(ResolveOutcome::Repeated(resolution));
        }

        let NegotiationState::RequestReceived(request) = &mut entry.state else {
            return Err(unknown());
        };

        if accept {
            transport.accept_connection(endpoint_id)?;
        } else {
            transport.reject_connection(endpoint_id)?;
        }

        let mut request = request.clone();
        let resolution = request.resolve(accept);
        entry.state = match resolution {
            Resolution::Accepted => NegotiationState::Accepted(request),
            Resolution::Rejected => NegotiationState::Rejected(request),
        };
        info!(endpoint_id = %endpoint_id, ?resolution, "Request resolved");
        Ok(ResolveOutcome::Applied(resolution))
    }

    /// Apply a `ConnectionResult` report
    pub fn on_result(&mut self, endpoint_id: &str, result: ConnectionResult) -> Result<ResultEffect> {
        let Some(entry) = self.entries.get_mut(endpoint_id) else {
            debug!(endpoint_id = %endpoint_id, ?result, "Result for idle endpoint");
            return Ok(ResultEffect::Stale {
                disconnect: result == ConnectionResult::Success,
            });
        };

        if entry.state.is_terminal() {
            debug!(endpoint_id = %endpoint_id, ?result, state = entry.state.label(), "Result for finished negotiation");
            return Ok(ResultEffect::Stale {
                disconnect: result == ConnectionResult::Success,
            });
        }

        match (result, &entry.state) {
            (_, NegotiationState::Connected(_)) | (ConnectionResult::Success, NegotiationState::RequestReceived(_)) => {
                Err(NearbyError::ProtocolViolation(format!(
                    "{result:?} result for {endpoint_id} while {}",
                    entry.state.label()
                )))
            },
            (ConnectionResult::Success, NegotiationState::RequestSent { display_name, pairing_code }) => {
                let connection =
                    Connection::new(endpoint_id, display_name, Direction::Outgoing, pairing_code.clone());
                Ok(self.connect(endpoint_id, connection))
            },
            (ConnectionResult::Success, NegotiationState::Accepted(request)) => {
                let connection = Connection::new(
                    endpoint_id,
                    &request.display_name,
                    Direction::Incoming,
                    Some(request.pairing_code.clone()),
                );
                Ok(self.connect(endpoint_id, connection))
            },
            (failure, state) => {
                let outcome = if failure == ConnectionResult::Rejected {
                    NegotiationOutcome::Rejected
                } else {
                    NegotiationOutcome::Failed
                };
                let display_name = state.display_name().to_string();
                self.cancel(endpoint_id, outcome);
                Ok(ResultEffect::Ended { display_name, outcome })
            },
        }
    }

    /// Tear down the connection or handshake for an endpoint.
    ///
    /// Returns `None` when nothing is live.
    pub fn disconnect(&mut self, endpoint_id: &str) -> Option<Teardown> {
        let state = self.state(endpoint_id)?;

        if state.is_pending() {
            let display_name = state.display_name().to_string();
            self.cancel(endpoint_id, NegotiationOutcome::Canceled);
            return Some(Teardown::Aborted { display_name });
        }

        if matches!(state, NegotiationState::Connected(_)) {
            return self.remote_disconnected(endpoint_id).map(Teardown::Closed);
        }

        None
    }

    /// Drop an established connection the transport reported closed
    pub fn remote_disconnected(&mut self, endpoint_id: &str) -> Option<Connection> {
        match self.entries.remove(endpoint_id) {
            Some(Entry {
                state: NegotiationState::Connected(connection),
                ..
            }) => {
                info!(endpoint_id = %endpoint_id, "Connection closed");
                Some(connection)
            },
            Some(entry) => {
                self.entries.insert(endpoint_id.to_string(), entry);
                None
            },
            None => None,
        }
    }

    /// Established connections in the order they came up
    pub fn connections(&self) -> Vec<&Connection> {
        self.ordered()
            .into_iter()
            .filter_map(|state| match state {
                NegotiationState::Connected(connection) => Some(connection),
                _ => None,
            })
            .collect()
    }

    /// Unresolved incoming requests in arrival order
    pub fn pending_requests(&self) -> Vec<&ConnectionRequest> {
        self.ordered()
            .into_iter()
            .filter_map(|state| match state {
                NegotiationState::RequestReceived(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Ids of endpoints with a handshake in flight or a connection up
    pub fn live_ids(&self) -> Vec<String> {
        let mut live: Vec<(&String, u64)> = self
            .entries
            .iter()
            .filter(|(_, e)| !e.state.is_terminal())
            .map(|(id, e)| (id, e.seq))
            .collect();
        live.sort_by_key(|(_, seq)| *seq);
        live.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Forget every negotiation
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn ordered(&self) -> Vec<&NegotiationState> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| &e.state).collect()
    }

    fn connect(&mut self, endpoint_id: &str, connection: Connection) -> ResultEffect {
        info!(endpoint_id = %endpoint_id, initiated = ?connection.initiated, "Connection established");
        self.enter(endpoint_id, NegotiationState::Connected(connection.clone()));
        ResultEffect::Connected(connection)
    }

    fn cancel(&mut self, endpoint_id: &str, outcome: NegotiationOutcome) {
        let Some(entry) = self.entries.get_mut(endpoint_id) else {
            return;
        };

        let display_name = entry.state.display_name().to_string();
        let request = match &entry.state {
            NegotiationState::RequestReceived(request) | NegotiationState::Accepted(request) => Some(request.clone()),
            _ => None,
        };

        if outcome == NegotiationOutcome::Failed {
            warn!(endpoint_id = %endpoint_id, from = entry.state.label(), "Negotiation failed");
        } else {
            info!(endpoint_id = %endpoint_id, from = entry.state.label(), %outcome, "Negotiation ended");
        }

        entry.state = NegotiationState::Canceled {
            display_name,
            request,
            outcome,
        };
    }

    fn enter(&mut self, endpoint_id: &str, state: NegotiationState) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(endpoint_id.to_string(), Entry { state, seq });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{RecordingTransport, TransportCall};

    fn incoming(negotiator: &mut Negotiator, transport: &mut RecordingTransport, id: &str) {
        negotiator.on_initiated(id, "Phone", "482913", transport).unwrap();
    }

    #[test]
    fn test_outgoing_handshake() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();
        let log = transport.log();

        negotiator.request_connection("E1", "Phone", &mut transport).unwrap();
        assert!(matches!(negotiator.state("E1"), Some(NegotiationState::RequestSent { .. })));

        let initiated = negotiator.on_initiated("E1", "Phone", "1234", &mut transport).unwrap();
        assert_eq!(initiated, Initiated::Outgoing { pairing_code: "1234".into() });
        assert!(negotiator.pending_requests().is_empty());

        let effect = negotiator.on_result("E1", ConnectionResult::Success).unwrap();
        let ResultEffect::Connected(connection) = effect else {
            panic!("expected connection, got {effect:?}");
        };
        assert_eq!(connection.initiated, Direction::Outgoing);
        assert_eq!(connection.pairing_code.as_deref(), Some("1234"));

        assert_eq!(
            log.calls(),
            vec![
                TransportCall::RequestConnection("E1".into()),
                TransportCall::AcceptConnection("E1".into()),
            ]
        );
    }

    #[test]
    fn test_outgoing_success_without_initiation() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();

        negotiator.request_connection("E1", "Phone", &mut transport).unwrap();
        let effect = negotiator.on_result("E1", ConnectionResult::Success).unwrap();
        assert!(matches!(effect, ResultEffect::Connected(_)));
        assert_eq!(negotiator.connections().len(), 1);
    }

    #[test]
    fn test_duplicate_request() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();

        negotiator.request_connection("E1", "Phone", &mut transport).unwrap();
        let result = negotiator.request_connection("E1", "Phone", &mut transport);
        assert!(matches!(result, Err(NearbyError::DuplicateRequest(_))));
        assert_eq!(transport.log().calls().len(), 1);

        negotiator.on_result("E1", ConnectionResult::Success).unwrap();
        let result = negotiator.request_connection("E1", "Phone", &mut transport);
        assert!(matches!(result, Err(NearbyError::DuplicateRequest(_))));
        assert_eq!(negotiator.connections().len(), 1);
    }

    #[test]
    fn test_refused_request_leaves_idle() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::refusing();

        let result = negotiator.request_connection("E1", "Phone", &mut transport);
        assert!(matches!(result, Err(NearbyError::Transport(_))));
        assert!(negotiator.state("E1").is_none());
    }

    #[test]
    fn test_incoming_accept_then_connect() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();
        incoming(&mut negotiator, &mut transport, "E1");

        assert_eq!(negotiator.pending_requests().len(), 1);
        let outcome = negotiator.resolve("E1", true, &mut transport).unwrap();
        assert_eq!(outcome, ResolveOutcome::Applied(Resolution::Accepted));
        assert!(negotiator.pending_requests().is_empty());
        assert!(transport.log().contains(&TransportCall::AcceptConnection("E1".into())));

        let effect = negotiator.on_result("E1", ConnectionResult::Success).unwrap();
        assert!(matches!(effect, ResultEffect::Connected(ref c) if c.initiated == Direction::Incoming));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();
        incoming(&mut negotiator, &mut transport, "E1");

        negotiator.resolve("E1", false, &mut transport).unwrap();
        let again = negotiator.resolve("E1", true, &mut transport).unwrap();
        assert_eq!(again, ResolveOutcome::Repeated(Resolution::Rejected));
        assert!(matches!(negotiator.state("E1"), Some(NegotiationState::Rejected(_))));
        assert_eq!(transport.log().calls(), vec![TransportCall::RejectConnection("E1".into())]);
    }

    #[test]
    fn test_resolve_after_connect_reports_accept() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();
        incoming(&mut negotiator, &mut transport, "E1");
        negotiator.resolve("E1", true, &mut transport).unwrap();
        negotiator.on_result("E1", ConnectionResult::Success).unwrap();

        let again = negotiator.resolve("E1", false, &mut transport).unwrap();
        assert_eq!(again.resolution(), Resolution::Accepted);
        assert_eq!(negotiator.connections().len(), 1);
    }

    #[test]
    fn test_resolve_unknown_endpoint() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();

        let result = negotiator.resolve("ghost", true, &mut transport);
        assert!(matches!(result, Err(NearbyError::UnknownEndpoint(_))));

        negotiator.request_connection("E1", "Phone", &mut transport).unwrap();
        let result = negotiator.resolve("E1", true, &mut transport);
        assert!(matches!(result, Err(NearbyError::UnknownEndpoint(_))));
    }

    #[test]
    fn test_result_before_local_answer() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();
        incoming(&mut negotiator, &mut transport, "E1");

        let result = negotiator.on_result("E1", ConnectionResult::Success);
        assert!(matches!(result, Err(NearbyError::ProtocolViolation(_))));
        assert_eq!(negotiator.pending_requests().len(), 1);

        let effect = negotiator.on_result("E1", ConnectionResult::Failure).unwrap();
        assert!(matches!(
            effect,
            ResultEffect::Ended {
                outcome: NegotiationOutcome::Failed,
                ..
            }
        ));
        assert!(negotiator.pending_requests().is_empty());
        let result = negotiator.resolve("E1", true, &mut transport);
        assert!(matches!(result, Err(NearbyError::UnknownEndpoint(_))));
    }

    #[test]
    fn test_remote_rejection_allows_retry() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();

        negotiator.request_connection("E1", "Phone", &mut transport).unwrap();
        let effect = negotiator.on_result("E1", ConnectionResult::Rejected).unwrap();
        assert!(matches!(
            effect,
            ResultEffect::Ended {
                outcome: NegotiationOutcome::Rejected,
                ..
            }
        ));

        negotiator.request_connection("E1", "Phone", &mut transport).unwrap();
        assert!(matches!(negotiator.state("E1"), Some(NegotiationState::RequestSent { .. })));
    }

    #[test]
    fn test_stale_success_requests_disconnect() {
        let mut negotiator = Negotiator::new();
        let effect = negotiator.on_result("E1", ConnectionResult::Success).unwrap();
        assert_eq!(effect, ResultEffect::Stale { disconnect: true });

        let effect = negotiator.on_result("E1", ConnectionResult::Failure).unwrap();
        assert_eq!(effect, ResultEffect::Stale { disconnect: false });
    }

    #[test]
    fn test_concurrent_incoming_requests() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();
        incoming(&mut negotiator, &mut transport, "E1");
        incoming(&mut negotiator, &mut transport, "E2");

        negotiator.resolve("E1", false, &mut transport).unwrap();
        let pending: Vec<&str> = negotiator
            .pending_requests()
            .into_iter()
            .map(|r| r.endpoint_id.as_str())
            .collect();
        assert_eq!(pending, vec!["E2"]);
    }

    #[test]
    fn test_duplicate_initiation_is_violation() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();
        incoming(&mut negotiator, &mut transport, "E1");

        let result = negotiator.on_initiated("E1", "Phone", "000000", &mut transport);
        assert!(matches!(result, Err(NearbyError::ProtocolViolation(_))));
        assert_eq!(negotiator.pending_requests()[0].pairing_code, "482913");
    }

    #[test]
    fn test_disconnect_pending_and_connected() {
        let mut negotiator = Negotiator::new();
        let mut transport = RecordingTransport::new();
        negotiator.request_connection("E1", "Phone", &mut transport).unwrap();

        assert_eq!(
            negotiator.disconnect("E1"),
            Some(Teardown::Aborted {
                display_name: "Phone".into()
            })
        );
        assert!(matches!(
            negotiator.state("E1"),
            Some(NegotiationState::Canceled {
                outcome: NegotiationOutcome::Canceled,
                ..
            })
        ));
        assert_eq!(negotiator.disconnect("E1"), None);

        negotiator.request_connection("E1", "Phone", &mut transport).unwrap();
        negotiator.on_result("E1", ConnectionResult::Success).unwrap();
        assert!(matches!(negotiator.disconnect("E1"), Some(Teardown::Closed(_))));
        assert!(negotiator.state("E1").is_none());
        assert!(negotiator.live_ids().is_empty());
    }
}
