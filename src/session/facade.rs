//! Session facade.
//!
//! Owns the endpoint registry, the negotiator and the payload tracker, and
//! is the only thing that mutates them. Every mutation is published to the
//! observers before the call returns.

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::observer::{ObserverList, SessionObserver, Subscription};
use super::snapshot::{ConnectionView, Notice, SessionSnapshot};
use crate::config::SessionConfig;
use crate::endpoint::{Endpoint, EndpointRegistry, EndpointState};
use crate::error::{NearbyError, Result};
use crate::negotiation::{
    Connection, ConnectionRequest, Initiated, NegotiationOutcome, NegotiationState, Negotiator, Resolution,
    ResolveOutcome, ResultEffect, Teardown,
};
use crate::payload::{Direction, Payload, PayloadId, PayloadKind, PayloadStatus, PayloadTracker};
use crate::transport::{TransportAdapter, TransportEvent};

/// Single public surface of the session core
pub struct SessionFacade<T: TransportAdapter> {
    config: SessionConfig,
    transport: T,
    registry: EndpointRegistry,
    negotiator: Negotiator,
    tracker: PayloadTracker,
    advertising: bool,
    discovering: bool,
    observers: ObserverList,
}

impl<T: TransportAdapter> SessionFacade<T> {
    /// Create an idle session driving `transport`
    pub fn new(config: SessionConfig, transport: T) -> Self {
        info!(transport = transport.name(), service_id = %config.service_id, "Session created");
        Self {
            config,
            transport,
            registry: EndpointRegistry::new(),
            negotiator: Negotiator::new(),
            tracker: PayloadTracker::new(),
            advertising: false,
            discovering: false,
            observers: ObserverList::new(),
        }
    }

    /// Register an observer
    pub fn subscribe(&mut self, observer: impl SessionObserver + 'static) -> Subscription {
        self.observers.subscribe(Box::new(observer))
    }

    /// Remove an observer
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.observers.unsubscribe(subscription)
    }

    /// Session identity
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The driven transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether advertising is on
    pub fn is_advertising(&self) -> bool {
        self.advertising
    }

    /// Whether discovery is on
    pub fn is_discovering(&self) -> bool {
        self.discovering
    }

    /// Look up a known endpoint
    pub fn endpoint(&self, endpoint_id: &str) -> Option<&Endpoint> {
        self.registry.find(endpoint_id)
    }

    /// Negotiation state for an endpoint (`None` is idle)
    pub fn negotiation(&self, endpoint_id: &str) -> Option<&NegotiationState> {
        self.negotiator.state(endpoint_id)
    }

    /// Every payload since the last reset, oldest first
    pub fn payload_history(&self) -> Vec<Payload> {
        self.tracker.history()
    }

    /// Received byte payloads as `(endpoint id, data)`, oldest first
    pub fn received(&self) -> Vec<(String, Bytes)> {
        self.tracker.received()
    }

    /// Current state
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            advertising: self.advertising,
            discovering: self.discovering,
            endpoints: self.registry.endpoints(),
            pending_requests: self
                .negotiator
                .pending_requests()
                .into_iter()
                .cloned()
                .collect::<Vec<ConnectionRequest>>(),
            connections: self
                .negotiator
                .connections()
                .into_iter()
                .map(|connection: &Connection| ConnectionView {
                    connection: connection.clone(),
                    payloads: self.tracker.payloads(&connection.endpoint_id).to_vec(),
                })
                .collect(),
        }
    }

    // ── Radio ───────────────────────────────────────────────────────

    /// Start advertising; a no-op when already advertising
    pub fn start_advertising(&mut self) -> Result<()> {
        if self.advertising {
            debug!("Already advertising");
            return Ok(());
        }
        self.transport
            .advertise(&self.config.service_id, &self.config.local_name)?;
        self.advertising = true;
        info!(local_name = %self.config.local_name, "Advertising started");
        self.publish(Notice::AdvertisingStarted);
        Ok(())
    }

    /// Stop advertising; a no-op when not advertising
    pub fn stop_advertising(&mut self) -> Result<()> {
        if !self.advertising {
            return Ok(());
        }
        self.transport.stop_advertise()?;
        self.advertising = false;
        info!("Advertising stopped");
        self.publish(Notice::AdvertisingStopped);
        Ok(())
    }

    /// Start discovery; a no-op when already discovering
    pub fn start_discovery(&mut self) -> Result<()> {
        if self.discovering {
            debug!("Already discovering");
            return Ok(());
        }
        self.transport.discover(&self.config.service_id)?;
        self.discovering = true;
        info!("Discovery started");
        self.publish(Notice::DiscoveryStarted);
        Ok(())
    }

    /// Stop discovery; a no-op when not discovering
    pub fn stop_discovery(&mut self) -> Result<()> {
        if !self.discovering {
            return Ok(());
        }
        self.transport.stop_discover()?;
        self.discovering = false;
        info!("Discovery stopped");
        self.publish(Notice::DiscoveryStopped);
        Ok(())
    }

    // ── Negotiation ─────────────────────────────────────────────────

    /// Ask a known endpoint for a connection
    pub fn request_connection(&mut self, endpoint_id: &str) -> Result<()> {
        let Some(endpoint) = self.registry.find(endpoint_id) else {
            return Err(NearbyError::UnknownEndpoint(endpoint_id.to_string()));
        };
        let display_name = endpoint.display_name.clone();

        match self
            .negotiator
            .request_connection(endpoint_id, &display_name, &mut self.transport)
        {
            Ok(()) => {
                self.registry.set_state(endpoint_id, EndpointState::PendingOutgoing);
                self.publish(Notice::RequestSent {
                    endpoint_id: endpoint_id.to_string(),
                });
                Ok(())
            },
            Err(err @ NearbyError::DuplicateRequest(_)) => {
                self.publish(Notice::DuplicateRequest {
                    endpoint_id: endpoint_id.to_string(),
                });
                Err(err)
            },
            Err(err) => Err(err),
        }
    }

    /// Answer a pending incoming request. Repeated calls return the first
    /// answer and change nothing.
    pub fn resolve_request(&mut self, endpoint_id: &str, accept: bool) -> Result<Resolution> {
        let outcome = self.negotiator.resolve(endpoint_id, accept, &mut self.transport)?;

        if let ResolveOutcome::Applied(resolution) = outcome {
            self.sync_endpoint(endpoint_id);
            self.publish(Notice::RequestResolved {
                endpoint_id: endpoint_id.to_string(),
                resolution,
            });
        }
        Ok(outcome.resolution())
    }

    // ── Payloads ────────────────────────────────────────────────────

    /// Send `data` to every established connection among `targets`
    pub fn send_payload(&mut self, targets: &[String], kind: PayloadKind, data: Bytes) -> Result<PayloadId> {
        match self
            .tracker
            .begin_outgoing(targets, kind, data, &mut self.transport)
        {
            Ok((payload_id, created)) => {
                info!(%payload_id, targets = created.len(), ?kind, "Payload queued");
                self.publish(Notice::PayloadQueued {
                    payload_id,
                    targets: created.len(),
                });
                Ok(payload_id)
            },
            Err(NearbyError::NoActiveConnections) => {
                info!(requested = targets.len(), "No active connections to send to");
                self.publish(Notice::NoActiveConnections);
                Err(NearbyError::NoActiveConnections)
            },
            Err(err) => Err(err),
        }
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Close the connection or cancel the handshake with an endpoint
    pub fn disconnect(&mut self, endpoint_id: &str) -> Result<()> {
        if self.teardown(endpoint_id) {
            Ok(())
        } else {
            Err(NearbyError::UnknownEndpoint(endpoint_id.to_string()))
        }
    }

    /// Close every connection and cancel every handshake; returns how many
    pub fn disconnect_all(&mut self) -> usize {
        let live = self.negotiator.live_ids();
        live.iter().filter(|id| self.teardown(id)).count()
    }

    /// Return to the fully idle initial state
    pub fn reset(&mut self) {
        if let Err(e) = self.stop_advertising() {
            warn!(error = %e, "Transport refused to stop advertising during reset");
            self.advertising = false;
        }
        if let Err(e) = self.stop_discovery() {
            warn!(error = %e, "Transport refused to stop discovery during reset");
            self.discovering = false;
        }
        self.disconnect_all();

        self.registry.clear();
        self.negotiator.clear();
        self.tracker.clear();
        info!("Session reset");
        self.publish(Notice::Reset);
    }

    // ── Transport events ────────────────────────────────────────────

    /// Apply one transport event.
    ///
    /// Protocol violations are logged and published; state is left as it
    /// was and the error is returned for inspection.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<()> {
        debug!(%event, "Transport event");
        let result = self.apply_event(event);

        if let Err(NearbyError::ProtocolViolation(detail)) = &result {
            warn!(%detail, "Protocol violation");
            let detail = detail.clone();
            self.publish(Notice::ProtocolViolation { detail });
        }
        result
    }

    fn apply_event(&mut self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::PeerFound { endpoint_id, name } => {
                let changed = self.registry.upsert_discovered(&endpoint_id, &name);
                // A peer lost mid-negotiation comes back in its negotiated state
                if self.negotiator.state(&endpoint_id).is_some_and(|s| !s.is_terminal()) {
                    self.sync_endpoint(&endpoint_id);
                }
                if changed {
                    self.publish(Notice::EndpointFound { endpoint_id, name });
                }
            },

            TransportEvent::PeerLost { endpoint_id } => {
                if self.registry.mark_lost(&endpoint_id).is_some() {
                    self.publish(Notice::EndpointLost { endpoint_id });
                }
            },

            TransportEvent::ConnectionInitiated {
                endpoint_id,
                name,
                pairing_code,
            } => match self
                .negotiator
                .on_initiated(&endpoint_id, &name, &pairing_code, &mut self.transport)?
            {
                Initiated::Incoming(request) => {
                    self.registry
                        .track(&endpoint_id, &name, EndpointState::PendingIncoming);
                    self.publish(Notice::RequestReceived {
                        endpoint_id,
                        name,
                        pairing_code: request.pairing_code,
                    });
                },
                Initiated::Outgoing { pairing_code } => {
                    self.publish(Notice::HandshakeStarted {
                        endpoint_id,
                        pairing_code,
                    });
                },
            },

            TransportEvent::ConnectionResult { endpoint_id, result } => {
                match self.negotiator.on_result(&endpoint_id, result)? {
                    ResultEffect::Connected(connection) => {
                        self.tracker.open(&endpoint_id);
                        self.registry
                            .track(&endpoint_id, &connection.display_name, EndpointState::Connected);
                        self.publish(Notice::Connected {
                            endpoint_id,
                            name: connection.display_name,
                        });
                    },
                    ResultEffect::Ended { outcome, .. } => {
                        self.registry.release(&endpoint_id);
                        self.publish(Notice::NegotiationEnded { endpoint_id, outcome });
                    },
                    ResultEffect::Stale { disconnect } => {
                        if disconnect {
                            info!(endpoint_id = %endpoint_id, "Closing connection the session no longer wants");
                            if let Err(e) = self.transport.disconnect(&endpoint_id) {
                                warn!(endpoint_id = %endpoint_id, error = %e, "Transport refused disconnect");
                            }
                        }
                    },
                }
            },

            TransportEvent::Disconnected { endpoint_id } => {
                if self.negotiator.remote_disconnected(&endpoint_id).is_some() {
                    self.tracker.close(&endpoint_id, PayloadStatus::Failure);
                    self.registry.release(&endpoint_id);
                    self.publish(Notice::Disconnected {
                        endpoint_id,
                        remote: true,
                    });
                } else {
                    debug!(endpoint_id = %endpoint_id, "Disconnect for endpoint without a connection ignored");
                }
            },

            TransportEvent::PayloadStarted {
                connection_id,
                payload_id,
                direction,
                kind,
            } => {
                match direction {
                    Direction::Incoming => {
                        self.tracker.record_incoming(&connection_id, payload_id, kind)?;
                    },
                    Direction::Outgoing => {
                        let known = self
                            .tracker
                            .payloads(&connection_id)
                            .iter()
                            .any(|p| p.id == payload_id && p.direction == Direction::Outgoing);
                        if !known {
                            return Err(NearbyError::ProtocolViolation(format!(
                                "transport started unknown outgoing payload {payload_id} on {connection_id}"
                            )));
                        }
                    },
                }
                self.publish(Notice::PayloadStarted {
                    connection_id,
                    payload_id,
                    direction,
                });
            },

            TransportEvent::PayloadProgress {
                connection_id,
                payload_id,
                update,
            } => {
                let payload = self.tracker.on_progress(&connection_id, payload_id, update)?;
                self.publish(Notice::PayloadUpdated {
                    connection_id,
                    payload_id,
                    status: payload.status,
                });
            },

            TransportEvent::PayloadReceived {
                connection_id,
                payload_id,
                data,
            } => {
                let len = data.len();
                self.tracker.attach_data(&connection_id, payload_id, data)?;
                self.publish(Notice::PayloadReceived {
                    connection_id,
                    payload_id,
                    len,
                });
            },
        }
        Ok(())
    }

    /// Tear down whatever is live for an endpoint; `false` if nothing was
    fn teardown(&mut self, endpoint_id: &str) -> bool {
        let Some(teardown) = self.negotiator.disconnect(endpoint_id) else {
            return false;
        };

        if let Err(e) = self.transport.disconnect(endpoint_id) {
            warn!(endpoint_id = %endpoint_id, error = %e, "Transport refused disconnect");
        }
        self.registry.release(endpoint_id);

        let notice = match teardown {
            Teardown::Closed(_) => {
                self.tracker.close(endpoint_id, PayloadStatus::Canceled);
                Notice::Disconnected {
                    endpoint_id: endpoint_id.to_string(),
                    remote: false,
                }
            },
            Teardown::Aborted { .. } => Notice::NegotiationEnded {
                endpoint_id: endpoint_id.to_string(),
                outcome: NegotiationOutcome::Canceled,
            },
        };
        self.publish(notice);
        true
    }

    /// Mirror the negotiation state onto a tracked endpoint
    fn sync_endpoint(&mut self, endpoint_id: &str) {
        match self
            .negotiator
            .state(endpoint_id)
            .and_then(|state| state.endpoint_state())
        {
            Some(state) => {
                self.registry.set_state(endpoint_id, state);
            },
            None => self.registry.release(endpoint_id),
        }
    }

    fn publish(&mut self, notice: Notice) {
        if self.observers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        self.observers.notify(&notice, &snapshot);
    }
}
