//! Endpoint registry.
//!
//! Tracks every peer the session knows about, keyed by endpoint id.

use std::collections::HashMap;

use tracing::debug;

use super::{Endpoint, EndpointState};

struct Entry {
    endpoint: Endpoint,
    /// Discovery currently reports this peer
    visible: bool,
    /// Insertion order for stable listings
    seq: u64,
}

/// Registry of known endpoints
#[derive(Default)]
pub struct EndpointRegistry {
    entries: HashMap<String, Entry>,
    next_seq: u64,
}

impl EndpointRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh an endpoint reported by discovery.
    ///
    /// A peer that is connected or mid-negotiation keeps its state; only its
    /// name and visibility are refreshed. Returns `true` if the listing
    /// changed.
    pub fn upsert_discovered(&mut self, id: &str, display_name: &str) -> bool {
        if let Some(entry) = self.entries.get_mut(id) {
            let was_visible = entry.visible;
            let renamed = entry.endpoint.display_name != display_name;
            entry.visible = true;
            entry.endpoint.display_name = display_name.to_string();

            if entry.endpoint.state.is_sticky() {
                debug!(endpoint_id = %id, state = ?entry.endpoint.state, "Discovery refresh for busy endpoint");
                return renamed || !was_visible;
            }

            let changed = renamed || entry.endpoint.state != EndpointState::Discovered;
            entry.endpoint.state = EndpointState::Discovered;
            return changed;
        }

        self.insert(Endpoint::discovered(id, display_name), true);
        true
    }

    /// Handle a peer-lost report.
    ///
    /// Connected endpoints are kept (they live on in the connection set) but
    /// marked invisible. Anything else transitions to `Lost` and is pruned;
    /// the pruned endpoint is returned.
    pub fn mark_lost(&mut self, id: &str) -> Option<Endpoint> {
        let Some(entry) = self.entries.get_mut(id) else {
            debug!(endpoint_id = %id, "Lost report for unknown endpoint ignored");
            return None;
        };

        if entry.endpoint.state == EndpointState::Connected {
            entry.visible = false;
            return None;
        }

        self.entries.remove(id).map(|entry| Endpoint {
            state: EndpointState::Lost,
            ..entry.endpoint
        })
    }

    /// Look up an endpoint
    pub fn find(&self, id: &str) -> Option<&Endpoint> {
        self.entries.get(id).map(|e| &e.endpoint)
    }

    /// Whether discovery currently reports the endpoint
    pub fn is_visible(&self, id: &str) -> bool {
        self.entries.get(id).is_some_and(|e| e.visible)
    }

    /// Record a negotiation-driven state, inserting the endpoint if the peer
    /// reached us without being discovered.
    pub fn track(&mut self, id: &str, display_name: &str, state: EndpointState) {
        match self.entries.get_mut(id) {
            Some(entry) => entry.endpoint.state = state,
            None => {
                let endpoint = Endpoint {
                    id: id.to_string(),
                    display_name: display_name.to_string(),
                    state,
                };
                self.insert(endpoint, false);
            },
        }
    }

    /// Update the state of a tracked endpoint; returns `false` if unknown
    pub fn set_state(&mut self, id: &str, state: EndpointState) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.endpoint.state = state;
                true
            },
            None => false,
        }
    }

    /// Return an endpoint whose negotiation or connection ended to the
    /// discoverable pool, or drop it if discovery no longer reports it.
    pub fn release(&mut self, id: &str) {
        match self.entries.get_mut(id) {
            Some(entry) if entry.visible => entry.endpoint.state = EndpointState::Discovered,
            Some(_) => {
                self.entries.remove(id);
            },
            None => {},
        }
    }

    /// Remove every endpoint
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of tracked endpoints
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All endpoints in insertion order
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.endpoint.clone()).collect()
    }

    fn insert(&mut self, endpoint: Endpoint, visible: bool) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            endpoint.id.clone(),
            Entry {
                endpoint,
                visible,
                seq,
            },
        );
    }
}
