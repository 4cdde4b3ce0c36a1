//! Payload tracker.
//!
//! Records transfers per connection in creation order and applies the
//! status transitions reported by the transport.

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, warn};

use super::{Direction, Payload, PayloadId, PayloadKind, PayloadStatus, PayloadUpdate};
use crate::error::{NearbyError, Result};
use crate::transport::{OutgoingPayload, TransportAdapter};

/// Per-connection payload history
#[derive(Default)]
pub struct PayloadTracker {
    /// Payloads of live connections, keyed by connection id
    active: HashMap<String, Vec<Payload>>,
    /// Payloads of connections that have since closed
    archive: Vec<Payload>,
    next_seq: u64,
}

impl PayloadTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a newly established connection
    pub fn open(&mut self, connection_id: &str) {
        self.active.entry(connection_id.to_string()).or_default();
    }

    /// Whether the connection is tracked as live
    pub fn is_open(&self, connection_id: &str) -> bool {
        self.active.contains_key(connection_id)
    }

    /// Send `data` to every live connection among `targets`.
    ///
    /// Ids that are not live connections are skipped. Fails with
    /// `NoActiveConnections` (recording nothing) when none remain. Returns
    /// the id shared by every record and the records themselves.
    pub fn begin_outgoing<T>(
        &mut self,
        targets: &[String],
        kind: PayloadKind,
        data: Bytes,
        transport: &mut T,
    ) -> Result<(PayloadId, Vec<Payload>)>
    where
        T: TransportAdapter + ?Sized,
    {
        let live: Vec<String> = targets
            .iter()
            .filter(|id| {
                let open = self.is_open(id);
                if !open {
                    debug!(connection_id = %id, "Skipping send to inactive connection");
                }
                open
            })
            .cloned()
            .collect();

        if live.is_empty() {
            return Err(NearbyError::NoActiveConnections);
        }

        let total = data.len() as u64;
        let outgoing = OutgoingPayload {
            id: PayloadId::random(),
            kind,
            data,
        };
        transport.send(&live, &outgoing)?;

        let mut created = Vec::with_capacity(live.len());
        for connection_id in &live {
            let mut payload = Payload::new(outgoing.id, connection_id, Direction::Outgoing, kind);
            payload.total_bytes = Some(total);
            payload.seq = self.next_seq();
            created.push(payload.clone());
            self.active.entry(connection_id.clone()).or_default().push(payload);
        }

        Ok((outgoing.id, created))
    }

    /// Record the announcement of an inbound transfer
    pub fn record_incoming(
        &mut self,
        connection_id: &str,
        payload_id: PayloadId,
        kind: PayloadKind,
    ) -> Result<Payload> {
        let Some(payloads) = self.active.get_mut(connection_id) else {
            return Err(NearbyError::ProtocolViolation(format!(
                "incoming payload {payload_id} on unknown connection {connection_id}"
            )));
        };

        if payloads.iter().any(|p| p.id == payload_id) {
            return Err(NearbyError::ProtocolViolation(format!(
                "payload {payload_id} announced twice on {connection_id}"
            )));
        }

        let mut payload = Payload::new(payload_id, connection_id, Direction::Incoming, kind);
        payload.seq = self.next_seq;
        self.next_seq += 1;
        payloads.push(payload.clone());
        Ok(payload)
    }

    /// Apply a transport progress report
    pub fn on_progress(
        &mut self,
        connection_id: &str,
        payload_id: PayloadId,
        update: PayloadUpdate,
    ) -> Result<Payload> {
        let payload = self.find_mut(connection_id, payload_id)?;

        if payload.status.is_terminal() {
            return Err(NearbyError::ProtocolViolation(format!(
                "payload {payload_id} on {connection_id} is already {:?}, refusing {:?}",
                payload.status, update.status
            )));
        }

        payload.status = update.status;
        payload.bytes_transferred = payload.bytes_transferred.max(update.bytes_transferred);
        if update.total_bytes.is_some() {
            payload.total_bytes = update.total_bytes;
        }
        Ok(payload.clone())
    }

    /// Attach the received bytes to an incoming payload
    pub fn attach_data(&mut self, connection_id: &str, payload_id: PayloadId, data: Bytes) -> Result<()> {
        let payload = self.find_mut(connection_id, payload_id)?;

        if payload.direction != Direction::Incoming {
            return Err(NearbyError::ProtocolViolation(format!(
                "data delivered for outgoing payload {payload_id}"
            )));
        }

        payload.bytes_transferred = payload.bytes_transferred.max(data.len() as u64);
        payload.data = Some(data);
        Ok(())
    }

    /// Stop tracking a connection. Payloads still in flight move to
    /// `status`; all of them go to the archive. Returns how many were in
    /// flight.
    pub fn close(&mut self, connection_id: &str, status: PayloadStatus) -> usize {
        let Some(mut payloads) = self.active.remove(connection_id) else {
            return 0;
        };

        let mut interrupted = 0;
        for payload in payloads.iter_mut().filter(|p| !p.status.is_terminal()) {
            payload.status = status;
            interrupted += 1;
        }

        if interrupted > 0 {
            warn!(connection_id = %connection_id, interrupted, ?status, "Closed connection with payloads in flight");
        }

        self.archive.append(&mut payloads);
        interrupted
    }

    /// Payloads of a live connection, oldest first
    pub fn payloads(&self, connection_id: &str) -> &[Payload] {
        self.active.get(connection_id).map_or(&[], Vec::as_slice)
    }

    /// Every payload recorded since the last reset, oldest first
    pub fn history(&self) -> Vec<Payload> {
        let mut all: Vec<Payload> = self
            .archive
            .iter()
            .chain(self.active.values().flatten())
            .cloned()
            .collect();
        all.sort_by_key(|p| p.seq);
        all
    }

    /// Completed incoming byte payloads as `(connection id, data)`, oldest first
    pub fn received(&self) -> Vec<(String, Bytes)> {
        self.history()
            .into_iter()
            .filter(|p| p.direction == Direction::Incoming && p.status == PayloadStatus::Success)
            .filter_map(|p| p.data.map(|data| (p.connection_id, data)))
            .collect()
    }

    /// Drop all history
    pub fn clear(&mut self) {
        self.active.clear();
        self.archive.clear();
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn find_mut(&mut self, connection_id: &str, payload_id: PayloadId) -> Result<&mut Payload> {
        self.active
            .get_mut(connection_id)
            .and_then(|payloads| payloads.iter_mut().find(|p| p.id == payload_id))
            .ok_or_else(|| {
                NearbyError::ProtocolViolation(format!(
                    "unknown payload {payload_id} on connection {connection_id}"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{RecordingTransport, TransportCall};

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_begin_outgoing_without_connections() {
        let mut tracker = PayloadTracker::new();
        let mut transport = RecordingTransport::new();

        let result = tracker.begin_outgoing(&ids(&["C1"]), PayloadKind::Bytes, Bytes::from("hi"), &mut transport);
        assert!(matches!(result, Err(NearbyError::NoActiveConnections)));
        assert!(tracker.history().is_empty());
        assert!(transport.log().calls().is_empty());
    }

    #[test]
    fn test_begin_outgoing_one_record_per_connection() {
        let mut tracker = PayloadTracker::new();
        let mut transport = RecordingTransport::new();
        tracker.open("C1");
        tracker.open("C2");

        let (payload_id, created) = tracker
            .begin_outgoing(&ids(&["C1", "C2", "C3"]), PayloadKind::Bytes, Bytes::from("hello"), &mut transport)
            .unwrap();

        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|p| p.id == payload_id));
        assert!(created.iter().all(|p| p.status == PayloadStatus::InProgress));
        assert_eq!(created[0].total_bytes, Some(5));
        assert_eq!(tracker.payloads("C1").len(), 1);
        assert_eq!(tracker.payloads("C2").len(), 1);

        let calls = transport.log().calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], TransportCall::Send { endpoint_ids, .. } if endpoint_ids == &ids(&["C1", "C2"])));
    }

    #[test]
    fn test_progress_to_terminal() {
        let mut tracker = PayloadTracker::new();
        tracker.open("C1");
        tracker.record_incoming("C1", PayloadId(7), PayloadKind::Bytes).unwrap();

        let update = PayloadUpdate {
            status: PayloadStatus::InProgress,
            bytes_transferred: 10,
            total_bytes: Some(20),
        };
        tracker.on_progress("C1", PayloadId(7), update).unwrap();
        let done = tracker
            .on_progress("C1", PayloadId(7), PayloadUpdate::status(PayloadStatus::Success))
            .unwrap();

        assert_eq!(done.status, PayloadStatus::Success);
        assert_eq!(done.bytes_transferred, 10);
        assert_eq!(done.total_bytes, Some(20));
    }

    #[test]
    fn test_terminal_transition_is_violation() {
        let mut tracker = PayloadTracker::new();
        tracker.open("C1");
        tracker.record_incoming("C1", PayloadId(7), PayloadKind::File).unwrap();
        tracker
            .on_progress("C1", PayloadId(7), PayloadUpdate::status(PayloadStatus::Failure))
            .unwrap();

        let result = tracker.on_progress("C1", PayloadId(7), PayloadUpdate::status(PayloadStatus::Success));
        assert!(matches!(result, Err(NearbyError::ProtocolViolation(_))));
        assert_eq!(tracker.payloads("C1")[0].status, PayloadStatus::Failure);
    }

    #[test]
    fn test_incoming_on_unknown_connection() {
        let mut tracker = PayloadTracker::new();
        let result = tracker.record_incoming("C9", PayloadId(1), PayloadKind::Bytes);
        assert!(matches!(result, Err(NearbyError::ProtocolViolation(_))));
    }

    #[test]
    fn test_duplicate_announcement() {
        let mut tracker = PayloadTracker::new();
        tracker.open("C1");
        tracker.record_incoming("C1", PayloadId(1), PayloadKind::Bytes).unwrap();
        let result = tracker.record_incoming("C1", PayloadId(1), PayloadKind::Bytes);
        assert!(matches!(result, Err(NearbyError::ProtocolViolation(_))));
        assert_eq!(tracker.payloads("C1").len(), 1);
    }

    #[test]
    fn test_close_cancels_in_flight_and_archives() {
        let mut tracker = PayloadTracker::new();
        tracker.open("C1");
        tracker.record_incoming("C1", PayloadId(1), PayloadKind::Bytes).unwrap();
        tracker.record_incoming("C1", PayloadId(2), PayloadKind::Bytes).unwrap();
        tracker
            .on_progress("C1", PayloadId(1), PayloadUpdate::status(PayloadStatus::Success))
            .unwrap();

        assert_eq!(tracker.close("C1", PayloadStatus::Canceled), 1);
        assert!(!tracker.is_open("C1"));
        assert!(tracker.payloads("C1").is_empty());

        let history = tracker.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|p| p.status == PayloadStatus::Canceled).count(), 1);
    }

    #[test]
    fn test_history_keeps_creation_order() {
        let mut tracker = PayloadTracker::new();
        let mut transport = RecordingTransport::new();
        let names: Vec<String> = (0..8).map(|n| format!("C{n}")).collect();
        for name in &names {
            tracker.open(name);
        }

        let mut expected = Vec::new();
        for (n, name) in names.iter().enumerate().rev() {
            tracker
                .record_incoming(name, PayloadId(n as u64), PayloadKind::Bytes)
                .unwrap();
            expected.push(PayloadId(n as u64));
        }
        let (sent, _) = tracker
            .begin_outgoing(&ids(&["C3"]), PayloadKind::Bytes, Bytes::from("x"), &mut transport)
            .unwrap();
        expected.push(sent);
        tracker.close("C5", PayloadStatus::Canceled);

        let order: Vec<PayloadId> = tracker.history().into_iter().map(|p| p.id).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_received_data() {
        let mut tracker = PayloadTracker::new();
        tracker.open("C1");
        tracker.record_incoming("C1", PayloadId(3), PayloadKind::Bytes).unwrap();
        tracker.attach_data("C1", PayloadId(3), Bytes::from("ping")).unwrap();
        assert!(tracker.received().is_empty());

        tracker
            .on_progress("C1", PayloadId(3), PayloadUpdate::status(PayloadStatus::Success))
            .unwrap();
        assert_eq!(tracker.received(), vec![("C1".to_string(), Bytes::from("ping"))]);
    }

    #[test]
    fn test_attach_data_to_outgoing_is_violation() {
        let mut tracker = PayloadTracker::new();
        let mut transport = RecordingTransport::new();
        tracker.open("C1");
        let (payload_id, _) = tracker
            .begin_outgoing(&ids(&["C1"]), PayloadKind::Bytes, Bytes::from("x"), &mut transport)
            .unwrap();

        let result = tracker.attach_data("C1", payload_id, Bytes::from("y"));
        assert!(matches!(result, Err(NearbyError::ProtocolViolation(_))));
    }
}
