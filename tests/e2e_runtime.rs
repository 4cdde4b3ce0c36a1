//! End-to-end tests of a session running on its owner task.
//!
//! Commands go through `SessionHandle`, transport events through the
//! channel an adapter would use.

use std::time::Duration;

use bytes::Bytes;
use nearby::{
    event_channel, CallLog, ConnectionResult, NearbyError, Notice, PayloadKind, RecordingTransport, RuntimeConfig,
    Script, SessionConfig, SessionFacade, SessionHandle, SessionRuntime, SessionSnapshot, TransportCall, TransportEvent,
};
use tokio::sync::{mpsc, watch};

fn spawn() -> (SessionHandle, mpsc::Sender<TransportEvent>, CallLog) {
    let transport = RecordingTransport::new();
    let log = transport.log();
    let facade = SessionFacade::new(SessionConfig::default(), transport);
    let (events_tx, events_rx) = event_channel(32);
    let handle = SessionRuntime::spawn(facade, events_rx, &RuntimeConfig::default());
    (handle, events_tx, log)
}

async fn wait_for(watch: &mut watch::Receiver<SessionSnapshot>, check: impl Fn(&SessionSnapshot) -> bool) {
    tokio::time::timeout(Duration::from_secs(2), watch.wait_for(|s| check(s)))
        .await
        .expect("timed out waiting for snapshot")
        .expect("session stopped");
}

/// Adapter callbacks from another task reach the session in order
#[tokio::test]
async fn test_adapter_events_from_background_task() {
    let (handle, events, log) = spawn();
    let mut watch = handle.watch_snapshot();

    handle.start_advertising().await.unwrap();

    let adapter = tokio::spawn(async move {
        events
            .send(TransportEvent::ConnectionInitiated {
                endpoint_id: "E1".into(),
                name: "Phone".into(),
                pairing_code: "482913".into(),
            })
            .await
            .unwrap();
        events
    });
    let events = adapter.await.unwrap();

    wait_for(&mut watch, |s| s.pending_requests.len() == 1).await;
    assert_eq!(handle.snapshot().pending_requests[0].pairing_code, "482913");

    handle.resolve_request("E1", true).await.unwrap();
    assert!(log.contains(&TransportCall::AcceptConnection("E1".into())));

    events
        .send(TransportEvent::ConnectionResult {
            endpoint_id: "E1".into(),
            result: ConnectionResult::Success,
        })
        .await
        .unwrap();
    wait_for(&mut watch, |s| s.connections.len() == 1).await;
}

/// Handles are cheap clones of the same session
#[tokio::test]
async fn test_cloned_handles_share_session() {
    let (handle, _events, _log) = spawn();
    let other = handle.clone();

    tokio_test::assert_ok!(handle.start_discovery().await);
    assert!(other.snapshot().discovering);

    tokio_test::assert_ok!(other.stop_discovery().await);
    assert!(!handle.snapshot().discovering);
}

/// Duplicate requests are reported, not applied twice
#[tokio::test]
async fn test_duplicate_request_through_handle() {
    let (handle, _events, log) = spawn();
    let mut notices = handle.subscribe_notices();

    handle
        .apply_event(TransportEvent::PeerFound {
            endpoint_id: "E1".into(),
            name: "Phone".into(),
        })
        .await
        .unwrap();
    handle.request_connection("E1").await.unwrap();
    let err = handle.request_connection("E1").await.unwrap_err();
    assert!(err.is_recoverable_notice());

    let requests = log
        .calls()
        .into_iter()
        .filter(|c| matches!(c, TransportCall::RequestConnection(_)))
        .count();
    assert_eq!(requests, 1);

    let mut seen = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        seen.push(notice);
    }
    assert_eq!(
        seen.last(),
        Some(&Notice::DuplicateRequest {
            endpoint_id: "E1".into()
        })
    );
}

/// A script replays through the handle and reports refused steps
#[tokio::test]
async fn test_script_replay() {
    let (handle, _events, log) = spawn();
    let script = Script::from_json(
        r#"{ "steps": [
            { "step": "start_advertising" },
            { "step": "send_payload", "targets": ["C1"], "text": "nobody home" },
            { "step": "event", "event": { "type": "connection_initiated", "endpoint_id": "C1", "name": "Laptop", "pairing_code": "1234" } },
            { "step": "resolve_request", "endpoint_id": "C1", "accept": true },
            { "step": "resolve_request", "endpoint_id": "C1", "accept": false },
            { "step": "event", "event": { "type": "connection_result", "endpoint_id": "C1", "result": "success" } },
            { "step": "send_payload", "targets": ["C1"], "kind": "file", "text": "report.pdf" },
            { "step": "disconnect", "endpoint_id": "C1" }
        ] }"#,
    )
    .unwrap();

    let outcomes = script.run(&handle).await.unwrap();
    let errors: Vec<usize> = outcomes
        .iter()
        .filter(|o| o.error.is_some())
        .map(|o| o.index)
        .collect();
    assert_eq!(errors, vec![2]);

    assert!(!log.contains(&TransportCall::RejectConnection("C1".into())));
    let history = handle.payload_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, PayloadKind::File);
    assert_eq!(history[0].status, nearby::PayloadStatus::Canceled);
    assert!(handle.snapshot().connections.is_empty());
}

/// Shutdown resets the session and refuses further commands
#[tokio::test]
async fn test_shutdown() {
    let (handle, events, _log) = spawn();
    handle.start_advertising().await.unwrap();
    assert!(handle.is_running());
    handle.shutdown().await.unwrap();

    assert!(handle.snapshot().is_idle());
    let err = handle
        .send_payload(&["C1".to_string()], PayloadKind::Bytes, Bytes::from("late"))
        .await
        .unwrap_err();
    assert!(matches!(err, NearbyError::Runtime(_)));

    tokio::time::timeout(Duration::from_secs(2), events.closed())
        .await
        .expect("owner task did not stop");
    assert!(!handle.is_running());
}
