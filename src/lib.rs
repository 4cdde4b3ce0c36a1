//! # Nearby - Peer Discovery and Session Core
//!
//! Platform-independent core of a nearby-device session: discovering peers,
//! negotiating connections confirmed by a pairing code, and tracking payload
//! transfers over established connections. Radio work is delegated to a
//! [`TransportAdapter`](transport::TransportAdapter); the core only keeps
//! state consistent and tells observers what changed.
//!
//! ## Architecture
//!
//! ```text
//!   UI / CLI                 SessionFacade                     Transport
//!      |                          |                                |
//!      |-- start_discovery() ---->|------- discover(service) ----->|
//!      |                          |<------ PeerFound(E1) ----------|
//!      |<-- EndpointFound --------|                                |
//!      |-- request_connection --->|------- request_connection ---->|
//!      |                          |<------ ConnectionInitiated ----|
//!      |                          |------- accept_connection ----->|
//!      |                          |<------ ConnectionResult(ok) ---|
//!      |<-- Connected ------------|                                |
//!      |-- send_payload(bytes) -->|------- send([E1], payload) --->|
//!      |                          |<------ PayloadProgress --------|
//! ```
//!
//! ## Components
//!
//! | Component            | Owns                                          |
//! |----------------------|-----------------------------------------------|
//! | `EndpointRegistry`   | Discovered peers and their display state      |
//! | `Negotiator`         | One handshake state machine per endpoint      |
//! | `PayloadTracker`     | Transfer records per connection, plus history |
//! | `SessionFacade`      | All of the above; the single mutation point   |
//! | `SessionRuntime`     | A tokio task owning a facade                  |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nearby::{SessionFacade, SessionConfig, RecordingTransport, TransportEvent};
//!
//! let mut session = SessionFacade::new(SessionConfig::default(), RecordingTransport::new());
//! session.subscribe(|notice: &nearby::Notice, _: &nearby::SessionSnapshot| println!("{notice}"));
//!
//! session.start_discovery()?;
//! session.handle_event(TransportEvent::PeerFound {
//!     endpoint_id: "E1".into(),
//!     name: "Phone".into(),
//! })?;
//! session.request_connection("E1")?;
//! ```
//!
//! ## Modules
//!
//! - [`endpoint`]: Endpoint registry
//! - [`negotiation`]: Connection negotiation state machine
//! - [`payload`]: Payload records and tracker
//! - [`session`]: Facade, observers and snapshots
//! - [`runtime`]: Owner task and cloneable handle
//! - [`transport`]: Adapter boundary and a recording adapter
//! - [`script`]: JSON replay of commands and events
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod config;
pub mod endpoint;
pub mod error;
pub mod negotiation;
pub mod payload;
pub mod runtime;
pub mod script;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::{Config, RuntimeConfig, SessionConfig};
pub use endpoint::{Endpoint, EndpointRegistry, EndpointState};
pub use error::{NearbyError, Result};
pub use negotiation::{Connection, ConnectionRequest, NegotiationOutcome, NegotiationState, Negotiator, Resolution};
pub use payload::{Direction, Payload, PayloadId, PayloadKind, PayloadStatus, PayloadTracker, PayloadUpdate};
pub use runtime::{event_channel, SessionHandle, SessionRuntime};
pub use script::{Script, ScriptStep, StepOutcome};
pub use session::{ConnectionView, Notice, SessionFacade, SessionObserver, SessionSnapshot, Subscription};
pub use transport::{
    CallLog, ConnectionResult, OutgoingPayload, RecordingTransport, TransportAdapter, TransportCall, TransportEvent,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
