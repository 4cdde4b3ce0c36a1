//! Connection negotiation.
//!
//! A negotiation turns a discovered endpoint into a connection through a
//! request/accept/reject handshake confirmed by a short pairing code.
//!
//! ## State Machine
//!
//! ```text
//!                request_connection()             ConnectionResult(success)
//!   [Idle] ─────────────────────────> [RequestSent] ─────────────────────────┐
//!     │                                    │                                 │
//!     │ ConnectionInitiated                │ failure / rejected / disconnect │
//!     v                                    v                                 v
//!   [RequestReceived] ──resolve(false)──> [Rejected]      [Canceled]   [Connected]
//!     │                                                      ^               ^
//!     │ resolve(true)                                        │               │
//!     v                          failure / disconnect        │               │
//!   [Accepted] ──────────────────────────────────────────────┘               │
//!     └──────────────────────── ConnectionResult(success) ───────────────────┘
//! ```
//!
//! | State             | Description                                | Valid Transitions              |
//! |-------------------|--------------------------------------------|--------------------------------|
//! | `Idle`            | No entry for the endpoint                  | → RequestSent, RequestReceived |
//! | `RequestSent`     | We asked, awaiting the transport outcome   | → Connected, Canceled          |
//! | `RequestReceived` | Peer asked, awaiting the local answer      | → Accepted, Rejected, Canceled |
//! | `Accepted`        | We accepted, awaiting the transport outcome| → Connected, Canceled          |
//! | `Connected`       | Session established                        | → Idle (disconnect)            |
//! | `Rejected`        | We declined                                | (terminal)                     |
//! | `Canceled`        | Failed, declined remotely or torn down     | (terminal)                     |
//!
//! A terminal entry counts as idle for a new attempt. For our own requests
//! the local accept is implicit: a `ConnectionInitiated` report for an
//! endpoint in `RequestSent` records the pairing code and accepts on the
//! spot.

mod negotiator;
mod request;
mod state;

pub use negotiator::{Initiated, Negotiator, ResolveOutcome, ResultEffect, Teardown};
pub use request::{ConnectionRequest, Resolution};
pub use state::{Connection, NegotiationOutcome, NegotiationState};
