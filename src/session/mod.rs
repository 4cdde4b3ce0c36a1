//! Session facade and observer contract.
//!
//! [`SessionFacade`] is the single public surface of the core. It owns the
//! endpoint registry, the negotiator and the payload tracker, drives the
//! transport for local commands and applies transport events.
//!
//! ```text
//!   UI commands ──> SessionFacade ──> TransportAdapter
//!                     │    ^
//!        Notice +     │    │ TransportEvent
//!        snapshot     v    │
//!                 observers  transport
//! ```
//!
//! Observers see every mutation synchronously, in the order it happened,
//! together with a consistent [`SessionSnapshot`].

mod facade;
mod observer;
mod snapshot;

pub use facade::SessionFacade;
pub use observer::{ObserverList, SessionObserver, Subscription};
pub use snapshot::{ConnectionView, Notice, SessionSnapshot};
