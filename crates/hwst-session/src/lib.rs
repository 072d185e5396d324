//! `hwst-session` - client core for hardware self-test sessions over JSON-RPC.

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

/// Progress and result aggregation.
pub mod aggregate;
/// Diagnostic catalog and run ordering.
pub mod catalog;
/// Clocks and stage timers.
pub mod clock;
/// Session configuration.
pub mod config;
/// Request/response correlation.
pub mod correlator;
/// Device identity from startup info.
pub mod device;
/// Diagnostic status codes.
pub mod errcodes;
/// Session and protocol errors.
pub mod error;
/// Session stages and presentation events.
pub mod events;
/// Run plan.
pub mod plan;
/// Stored results of the previous run.
pub mod previous;
/// JSON-RPC envelopes.
pub mod protocol;
/// Running instance registry.
pub mod registry;
/// Session orchestration.
pub mod session;
/// Transport seams and connection lifecycle.
pub mod transport;
/// WebSocket transport.
pub mod ws;

pub use aggregate::FinalResult;
pub use catalog::{Catalog, DiagSpec, GroupSpec, OrderGraph, OrderRule};
pub use clock::{Clock, ManualClock, StdClock};
pub use config::HwstConfig;
pub use error::{ProtocolError, SessionError};
pub use events::{Cookie, SessionEvent, Stage};
pub use plan::{Element, Group, Plan, ResultState};
pub use session::Session;
pub use transport::{Connection, ConnectionState, Connector, Transport, TransportEvent};
pub use ws::WsConnector;
