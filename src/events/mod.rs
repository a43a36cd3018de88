//! Real-time event fan-out
//!
//! The judging, queue, scoring and lifecycle layers depend on the
//! `EventSink` trait; the in-process `EventBus` is injected at startup.
//! Delivery is best-effort: lagging subscribers drop messages and resync
//! by re-reading current state.

pub mod auth;
pub mod bus;
pub mod messages;

pub use auth::{Principal, TokenVerifier};
pub use bus::{EventBus, EventSink, Room};
#[cfg(test)]
pub use bus::MockEventSink;
pub use messages::{ContestSnapshot, EventMessage, EventPayload, SubmissionResultPayload};
