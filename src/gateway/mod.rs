//! Minimal HTTP/WS surface
//!
//! The platform's REST API lives elsewhere; this gateway exposes only the
//! realtime attach point for the event bus, the public leaderboard read
//! and a liveness probe.

pub mod router;
pub mod ws;

pub use router::build_router;
