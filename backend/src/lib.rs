//! Patient issue triage backend.
//!
//! Patients report health issues; doctors watch every issue live and respond.
//! The [`domain`] module holds the issue lifecycle and the per-connection
//! dashboard, [`inbound`] exposes it over HTTP and WebSocket, [`outbound`]
//! supplies the in-memory realtime store and credential directory, and
//! [`server`] wires them into an Actix server.

pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod server;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
