//! The `transport` module exposes the broadcast registry over HTTP.
//!
//! It defines the publish request/response bodies and the axum server that
//! turns each `GET /events/{topic}` response into a registered subscriber
//! stream.

pub mod message;
pub mod sse;

pub use sse::{AppState, router, serve, start_sse_server};
