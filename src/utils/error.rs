//! The `error` module defines the error types used within `ringcast`.
//!
//! None of these cross the registry API: write faults are recovered inside
//! the broker and client faults are reported as channel state. They exist
//! for the transport edges, where `?` propagation and HTTP status mapping
//! need concrete types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// A write to a subscriber stream could not be delivered.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    #[error("subscriber stream is closed")]
    Closed,
}

/// Failures of the client-side event stream transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint responded with status {0}")]
    Status(u16),

    #[error("malformed event stream: {0}")]
    Decode(#[from] DecodeError),
}

/// The event stream body could not be decoded.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("line exceeds {limit} bytes without a terminator")]
    LineTooLong { limit: usize },
}

/// Failures while starting or running the HTTP server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server terminated: {0}")]
    Serve(#[source] std::io::Error),
}

/// Rejections produced by the HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing or invalid token")]
    Unauthorized,

    #[error("subscriber capacity reached")]
    CapacityReached,

    #[error("event name must not contain line breaks")]
    InvalidEventName,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::CapacityReached => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidEventName => StatusCode::BAD_REQUEST,
        };

        (status, self.to_string()).into_response()
    }
}
