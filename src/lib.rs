//! # ringcast
//!
//! `ringcast` is the live event fan-out layer of a fight-streaming and betting
//! platform. Producers publish named JSON events to topics (an event or fight
//! id); every browser or service streaming that topic receives them as
//! server-sent events, and consumers keep their streams alive across network
//! failures with exponential-backoff reconnection.
//!
//! ## Core Modules
//!
//! - `broker`: The broadcast registry mapping topics to open subscriber streams.
//! - `client`: The reconnecting stream client and its multi-channel owner.
//! - `config`: Handles loading and managing configuration.
//! - `transport`: The HTTP server exposing stream and publish endpoints.
//! - `utils`: Shared error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;
