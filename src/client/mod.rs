//! The reconnecting stream client.
//!
//! Each observed channel keeps one logical subscription to its endpoint,
//! re-establishing the connection with exponential backoff and exposing the
//! latest payload and connection status through a `watch` receiver.

pub mod backoff;
pub mod channel;
pub mod credentials;
pub mod decoder;
pub mod manager;
pub mod transport;

pub use backoff::Backoff;
pub use channel::{ChannelFault, ChannelOptions, ChannelState, ConnectionStatus};
pub use credentials::{CredentialStore, FileCredentials, MemoryCredentials};
pub use decoder::{SseDecoder, SseEvent};
pub use manager::ChannelSet;
pub use transport::{EventStream, HttpTransport, Transport, TransportEvent};
