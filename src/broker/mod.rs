//! The broadcast registry.
//!
//! `Broker` maps topic keys to the subscriber streams currently attached to
//! them and fans published events out as SSE frames. Write failures are
//! treated as disconnects and never reach the publisher.

pub mod engine;
pub mod message;
pub mod subscriber;
pub mod topic;

pub use engine::Broker;
pub use message::{EventFrame, is_valid_event_name};
pub use subscriber::{Subscriber, SubscriberId};

#[cfg(test)]
mod tests;
