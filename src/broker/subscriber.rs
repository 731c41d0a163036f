//! Subscriber handles
//!
//! A `Subscriber` owns the sending side of one live output stream. The
//! transport keeps the receiving side inside the HTTP response body, so the
//! channel closes as soon as the response is dropped and the next write
//! reports `WriteError::Closed`.

use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::utils::error::WriteError;

pub type SubscriberId = String;

#[derive(Debug)]
pub struct Subscriber {
    pub id: SubscriberId,
    sender: UnboundedSender<String>,
}

impl Subscriber {
    /// Create a new subscriber with a sender channel. The `id` is a UUID used
    /// to identify the stream across registry operations.
    pub fn new(sender: UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
        }
    }

    /// Queue an encoded frame on the stream. Does not wait for a flush.
    pub fn write(&self, frame: &str) -> Result<(), WriteError> {
        self.sender
            .send(frame.to_owned())
            .map_err(|_| WriteError::Closed)
    }
}
