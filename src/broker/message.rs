//! SSE frame encoding
//!
//! Every published event goes on the wire as
//!
//! ```text
//! event: <name>
//! data: <json>
//!
//! ```
//!
//! No `id:` or `retry:` fields are emitted; clients that miss a frame while
//! disconnected never see it.

use serde_json::Value;

/// Comment frame written by the keep-alive loop. SSE parsers ignore it.
pub const KEEPALIVE_FRAME: &str = ": keep-alive\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    pub event: String,
    pub data: String,
}

/// Event names end up on a single `event:` line and must not break it.
pub fn is_valid_event_name(name: &str) -> bool {
    !name.contains(['\r', '\n'])
}

impl EventFrame {
    /// Build a frame from a JSON payload. Strings are sent verbatim, any
    /// other value is JSON-encoded. Line breaks in `event` are stripped.
    pub fn new(event: &str, payload: &Value) -> Self {
        let data = match payload {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };

        Self {
            event: event.replace(['\r', '\n'], ""),
            data,
        }
    }

    /// Render the frame as UTF-8 text ready to be written to a stream.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(self.event.len() + self.data.len() + 16);
        out.push_str("event: ");
        out.push_str(&self.event);
        out.push('\n');
        // a verbatim string may carry CRLF, CR or LF breaks; each line needs its own field
        let data = self.data.replace("\r\n", "\n").replace('\r', "\n");
        for line in data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}
