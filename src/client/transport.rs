//! Event stream transports.
//!
//! A transport turns a URL into a stream of [`TransportEvent`]s. The first
//! item of a healthy connection is `Open`, followed by one `Message` per
//! decoded event. An `Err` item is a transport fault and the end of the
//! stream is a close; either way the channel drops the stream, which closes
//! the underlying connection.

use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::{BoxStream, Stream, StreamExt, try_unfold};
use reqwest::header::{ACCEPT, CACHE_CONTROL};

use super::decoder::{SseDecoder, SseEvent};
use crate::utils::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(SseEvent),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<TransportEvent, TransportError>> + Send>>;

pub trait Transport: Send + Sync + 'static {
    /// Start connecting to `url`. Returns immediately; progress is reported
    /// through the returned stream.
    fn open(&self, url: &str) -> EventStream;
}

/// `text/event-stream` over HTTP, backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn open(&self, url: &str) -> EventStream {
        let state = HttpState::Pending {
            client: self.client.clone(),
            url: url.to_string(),
        };
        Box::pin(try_unfold(state, advance))
    }
}

enum HttpState {
    Pending {
        client: reqwest::Client,
        url: String,
    },
    Streaming {
        body: BoxStream<'static, reqwest::Result<bytes::Bytes>>,
        decoder: SseDecoder,
        ready: VecDeque<SseEvent>,
    },
}

async fn advance(
    state: HttpState,
) -> Result<Option<(TransportEvent, HttpState)>, TransportError> {
    match state {
        HttpState::Pending { client, url } => {
            let response = client
                .get(&url)
                .header(ACCEPT, "text/event-stream")
                .header(CACHE_CONTROL, "no-cache")
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }

            let next = HttpState::Streaming {
                body: response.bytes_stream().boxed(),
                decoder: SseDecoder::new(),
                ready: VecDeque::new(),
            };
            Ok(Some((TransportEvent::Open, next)))
        }
        HttpState::Streaming {
            mut body,
            mut decoder,
            mut ready,
        } => loop {
            if let Some(event) = ready.pop_front() {
                let next = HttpState::Streaming {
                    body,
                    decoder,
                    ready,
                };
                return Ok(Some((TransportEvent::Message(event), next)));
            }

            match body.next().await {
                Some(chunk) => ready.extend(decoder.feed(&chunk?)?),
                None => return Ok(None),
            }
        },
    }
}
