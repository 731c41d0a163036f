//! Server-sent events transport
//!
//! Responsibilities:
//! - Serve `GET /events/{topic}` as a `text/event-stream` response whose body
//!   is fed by a `Subscriber` registered with the `Broker`
//! - Unregister the subscriber when the response body is dropped, which
//!   happens on client disconnect and on server shutdown
//! - Accept `POST /publish/{topic}` and `POST /publish` from producers
//! - Run the keep-alive loop for as long as the server runs

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::Stream;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

use crate::broker::{Broker, Subscriber, SubscriberId, is_valid_event_name};
use crate::config::Settings;
use crate::transport::message::{PublishRequest, PublishResponse, TokenQuery};
use crate::utils::error::{AppError, ServerError};

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<Mutex<Broker>>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(broker: Arc<Mutex<Broker>>, settings: Settings) -> Self {
        Self {
            broker,
            settings: Arc::new(settings),
        }
    }

    fn authorize(&self, token: Option<&str>) -> Result<(), AppError> {
        match self.settings.server.auth_token.as_deref() {
            Some(expected) if token != Some(expected) => Err(AppError::Unauthorized),
            _ => Ok(()),
        }
    }
}

fn validate_event_name(name: &str) -> Result<(), AppError> {
    if is_valid_event_name(name) {
        Ok(())
    } else {
        Err(AppError::InvalidEventName)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events/{topic}", get(subscribe_handler))
        .route("/publish/{topic}", post(publish_handler))
        .route("/publish", post(publish_all_handler))
        .with_state(state)
}

/// Binds `host:port` from the settings and serves until Ctrl+C or SIGTERM.
pub async fn start_sse_server(
    broker: Arc<Mutex<Broker>>,
    settings: Settings,
) -> Result<(), ServerError> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

    info!("SSE server listening on http://{addr}");
    serve(listener, broker, settings, shutdown_signal()).await
}

/// Serves on an already bound listener until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    broker: Arc<Mutex<Broker>>,
    settings: Settings,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServerError> {
    let keepalive = match settings.broker.keepalive_secs {
        0 => None,
        secs => Some(tokio::spawn(Broker::start_keepalive_loop(
            broker.clone(),
            Duration::from_secs(secs),
        ))),
    };

    let app = router(AppState::new(broker.clone(), settings));
    // open event streams never finish on their own; end them before draining
    let shutdown = async move {
        shutdown.await;
        let closed = broker.lock().close_all();
        info!("Closed {closed} open stream(s)");
    };

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve);

    if let Some(task) = keepalive {
        task.abort();
    }
    info!("SSE server shut down");
    result
}

async fn subscribe_handler(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Query(query): Query<TokenQuery>,
) -> Result<Response, AppError> {
    state.authorize(query.token.as_deref())?;

    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let subscriber = Subscriber::new(tx);
    let id = subscriber.id.clone();
    {
        let mut broker = state.broker.lock();
        if broker.total_subscribers() >= state.settings.broker.max_connections {
            return Err(AppError::CapacityReached);
        }
        broker.subscribe(&topic, subscriber);
    }
    info!(%id, %topic, "subscriber connected");

    let stream = SubscriptionStream {
        receiver: rx,
        _guard: SubscriptionGuard {
            broker: state.broker.clone(),
            topic,
            id,
        },
    };

    Ok((
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn publish_handler(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    Query(query): Query<TokenQuery>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, AppError> {
    state.authorize(query.token.as_deref())?;
    validate_event_name(&request.event)?;

    let delivered = state
        .broker
        .lock()
        .publish(&topic, &request.event, &request.data);
    debug!(%topic, event = %request.event, delivered, "published");

    Ok(Json(PublishResponse { delivered }))
}

async fn publish_all_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, AppError> {
    state.authorize(query.token.as_deref())?;
    validate_event_name(&request.event)?;

    let delivered = state
        .broker
        .lock()
        .publish_all(&request.event, &request.data);
    debug!(event = %request.event, delivered, "published to all topics");

    Ok(Json(PublishResponse { delivered }))
}

/// Removes the subscriber from the broker when dropped.
struct SubscriptionGuard {
    broker: Arc<Mutex<Broker>>,
    topic: String,
    id: SubscriberId,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        // a failed write may already have removed it
        if self.broker.lock().unsubscribe(&self.topic, &self.id) {
            info!(id = %self.id, topic = %self.topic, "subscriber disconnected");
        }
    }
}

/// Response body of one event stream.
struct SubscriptionStream {
    receiver: UnboundedReceiver<String>,
    _guard: SubscriptionGuard,
}

impl Stream for SubscriptionStream {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx).map(|frame| frame.map(Ok))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_dropping_the_body_unsubscribes() {
        let broker = Arc::new(Mutex::new(Broker::new()));
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let subscriber = Subscriber::new(tx);
        let id = subscriber.id.clone();
        broker.lock().subscribe("event-42", subscriber);

        let mut stream = SubscriptionStream {
            receiver: rx,
            _guard: SubscriptionGuard {
                broker: broker.clone(),
                topic: "event-42".to_string(),
                id: id.clone(),
            },
        };

        broker
            .lock()
            .publish("event-42", "tick", &serde_json::json!(1));
        assert_eq!(
            stream.next().await,
            Some(Ok("event: tick\ndata: 1\n\n".to_string()))
        );

        drop(stream);
        assert!(!broker.lock().is_subscribed("event-42", &id));
        assert_eq!(broker.lock().topic_count(), 0);
    }

    #[test]
    fn test_authorize_only_checks_when_a_token_is_configured() {
        let broker = Arc::new(Mutex::new(Broker::new()));
        let open = AppState::new(broker.clone(), Settings::default());
        assert!(open.authorize(None).is_ok());
        assert!(open.authorize(Some("anything")).is_ok());

        let mut settings = Settings::default();
        settings.server.auth_token = Some("secret".to_string());
        let guarded = AppState::new(broker, settings);
        assert!(guarded.authorize(Some("secret")).is_ok());
        assert!(matches!(
            guarded.authorize(Some("wrong")),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(guarded.authorize(None), Err(AppError::Unauthorized)));
    }

    #[test]
    fn test_event_names_with_line_breaks_are_invalid() {
        assert!(validate_event_name("odds_update").is_ok());
        assert!(matches!(
            validate_event_name("odds_update\ndata: forged"),
            Err(AppError::InvalidEventName)
        ));
        assert!(matches!(
            validate_event_name("odds_update\r"),
            Err(AppError::InvalidEventName)
        ));
        assert_eq!(
            AppError::InvalidEventName.into_response().status(),
            axum::http::StatusCode::BAD_REQUEST
        );
    }
}
