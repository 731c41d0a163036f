//! CLI for ringcast
//!
//! Subcommands:
//! - `server`: run the SSE server
//! - `watch`: follow one or more channels and log every state change

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use parking_lot::Mutex;
use ringcast::broker::Broker;
use ringcast::client::{
    ChannelOptions, ChannelSet, CredentialStore, FileCredentials, HttpTransport,
    MemoryCredentials,
};
use ringcast::config::{Settings, load_config};
use ringcast::transport::start_sse_server;
use ringcast::utils::logging;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "ringcast")]
enum Command {
    /// Start the SSE server
    Server,
    /// Follow channels and log their state
    Watch {
        /// Channel to follow, as `name=url`. Repeatable.
        #[arg(long = "channel", value_parser = parse_channel, required = true)]
        channels: Vec<(String, String)>,
        /// Token presented to the server
        #[arg(long, conflicts_with = "session_file")]
        token: Option<String>,
        /// File holding the session token, re-read on every connect
        #[arg(long)]
        session_file: Option<PathBuf>,
    },
}

fn parse_channel(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(name, url)| !name.is_empty() && !url.is_empty())
        .map(|(name, url)| (name.to_string(), url.to_string()))
        .ok_or_else(|| format!("expected name=url, got `{raw}`"))
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cmd = Command::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            return;
        }
    };
    logging::init(&settings.log_level);

    let result = match cmd {
        Command::Server => run_server(settings).await,
        Command::Watch {
            channels,
            token,
            session_file,
        } => run_watch(settings, channels, token, session_file).await,
    };

    if let Err(e) = result {
        error!("{e}");
    }
}

async fn run_server(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let broker = Arc::new(Mutex::new(Broker::new()));
    start_sse_server(broker, settings).await?;
    Ok(())
}

async fn run_watch(
    settings: Settings,
    channels: Vec<(String, String)>,
    token: Option<String>,
    session_file: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let credentials: Arc<dyn CredentialStore> = match session_file {
        Some(path) => Arc::new(FileCredentials::new(path)),
        None => Arc::new(MemoryCredentials::new(token)),
    };
    let options = ChannelOptions {
        backoff: (&settings.client).into(),
        field_events: settings.client.field_events.clone(),
    };

    let mut set = ChannelSet::new(Arc::new(HttpTransport::new()?), credentials)
        .with_options(options);
    set.observe(channels);

    let mut watchers = Vec::new();
    for key in set.keys().map(str::to_string).collect::<Vec<_>>() {
        let Some(mut rx) = set.watch(&key) else {
            continue;
        };
        watchers.push(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                match &state.fault {
                    Some(fault) => warn!(channel = %key, status = ?state.status, ?fault, "channel state"),
                    None => info!(
                        channel = %key,
                        status = ?state.status,
                        latest = %state.latest.as_ref().map(ToString::to_string).unwrap_or_default(),
                        "channel state"
                    ),
                }
            }
        }));
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, closing channels");
    set.teardown();
    for watcher in watchers {
        watcher.abort();
    }

    Ok(())
}
