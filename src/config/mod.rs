mod settings;

use crate::config::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, ClientSettings, ServerSettings, Settings};

/// Prefix of environment overrides, e.g. `RINGCAST_SERVER__PORT=9000`.
/// List values are comma separated: `RINGCAST_CLIENT__FIELD_EVENTS=status,score`.
pub const ENV_PREFIX: &str = "RINGCAST";

/// Loads the configuration from the default file and environment variables.
///
/// `config/default.*` is optional; environment variables take precedence over
/// it, and anything neither source sets falls back to `Settings::default()`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("client.field_events"),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(merge(partial, Settings::default()))
}

fn merge(partial: PartialSettings, default: Settings) -> Settings {
    let server = partial.server;
    let broker = partial.broker;
    let client = partial.client;

    Settings {
        server: ServerSettings {
            host: server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
            auth_token: server
                .as_ref()
                .and_then(|s| s.auth_token.clone())
                .or(default.server.auth_token),
        },
        broker: BrokerSettings {
            max_connections: broker
                .as_ref()
                .and_then(|b| b.max_connections)
                .unwrap_or(default.broker.max_connections),
            keepalive_secs: broker
                .as_ref()
                .and_then(|b| b.keepalive_secs)
                .unwrap_or(default.broker.keepalive_secs),
        },
        client: ClientSettings {
            base_delay_ms: client
                .as_ref()
                .and_then(|c| c.base_delay_ms)
                .unwrap_or(default.client.base_delay_ms),
            max_delay_ms: client
                .as_ref()
                .and_then(|c| c.max_delay_ms)
                .unwrap_or(default.client.max_delay_ms),
            field_events: client
                .and_then(|c| c.field_events)
                .unwrap_or(default.client.field_events),
        },
        log_level: partial.log_level.unwrap_or(default.log_level),
    }
}
