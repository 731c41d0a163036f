use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the HTTP server, the broadcast registry and the
/// reconnecting client.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub client: ClientSettings,
    pub log_level: String,
}

/// Configuration settings for the server.
///
/// `auth_token`, when set, must be presented by every stream and publish
/// request as the `token` query parameter.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub auth_token: Option<String>,
}

/// Configuration settings for the broadcast registry.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub max_connections: usize,
    /// Interval between keep-alive comment frames. `0` disables them.
    pub keepalive_secs: u64,
}

/// Configuration settings for the reconnecting client.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Event names stored under their own key in a channel's latest value.
    pub field_events: Vec<String>,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub client: Option<PartialClientSettings>,
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
    pub keepalive_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub field_events: Option<Vec<String>>,
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                auth_token: None,
            },
            broker: BrokerSettings {
                max_connections: 1000,
                keepalive_secs: 15,
            },
            client: ClientSettings {
                base_delay_ms: 1000,
                max_delay_ms: 30_000,
                field_events: vec!["status".to_string()],
            },
            log_level: "info".to_string(),
        }
    }
}
