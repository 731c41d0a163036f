use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /publish` and `POST /publish/{topic}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishResponse {
    pub delivered: usize,
}

/// Query string accepted by every endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}
