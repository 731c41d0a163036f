//! Credential sources for the reconnecting client.
//!
//! The credential is looked up on every connect attempt and never cached by
//! the client, so a rotated or revoked session takes effect on the next
//! reconnect.

use std::fs;
use std::path::PathBuf;

use parking_lot::RwLock;
use tracing::debug;

pub trait CredentialStore: Send + Sync + 'static {
    /// The bearer token to present, or `None` if no session is available.
    fn token(&self) -> Option<String>;
}

/// In-process credential holder.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    token: RwLock<Option<String>>,
}

impl MemoryCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn set(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }
}

impl CredentialStore for MemoryCredentials {
    fn token(&self) -> Option<String> {
        self.token.read().clone()
    }
}

/// Reads the token from a persisted session file.
///
/// A missing, unreadable or blank file counts as no credential.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialStore for FileCredentials {
    fn token(&self) -> Option<String> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(e) => {
                debug!(path = %self.path.display(), "session file unavailable: {e}");
                None
            }
        }
    }
}
