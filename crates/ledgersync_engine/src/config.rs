//! Configuration for a sync session.

use std::time::Duration;

/// Configuration for one remote file.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server base URL, without a trailing slash.
    pub server_url: String,
    /// Remote file id.
    pub file_id: String,
    /// Remote group id.
    pub group_id: String,
    /// Encryption key id the file is expected to use, if encrypted.
    pub key_id: Option<String>,
    /// Session token sent with every request.
    pub token: String,
    /// Node id for the logical clock. Generated when absent.
    pub client_id: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Creates a configuration for an unencrypted file.
    pub fn new(
        server_url: impl Into<String>,
        file_id: impl Into<String>,
        group_id: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into().trim_end_matches('/').to_string(),
            file_id: file_id.into(),
            group_id: group_id.into(),
            key_id: None,
            token: String::new(),
            client_id: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the expected encryption key id.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Sets the session token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Pins the clock node id.
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns true if the file is expected to be encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.key_id.is_some()
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("", "", "")
    }
}
