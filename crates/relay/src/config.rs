//! Session configuration

use std::time::Duration;

use edgerelay_core::AuthToken;

/// Idle timeout armed when the upstream connects
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Upper bound on establishing the upstream connection
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on delivering the close frame to a peer that stopped reading
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes held while the upstream is still connecting (1 MiB)
pub const DEFAULT_MAX_PENDING_BYTES: usize = 1024 * 1024;

/// Settings shared by every session of one deployment
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Canonical dashed-hex form of the deployment token
    expected_token: String,
    /// Forced closure delay after the upstream connects; not refreshed by traffic
    pub idle_timeout: Duration,
    pub connect_timeout: Duration,
    pub close_timeout: Duration,
    pub max_pending_bytes: usize,
}

impl SessionConfig {
    pub fn new(token: &AuthToken) -> Self {
        Self {
            expected_token: token.canonical(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            max_pending_bytes: DEFAULT_MAX_PENDING_BYTES,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    pub fn with_max_pending_bytes(mut self, max_pending_bytes: usize) -> Self {
        self.max_pending_bytes = max_pending_bytes;
        self
    }

    pub(crate) fn expected_token(&self) -> &str {
        &self.expected_token
    }
}
