//! Configuration types

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use edgerelay_core::AuthToken;

use crate::{
    default_settings_path, Result, SettingsError, ENV_IDLE_TIMEOUT, ENV_LISTEN, ENV_PATH, ENV_PORT,
    ENV_TOKEN,
};

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// HTTP listener
    #[serde(default)]
    pub server: ServerSettings,

    /// Relay sessions
    #[serde(default)]
    pub relay: RelaySettings,

    /// Seconds to wait for sessions to drain before forcing exit
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    /// Custom settings file path (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            relay: RelaySettings::default(),
            shutdown_grace_secs: default_shutdown_grace(),
            config_path: None,
        }
    }
}

impl Settings {
    /// Load settings from the default path, or create defaults
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&default_settings_path())
    }

    /// Load settings from a specific path, or create defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(SettingsError::ReadError)?;
            let settings: Settings = serde_json::from_str(&content).map_err(SettingsError::ParseError)?;
            info!("Loaded settings from {:?}", path);
            settings
        } else {
            debug!("No settings at {:?}, using defaults", path);
            Self::default()
        };
        settings.config_path = Some(path.to_path_buf());
        Ok(settings)
    }

    /// Save settings to the configured path
    pub fn save(&self) -> Result<()> {
        let path = self.config_path.clone().unwrap_or_else(default_settings_path);
        self.save_to(&path)
    }

    /// Save settings to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(SettingsError::CreateDirError)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(SettingsError::ParseError)?;
        std::fs::write(path, content).map_err(SettingsError::WriteError)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }

    /// Path the settings were loaded from, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Apply `EDGERELAY_*` environment overrides
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(listen) = lookup(ENV_LISTEN) {
            self.server.listen_addr = listen;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port.trim().parse().map_err(|_| SettingsError::InvalidEnv {
                var: ENV_PORT,
                value: port,
            })?;
        }
        if let Some(token) = lookup(ENV_TOKEN) {
            self.relay.auth_token = Some(token);
        }
        if let Some(path) = lookup(ENV_PATH) {
            self.server.ws_path = path;
        }
        if let Some(idle) = lookup(ENV_IDLE_TIMEOUT) {
            self.relay.idle_timeout_secs = idle.trim().parse().map_err(|_| SettingsError::InvalidEnv {
                var: ENV_IDLE_TIMEOUT,
                value: idle,
            })?;
        }
        Ok(())
    }

    /// Check that the settings can start a server
    pub fn validate(&self) -> Result<()> {
        self.auth_token()?;
        if !self.server.ws_path.starts_with('/') {
            return Err(SettingsError::Invalid(format!(
                "server.ws_path must start with '/', got {:?}",
                self.server.ws_path
            )));
        }
        if self.server.listen_addr.trim().is_empty() {
            return Err(SettingsError::Invalid("server.listen_addr is empty".to_string()));
        }
        if self.relay.idle_timeout_secs == 0 {
            return Err(SettingsError::Invalid("relay.idle_timeout_secs must be non-zero".to_string()));
        }
        if self.relay.connect_timeout_secs == 0 {
            return Err(SettingsError::Invalid("relay.connect_timeout_secs must be non-zero".to_string()));
        }
        Ok(())
    }

    /// The configured token, parsed
    pub fn auth_token(&self) -> Result<AuthToken> {
        let token = self.relay.auth_token.as_deref().ok_or(SettingsError::MissingToken)?;
        Ok(token.parse::<AuthToken>()?)
    }

    /// `host:port` for the listener
    pub fn bind_addr(&self) -> String {
        let host = &self.server.listen_addr;
        if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, self.server.port)
        } else {
            format!("{}:{}", host, self.server.port)
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Path that accepts WebSocket upgrades; everything else gets the decoy page
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            port: default_port(),
            ws_path: default_ws_path(),
        }
    }
}

/// Relay session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Dashed-hex token clients must present
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Bytes held per session while its upstream connects
    #[serde(default = "default_max_pending")]
    pub max_pending_bytes: usize,
}

fn default_idle_timeout() -> u64 {
    300
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_pending() -> usize {
    1024 * 1024
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            auth_token: None,
            idle_timeout_secs: default_idle_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_pending_bytes: default_max_pending(),
        }
    }
}

impl RelaySettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
