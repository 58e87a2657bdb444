//! edgerelay Settings
//!
//! Configuration for the relay server: JSON file, environment overrides
//! and validation.
//!
//! ## Usage
//!
//! ```no_run
//! use edgerelay_settings::Settings;
//!
//! let mut settings = Settings::load_or_default()?;
//! settings.apply_env()?;
//! settings.validate()?;
//! # Ok::<(), edgerelay_settings::SettingsError>(())
//! ```

mod config;

pub use config::{RelaySettings, ServerSettings, Settings};

use std::path::PathBuf;

use thiserror::Error;

/// Environment variable overriding `server.listen_addr`
pub const ENV_LISTEN: &str = "EDGERELAY_LISTEN";
/// Environment variable overriding `server.port`
pub const ENV_PORT: &str = "EDGERELAY_PORT";
/// Environment variable overriding `relay.auth_token`
pub const ENV_TOKEN: &str = "EDGERELAY_TOKEN";
/// Environment variable overriding `server.ws_path`
pub const ENV_PATH: &str = "EDGERELAY_PATH";
/// Environment variable overriding `relay.idle_timeout_secs`
pub const ENV_IDLE_TIMEOUT: &str = "EDGERELAY_IDLE_TIMEOUT";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(std::io::Error),

    #[error("Failed to write settings: {0}")]
    WriteError(std::io::Error),

    #[error("Failed to parse settings: {0}")]
    ParseError(serde_json::Error),

    #[error("Failed to create config directory: {0}")]
    CreateDirError(std::io::Error),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("No auth token configured (set relay.auth_token or EDGERELAY_TOKEN)")]
    MissingToken,

    #[error("Invalid auth token: {0}")]
    InvalidToken(#[from] edgerelay_core::TokenError),

    #[error("Invalid setting: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Get the default settings file path
///
/// `$HOME/.edgerelay/settings.json`, or `edgerelay.json` in the working
/// directory when no home directory is known.
pub fn default_settings_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".edgerelay").join("settings.json"),
        None => PathBuf::from("edgerelay.json"),
    }
}
