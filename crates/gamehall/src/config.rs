//! Server configuration.
//!
//! Configuration is read once at startup into an immutable
//! [`ServerConfig`]. Every field has a default, so an empty JSON object is
//! a valid config file.

use std::env;
use std::path::{Path, PathBuf};

use gamehall_room::DEFAULT_CHANNEL_SIZE;
use serde::{Deserialize, Serialize};

use crate::GamehallError;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "GAMEHALL_CONFIG";

/// Environment variable overriding `admin_secret`.
pub const ADMIN_SECRET_ENV: &str = "GAMEHALL_ADMIN_SECRET";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// Command queue length of each room actor.
    pub room_channel_size: usize,

    /// Enables debug-level logging.
    pub debug: bool,

    /// Directory game modules are looked up in. Ignored with a warning if
    /// it is not an existing directory.
    pub plugin_dir: Option<PathBuf>,

    /// The administrative secret. Empty disables administrator access.
    pub admin_secret: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            room_channel_size: DEFAULT_CHANNEL_SIZE,
            debug: false,
            plugin_dir: None,
            admin_secret: String::new(),
        }
    }
}

impl ServerConfig {
    /// Reads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GamehallError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| {
            GamehallError::ConfigRead {
                path: path.to_path_buf(),
                source,
            }
        })?;
        serde_json::from_str(&raw).map_err(|source| GamehallError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the file named by `GAMEHALL_CONFIG` (defaults when unset),
    /// then applies `GAMEHALL_ADMIN_SECRET` on top.
    pub fn from_env() -> Result<Self, GamehallError> {
        let mut config = match env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Ok(secret) = env::var(ADMIN_SECRET_ENV) {
            config.admin_secret = secret;
        }
        Ok(config)
    }

    /// The plugin directory, if it is set and exists.
    pub fn plugin_dir(&self) -> Option<&Path> {
        let dir = self.plugin_dir.as_deref()?;
        if dir.is_dir() {
            Some(dir)
        } else {
            tracing::warn!(plugin_dir = %dir.display(), "plugin directory does not exist, ignoring");
            None
        }
    }
}
