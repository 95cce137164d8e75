//! Configuration storage

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000/api";
const DEFAULT_WS_BASE: &str = "ws://127.0.0.1:8000/ws/chat";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// User identity sent with every request (no authentication)
    pub email: Option<String>,
    /// Base URL of the chat server's HTTP API
    pub api_base: String,
    /// Base URL of the push channel; the email is appended as a path segment
    pub ws_base: String,
    /// Sync tick period
    pub poll_interval_ms: u64,
    /// Delay before reconnecting a closed push channel
    pub reconnect_delay_ms: u64,
    /// Quiet period after the last keystroke before "typing" clears
    pub typing_debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            email: None,
            api_base: DEFAULT_API_BASE.to_string(),
            ws_base: DEFAULT_WS_BASE.to_string(),
            poll_interval_ms: 1000,
            reconnect_delay_ms: 3000,
            typing_debounce_ms: 1000,
        }
    }
}

/// Timer periods derived from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub poll_interval: Duration,
    pub reconnect_delay: Duration,
    pub typing_debounce: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Config::default().timing()
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "chat-sync", "chat-sync")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // The file carries the user's email address.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// The configured email, or an error telling the user how to set it.
    pub fn email(&self) -> Result<&str> {
        self.email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .context("No email configured. Run `chat-sync config --email <address>` first.")
    }

    pub fn timing(&self) -> Timing {
        Timing {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            typing_debounce: Duration::from_millis(self.typing_debounce_ms),
        }
    }

    /// Push channel URL for the configured user: `{ws_base}/{email}`.
    pub fn push_url(&self) -> Result<String> {
        let email = self.email()?;
        let mut url = url::Url::parse(&self.ws_base).context("Invalid ws_base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("ws_base cannot carry a path: {}", self.ws_base))?
            .pop_if_empty()
            .push(email);
        Ok(url.to_string())
    }
}
