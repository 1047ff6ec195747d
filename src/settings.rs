use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ShellError;

pub const DEFAULT_URL: &str = "http://localhost:7125";

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_console_history() -> usize {
    100
}

fn default_console_capacity() -> usize {
    1000
}

fn default_completion_timeout_ms() -> u64 {
    1500
}

fn default_status_interval_secs() -> u64 {
    2
}

/// Shell settings stored in the OS config directory. Every field has a serde
/// default so partial files load cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellSettings {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Timeout for regular command requests.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Number of historical console messages seeded on entering console mode.
    #[serde(default = "default_console_history")]
    pub console_history: usize,
    /// Ring buffer capacity for console mode.
    #[serde(default = "default_console_capacity")]
    pub console_capacity: usize,
    /// Timeout for completion-time name lookups and the status line.
    #[serde(default = "default_completion_timeout_ms")]
    pub completion_timeout_ms: u64,
    #[serde(default)]
    pub split_screen: bool,
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            console_history: default_console_history(),
            console_capacity: default_console_capacity(),
            completion_timeout_ms: default_completion_timeout_ms(),
            split_screen: false,
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl ShellSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms.max(1))
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs.max(1))
    }
}

/// Load settings from the config directory. A missing file yields defaults;
/// an unreadable or malformed one is a configuration error.
pub fn load_settings(config_dir: &Path) -> Result<ShellSettings, ShellError> {
    let path = crate::paths::settings_path(config_dir);
    if !path.exists() {
        debug!(path = %path.display(), "no settings file, using defaults");
        return Ok(ShellSettings::default());
    }
    let data = fs::read_to_string(&path).map_err(|e| ShellError::Config {
        message: format!("{}: {e}", path.display()),
    })?;
    serde_json::from_str(&data).map_err(|e| ShellError::Config {
        message: format!("{}: {e}", path.display()),
    })
}

/// Save settings to the config directory (atomic write via a sibling tmp file).
pub fn save_settings(config_dir: &Path, settings: &ShellSettings) -> Result<(), ShellError> {
    let config_err = |e: std::io::Error| ShellError::Config {
        message: e.to_string(),
    };
    fs::create_dir_all(config_dir).map_err(config_err)?;
    let path = crate::paths::settings_path(config_dir);
    let json = serde_json::to_string_pretty(settings).map_err(|e| ShellError::Config {
        message: e.to_string(),
    })?;

    let mut tmp_name = OsString::from(crate::paths::SETTINGS_FILE);
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, json.as_bytes()).map_err(config_err)?;
    fs::rename(&tmp_path, &path).map_err(config_err)
}
