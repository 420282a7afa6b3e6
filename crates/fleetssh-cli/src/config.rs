//! Configuration file loading
//!
//! `fleetssh.toml` supplies fleet defaults; command-line flags override them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use fleetssh_core::{DEFAULT_CONCURRENCY, DEFAULT_PORT};

/// Top-level configuration for the `fleetssh` binary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
    /// Fleet defaults
    #[serde(default)]
    pub fleet: FleetConfig,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Level used when `RUST_LOG` is unset (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON log lines
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Fleet defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Host specifiers
    #[serde(default)]
    pub hosts: Vec<String>,
    /// SSH user
    #[serde(default = "default_user")]
    pub user: String,
    /// Default SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Private key path
    #[serde(default)]
    pub private_key: Option<PathBuf>,
    /// Environment variable holding a base64 private key
    #[serde(default)]
    pub private_key_env: Option<String>,
    /// Environment variable holding the SSH password
    #[serde(default)]
    pub password_env: Option<String>,
    /// Work on several hosts at once
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    /// Upper bound on concurrent hosts
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    /// Connect timeout in seconds
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            user: default_user(),
            port: default_port(),
            private_key: None,
            private_key_env: None,
            password_env: None,
            parallel: default_parallel(),
            max_parallel: default_max_parallel(),
            connect_timeout_secs: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_parallel() -> bool {
    true
}

fn default_max_parallel() -> usize {
    DEFAULT_CONCURRENCY
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("reading {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from the first default location that exists, or use defaults
    ///
    /// # Errors
    /// Returns error if a found file cannot be read or parsed
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var("FLEETSSH_CONFIG") {
            return Self::load(Path::new(&path));
        }

        for path in Self::search_paths() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Config::default())
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("fleetssh.toml"),
            PathBuf::from("/etc/fleetssh/fleetssh.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("fleetssh/fleetssh.toml"));
        }
        paths
    }
}

/// First conventional SSH key under `~/.ssh` that exists
#[must_use]
pub fn default_key() -> Option<PathBuf> {
    let ssh_dir = dirs::home_dir()?.join(".ssh");
    ["id_ed25519", "id_ecdsa", "id_rsa"]
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|path| path.exists())
}
