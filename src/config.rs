//! Configuration management for intelsync.
//!
//! The configuration is read once at startup from an optional YAML file and
//! then overlaid with the environment variables the daemon has always used
//! (`TARGET_API`, `TARGET_DATABASE_NAME`, `DATABASE_USER`, `DATABASE_PASSWORD`).
//! The resulting value is immutable and passed by reference to every component.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::validation::{parse_interval, validate_base_url};

/// Secure string type that zeroizes memory on drop
/// Used for the database password
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecureString(String);

impl SecureString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base address of the threat-intelligence API (e.g. https://intel.example.com)
    pub api_base_url: String,

    /// Delay between two sync cycles (e.g. "1h", "15m")
    pub sync_interval: String,

    /// Upper bound for a single delta fetch, in seconds
    pub fetch_timeout_secs: u64,

    /// Consecutive storage failures tolerated before the daemon exits
    pub max_storage_failures: u32,

    /// Advisory lock preventing two daemons from writing the same store
    pub lock_file: PathBuf,

    pub database: DatabaseConfig,

    pub ruleset: RulesetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            sync_interval: "1h".to_string(),
            fetch_timeout_secs: 30,
            max_storage_failures: 5,
            lock_file: PathBuf::from("/var/run/intelsync.lock"),
            database: DatabaseConfig::default(),
            ruleset: RulesetConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    /// Target database name (TARGET_DATABASE_NAME)
    pub name: String,
    /// Database user (DATABASE_USER)
    pub user: String,
    /// Password can be set directly or via DATABASE_PASSWORD
    /// Memory is securely zeroed when dropped
    pub password: SecureString,
    /// Environment variable name to read the password from (optional)
    pub password_env: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "threat_intel".to_string(),
            user: "postgres".to_string(),
            password: SecureString::default(),
            password_env: None,
            max_connections: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesetConfig {
    /// Where the compiled ruleset is persisted before loading
    pub path: PathBuf,
    /// Path to the nft binary
    pub nft_path: String,
}

impl Default for RulesetConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/etc/intelsync/blacklist.nft"),
            nft_path: "/usr/sbin/nft".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from YAML (if present) and the process environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            serde_yaml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            debug!("No config file at {:?}, using defaults and environment", path);
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Overlay environment values. `lookup` is `std::env::var` in production.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api) = lookup("TARGET_API") {
            self.api_base_url = api;
        }
        if let Some(name) = lookup("TARGET_DATABASE_NAME") {
            self.database.name = name;
        }
        if let Some(user) = lookup("DATABASE_USER") {
            self.database.user = user;
        }
        if let Some(host) = lookup("DATABASE_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("DATABASE_PORT") {
            self.database.port = port
                .parse()
                .with_context(|| format!("Invalid DATABASE_PORT '{}'", port))?;
        }

        // Custom variable first, then the default one, then the file value
        let from_custom = self.database.password_env.as_deref().and_then(&lookup);
        if let Some(password) = from_custom.or_else(|| lookup("DATABASE_PASSWORD")) {
            self.database.password = SecureString::new(password);
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        parse_interval(&self.sync_interval)?;

        if !self.api_base_url.is_empty() {
            validate_base_url(&self.api_base_url)?;
        }

        if self.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be greater than zero");
        }

        if self.max_storage_failures == 0 {
            anyhow::bail!("max_storage_failures must be greater than zero");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be greater than zero");
        }

        if self.database.name.is_empty() {
            anyhow::bail!("Database name is empty (set TARGET_DATABASE_NAME)");
        }

        if !self.ruleset.path.is_absolute() {
            anyhow::bail!(
                "Ruleset path must be absolute: {}",
                self.ruleset.path.display()
            );
        }

        if self.ruleset.nft_path.is_empty() {
            anyhow::bail!("ruleset.nft_path cannot be empty");
        }

        Ok(())
    }

    /// Parsed sync interval.
    pub fn sync_interval(&self) -> Result<Duration> {
        parse_interval(&self.sync_interval)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
