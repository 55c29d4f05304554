//! Proxy configuration management.
//!
//! Configuration is stored at `~/.config/pagecache/config.json`. A missing
//! file means defaults. Every field can be overridden with a `PAGECACHE_*`
//! environment variable.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::handler::LookupFailurePolicy;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "pagecache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Name of the cache store responses are written to.
pub const DEFAULT_CACHE_NAME: &str = "pagecache-v1";

/// Loopback only; the proxy is meant for the local front-end.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8787";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin every intercepted request is forwarded to.
    pub upstream: Option<String>,
    pub listen: String,
    pub cache_name: String,
    /// Overrides the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    /// `None` leaves network requests unbounded.
    pub request_timeout_secs: Option<u64>,
    pub lookup_failure: LookupFailurePolicy,
    /// Write logs to daily files here instead of stderr.
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream: None,
            listen: DEFAULT_LISTEN.to_string(),
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            cache_dir: None,
            request_timeout_secs: None,
            lookup_failure: LookupFailurePolicy::default(),
            log_dir: None,
        }
    }
}

impl Config {
    /// Load from the config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `PAGECACHE_*` overrides, reading each variable through `var`.
    pub fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| var(key).filter(|value| !value.trim().is_empty());

        if let Some(upstream) = var("PAGECACHE_UPSTREAM") {
            self.upstream = Some(upstream);
        }
        if let Some(listen) = var("PAGECACHE_LISTEN") {
            self.listen = listen;
        }
        if let Some(name) = var("PAGECACHE_CACHE_NAME") {
            self.cache_name = name;
        }
        if let Some(dir) = var("PAGECACHE_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = var("PAGECACHE_TIMEOUT_SECS") {
            let secs = secs
                .trim()
                .parse::<u64>()
                .with_context(|| format!("PAGECACHE_TIMEOUT_SECS is not a number: {}", secs))?;
            self.request_timeout_secs = Some(secs);
        }
        if let Some(dir) = var("PAGECACHE_LOG_DIR") {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(policy) = var("PAGECACHE_LOOKUP_FAILURE") {
            self.lookup_failure = match policy.trim().to_ascii_lowercase().as_str() {
                "reuse" => LookupFailurePolicy::ReuseInFlight,
                "refetch" => LookupFailurePolicy::Refetch,
                other => anyhow::bail!("PAGECACHE_LOOKUP_FAILURE must be reuse or refetch, got {}", other),
            };
        }
        Ok(())
    }

    /// Parsed upstream origin. Required to run the proxy.
    pub fn upstream_url(&self) -> Result<Url> {
        let raw = self
            .upstream
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No upstream configured (set PAGECACHE_UPSTREAM)"))?;
        let url = Url::parse(raw).with_context(|| format!("Invalid upstream URL: {}", raw))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!("Upstream must be http or https: {}", raw);
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
