use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use deckd_bridge::{BridgeConfig, ReconnectConfig};
use deckd_registry::RegistryConfig;
use deckd_stems::StemCacheConfig;

/// Daemon configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single-machine setup.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub database_url: String,
    pub bridge: BridgeConfig,
    pub registry: RegistryConfig,
    pub stems: StemCacheConfig,
    /// Finished jobs older than this are purged once a day.
    pub job_retention: chrono::Duration,
}

impl DaemonConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                      |
    /// |---------------------------|------------------------------|
    /// | `DATABASE_URL`            | `sqlite://deckd.db?mode=rwc` |
    /// | `PLAYBACK_WS_URL`         | `ws://127.0.0.1:9002`        |
    /// | `STEM_CACHE_DIR`          | `./stem-cache`               |
    /// | `STEM_CACHE_MAX_ENTRIES`  | `10`                         |
    /// | `JOB_MAX_RETRIES`         | `3`                          |
    /// | `KEEPALIVE_INTERVAL_SECS` | `30`                         |
    /// | `PEER_READY_TIMEOUT_SECS` | `30`                         |
    /// | `CONNECT_TIMEOUT_SECS`    | `5`                          |
    /// | `JOB_RETENTION_DAYS`      | `7`                          |
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let secs = |key: &str, default: u64| -> anyhow::Result<Duration> {
            Ok(Duration::from_secs(parse(&lookup, key, default)?))
        };

        Ok(Self {
            database_url: string("DATABASE_URL", "sqlite://deckd.db?mode=rwc"),
            bridge: BridgeConfig {
                url: string("PLAYBACK_WS_URL", "ws://127.0.0.1:9002"),
                keepalive_interval: secs("KEEPALIVE_INTERVAL_SECS", 30)?,
                peer_ready_timeout: secs("PEER_READY_TIMEOUT_SECS", 30)?,
                connect_timeout: secs("CONNECT_TIMEOUT_SECS", 5)?,
                reconnect: ReconnectConfig::default(),
                ..BridgeConfig::default()
            },
            registry: RegistryConfig {
                max_retries: parse(&lookup, "JOB_MAX_RETRIES", 3)?,
            },
            stems: StemCacheConfig {
                root: PathBuf::from(string("STEM_CACHE_DIR", "./stem-cache")),
                max_entries: parse(&lookup, "STEM_CACHE_MAX_ENTRIES", 10)?,
            },
            job_retention: chrono::Duration::days(parse(&lookup, "JOB_RETENTION_DAYS", 7)?),
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a valid number, got {raw:?}")),
        None => Ok(default),
    }
}
