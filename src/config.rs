use crate::auth::DEFAULT_VERIFY_URL;
use crate::connection::PoolConfig;
use anyhow::{Context, Result};
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;
use std::{net::SocketAddr, path::PathBuf};

/// Process configuration, read from the environment (and `.env`, if loaded).
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub nations_dump: PathBuf,
    pub regions_dump: PathBuf,
    /// Store state is loaded from and checkpointed to this file when set
    pub state_file: Option<PathBuf>,
    pub update_interval: Duration,
    pub throttle: Duration,
    pub max_connections: usize,
    pub verify_url: String,
    pub cache_capacity: NonZeroUsize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env_string("DUMPSYNC_BIND_ADDR", "127.0.0.1:9000")
            .parse::<SocketAddr>()
            .context("DUMPSYNC_BIND_ADDR must be a valid host:port")?;

        let nations_dump = PathBuf::from(env_string("DUMPSYNC_NATIONS_DUMP", "nations.jsonl"));
        let regions_dump = PathBuf::from(env_string("DUMPSYNC_REGIONS_DUMP", "regions.jsonl"));
        let state_file = std::env::var("DUMPSYNC_STATE_FILE")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let update_interval =
            Duration::from_secs(env_parse::<u64>("DUMPSYNC_UPDATE_INTERVAL_SECS", 86_400)?);
        let throttle = Duration::from_millis(env_parse::<u64>("DUMPSYNC_THROTTLE_MS", 1)?);
        let max_connections = env_parse::<usize>("DUMPSYNC_MAX_CONNECTIONS", 75)?;
        let verify_url = env_string("DUMPSYNC_VERIFY_URL", DEFAULT_VERIFY_URL);
        let cache_capacity = NonZeroUsize::new(env_parse::<usize>("DUMPSYNC_CACHE_CAPACITY", 10_000)?)
            .context("DUMPSYNC_CACHE_CAPACITY must be greater than zero")?;

        if update_interval.is_zero() {
            anyhow::bail!("DUMPSYNC_UPDATE_INTERVAL_SECS must be greater than zero");
        }

        Ok(Self {
            bind_addr,
            nations_dump,
            regions_dump,
            state_file,
            update_interval,
            throttle,
            max_connections,
            verify_url,
            cache_capacity,
        })
    }

    pub fn pool_config(&self) -> Result<PoolConfig> {
        let config = PoolConfig::new().max_connections(self.max_connections);
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid connection pool settings: {}", e))?;
        Ok(config)
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value '{}'", key, value)),
        Err(_) => Ok(default),
    }
}
