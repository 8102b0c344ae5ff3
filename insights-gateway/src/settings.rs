//! Gateway settings from `INSIGHTS_*` environment variables.

use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment};
use insights_core::{CacheSettings, TaskQueueConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub listen_addr: String,
    #[serde(default)]
    pub redis_url: Option<String>,
    #[serde(default)]
    pub amqp_url: Option<String>,
    pub cache_ttl_secs: u64,
    pub cache_workers: usize,
    pub cache_queue_capacity: usize,
    pub db_max_connections: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_environment(Environment::with_prefix("INSIGHTS"))
    }

    fn from_environment(env: Environment) -> Result<Self> {
        let settings: Settings = Config::builder()
            .set_default("listen_addr", "0.0.0.0:8090")?
            .set_default("cache_ttl_secs", 28_800)?
            .set_default("cache_workers", 10)?
            .set_default("cache_queue_capacity", 1024)?
            .set_default("db_max_connections", 10)?
            .add_source(env.try_parsing(true))
            .build()
            .context("failed to read INSIGHTS_* settings")?
            .try_deserialize()
            .context("invalid INSIGHTS_* settings")?;

        Ok(Settings {
            redis_url: settings.redis_url.filter(|s| !s.is_empty()),
            amqp_url: settings.amqp_url.filter(|s| !s.is_empty()),
            ..settings
        })
    }

    pub fn cache(&self) -> CacheSettings {
        CacheSettings {
            ttl: Duration::from_secs(self.cache_ttl_secs),
            ..CacheSettings::default()
        }
    }

    pub fn task_queue(&self) -> TaskQueueConfig {
        TaskQueueConfig {
            workers: self.cache_workers,
            capacity: self.cache_queue_capacity,
        }
    }
}
