// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed configuration for the control plane, loaded from a TOML file with
//! environment-variable overrides (`CEP_*`), following the source family's
//! layering convention (fixed on-disk layout, env overrides for operators).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Pool sizing for one worker class (start-type or cancel-type).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PoolConfig {
    pub worker_limit: usize,
    pub buffer_limit: usize,
}

/// Full control-plane configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory under which `<instance>/<root>/state/...` is laid out.
    pub data_store: PathBuf,
    /// This instance's ID, used in the persisted directory layout.
    pub instance_id: String,
    pub command_pool: PoolConfig,
    pub cancel_pool: PoolConfig,
    pub session_pool: PoolConfig,
    pub session_cancel_pool: PoolConfig,

    #[serde(with = "humantime_secs")]
    pub poll_frequency: Duration,
    #[serde(with = "humantime_secs")]
    pub failed_reply_frequency: Duration,
    #[serde(with = "humantime_secs")]
    pub idempotency_sweep_frequency: Duration,
    #[serde(with = "humantime_secs")]
    pub idempotency_ttl: Duration,

    pub command_retry_limit: u32,
    #[serde(with = "humantime_secs")]
    pub reply_timeout: Duration,
    #[serde(with = "humantime_secs")]
    pub in_progress_expiry: Duration,

    #[serde(with = "humantime_secs")]
    pub command_retention: Duration,
    #[serde(with = "humantime_secs")]
    pub association_retention: Duration,
    #[serde(with = "humantime_secs")]
    pub session_retention: Duration,

    #[serde(with = "humantime_secs")]
    pub stop_timeout: Duration,
    #[serde(with = "humantime_secs")]
    pub hard_stop_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_store: PathBuf::from("/var/lib/cep"),
            instance_id: String::new(),
            command_pool: PoolConfig { worker_limit: 5, buffer_limit: 10 },
            cancel_pool: PoolConfig { worker_limit: 1, buffer_limit: 1 },
            session_pool: PoolConfig { worker_limit: 5, buffer_limit: 10 },
            session_cancel_pool: PoolConfig { worker_limit: 1, buffer_limit: 1 },
            poll_frequency: secs(15 * 60),
            failed_reply_frequency: secs(5 * 60),
            idempotency_sweep_frequency: secs(10 * 60),
            idempotency_ttl: secs(30 * 60),
            command_retry_limit: 3,
            reply_timeout: secs(2 * 60 * 60),
            in_progress_expiry: secs(48 * 60 * 60),
            command_retention: secs(24 * 60 * 60),
            association_retention: secs(24 * 60 * 60),
            session_retention: secs(24 * 60 * 60),
            stop_timeout: secs(30),
            hard_stop_timeout: secs(4),
        }
    }
}

impl Config {
    /// Load from a TOML file, falling back to defaults for any field the
    /// file omits, then apply `CEP_*` environment overrides.
    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CEP_DATA_STORE") {
            self.data_store = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CEP_INSTANCE_ID") {
            self.instance_id = v;
        }
    }

    /// Root directory for this instance's persisted state.
    pub fn instance_root(&self) -> PathBuf {
        self.data_store.join(&self.instance_id)
    }
}

/// Helper `serde(with = ...)` module: (de)serialize a `Duration` as whole
/// seconds, matching how the knobs in [`Config`] are named (`*_frequency`,
/// `*_ttl`, `*_timeout`).
mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config file: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_knobs() {
        let config = Config::default();
        assert_eq!(config.poll_frequency, Duration::from_secs(900));
        assert_eq!(config.idempotency_ttl, Duration::from_secs(1800));
        assert_eq!(config.hard_stop_timeout, Duration::from_secs(4));
        assert_eq!(config.cancel_pool.buffer_limit, 1);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(std::path::Path::new("/nonexistent/cep.toml")).unwrap();
        assert_eq!(config.command_retry_limit, 3);
    }
}
