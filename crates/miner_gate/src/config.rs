use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;
use crate::priority::LOOKBACK;
use crate::request::Identity;

pub const CONFIG_FILE: &str = "gate.toml";

/// Upper bound on `priority.history_len`; every caller holds this many slots.
pub const MAX_HISTORY_LEN: usize = 4096;

/// Startup configuration for the gate. Read once, never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    #[serde(default)]
    pub priority: PriorityConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlacklistConfig {
    #[serde(default)]
    pub whitelist: BTreeSet<Identity>,
    #[serde(default)]
    pub blacklist: BTreeSet<Identity>,
    /// Only callers holding a validator permit are admitted.
    #[serde(default)]
    pub force_validator_permit: bool,
    #[serde(default)]
    pub allow_non_registered: bool,
    /// Registered callers staking less than this are rejected. `0` disables the check.
    #[serde(default)]
    pub minimum_stake_requirement: f64,
    #[serde(default)]
    pub use_request_cache: bool,
    /// Blocks a payload fingerprint stays in the dedup cache.
    #[serde(default = "default_request_cache_block_span")]
    pub request_cache_block_span: u64,
    /// Window over which at most `priority.history_len` requests are served per caller.
    #[serde(default = "default_min_request_period_secs")]
    pub min_request_period_secs: f64,
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            whitelist: BTreeSet::new(),
            blacklist: BTreeSet::new(),
            force_validator_permit: false,
            allow_non_registered: false,
            minimum_stake_requirement: 0.0,
            use_request_cache: false,
            request_cache_block_span: default_request_cache_block_span(),
            min_request_period_secs: default_min_request_period_secs(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriorityConfig {
    /// Priority of unregistered callers and of a caller's first request.
    #[serde(default)]
    pub default: f64,
    /// Idle time after which a caller's stake counts double.
    #[serde(default = "default_stake_doubling_period_secs")]
    pub stake_doubling_period_secs: f64,
    /// Request timestamps remembered per caller.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            default: 0.0,
            stake_doubling_period_secs: default_stake_doubling_period_secs(),
            history_len: default_history_len(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Seconds between snapshot refreshes by [`crate::snapshot::SnapshotRefresher`].
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl SnapshotConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

fn default_request_cache_block_span() -> u64 {
    7200
}

fn default_min_request_period_secs() -> f64 {
    5.0 * 60.0
}

fn default_stake_doubling_period_secs() -> f64 {
    10.0 * 60.0
}

fn default_history_len() -> usize {
    50
}

fn default_refresh_interval_secs() -> u64 {
    12
}

impl GateConfig {
    /// Load `<dir>/gate.toml`. A missing file is created holding the
    /// defaults; a file that exists but fails to parse or validate is left
    /// untouched and the error is returned.
    pub fn load(dir: &str) -> Result<Self, ConfigError> {
        let path = format!("{}/{}", dir, CONFIG_FILE);
        match Self::from_file(&path) {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %path, "gate config missing; writing defaults");
                let cfg = Self::default();
                cfg.save(dir)?;
                Ok(cfg)
            }
            Err(err) => {
                tracing::error!(path = %path, %err, "gate config rejected");
                Err(err)
            }
        }
    }

    pub fn save(&self, dir: &str) -> Result<(), ConfigError> {
        fs::create_dir_all(dir)?;
        let path = format!("{}/{}", dir, CONFIG_FILE);
        let body = toml::to_string_pretty(self)?;
        fs::write(path, body)?;
        Ok(())
    }

    /// Like [`GateConfig::load`] but never creates the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.priority;
        let b = &self.blacklist;
        if p.history_len < LOOKBACK {
            return Err(ConfigError::Invalid(format!(
                "priority.history_len must be at least {LOOKBACK}, got {}",
                p.history_len
            )));
        }
        if p.history_len > MAX_HISTORY_LEN {
            return Err(ConfigError::Invalid(format!(
                "priority.history_len must be at most {MAX_HISTORY_LEN}, got {}",
                p.history_len
            )));
        }
        if !(p.stake_doubling_period_secs.is_finite() && p.stake_doubling_period_secs > 0.0) {
            return Err(ConfigError::Invalid(
                "priority.stake_doubling_period_secs must be positive".into(),
            ));
        }
        if !(p.default.is_finite() && p.default >= 0.0) {
            return Err(ConfigError::Invalid(
                "priority.default must be non-negative".into(),
            ));
        }
        if !(b.min_request_period_secs.is_finite() && b.min_request_period_secs >= 0.0) {
            return Err(ConfigError::Invalid(
                "blacklist.min_request_period_secs must be non-negative".into(),
            ));
        }
        if !(b.minimum_stake_requirement.is_finite() && b.minimum_stake_requirement >= 0.0) {
            return Err(ConfigError::Invalid(
                "blacklist.minimum_stake_requirement must be non-negative".into(),
            ));
        }
        if let Some(id) = b.whitelist.intersection(&b.blacklist).next() {
            tracing::warn!(caller = %id, "identity is both whitelisted and blacklisted; whitelist wins");
        }
        Ok(())
    }

    /// Settings that expose the miner to callers it probably should not serve.
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.blacklist.force_validator_permit {
            out.push("non-validators may send requests to this miner");
        }
        if self.blacklist.allow_non_registered {
            out.push("non-registered callers may send requests to this miner");
        }
        out
    }
}
