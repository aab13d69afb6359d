use std::io;
use thiserror::Error;

/// Errors raised while loading or validating a [`crate::config::GateConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("encode error: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised when a network snapshot violates its shape invariants.
#[derive(Debug, Error, PartialEq)]
pub enum SnapshotError {
    #[error("snapshot vectors misaligned: {identities} identities, {stake} stakes, {permits} permits")]
    LengthMismatch {
        identities: usize,
        stake: usize,
        permits: usize,
    },
    #[error("uid {uid} has invalid stake {stake}")]
    InvalidStake { uid: usize, stake: f64 },
}

/// Failure channel for deployment-supplied policies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// The deployment does not provide this policy; the default applies.
    #[error("policy not implemented")]
    NotImplemented,
    #[error("policy failed: {0}")]
    Failed(String),
}
