//! Runtime configuration for the sync pipeline, read from the environment.

use std::time::Duration;

use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::versioning::VersionSource;

pub const READ_TIMEOUT_VAR: &str = "SYNC_READ_TIMEOUT_MS";
pub const WRITE_TIMEOUT_VAR: &str = "SYNC_WRITE_TIMEOUT_MS";
pub const LEASE_TTL_VAR: &str = "SYNC_LEASE_TTL_MS";
pub const CAS_MAX_RETRIES_VAR: &str = "SYNC_CAS_MAX_RETRIES";
pub const VERSION_SOURCE_VAR: &str = "SYNC_VERSION_SOURCE";
pub const REDELIVERY_MAX_ATTEMPTS_VAR: &str = "SYNC_REDELIVERY_MAX_ATTEMPTS";
pub const REDELIVERY_BASE_DELAY_VAR: &str = "SYNC_REDELIVERY_BASE_DELAY_MS";

/// Longest lease the guard will hand out.
const MAX_LEASE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// How long an admitted attempt owns its version before a retry may take over.
    pub lease_ttl: Duration,
    pub cas_max_retries: u32,
    pub version_source: VersionSource,
    pub redelivery: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(2_000),
            write_timeout: Duration::from_millis(2_000),
            lease_ttl: Duration::from_millis(30_000),
            cas_max_retries: 8,
            version_source: VersionSource::Timestamp,
            redelivery: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let millis = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(raw) => {
                    let ms: u64 = raw
                        .trim()
                        .parse()
                        .map_err(|e| ConfigError::invalid(var, format!("`{raw}`: {e}")))?;
                    if ms == 0 {
                        return Err(ConfigError::invalid(var, "must be greater than zero"));
                    }
                    Ok(Duration::from_millis(ms))
                }
            }
        };
        let count = |var: &'static str, default: u32| -> Result<u32, ConfigError> {
            match lookup(var) {
                None => Ok(default),
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|e| ConfigError::invalid(var, format!("`{raw}`: {e}"))),
            }
        };

        let version_source = match lookup(VERSION_SOURCE_VAR) {
            None => defaults.version_source,
            Some(raw) => raw
                .parse()
                .map_err(|reason: String| ConfigError::invalid(VERSION_SOURCE_VAR, reason))?,
        };

        let redelivery = RetryPolicy {
            max_attempts: count(REDELIVERY_MAX_ATTEMPTS_VAR, defaults.redelivery.max_attempts)?,
            base_delay: millis(REDELIVERY_BASE_DELAY_VAR, defaults.redelivery.base_delay)?,
            ..defaults.redelivery.clone()
        };

        let config = Self {
            read_timeout: millis(READ_TIMEOUT_VAR, defaults.read_timeout)?,
            write_timeout: millis(WRITE_TIMEOUT_VAR, defaults.write_timeout)?,
            lease_ttl: millis(LEASE_TTL_VAR, defaults.lease_ttl)?,
            cas_max_retries: count(CAS_MAX_RETRIES_VAR, defaults.cas_max_retries)?,
            version_source,
            redelivery,
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks.
    ///
    /// A lease shorter than the write timeout would let a retry re-admit a
    /// version whose first write is still legitimately running.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lease_ttl <= self.write_timeout {
            return Err(ConfigError::invalid(
                LEASE_TTL_VAR,
                format!(
                    "lease ({} ms) must exceed the write timeout ({} ms)",
                    self.lease_ttl.as_millis(),
                    self.write_timeout.as_millis()
                ),
            ));
        }
        if self.lease_ttl > MAX_LEASE_TTL {
            return Err(ConfigError::invalid(LEASE_TTL_VAR, "must not exceed 24 hours"));
        }
        Ok(())
    }
}
