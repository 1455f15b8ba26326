use std::{env, time::Duration};

use thiserror::Error;

use tasktrack_core::lock::BackoffPolicy;

use crate::pipeline::PipelineSettings;

/// Upper bound for the lease TTL, so a crashed holder cannot block a record for long.
pub const MAX_LOCK_TTL_MS: u64 = 60_000;

/// Timed cache and lease calls made while a lease is held: fence raise,
/// point delete, epoch bump, list deletion and the lease release.
pub const CACHE_CALLS_PER_RUN: u64 = 5;

/// Errors raised by [`Config::validate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("LOCK_TTL_MS ({ttl_ms}) must exceed the sum of store, audit and cache timeouts ({required_ms})")]
    LockTtlTooShort { ttl_ms: u64, required_ms: u64 },
    #[error("LOCK_TTL_MS ({ttl_ms}) must not exceed {MAX_LOCK_TTL_MS}")]
    LockTtlTooLong { ttl_ms: u64 },
    #[error("LOCK_BASE_DELAY_MS ({base_ms}) must not exceed LOCK_MAX_DELAY_MS ({max_ms})")]
    BackoffInverted { base_ms: u64, max_ms: u64 },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Cache TTL in seconds (default: 300)
    pub cache_ttl_seconds: u64,
    /// Maximum number of cache entries (default: 10,000)
    pub cache_max_entries: usize,
    /// Deadline of a single cache call in milliseconds (default: 250)
    pub cache_op_timeout_ms: u64,
    /// Deadline of a durable store call in milliseconds (default: 2,000)
    pub store_timeout_ms: u64,
    /// Deadline of an audit append in milliseconds (default: 1,000)
    pub audit_timeout_ms: u64,
    /// Lease TTL in milliseconds (default: 10,000)
    pub lock_ttl_ms: u64,
    /// Lease acquisition attempts before reporting busy (default: 5)
    pub lock_max_attempts: u32,
    /// First backoff delay in milliseconds (default: 25)
    pub lock_base_delay_ms: u64,
    /// Backoff delay cap in milliseconds (default: 400)
    pub lock_max_delay_ms: u64,
    /// Attempts for a failed invalidation before it is left to TTL (default: 5)
    pub invalidation_retry_attempts: u32,
    /// Path to SQLite database file (default: "tasktrack.db")
    /// Note: Only used when the `sqlite` feature is enabled.
    pub sqlite_path: String,
    /// Redis connection URL (default: "redis://localhost:6379")
    /// Note: Only used when the `redis` feature is enabled.
    pub redis_url: String,
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults:
    /// - `CACHE_TTL_SECONDS` (300), `CACHE_MAX_ENTRIES` (10,000)
    /// - `CACHE_OP_TIMEOUT_MS` (250), `STORE_TIMEOUT_MS` (2,000), `AUDIT_TIMEOUT_MS` (1,000)
    /// - `LOCK_TTL_MS` (10,000), `LOCK_MAX_ATTEMPTS` (5), `LOCK_BASE_DELAY_MS` (25),
    ///   `LOCK_MAX_DELAY_MS` (400)
    /// - `INVALIDATION_RETRY_ATTEMPTS` (5)
    /// - `SQLITE_PATH` ("tasktrack.db"), `REDIS_URL` ("redis://localhost:6379")
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            cache_ttl_seconds: parsed(&lookup, "CACHE_TTL_SECONDS", 300),
            cache_max_entries: parsed(&lookup, "CACHE_MAX_ENTRIES", 10_000),
            cache_op_timeout_ms: parsed(&lookup, "CACHE_OP_TIMEOUT_MS", 250),
            store_timeout_ms: parsed(&lookup, "STORE_TIMEOUT_MS", 2_000),
            audit_timeout_ms: parsed(&lookup, "AUDIT_TIMEOUT_MS", 1_000),
            lock_ttl_ms: parsed(&lookup, "LOCK_TTL_MS", 10_000),
            lock_max_attempts: parsed(&lookup, "LOCK_MAX_ATTEMPTS", 5),
            lock_base_delay_ms: parsed(&lookup, "LOCK_BASE_DELAY_MS", 25),
            lock_max_delay_ms: parsed(&lookup, "LOCK_MAX_DELAY_MS", 400),
            invalidation_retry_attempts: parsed(&lookup, "INVALIDATION_RETRY_ATTEMPTS", 5),
            sqlite_path: lookup("SQLITE_PATH").unwrap_or_else(|| "tasktrack.db".to_string()),
            redis_url: lookup("REDIS_URL")
                .unwrap_or_else(|| "redis://localhost:6379".to_string()),
        }
    }

    /// Rejects settings that would break the pipeline's timing assumptions.
    ///
    /// The lease must outlast one full run (store write, every timed cache
    /// call and the audit append) and stay bounded.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("CACHE_TTL_SECONDS", self.cache_ttl_seconds),
            ("CACHE_MAX_ENTRIES", self.cache_max_entries as u64),
            ("CACHE_OP_TIMEOUT_MS", self.cache_op_timeout_ms),
            ("STORE_TIMEOUT_MS", self.store_timeout_ms),
            ("AUDIT_TIMEOUT_MS", self.audit_timeout_ms),
            ("LOCK_MAX_ATTEMPTS", u64::from(self.lock_max_attempts)),
            ("INVALIDATION_RETRY_ATTEMPTS", u64::from(self.invalidation_retry_attempts)),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Zero(name));
        }

        let required_ms = self
            .store_timeout_ms
            .saturating_add(self.audit_timeout_ms)
            .saturating_add(self.cache_op_timeout_ms.saturating_mul(CACHE_CALLS_PER_RUN));
        if self.lock_ttl_ms <= required_ms {
            return Err(ConfigError::LockTtlTooShort {
                ttl_ms: self.lock_ttl_ms,
                required_ms,
            });
        }
        if self.lock_ttl_ms > MAX_LOCK_TTL_MS {
            return Err(ConfigError::LockTtlTooLong {
                ttl_ms: self.lock_ttl_ms,
            });
        }

        if self.lock_base_delay_ms > self.lock_max_delay_ms {
            return Err(ConfigError::BackoffInverted {
                base_ms: self.lock_base_delay_ms,
                max_ms: self.lock_max_delay_ms,
            });
        }

        Ok(())
    }

    /// Get cache TTL as a Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn cache_op_timeout(&self) -> Duration {
        Duration::from_millis(self.cache_op_timeout_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn lock_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            self.lock_max_attempts,
            Duration::from_millis(self.lock_base_delay_ms),
            Duration::from_millis(self.lock_max_delay_ms),
        )
    }

    /// Backoff for invalidation retries, sharing the lock backoff delays.
    pub fn invalidation_retry_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.invalidation_retry_attempts,
            ..self.lock_policy()
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            lock_ttl: Duration::from_millis(self.lock_ttl_ms),
            store_timeout: self.store_timeout(),
            audit_timeout: Duration::from_millis(self.audit_timeout_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
