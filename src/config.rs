//! Configuration Module
//!
//! Per-call cache policy ([`CacheConfig`]) and manager-wide settings loaded
//! from environment variables ([`ManagerSettings`]).

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::{CacheError, Result};

// == Cache Config ==
/// Freshness and capacity policy for a class of keys.
///
/// Every entry keeps a copy of the config it was last written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Age after which data is stale but still servable
    pub ttl: Duration,
    /// Age after which data is expired; only used as an offline/error fallback
    pub max_age: Duration,
    /// Serve stale data immediately and refresh in the background
    pub stale_while_revalidate: bool,
    /// Per-entry byte ceiling
    pub max_size: Option<usize>,
    /// Table size ceiling; falls back to [`ManagerSettings::max_entries`]
    pub max_entries: Option<usize>,
}

impl CacheConfig {
    // == Constructor ==
    /// Creates a config with the given windows and no capacity limits.
    pub fn new(ttl: Duration, max_age: Duration) -> Result<Self> {
        let config = Self {
            ttl,
            max_age,
            stale_while_revalidate: false,
            max_size: None,
            max_entries: None,
        };
        config.validate()?;
        Ok(config)
    }

    // == Presets ==
    /// Rapidly changing data such as live vehicle positions.
    pub fn live_data() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            max_age: Duration::from_secs(5 * 60),
            stale_while_revalidate: true,
            max_size: None,
            max_entries: None,
        }
    }

    /// Per-user data that should not be served stale without a refetch.
    pub fn user_data() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            max_age: Duration::from_secs(30 * 60),
            stale_while_revalidate: false,
            max_size: None,
            max_entries: None,
        }
    }

    /// Slowly changing lookups such as route and stop listings.
    pub fn reference_data() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            max_age: Duration::from_secs(24 * 60 * 60),
            stale_while_revalidate: true,
            max_size: None,
            max_entries: None,
        }
    }

    pub fn static_data() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            max_age: Duration::from_secs(7 * 24 * 60 * 60),
            stale_while_revalidate: true,
            max_size: None,
            max_entries: None,
        }
    }

    // == Overrides ==
    /// Returns a copy of this config with the given fields replaced.
    ///
    /// Fails if the result violates `max_age >= ttl`.
    pub fn with_overrides(&self, overrides: ConfigOverrides) -> Result<Self> {
        let config = Self {
            ttl: overrides.ttl.unwrap_or(self.ttl),
            max_age: overrides.max_age.unwrap_or(self.max_age),
            stale_while_revalidate: overrides
                .stale_while_revalidate
                .unwrap_or(self.stale_while_revalidate),
            max_size: overrides.max_size.or(self.max_size),
            max_entries: overrides.max_entries.or(self.max_entries),
        };
        config.validate()?;
        Ok(config)
    }

    // == Validate ==
    pub fn validate(&self) -> Result<()> {
        if self.max_age < self.ttl {
            return Err(CacheError::InvalidConfig(format!(
                "max_age ({}ms) must not be shorter than ttl ({}ms)",
                self.max_age.as_millis(),
                self.ttl.as_millis()
            )));
        }
        if self.max_entries == Some(0) {
            return Err(CacheError::InvalidConfig(
                "max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn ttl_ms(&self) -> u64 {
        self.ttl.as_millis() as u64
    }

    pub(crate) fn max_age_ms(&self) -> u64 {
        self.max_age.as_millis() as u64
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::user_data()
    }
}

// == Config Overrides ==
/// Typed set of fields to replace on an existing [`CacheConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub ttl: Option<Duration>,
    pub max_age: Option<Duration>,
    pub stale_while_revalidate: Option<bool>,
    pub max_size: Option<usize>,
    pub max_entries: Option<usize>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn stale_while_revalidate(mut self, enabled: bool) -> Self {
        self.stale_while_revalidate = Some(enabled);
        self
    }

    pub fn max_size(mut self, bytes: usize) -> Self {
        self.max_size = Some(bytes);
        self
    }

    pub fn max_entries(mut self, entries: usize) -> Self {
        self.max_entries = Some(entries);
        self
    }
}

// == Memory Policy ==
/// Aggregate byte ceiling and the two-tier pressure response.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPolicy {
    /// Total estimated bytes the table may hold
    pub max_total_bytes: usize,
    /// Usage ratio that triggers an aggressive cleanup
    pub pressure_threshold: f64,
    /// Usage ratio that triggers an emergency cleanup
    pub emergency_threshold: f64,
    /// Fraction of entries removed by an aggressive cleanup
    pub aggressive_eviction_fraction: f64,
    /// Fraction of entries kept by an emergency cleanup
    pub emergency_retain_fraction: f64,
}

impl MemoryPolicy {
    // == Validate ==
    /// Checks the byte ceiling, the threshold ordering and that every ratio
    /// lies in `(0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if self.max_total_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "max_total_bytes must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("pressure_threshold", self.pressure_threshold),
            ("emergency_threshold", self.emergency_threshold),
            ("aggressive_eviction_fraction", self.aggressive_eviction_fraction),
            ("emergency_retain_fraction", self.emergency_retain_fraction),
        ] {
            if !is_ratio(value) {
                return Err(CacheError::InvalidConfig(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.pressure_threshold > self.emergency_threshold {
            return Err(CacheError::InvalidConfig(format!(
                "pressure_threshold ({}) must not exceed emergency_threshold ({})",
                self.pressure_threshold, self.emergency_threshold
            )));
        }
        Ok(())
    }
}

impl Default for MemoryPolicy {
    fn default() -> Self {
        Self {
            max_total_bytes: 50 * 1024 * 1024,
            pressure_threshold: 0.8,
            emergency_threshold: 0.95,
            aggressive_eviction_fraction: 0.25,
            emergency_retain_fraction: 0.1,
        }
    }
}

// == Manager Settings ==
/// Manager-wide configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSettings {
    /// Entry ceiling used when a write's config does not set one
    pub max_entries: usize,
    /// Memory pressure policy
    pub memory: MemoryPolicy,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// HTTP port for the diagnostics server
    pub server_port: u16,
}

impl ManagerSettings {
    /// Creates settings by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Default entry ceiling (default: 1000)
    /// - `CACHE_MAX_BYTES` - Aggregate byte ceiling (default: 50 MiB)
    /// - `CACHE_PRESSURE_THRESHOLD` - Aggressive cleanup ratio (default: 0.8)
    /// - `CACHE_EMERGENCY_THRESHOLD` - Emergency cleanup ratio (default: 0.95)
    /// - `CACHE_AGGRESSIVE_FRACTION` - Share evicted by aggressive cleanup (default: 0.25)
    /// - `CACHE_EMERGENCY_RETAIN` - Share kept by emergency cleanup (default: 0.1)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 60)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    ///
    /// Values that fail to parse or fall outside their valid range are
    /// ignored in favor of the default, so the result always passes
    /// [`ManagerSettings::validate`].
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut memory = MemoryPolicy {
            max_total_bytes: env_where("CACHE_MAX_BYTES", defaults.memory.max_total_bytes, |v| {
                *v > 0
            }),
            pressure_threshold: env_where(
                "CACHE_PRESSURE_THRESHOLD",
                defaults.memory.pressure_threshold,
                is_ratio_ref,
            ),
            emergency_threshold: env_where(
                "CACHE_EMERGENCY_THRESHOLD",
                defaults.memory.emergency_threshold,
                is_ratio_ref,
            ),
            aggressive_eviction_fraction: env_where(
                "CACHE_AGGRESSIVE_FRACTION",
                defaults.memory.aggressive_eviction_fraction,
                is_ratio_ref,
            ),
            emergency_retain_fraction: env_where(
                "CACHE_EMERGENCY_RETAIN",
                defaults.memory.emergency_retain_fraction,
                is_ratio_ref,
            ),
        };
        if memory.pressure_threshold > memory.emergency_threshold {
            warn!(
                "Pressure threshold {} exceeds emergency threshold {}, using defaults",
                memory.pressure_threshold, memory.emergency_threshold
            );
            memory.pressure_threshold = defaults.memory.pressure_threshold;
            memory.emergency_threshold = defaults.memory.emergency_threshold;
        }

        Self {
            max_entries: env_where("CACHE_MAX_ENTRIES", defaults.max_entries, |v| *v > 0),
            memory,
            cleanup_interval: env_where("CLEANUP_INTERVAL", defaults.cleanup_interval, |v| {
                *v > 0
            }),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    // == Validate ==
    /// Rejects a zero entry ceiling, a zero cleanup interval and an invalid
    /// [`MemoryPolicy`].
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::InvalidConfig(
                "max_entries must be at least 1".to_string(),
            ));
        }
        if self.cleanup_interval == 0 {
            return Err(CacheError::InvalidConfig(
                "cleanup_interval must be at least 1 second".to_string(),
            ));
        }
        self.memory.validate()
    }
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            memory: MemoryPolicy::default(),
            cleanup_interval: 60,
            server_port: 3000,
        }
    }
}

fn env_or<V: FromStr>(name: &str, default: V) -> V {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Like [`env_or`], but a parsed value failing `valid` also yields the default.
fn env_where<V, P>(name: &str, default: V, valid: P) -> V
where
    V: FromStr + fmt::Display,
    P: Fn(&V) -> bool,
{
    match env::var(name).ok().and_then(|v| v.parse::<V>().ok()) {
        Some(value) if valid(&value) => value,
        Some(value) => {
            warn!("Ignoring out-of-range {}={}, using {}", name, value, default);
            default
        }
        None => default,
    }
}

fn is_ratio(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

fn is_ratio_ref(value: &f64) -> bool {
    is_ratio(*value)
}
