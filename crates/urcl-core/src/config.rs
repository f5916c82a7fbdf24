//! Adapter configuration.
//!
//! Configuration is built in code through [`AdapterConfigBuilder`] or read from
//! the environment with [`AdapterConfig::from_env`].
//!
//! | variable | meaning |
//! |----------|---------|
//! | `URCL_ADAPTER_NAME` | label used in log output |
//! | `URCL_DEFAULT_OWNERSHIP` | `share`, `transfer` or `borrow` |
//! | `URCL_EAGER_DISCOVERY` | `1`/`true` discovers platforms at adapter creation |
//! | `URCL_WARN_PENDING_DELETERS` | `0`/`false` silences teardown warnings |

use crate::error::{Result, UrError};
use crate::handle::OwnershipIntent;

/// Environment variable holding the adapter name.
pub const ENV_ADAPTER_NAME: &str = "URCL_ADAPTER_NAME";
/// Environment variable holding the default ownership intent.
pub const ENV_DEFAULT_OWNERSHIP: &str = "URCL_DEFAULT_OWNERSHIP";
/// Environment variable enabling eager platform discovery.
pub const ENV_EAGER_DISCOVERY: &str = "URCL_EAGER_DISCOVERY";
/// Environment variable controlling pending-deleter warnings.
pub const ENV_WARN_PENDING_DELETERS: &str = "URCL_WARN_PENDING_DELETERS";

/// When platforms are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlatformDiscovery {
    /// On the first enumeration request.
    #[default]
    Lazy,
    /// When the adapter is created.
    Eager,
}

/// Adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Label used in log output.
    pub name: String,
    /// Ownership intent when an adoption call does not state one.
    pub default_ownership: OwnershipIntent,
    /// Platform discovery timing.
    pub platform_discovery: PlatformDiscovery,
    /// Log a warning for deleters still pending at adapter teardown.
    pub warn_on_pending_deleters: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: "opencl".to_string(),
            default_ownership: OwnershipIntent::Share,
            platform_discovery: PlatformDiscovery::Lazy,
            warn_on_pending_deleters: true,
        }
    }
}

impl AdapterConfig {
    /// Start a builder from the defaults.
    pub fn builder() -> AdapterConfigBuilder {
        AdapterConfigBuilder::new()
    }

    /// Defaults overridden by `URCL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(name) = lookup(ENV_ADAPTER_NAME) {
            builder = builder.name(name);
        }
        if let Some(intent) = lookup(ENV_DEFAULT_OWNERSHIP) {
            builder = builder.default_ownership(OwnershipIntent::parse(&intent)?);
        }
        if let Some(eager) = lookup(ENV_EAGER_DISCOVERY) {
            if parse_flag(&eager)? {
                builder = builder.platform_discovery(PlatformDiscovery::Eager);
            }
        }
        if let Some(warn) = lookup(ENV_WARN_PENDING_DELETERS) {
            builder = builder.warn_on_pending_deleters(parse_flag(&warn)?);
        }
        builder.build()
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(UrError::InvalidValue),
    }
}

/// Builder for [`AdapterConfig`].
#[derive(Debug, Clone, Default)]
pub struct AdapterConfigBuilder {
    config: AdapterConfig,
}

impl AdapterConfigBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log label.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the default ownership intent.
    pub fn default_ownership(mut self, intent: OwnershipIntent) -> Self {
        self.config.default_ownership = intent;
        self
    }

    /// Set platform discovery timing.
    pub fn platform_discovery(mut self, discovery: PlatformDiscovery) -> Self {
        self.config.platform_discovery = discovery;
        self
    }

    /// Enable or disable pending-deleter warnings.
    pub fn warn_on_pending_deleters(mut self, warn: bool) -> Self {
        self.config.warn_on_pending_deleters = warn;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<AdapterConfig> {
        if self.config.name.trim().is_empty() {
            return Err(UrError::InvalidValue);
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = AdapterConfig::default();
        assert_eq!(config.name, "opencl");
        assert_eq!(config.default_ownership, OwnershipIntent::Share);
        assert_eq!(config.platform_discovery, PlatformDiscovery::Lazy);
        assert!(config.warn_on_pending_deleters);
    }

    #[test]
    fn test_builder() {
        let config = AdapterConfig::builder()
            .name("test")
            .default_ownership(OwnershipIntent::Transfer)
            .platform_discovery(PlatformDiscovery::Eager)
            .warn_on_pending_deleters(false)
            .build()
            .unwrap();
        assert_eq!(config.name, "test");
        assert_eq!(config.default_ownership, OwnershipIntent::Transfer);
        assert_eq!(config.platform_discovery, PlatformDiscovery::Eager);
        assert!(!config.warn_on_pending_deleters);
    }

    #[test]
    fn test_builder_rejects_empty_name() {
        assert_eq!(
            AdapterConfig::builder().name("  ").build(),
            Err(UrError::InvalidValue)
        );
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            (ENV_ADAPTER_NAME, "sim"),
            (ENV_DEFAULT_OWNERSHIP, "borrow"),
            (ENV_EAGER_DISCOVERY, "1"),
            (ENV_WARN_PENDING_DELETERS, "off"),
        ]
        .into_iter()
        .collect();

        let config = AdapterConfig::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(config.name, "sim");
        assert_eq!(config.default_ownership, OwnershipIntent::Borrow);
        assert_eq!(config.platform_discovery, PlatformDiscovery::Eager);
        assert!(!config.warn_on_pending_deleters);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let result = AdapterConfig::from_lookup(|key| {
            (key == ENV_DEFAULT_OWNERSHIP).then(|| "lend".to_string())
        });
        assert_eq!(result, Err(UrError::InvalidValue));

        let result =
            AdapterConfig::from_lookup(|key| (key == ENV_EAGER_DISCOVERY).then(|| "maybe".to_string()));
        assert_eq!(result, Err(UrError::InvalidValue));
    }
}
