//! Configuration types for the DNS sync system
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::model::CloudAccount;

/// Main DNS sync configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsSyncConfig {
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Cloud accounts to register on start-up
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl DnsSyncConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.store.validate()?;
        self.engine.validate()?;

        let mut names: Vec<&str> = Vec::new();
        for account in &self.accounts {
            account.validate()?;
            if names.contains(&account.name.as_str()) {
                return Err(crate::Error::config(format!(
                    "Cloud account {} configured twice",
                    account.name
                )));
            }
            names.push(&account.name);
        }

        Ok(())
    }
}

/// Store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON file store with backup and recovery
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Store file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

/// One cloud account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Account name, unique within the configuration
    pub name: String,

    /// Provider connection settings
    pub provider: ProviderConfig,
}

impl AccountConfig {
    pub fn new(name: impl Into<String>, provider: ProviderConfig) -> Self {
        Self {
            name: name.into(),
            provider,
        }
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.name.is_empty() {
            return Err(crate::Error::config("Cloud account name cannot be empty"));
        }
        self.provider.validate()
    }

    /// Cloud account row for this configuration (id assigned by the store)
    pub fn to_account(&self) -> Result<CloudAccount, crate::Error> {
        Ok(CloudAccount {
            id: String::new(),
            name: self.name.clone(),
            provider: self.provider.type_name().to_string(),
            config: self.provider.account_config()?,
        })
    }
}

/// DNS provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Cloudflare provider
    Cloudflare {
        /// Cloudflare API token
        api_token: String,
        /// Account ID, required to create zones
        account_id: Option<String>,
    },

    /// Custom provider
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl ProviderConfig {
    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            ProviderConfig::Cloudflare { api_token, .. } => {
                if api_token.is_empty() {
                    return Err(crate::Error::config("Cloudflare API token cannot be empty"));
                }
                Ok(())
            }
            ProviderConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom provider factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom provider config cannot be null"));
                }
                Ok(())
            }
        }
    }

    /// Get the provider type name
    pub fn type_name(&self) -> &str {
        match self {
            ProviderConfig::Cloudflare { .. } => "cloudflare",
            ProviderConfig::Custom { factory, .. } => factory,
        }
    }

    /// Settings stored on the cloud account and handed to the factory
    pub fn account_config(&self) -> Result<serde_json::Value, crate::Error> {
        match self {
            ProviderConfig::Cloudflare { .. } => Ok(serde_json::to_value(self)?),
            ProviderConfig::Custom { config, .. } => Ok(config.clone()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Delay between the last record-set change and the resulting sync (in seconds)
    ///
    /// Changes made while the timer is pending push it out again, so a
    /// burst of edits produces a single sync.
    #[serde(default = "default_debounce_delay_secs")]
    pub debounce_delay_secs: u64,

    /// Interval of the periodic cloud import (in seconds, 0 disables it)
    #[serde(default = "default_import_interval_secs")]
    pub import_interval_secs: u64,

    /// Capacity of the internal event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Additional metadata to attach to operations
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_secs(self.debounce_delay_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_delay_secs: default_debounce_delay_secs(),
            import_interval_secs: default_import_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            metadata: HashMap::new(),
        }
    }
}

fn default_debounce_delay_secs() -> u64 {
    10
}

fn default_import_interval_secs() -> u64 {
    300
}

fn default_event_channel_capacity() -> usize {
    1000
}
