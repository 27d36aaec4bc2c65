//! Plugin-based provider registry
//!
//! Maps provider names to factories so cloud accounts can be opened without
//! hardcoded if-else chains over provider types.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dnssync_core::registry::ProviderRegistry;
//!
//! let registry = ProviderRegistry::new();
//! dnssync_provider_cloudflare::register(&registry);
//!
//! // Open a connection for an account
//! let provider = registry.create_provider(&account)?;
//! ```
//!
//! ## Registration
//!
//! Provider crates expose a `register` function called once at start-up:
//!
//! ```rust,ignore
//! pub fn register(registry: &ProviderRegistry) {
//!     registry.register_provider("cloudflare", Box::new(CloudflareFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{Error, Result};
use crate::model::CloudAccount;
use crate::traits::{DnsCapabilities, DnsProvider, DnsProviderFactory};

/// Provider registry for plugin-based DNS provider creation
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ProviderRegistry {
    /// Registered DNS provider factories
    providers: RwLock<HashMap<String, Box<dyn DnsProviderFactory>>>,
}

impl ProviderRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a DNS provider factory
    ///
    /// # Parameters
    ///
    /// - `name`: Provider name as stored on cloud accounts (e.g., "cloudflare")
    /// - `factory`: Factory object for creating provider instances
    ///
    /// Registering a name twice replaces the earlier factory.
    pub fn register_provider(&self, name: impl Into<String>, factory: Box<dyn DnsProviderFactory>) {
        let name = name.into();
        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        if providers.insert(name.clone(), factory).is_some() {
            tracing::warn!("Provider {} registered twice, keeping the latest factory", name);
        }
    }

    /// Open a provider connection for a cloud account
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn DnsProvider>)`: Connected provider instance
    /// - `Err(Error)`: If the account's provider is not registered or creation fails
    pub fn create_provider(&self, account: &CloudAccount) -> Result<Box<dyn DnsProvider>> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        let factory = providers
            .get(&account.provider)
            .ok_or_else(|| Error::config(format!("Unknown provider type: {}", account.provider)))?;

        factory.create(account)
    }

    /// Static capabilities of a registered provider
    ///
    /// # Returns
    ///
    /// - `Err(Error::NotSupported)` if the provider is not registered
    pub fn capabilities(&self, name: &str) -> Result<DnsCapabilities> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);

        providers
            .get(name)
            .map(|factory| factory.capabilities())
            .ok_or_else(|| Error::not_supported(format!("Provider {} is not registered", name)))
    }

    /// List all registered provider names
    pub fn list_providers(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a provider name is registered
    pub fn has_provider(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        providers.contains_key(name)
    }
}
