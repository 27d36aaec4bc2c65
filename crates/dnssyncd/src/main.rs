// # dnssyncd - DNS Sync Daemon
//
// Thin integration layer around dnssync-core. All zone, record-set and
// sync logic lives in the core crate; the daemon only:
//
// 1. Reads configuration (a JSON file and/or environment variables)
// 2. Initializes logging and the runtime
// 3. Opens the store and registers providers and cloud accounts
// 4. Starts the zone engine, logs its events and runs the periodic import
//
// ## Configuration
//
// ### Config file
// - `DNSSYNC_CONFIG`: Path to a JSON `DnsSyncConfig` (store, accounts, engine)
//
// ### Overrides (applied on top of the file)
// - `DNSSYNC_STORE_PATH`: Use a JSON file store at this path
// - `DNSSYNC_CLOUDFLARE_API_TOKEN`: Register a Cloudflare account
// - `DNSSYNC_CLOUDFLARE_ACCOUNT_ID`: Cloudflare account id (needed to create zones)
// - `DNSSYNC_ACCOUNT_NAME`: Name of that account (default: cloudflare)
// - `DNSSYNC_DEBOUNCE_SECS`: Delay between the last record edit and its sync
// - `DNSSYNC_IMPORT_INTERVAL_SECS`: Cloud import interval, 0 disables it
// - `DNSSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export DNSSYNC_STORE_PATH=/var/lib/dnssync/store.json
// export DNSSYNC_CLOUDFLARE_API_TOKEN=your_token
// export DNSSYNC_IMPORT_INTERVAL_SECS=600
//
// dnssyncd
// ```

use anyhow::{Context, Result};
use dnssync_core::config::{AccountConfig, DnsSyncConfig, ProviderConfig, StoreConfig};
use dnssync_core::traits::AccountStore;
use dnssync_core::{FileStore, MemoryStore, ProviderRegistry, Store, ZoneEngine, ZoneEvent};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DnsSyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DnsSyncExitCode> for ExitCode {
    fn from(code: DnsSyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
struct Config {
    sync: DnsSyncConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from the process environment
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup` (environment access)
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut sync = match lookup("DNSSYNC_CONFIG").filter(|p| !p.is_empty()) {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read DNSSYNC_CONFIG file {}", path))?;
                serde_json::from_str(&text).with_context(|| format!("Invalid config file {}", path))?
            }
            None => DnsSyncConfig::new(),
        };

        if let Some(path) = lookup("DNSSYNC_STORE_PATH") {
            sync.store = StoreConfig::File { path };
        }

        if let Some(api_token) = lookup("DNSSYNC_CLOUDFLARE_API_TOKEN") {
            let name = lookup("DNSSYNC_ACCOUNT_NAME").unwrap_or_else(|| "cloudflare".to_string());
            let provider = ProviderConfig::Cloudflare {
                api_token,
                account_id: lookup("DNSSYNC_CLOUDFLARE_ACCOUNT_ID"),
            };
            sync.accounts.retain(|a| a.name != name);
            sync.accounts.push(AccountConfig::new(name, provider));
        }

        if let Some(secs) = lookup("DNSSYNC_DEBOUNCE_SECS") {
            sync.engine.debounce_delay_secs = secs
                .parse()
                .with_context(|| format!("DNSSYNC_DEBOUNCE_SECS must be a number of seconds. Got: {}", secs))?;
        }

        if let Some(secs) = lookup("DNSSYNC_IMPORT_INTERVAL_SECS") {
            sync.engine.import_interval_secs = secs.parse().with_context(|| {
                format!("DNSSYNC_IMPORT_INTERVAL_SECS must be a number of seconds. Got: {}", secs)
            })?;
        }

        Ok(Self {
            sync,
            log_level: lookup("DNSSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.sync.validate()?;

        if self.sync.accounts.is_empty() {
            warn_early(
                "No cloud accounts configured; zones stay local until an account is added. \
                Set DNSSYNC_CLOUDFLARE_API_TOKEN or list accounts in DNSSYNC_CONFIG",
            );
        }

        if let StoreConfig::File { path } = &self.sync.store
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "Store directory does not exist: {}. \
                Create it first: sudo mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        if self.log_level().is_none() {
            anyhow::bail!(
                "DNSSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        Ok(())
    }

    fn log_level(&self) -> Option<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

/// Warnings raised before the subscriber exists
fn warn_early(message: &str) {
    eprintln!("WARNING: {}", message);
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DnsSyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return DnsSyncExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = config.log_level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DnsSyncExitCode::ConfigError.into();
    }

    info!("Starting dnssyncd daemon");
    info!("Configuration loaded: {} cloud account(s)", config.sync.accounts.len());

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DnsSyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            DnsSyncExitCode::RuntimeError
        } else {
            DnsSyncExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let store = open_store(&config.sync.store).await?;

    // Create provider registry
    let registry = Arc::new(ProviderRegistry::new());

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare provider");
        dnssync_provider_cloudflare::register(&registry);
    }

    seed_accounts(&store, &registry, &config.sync.accounts).await?;

    let (engine, events) = ZoneEngine::new(Arc::clone(&store), registry, config.sync.engine.clone())?;
    let event_logger = tokio::spawn(log_events(events));

    let interval = config.sync.engine.import_interval_secs;
    let importer = (interval > 0).then(|| tokio::spawn(import_loop(engine.clone(), Duration::from_secs(interval))));
    if importer.is_none() {
        info!("Periodic cloud import disabled");
    }

    info!("Daemon initialized successfully");

    let shutdown_result = wait_for_shutdown().await;

    if let Some(importer) = importer {
        importer.abort();
    }
    drop(engine);
    event_logger.abort();

    match shutdown_result {
        Ok(signal) => {
            info!("Received shutdown signal: {}", signal);
            info!("Shutting down daemon");
            Ok(())
        }
        Err(e) => {
            error!("Shutdown error: {}", e);
            Err(e)
        }
    }
}

async fn open_store(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config {
        StoreConfig::File { path } => {
            info!("Using file store at {}", path);
            Arc::new(FileStore::open(path).await?)
        }
        StoreConfig::Memory => {
            warn!("Using in-memory store; zones are lost on shutdown");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

/// Insert configured accounts the store does not know yet (matched by name)
async fn seed_accounts(store: &Arc<dyn Store>, registry: &ProviderRegistry, accounts: &[AccountConfig]) -> Result<()> {
    let known = store.list_accounts().await?;

    for account in accounts {
        let provider = account.provider.type_name();
        if !registry.has_provider(provider) {
            anyhow::bail!(
                "Cloud account {} uses provider '{}', which is not compiled in. Available providers: {:?}",
                account.name,
                provider,
                registry.list_providers()
            );
        }

        if let Some(existing) = known.iter().find(|a| a.name == account.name) {
            info!("Cloud account {} already registered as {}", account.name, existing.id);
            continue;
        }

        let row = store.insert_account(account.to_account()?).await?;
        info!("Registered cloud account {} ({}) as {}", row.name, row.provider, row.id);
    }

    Ok(())
}

/// Import every account's cloud zones on a fixed interval
async fn import_loop(engine: ZoneEngine, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;

        let accounts = match engine.store().list_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                error!("Failed to list cloud accounts: {}", e);
                continue;
            }
        };

        for account in accounts {
            match engine.import_cloud_zones(&account.id).await {
                Ok(result) if result.is_error() => {
                    warn!("Import from {} finished with errors: {}", account.name, result)
                }
                Ok(result) => info!("Imported cloud zones from {}: {}", account.name, result),
                Err(e) => error!("Import from {} failed: {}", account.name, e),
            }
        }
    }
}

async fn log_events(mut events: mpsc::Receiver<ZoneEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ZoneEvent::TaskStarted { task_id, kind, zone_id } => {
                info!("Task {} ({}) started for zone {}", task_id, kind, zone_id)
            }
            ZoneEvent::TaskCompleted { task_id, kind, zone_id } => {
                info!("Task {} ({}) completed for zone {}", task_id, kind, zone_id)
            }
            ZoneEvent::TaskFailed {
                task_id,
                kind,
                zone_id,
                error,
            } => warn!("Task {} ({}) failed for zone {}: {}", task_id, kind, zone_id, error),
            ZoneEvent::ZoneStatusChanged {
                zone_id,
                status,
                reason: Some(reason),
            } => info!("Zone {} is now {} ({})", zone_id, status, reason),
            ZoneEvent::ZoneStatusChanged { zone_id, status, .. } => info!("Zone {} is now {}", zone_id, status),
            ZoneEvent::ZoneMarkedDirty { zone_id } => info!("Zone {} has pending record changes", zone_id),
            ZoneEvent::RecordSetsSynced { zone_id, result } => info!("Zone {} synced: {}", zone_id, result),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    // Set up signal handlers for SIGTERM and SIGINT
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(matches!(config.sync.store, StoreConfig::Memory));
        assert!(config.sync.accounts.is_empty());
        assert_eq!(config.log_level(), Some(Level::INFO));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DNSSYNC_CLOUDFLARE_API_TOKEN", "token_0123456789"),
            ("DNSSYNC_CLOUDFLARE_ACCOUNT_ID", "cf-account"),
            ("DNSSYNC_ACCOUNT_NAME", "prod"),
            ("DNSSYNC_DEBOUNCE_SECS", "30"),
            ("DNSSYNC_IMPORT_INTERVAL_SECS", "0"),
            ("DNSSYNC_LOG_LEVEL", "DEBUG"),
        ]))
        .unwrap();

        assert_eq!(config.sync.accounts.len(), 1);
        assert_eq!(config.sync.accounts[0].name, "prod");
        assert_eq!(config.sync.accounts[0].provider.type_name(), "cloudflare");
        assert_eq!(config.sync.engine.debounce_delay_secs, 30);
        assert_eq!(config.sync.engine.import_interval_secs, 0);
        assert_eq!(config.log_level(), Some(Level::DEBUG));
    }

    #[test]
    fn test_config_file_with_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dnssync.json");
        std::fs::write(
            &path,
            r#"{
                "store": { "type": "file", "path": "/tmp/ignored.json" },
                "accounts": [
                    { "name": "cloudflare", "provider": { "type": "cloudflare", "api_token": "from_file" } }
                ],
                "engine": { "debounce_delay_secs": 5 }
            }"#,
        )
        .unwrap();
        let store_path = dir.path().join("store.json");
        let store_path = store_path.to_str().unwrap();

        let config = Config::from_lookup(lookup(&[
            ("DNSSYNC_CONFIG", path.to_str().unwrap()),
            ("DNSSYNC_STORE_PATH", store_path),
            ("DNSSYNC_CLOUDFLARE_API_TOKEN", "from_env"),
        ]))
        .unwrap();

        assert!(matches!(&config.sync.store, StoreConfig::File { path } if path == store_path));
        assert_eq!(config.sync.engine.debounce_delay_secs, 5);
        assert_eq!(config.sync.accounts.len(), 1);
        assert!(matches!(
            &config.sync.accounts[0].provider,
            ProviderConfig::Cloudflare { api_token, .. } if api_token == "from_env"
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Config::from_lookup(lookup(&[("DNSSYNC_DEBOUNCE_SECS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("DNSSYNC_CONFIG", "/nonexistent/dnssync.json")])).is_err());

        let config = Config::from_lookup(lookup(&[("DNSSYNC_LOG_LEVEL", "loud")])).unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_lookup(lookup(&[("DNSSYNC_CLOUDFLARE_API_TOKEN", "")])).unwrap();
        assert!(config.validate().is_err());

        let config = Config::from_lookup(lookup(&[("DNSSYNC_STORE_PATH", "/nonexistent/dir/store.json")])).unwrap();
        assert!(config.validate().is_err());
    }

    #[cfg(feature = "cloudflare")]
    #[tokio::test]
    async fn test_seed_accounts_is_idempotent() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let registry = ProviderRegistry::new();
        dnssync_provider_cloudflare::register(&registry);
        let accounts = vec![AccountConfig::new(
            "cloudflare",
            ProviderConfig::Cloudflare {
                api_token: "token_0123456789".to_string(),
                account_id: None,
            },
        )];

        seed_accounts(&store, &registry, &accounts).await.unwrap();
        seed_accounts(&store, &registry, &accounts).await.unwrap();

        let rows = store.list_accounts().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].provider, "cloudflare");
        assert!(registry.create_provider(&rows[0]).is_ok());
    }

    #[tokio::test]
    async fn test_seed_accounts_rejects_unknown_provider() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let accounts = vec![AccountConfig::new(
            "custom",
            ProviderConfig::Custom {
                factory: "route53".to_string(),
                config: serde_json::json!({}),
            },
        )];
        assert!(seed_accounts(&store, &ProviderRegistry::new(), &accounts).await.is_err());
        assert!(store.list_accounts().await.unwrap().is_empty());
    }
}
