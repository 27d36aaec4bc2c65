//! Zone reconciliation engine
//!
//! The ZoneEngine is responsible for:
//! - Validating zone, cache and VPC requests before any state transition
//! - Starting the task that carries out each accepted request
//! - Pushing local record sets to every cloud copy of a zone
//! - Importing remote zones and record sets from a cloud account
//! - Debouncing record-set edits into a single sync per zone
//!
//! ## Architecture
//!
//! ```text
//!  record-set CRUD ── mark_dirty ──► Debouncer ──┐
//!                                                │ fire
//!  create / cache / add_vpcs / delete ──────────►│
//!                                                ▼
//!                                       ┌──────────────┐
//!                                       │  ZoneEngine  │── ZoneEvent ──► daemon
//!                                       └──────────────┘
//!                                                │ start_task
//!                                                ▼
//!                                       ┌──────────────┐
//!                                       │ TaskManager  │
//!                                       └──────────────┘
//!                                                │
//!                    ┌───────────────────────────┼──────────────────────┐
//!                    ▼                           ▼                      ▼
//!             ┌─────────────┐           ┌──────────────┐       ┌───────────────┐
//!             │    Store    │           │ DnsProvider  │       │ PolicyRegistry│
//!             └─────────────┘           └──────────────┘       └───────────────┘
//! ```
//!
//! ## Zone lifecycle
//!
//! Every long-running operation starts from `available`, moves the zone to
//! its transient status and hands the work to a task. The task ends in
//! `available` (or `deleted`) on success and in the matching `*_failed`
//! status on error, with the error text in `status_reason`.

mod records;
mod sync;
mod zone;

pub use records::{RecordSetCreate, RecordSetUpdate, TrafficPolicyInput};
pub use sync::SyncResult;
pub use zone::CreateZoneRequest;

pub(crate) use zone::managed_account;

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::debounce::Debouncer;
use crate::error::{Error, Result};
use crate::lock::LockManager;
use crate::model::{CloudAccount, DnsZone, DnsZoneCache, ZoneStatus};
use crate::policy::TrafficPolicyRegistry;
use crate::registry::ProviderRegistry;
use crate::tasks::{TaskId, TaskManager, TaskRegistry, TaskStage};
use crate::traits::{CloudDnsZone, DnsProvider, Store};

/// Events emitted by the ZoneEngine
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneEvent {
    /// A task began running
    TaskStarted {
        task_id: TaskId,
        kind: String,
        zone_id: String,
    },

    /// A task finished successfully
    TaskCompleted {
        task_id: TaskId,
        kind: String,
        zone_id: String,
    },

    /// A task failed; the zone moved to the matching failed status
    TaskFailed {
        task_id: TaskId,
        kind: String,
        zone_id: String,
        error: String,
    },

    /// Zone status changed
    ZoneStatusChanged {
        zone_id: String,
        status: ZoneStatus,
        reason: Option<String>,
    },

    /// Local record sets changed and a delayed sync is pending
    ZoneMarkedDirty {
        zone_id: String,
    },

    /// A push of local record sets to the providers finished
    RecordSetsSynced {
        zone_id: String,
        result: SyncResult,
    },
}

/// Zone reconciliation engine
///
/// Cheap to clone; clones share the store, the locks, the debounce timers
/// and the task table.
///
/// ## Lifecycle
///
/// 1. Create with [`ZoneEngine::new()`]
/// 2. Drive it through the zone, record-set and import operations
/// 3. Consume [`ZoneEvent`]s from the returned receiver
#[derive(Clone)]
pub struct ZoneEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<dyn Store>,
    providers: Arc<ProviderRegistry>,
    policies: TrafficPolicyRegistry,
    locks: Arc<LockManager>,
    debouncer: Debouncer,
    tasks: TaskManager,
    event_tx: mpsc::Sender<ZoneEvent>,
    config: EngineConfig,
}

impl ZoneEngine {
    /// Create a new zone engine with the built-in task handlers
    ///
    /// # Parameters
    ///
    /// - `store`: Repository implementation
    /// - `providers`: Registry holding every provider factory in use
    /// - `config`: Engine settings
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        store: Arc<dyn Store>,
        providers: Arc<ProviderRegistry>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<ZoneEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);
        let locks = Arc::new(LockManager::new());

        let engine = Self {
            inner: Arc::new(EngineInner {
                policies: TrafficPolicyRegistry::new(Arc::clone(&store), Arc::clone(&locks)),
                debouncer: Debouncer::new(config.debounce_delay()),
                tasks: TaskManager::new(TaskRegistry::with_builtin()),
                store,
                providers,
                locks,
                event_tx: tx,
                config,
            }),
        };

        Ok((engine, rx))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.inner.providers
    }

    pub fn policies(&self) -> &TrafficPolicyRegistry {
        &self.inner.policies
    }

    pub fn locks(&self) -> &LockManager {
        &self.inner.locks
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.inner.tasks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Whether a delayed sync is pending for the zone
    pub fn sync_pending(&self, zone_id: &str) -> bool {
        self.inner.debouncer.is_armed(zone_id)
    }

    /// Wait until a task completes or fails
    pub async fn wait_task(&self, task_id: &str) -> Result<TaskStage> {
        self.inner.tasks.wait(task_id).await
    }

    /// Move a zone to `status` and notify listeners
    ///
    /// # Parameters
    ///
    /// - `zone_id`: Zone to update
    /// - `status`: New status
    /// - `reason`: Failure or summary text; `None` clears the previous one
    pub async fn set_zone_status(
        &self,
        zone_id: &str,
        status: ZoneStatus,
        reason: Option<String>,
    ) -> Result<DnsZone> {
        let event_reason = reason.clone();
        let zone = self
            .inner
            .store
            .update_zone(zone_id, Box::new(move |z| z.set_status(status, reason)))
            .await?;

        match &event_reason {
            Some(reason) => info!("Zone {} ({}) is now {}: {}", zone.name, zone.id, status, reason),
            None => info!("Zone {} ({}) is now {}", zone.name, zone.id, status),
        }
        self.emit_event(ZoneEvent::ZoneStatusChanged {
            zone_id: zone_id.to_string(),
            status,
            reason: event_reason,
        });
        Ok(zone)
    }

    /// Create a task, move the zone to `status` and schedule the task
    ///
    /// The caller must hold the zone's status lock and have checked that
    /// the zone may leave its current status.
    pub(crate) async fn start_task(
        &self,
        kind: &str,
        zone_id: &str,
        status: ZoneStatus,
        params: serde_json::Value,
    ) -> Result<TaskId> {
        let task = self.inner.tasks.new_task(kind, zone_id, params)?;
        self.set_zone_status(zone_id, status, None).await?;
        let task_id = task.id.clone();
        self.inner.tasks.schedule_run(self.clone(), task);
        Ok(task_id)
    }

    /// Load a zone and require it to be `available`
    pub(crate) async fn require_available(&self, zone_id: &str) -> Result<DnsZone> {
        let zone = self.inner.store.get_zone(zone_id).await?;
        if zone.status != ZoneStatus::Available {
            return Err(Error::invalid_status(format!(
                "zone {} is {}, expected {}",
                zone.name,
                zone.status,
                ZoneStatus::Available
            )));
        }
        Ok(zone)
    }

    /// Open a provider connection for a cloud account
    pub async fn provider_for_account(&self, account_id: &str) -> Result<(CloudAccount, Box<dyn DnsProvider>)> {
        let account = self.inner.store.get_account(account_id).await?;
        let provider = self.inner.providers.create_provider(&account)?;
        Ok((account, provider))
    }

    /// The remote zone a materialized cache points at
    pub async fn cloud_zone(&self, cache: &DnsZoneCache) -> Result<Box<dyn CloudDnsZone>> {
        if !cache.is_materialized() {
            return Err(Error::not_found(format!("cache {} has no remote zone", cache.id)));
        }
        let (_, provider) = self.provider_for_account(&cache.cloudaccount_id).await?;
        provider.get_zone(&cache.external_id).await
    }

    pub(crate) fn cancel_delayed_sync(&self, zone_id: &str) {
        if self.inner.debouncer.cancel(zone_id) {
            debug!("Cancelled pending sync for zone {}", zone_id);
        }
    }

    pub(crate) fn debouncer(&self) -> &Debouncer {
        &self.inner.debouncer
    }

    /// Emit an engine event
    ///
    /// # Parameters
    ///
    /// - `event`: The event to emit
    pub(crate) fn emit_event(&self, event: ZoneEvent) {
        // Send event, logging warning if channel is full (backpressure)
        if self.inner.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
