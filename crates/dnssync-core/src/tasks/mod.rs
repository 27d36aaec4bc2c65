//! Asynchronous zone tasks
//!
//! Every accepted zone operation is carried out by a task: a named handler
//! looked up in an explicit [`TaskRegistry`], run on its own tokio task by
//! the [`TaskManager`].
//!
//! ## Stages
//!
//! `Pending` → `Running` → `Complete` | `Failed`
//!
//! A handler error moves the task's zone to the handler's failure status
//! with the error text as `status_reason`. Tasks are never retried.

mod zone_cache;
mod zone_create;
mod zone_delete;
mod zone_sync;
mod zone_vpcs;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{error, info};

use crate::engine::{ZoneEngine, ZoneEvent};
use crate::error::{Error, Result};
use crate::model::ZoneStatus;

pub const DNS_ZONE_CREATE_TASK: &str = "DnsZoneCreateTask";
pub const DNS_ZONE_CACHE_CREATE_TASK: &str = "DnsZoneCacheCreateTask";
pub const DNS_ZONE_CACHE_DELETE_TASK: &str = "DnsZoneCacheDeleteTask";
pub const DNS_ZONE_ADD_VPCS_TASK: &str = "DnsZoneAddVpcsTask";
pub const DNS_ZONE_REMOVE_VPCS_TASK: &str = "DnsZoneRemoveVpcsTask";
pub const DNS_ZONE_SYNC_RECORD_SETS_TASK: &str = "DnsZoneSyncRecordSetsTask";
pub const DNS_ZONE_DELETE_TASK: &str = "DnsZoneDeleteTask";

pub type TaskId = String;

/// One scheduled unit of work
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub kind: String,
    /// Zone the task operates on
    pub object_id: String,
    pub params: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Decode the task parameters
    pub fn params<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.params.clone())
            .map_err(|e| Error::task(format!("invalid params for {} {}: {}", self.kind, self.id, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStage {
    Pending,
    Running,
    Complete,
    Failed { reason: String },
}

impl TaskStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStage::Complete | TaskStage::Failed { .. })
    }
}

/// Handler for one task kind
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Zone status set when [`TaskHandler::on_init`] fails
    fn failed_status(&self) -> ZoneStatus;

    /// Carry out the task
    async fn on_init(&self, engine: &ZoneEngine, task: &Task) -> Result<()>;
}

/// Explicit task name → handler table, populated at start-up
#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every zone task handler
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(DNS_ZONE_CREATE_TASK, Arc::new(zone_create::DnsZoneCreateTask));
        registry.register(DNS_ZONE_CACHE_CREATE_TASK, Arc::new(zone_cache::DnsZoneCacheCreateTask));
        registry.register(DNS_ZONE_CACHE_DELETE_TASK, Arc::new(zone_cache::DnsZoneCacheDeleteTask));
        registry.register(DNS_ZONE_ADD_VPCS_TASK, Arc::new(zone_vpcs::DnsZoneAddVpcsTask));
        registry.register(DNS_ZONE_REMOVE_VPCS_TASK, Arc::new(zone_vpcs::DnsZoneRemoveVpcsTask));
        registry.register(DNS_ZONE_SYNC_RECORD_SETS_TASK, Arc::new(zone_sync::DnsZoneSyncRecordSetsTask));
        registry.register(DNS_ZONE_DELETE_TASK, Arc::new(zone_delete::DnsZoneDeleteTask));
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(kind).cloned()
    }

    /// Registered task kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.handlers.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

/// Creates, runs and tracks tasks
pub struct TaskManager {
    registry: TaskRegistry,
    stages: Mutex<HashMap<TaskId, Arc<watch::Sender<TaskStage>>>>,
    next_id: AtomicU64,
}

impl TaskManager {
    pub fn new(registry: TaskRegistry) -> Self {
        Self {
            registry,
            stages: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Create a pending task
    ///
    /// # Errors
    ///
    /// `Error::Task` when no handler is registered for `kind`
    pub fn new_task(&self, kind: &str, object_id: &str, params: serde_json::Value) -> Result<Task> {
        if self.registry.get(kind).is_none() {
            return Err(Error::task(format!("no handler registered for {}", kind)));
        }

        let id = format!("task-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, _) = watch::channel(TaskStage::Pending);
        self.stages().insert(id.clone(), Arc::new(tx));

        Ok(Task {
            id,
            kind: kind.to_string(),
            object_id: object_id.to_string(),
            params,
            created_at: Utc::now(),
        })
    }

    /// Run a task on its own tokio task
    pub fn schedule_run(&self, engine: ZoneEngine, task: Task) {
        let handler = self.registry.get(&task.kind);
        let stage = self.stages().get(&task.id).cloned();
        let (Some(handler), Some(stage)) = (handler, stage) else {
            error!("Task {} ({}) cannot be scheduled", task.id, task.kind);
            return;
        };

        tokio::spawn(async move {
            stage.send_replace(TaskStage::Running);
            info!("Task {} ({}) started for zone {}", task.id, task.kind, task.object_id);
            engine.emit_event(ZoneEvent::TaskStarted {
                task_id: task.id.clone(),
                kind: task.kind.clone(),
                zone_id: task.object_id.clone(),
            });

            match handler.on_init(&engine, &task).await {
                Ok(()) => {
                    info!("Task {} ({}) complete", task.id, task.kind);
                    stage.send_replace(TaskStage::Complete);
                    engine.emit_event(ZoneEvent::TaskCompleted {
                        task_id: task.id.clone(),
                        kind: task.kind.clone(),
                        zone_id: task.object_id.clone(),
                    });
                }
                Err(err) => {
                    let reason = err.to_string();
                    error!("Task {} ({}) failed: {}", task.id, task.kind, reason);
                    if let Err(e) = engine
                        .set_zone_status(&task.object_id, handler.failed_status(), Some(reason.clone()))
                        .await
                    {
                        error!("Failed to record failure of task {}: {}", task.id, e);
                    }
                    stage.send_replace(TaskStage::Failed { reason: reason.clone() });
                    engine.emit_event(ZoneEvent::TaskFailed {
                        task_id: task.id.clone(),
                        kind: task.kind.clone(),
                        zone_id: task.object_id.clone(),
                        error: reason,
                    });
                }
            }
        });
    }

    /// Current stage of a task
    pub fn stage(&self, task_id: &str) -> Option<TaskStage> {
        self.stages().get(task_id).map(|tx| tx.borrow().clone())
    }

    /// Wait until a task reaches a terminal stage
    pub async fn wait(&self, task_id: &str) -> Result<TaskStage> {
        let mut rx = self
            .stages()
            .get(task_id)
            .map(|tx| tx.subscribe())
            .ok_or_else(|| Error::not_found(format!("task {}", task_id)))?;
        let stage = rx
            .wait_for(TaskStage::is_terminal)
            .await
            .map_err(|_| Error::task(format!("task {} dropped", task_id)))?;
        Ok(stage.clone())
    }

    fn stages(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, Arc<watch::Sender<TaskStage>>>> {
        self.stages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
