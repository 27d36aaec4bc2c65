//! DnsZoneDeleteTask: remove a zone's remote copies, then the zone

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::{zone_cache, Task, TaskHandler};
use crate::engine::ZoneEngine;
use crate::error::Result;
use crate::lock::zone_key;
use crate::model::ZoneStatus;

#[derive(Debug, Default, Deserialize)]
struct DeleteParams {
    #[serde(default)]
    purge: bool,
}

/// A plain delete stops at the first remote failure; a purge logs remote
/// failures and removes the local rows regardless.
pub(super) struct DnsZoneDeleteTask;

#[async_trait]
impl TaskHandler for DnsZoneDeleteTask {
    fn failed_status(&self) -> ZoneStatus {
        ZoneStatus::DeleteFailed
    }

    async fn on_init(&self, engine: &ZoneEngine, task: &Task) -> Result<()> {
        let params: DeleteParams = task.params()?;
        let _guard = engine.locks().lock(&zone_key(&task.object_id)).await;
        let zone = engine.store().get_zone(&task.object_id).await?;

        for cache in engine.store().list_caches(&zone.id).await? {
            if !cache.is_materialized() {
                continue;
            }
            match zone_cache::delete_remote_zone(engine, &cache).await {
                Ok(()) => {}
                Err(e) if params.purge => {
                    warn!("Ignoring failure to delete remote zone of cache {} during purge: {}", cache.id, e);
                }
                Err(e) => return Err(e),
            }
            engine.store().delete_cache(&cache.id).await?;
        }

        engine.remove_local_zone(&zone).await
    }
}
