//! DnsZoneSyncRecordSetsTask: push local record sets to the zone's caches

use async_trait::async_trait;

use super::{Task, TaskHandler};
use crate::engine::{ZoneEngine, ZoneEvent};
use crate::error::Result;
use crate::lock::zone_key;
use crate::model::ZoneStatus;

pub(super) struct DnsZoneSyncRecordSetsTask;

#[async_trait]
impl TaskHandler for DnsZoneSyncRecordSetsTask {
    fn failed_status(&self) -> ZoneStatus {
        ZoneStatus::SyncRecordSetsFailed
    }

    async fn on_init(&self, engine: &ZoneEngine, task: &Task) -> Result<()> {
        let result = {
            let _guard = engine.locks().lock(&zone_key(&task.object_id)).await;
            let zone = engine.store().get_zone(&task.object_id).await?;
            engine.push_record_sets(&zone).await?
        };

        let reason = result.failure_reason();
        engine.emit_event(ZoneEvent::RecordSetsSynced {
            zone_id: task.object_id.clone(),
            result,
        });
        // partial failures are reported, not retried
        engine
            .set_zone_status(&task.object_id, ZoneStatus::Available, reason)
            .await?;
        Ok(())
    }
}
