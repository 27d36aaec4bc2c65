//! DnsZoneCreateTask: provision the remote copy of a new zone

use async_trait::async_trait;
use serde::Deserialize;

use super::{zone_cache, zone_vpcs, Task, TaskHandler};
use crate::engine::ZoneEngine;
use crate::error::Result;
use crate::model::{ZoneStatus, ZoneType};

#[derive(Debug, Default, Deserialize)]
struct CreateParams {
    #[serde(default)]
    cloudaccount_id: Option<String>,
    #[serde(default)]
    vpc_ids: Vec<String>,
}

/// Public zones: register the cache and create the remote zone.
/// Private zones: associate the requested VPCs, creating the remote zone
/// for the managed ones.
pub(super) struct DnsZoneCreateTask;

#[async_trait]
impl TaskHandler for DnsZoneCreateTask {
    fn failed_status(&self) -> ZoneStatus {
        ZoneStatus::CreateFailed
    }

    async fn on_init(&self, engine: &ZoneEngine, task: &Task) -> Result<()> {
        let params: CreateParams = task.params()?;
        let zone = engine.store().get_zone(&task.object_id).await?;

        match zone.zone_type {
            ZoneType::PrivateZone => {
                let vpcs = engine.load_vpcs(&params.vpc_ids).await?;
                zone_vpcs::attach_vpcs(engine, &zone, vpcs).await?;
            }
            ZoneType::PublicZone => {
                if let Some(account_id) = &params.cloudaccount_id {
                    let cache = engine.register_cache(&zone, account_id).await?;
                    if !cache.is_materialized() {
                        zone_cache::materialize_public(engine, &zone, &cache).await?;
                    }
                }
            }
        }

        engine.set_zone_status(&zone.id, ZoneStatus::Available, None).await?;
        Ok(())
    }
}
