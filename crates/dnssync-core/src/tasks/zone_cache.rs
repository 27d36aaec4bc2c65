//! DnsZoneCacheCreateTask / DnsZoneCacheDeleteTask: materialize a public
//! zone in one cloud account, or remove it from there

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use super::{Task, TaskHandler};
use crate::engine::ZoneEngine;
use crate::error::Result;
use crate::lock::zone_key;
use crate::model::{CacheStatus, DnsZone, DnsZoneCache, ZoneStatus, ZoneType};
use crate::traits::ZoneCreateOptions;

#[derive(Debug, Deserialize)]
struct CacheParams {
    cache_id: String,
}

/// Create the remote public zone for a cache and store its external id
pub(super) async fn materialize_public(
    engine: &ZoneEngine,
    zone: &DnsZone,
    cache: &DnsZoneCache,
) -> Result<DnsZoneCache> {
    let (account, provider) = engine.provider_for_account(&cache.cloudaccount_id).await?;
    let remote = provider
        .create_zone(&ZoneCreateOptions {
            name: zone.name.clone(),
            zone_type: ZoneType::PublicZone,
            vpcs: Vec::new(),
            options: zone.options.clone(),
        })
        .await?;

    let external_id = remote.external_id();
    info!("Created zone {} in account {} as {}", zone.name, account.name, external_id);
    engine
        .store()
        .update_cache(
            &cache.id,
            Box::new(move |c| {
                c.external_id = external_id;
                c.status = CacheStatus::Available;
            }),
        )
        .await
}

async fn set_cache_status(engine: &ZoneEngine, cache_id: &str, status: CacheStatus) {
    if let Err(e) = engine
        .store()
        .update_cache(cache_id, Box::new(move |c| c.status = status))
        .await
    {
        warn!("Failed to set cache {} to {:?}: {}", cache_id, status, e);
    }
}

pub(super) struct DnsZoneCacheCreateTask;

impl DnsZoneCacheCreateTask {
    async fn run(engine: &ZoneEngine, zone_id: &str, cache: &DnsZoneCache) -> Result<()> {
        let zone = engine.store().get_zone(zone_id).await?;
        let cache = materialize_public(engine, &zone, cache).await?;

        // bring the new copy up to date with the local record sets
        let result = {
            let _guard = engine.locks().lock(&zone_key(&zone.id)).await;
            engine.push_to_cache(&zone, &cache).await?
        };

        engine
            .set_zone_status(&zone.id, ZoneStatus::Available, result.failure_reason())
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for DnsZoneCacheCreateTask {
    fn failed_status(&self) -> ZoneStatus {
        ZoneStatus::CacheFailed
    }

    async fn on_init(&self, engine: &ZoneEngine, task: &Task) -> Result<()> {
        let params: CacheParams = task.params()?;
        let cache = engine.store().get_cache(&params.cache_id).await?;
        set_cache_status(engine, &cache.id, CacheStatus::Creating).await;

        let result = Self::run(engine, &task.object_id, &cache).await;
        if result.is_err() {
            set_cache_status(engine, &cache.id, CacheStatus::CreateFailed).await;
        }
        result
    }
}

pub(super) struct DnsZoneCacheDeleteTask;

impl DnsZoneCacheDeleteTask {
    async fn run(engine: &ZoneEngine, cache: &DnsZoneCache) -> Result<()> {
        if cache.is_materialized() {
            delete_remote_zone(engine, cache).await?;
        }
        engine.store().delete_cache(&cache.id).await?;
        engine
            .set_zone_status(&cache.dns_zone_id, ZoneStatus::Available, None)
            .await?;
        Ok(())
    }
}

/// Delete the remote zone behind a cache; an already missing zone is success
pub(super) async fn delete_remote_zone(engine: &ZoneEngine, cache: &DnsZoneCache) -> Result<()> {
    let remote = match engine.cloud_zone(cache).await {
        Ok(remote) => remote,
        Err(e) if e.is_not_found() => {
            info!("Remote zone {} of cache {} already gone", cache.external_id, cache.id);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    match remote.delete().await {
        Err(e) if !e.is_not_found() => Err(e),
        _ => {
            info!("Deleted remote zone {} of cache {}", cache.external_id, cache.id);
            Ok(())
        }
    }
}

#[async_trait]
impl TaskHandler for DnsZoneCacheDeleteTask {
    fn failed_status(&self) -> ZoneStatus {
        ZoneStatus::UncacheFailed
    }

    async fn on_init(&self, engine: &ZoneEngine, task: &Task) -> Result<()> {
        let params: CacheParams = task.params()?;
        let cache = engine.store().get_cache(&params.cache_id).await?;
        set_cache_status(engine, &cache.id, CacheStatus::Deleting).await;

        let result = Self::run(engine, &cache).await;
        if result.is_err() {
            set_cache_status(engine, &cache.id, CacheStatus::DeleteFailed).await;
        }
        result
    }
}
