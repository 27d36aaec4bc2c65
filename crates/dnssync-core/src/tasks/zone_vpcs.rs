//! DnsZoneAddVpcsTask / DnsZoneRemoveVpcsTask: change the VPC set of a
//! private zone
//!
//! Unmanaged VPCs are local bookkeeping only. Managed VPCs go through the
//! cache of the account that owns them: the first association creates the
//! remote private zone for the whole managed set, later ones associate
//! VPC by VPC. Each remote call is followed immediately by the matching
//! local change, so a failure part-way leaves local state describing what
//! the provider actually did.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{Task, TaskHandler};
use crate::engine::{managed_account, ZoneEngine};
use crate::error::Result;
use crate::lock::zone_key;
use crate::model::{CacheStatus, DnsZone, Vpc, VpcRef, ZoneStatus, ZoneType};
use crate::traits::ZoneCreateOptions;

#[derive(Debug, Deserialize)]
struct VpcParams {
    vpc_ids: Vec<String>,
}

/// Associate `vpcs` with the zone
pub(super) async fn attach_vpcs(engine: &ZoneEngine, zone: &DnsZone, vpcs: Vec<Vpc>) -> Result<()> {
    let _guard = engine.locks().lock(&zone_key(&zone.id)).await;
    let store = engine.store();

    let (managed, unmanaged): (Vec<Vpc>, Vec<Vpc>) = vpcs.into_iter().partition(Vpc::is_managed);
    for vpc in &unmanaged {
        store.add_zone_vpc(&zone.id, &vpc.id).await?;
    }

    let Some(account_id) = managed_account(&managed)? else {
        return Ok(());
    };
    let cache = engine.register_cache_locked(zone, &account_id).await?;

    if cache.is_materialized() {
        let remote = engine.cloud_zone(&cache).await?;
        for vpc in &managed {
            remote.add_vpc(&vpc.to_ref()).await?;
            store.add_zone_vpc(&zone.id, &vpc.id).await?;
            info!("Associated VPC {} with zone {}", vpc.id, zone.name);
        }
        return Ok(());
    }

    // first managed association: the remote zone is created with every
    // managed VPC of the account the zone already has
    let mut refs: Vec<VpcRef> = store
        .list_zone_vpcs(&zone.id)
        .await?
        .iter()
        .filter(|v| v.is_managed() && v.cloudaccount_id.as_deref() == Some(account_id.as_str()))
        .map(Vpc::to_ref)
        .collect();
    refs.extend(managed.iter().map(Vpc::to_ref));

    let (account, provider) = engine.provider_for_account(&account_id).await?;
    let remote = provider
        .create_zone(&ZoneCreateOptions {
            name: zone.name.clone(),
            zone_type: ZoneType::PrivateZone,
            vpcs: refs,
            options: zone.options.clone(),
        })
        .await?;

    let external_id = remote.external_id();
    info!("Created private zone {} in account {} as {}", zone.name, account.name, external_id);
    store
        .update_cache(
            &cache.id,
            Box::new(move |c| {
                c.external_id = external_id;
                c.status = CacheStatus::Available;
            }),
        )
        .await?;
    for vpc in &managed {
        store.add_zone_vpc(&zone.id, &vpc.id).await?;
    }
    Ok(())
}

/// Disassociate `vpcs` from the zone
pub(super) async fn detach_vpcs(engine: &ZoneEngine, zone: &DnsZone, vpcs: Vec<Vpc>) -> Result<()> {
    let _guard = engine.locks().lock(&zone_key(&zone.id)).await;
    let store = engine.store();

    let (managed, unmanaged): (Vec<Vpc>, Vec<Vpc>) = vpcs.into_iter().partition(Vpc::is_managed);
    for vpc in &unmanaged {
        store.remove_zone_vpc(&zone.id, &vpc.id).await?;
    }

    let Some(account_id) = managed_account(&managed)? else {
        return Ok(());
    };

    let remote = match store.find_cache(&zone.id, &account_id).await? {
        Some(cache) if cache.is_materialized() => Some(engine.cloud_zone(&cache).await?),
        _ => None,
    };

    for vpc in &managed {
        if let Some(remote) = &remote {
            match remote.remove_vpc(&vpc.to_ref()).await {
                Err(e) if !e.is_not_found() => return Err(e),
                _ => {}
            }
        }
        store.remove_zone_vpc(&zone.id, &vpc.id).await?;
        info!("Disassociated VPC {} from zone {}", vpc.id, zone.name);
    }
    Ok(())
}

pub(super) struct DnsZoneAddVpcsTask;

#[async_trait]
impl TaskHandler for DnsZoneAddVpcsTask {
    fn failed_status(&self) -> ZoneStatus {
        ZoneStatus::AddVpcsFailed
    }

    async fn on_init(&self, engine: &ZoneEngine, task: &Task) -> Result<()> {
        let params: VpcParams = task.params()?;
        let zone = engine.store().get_zone(&task.object_id).await?;
        let vpcs = engine.load_vpcs(&params.vpc_ids).await?;

        attach_vpcs(engine, &zone, vpcs).await?;
        engine.set_zone_status(&zone.id, ZoneStatus::Available, None).await?;
        Ok(())
    }
}

pub(super) struct DnsZoneRemoveVpcsTask;

#[async_trait]
impl TaskHandler for DnsZoneRemoveVpcsTask {
    fn failed_status(&self) -> ZoneStatus {
        ZoneStatus::RemoveVpcsFailed
    }

    async fn on_init(&self, engine: &ZoneEngine, task: &Task) -> Result<()> {
        let params: VpcParams = task.params()?;
        let zone = engine.store().get_zone(&task.object_id).await?;
        let vpcs = engine.load_vpcs(&params.vpc_ids).await?;

        detach_vpcs(engine, &zone, vpcs).await?;
        engine.set_zone_status(&zone.id, ZoneStatus::Available, None).await?;
        Ok(())
    }
}
