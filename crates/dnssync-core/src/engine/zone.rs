//! Zone-level operations: create, cache, uncache, VPC changes, delete
//!
//! Each operation validates synchronously and only then starts its task.
//! Validation failures leave the zone untouched.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};

use super::ZoneEngine;
use crate::error::{Error, Result};
use crate::lock::{status_key, zone_key};
use crate::model::{validate_domain_name, DnsZone, DnsZoneCache, Vpc, ZoneStatus, ZoneType};
use crate::tasks::{self, TaskId};

/// Request to create a zone
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateZoneRequest {
    pub name: String,
    pub zone_type: ZoneType,
    /// VPCs to associate (private zones)
    #[serde(default)]
    pub vpc_ids: Vec<String>,
    /// Account to materialize the zone in right away (public zones)
    #[serde(default)]
    pub cloudaccount_id: Option<String>,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

impl CreateZoneRequest {
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zone_type: ZoneType::PublicZone,
            vpc_ids: Vec::new(),
            cloudaccount_id: None,
            options: None,
        }
    }

    pub fn private(name: impl Into<String>, vpc_ids: Vec<String>) -> Self {
        Self {
            name: name.into(),
            zone_type: ZoneType::PrivateZone,
            vpc_ids,
            cloudaccount_id: None,
            options: None,
        }
    }

    pub fn with_account(mut self, cloudaccount_id: impl Into<String>) -> Self {
        self.cloudaccount_id = Some(cloudaccount_id.into());
        self
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = Some(options);
        self
    }
}

/// Account shared by the managed VPCs of `vpcs`
///
/// # Returns
///
/// - `Ok(None)` when no VPC is managed
/// - `Err(Error::Conflict)` when managed VPCs belong to different managers
pub(crate) fn managed_account(vpcs: &[Vpc]) -> Result<Option<String>> {
    let mut managed = vpcs.iter().filter(|v| v.is_managed());
    let Some(first) = managed.next() else {
        return Ok(None);
    };
    if let Some(other) = managed.find(|v| v.manager_id != first.manager_id) {
        return Err(Error::conflict(format!(
            "VPCs {} and {} belong to different managers",
            first.id, other.id
        )));
    }
    first
        .cloudaccount_id
        .clone()
        .map(Some)
        .ok_or_else(|| Error::missing_parameter(format!("cloud account of VPC {}", first.id)))
}

impl ZoneEngine {
    /// Create a zone
    ///
    /// # Returns
    ///
    /// The inserted zone and, when remote work is needed, the id of the
    /// `DnsZoneCreateTask` provisioning it
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: bad domain name
    /// - `Conflict`: a public zone with the same name exists, or the
    ///   managed VPCs belong to different managers
    /// - `NotFound`: a VPC or the account does not exist
    /// - `NotSupported`: the provider cannot host this zone type
    pub async fn create_zone(&self, req: CreateZoneRequest) -> Result<(DnsZone, Option<TaskId>)> {
        validate_domain_name(&req.name)?;
        let name = req.name.trim_end_matches('.').to_ascii_lowercase();

        // private zones of the same name may serve different VPC sets
        if req.zone_type == ZoneType::PublicZone {
            let existing = self.store().find_zone_by_name(&name).await?;
            if existing.iter().any(|z| z.zone_type == ZoneType::PublicZone) {
                return Err(Error::conflict(format!("public zone {} already exists", name)));
            }
        }

        let mut zone = DnsZone::new(name, req.zone_type);
        zone.options = req.options;

        let params = match req.zone_type {
            ZoneType::PrivateZone => {
                let vpcs = self.load_vpcs(&req.vpc_ids).await?;
                if let Some(account_id) = managed_account(&vpcs)? {
                    self.require_zone_support(&account_id, ZoneType::PrivateZone).await?;
                }
                if vpcs.is_empty() {
                    None
                } else {
                    Some(json!({ "vpc_ids": req.vpc_ids }))
                }
            }
            ZoneType::PublicZone => match &req.cloudaccount_id {
                Some(account_id) => {
                    self.require_zone_support(account_id, ZoneType::PublicZone).await?;
                    Some(json!({ "cloudaccount_id": account_id }))
                }
                None => None,
            },
        };

        let Some(params) = params else {
            let zone = self.store().insert_zone(zone).await?;
            info!("Created {} {} ({}) without remote copy", zone.zone_type, zone.name, zone.id);
            return Ok((zone, None));
        };

        zone.status = ZoneStatus::Creating;
        let zone = self.store().insert_zone(zone).await?;
        let task_id = self
            .start_task(tasks::DNS_ZONE_CREATE_TASK, &zone.id, ZoneStatus::Creating, params)
            .await?;
        Ok((zone, Some(task_id)))
    }

    /// Materialize a public zone in a cloud account
    pub async fn cache(&self, zone_id: &str, cloudaccount_id: &str) -> Result<TaskId> {
        if cloudaccount_id.is_empty() {
            return Err(Error::missing_parameter("cloudaccount_id"));
        }

        let _guard = self.locks().lock(&status_key(zone_id)).await;
        let zone = self.require_available(zone_id).await?;
        require_public(&zone, "cache")?;
        let account = self.store().get_account(cloudaccount_id).await?;

        let cache = self.register_cache(&zone, &account.id).await?;
        if cache.is_materialized() {
            return Err(Error::conflict(format!(
                "zone {} is already cached in account {} as {}",
                zone.name, account.name, cache.external_id
            )));
        }

        self.start_task(
            tasks::DNS_ZONE_CACHE_CREATE_TASK,
            &zone.id,
            ZoneStatus::Caching,
            json!({ "cache_id": cache.id }),
        )
        .await
    }

    /// Remove a public zone's copy from a cloud account
    pub async fn uncache(&self, zone_id: &str, cloudaccount_id: &str) -> Result<TaskId> {
        if cloudaccount_id.is_empty() {
            return Err(Error::missing_parameter("cloudaccount_id"));
        }

        let _guard = self.locks().lock(&status_key(zone_id)).await;
        let zone = self.require_available(zone_id).await?;
        require_public(&zone, "uncache")?;

        let cache = self
            .store()
            .find_cache(&zone.id, cloudaccount_id)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!("zone {} has no cache in account {}", zone.name, cloudaccount_id))
            })?;

        self.start_task(
            tasks::DNS_ZONE_CACHE_DELETE_TASK,
            &zone.id,
            ZoneStatus::Uncaching,
            json!({ "cache_id": cache.id }),
        )
        .await
    }

    /// Associate VPCs with a private zone
    pub async fn add_vpcs(&self, zone_id: &str, vpc_ids: &[String]) -> Result<TaskId> {
        let _guard = self.locks().lock(&status_key(zone_id)).await;
        let zone = self.require_available(zone_id).await?;
        require_private(&zone, "add_vpcs")?;
        if vpc_ids.is_empty() {
            return Err(Error::missing_parameter("vpc_ids"));
        }

        let requested = self.load_vpcs(vpc_ids).await?;
        let current = self.store().list_zone_vpcs(&zone.id).await?;

        let mut combined = current.clone();
        combined.extend(requested.iter().cloned());
        managed_account(&combined)?;

        let associated: HashSet<&str> = current.iter().map(|v| v.id.as_str()).collect();
        if let Some(vpc) = requested.iter().find(|v| associated.contains(v.id.as_str())) {
            return Err(Error::conflict(format!("VPC {} is already in zone {}", vpc.id, zone.name)));
        }

        self.start_task(
            tasks::DNS_ZONE_ADD_VPCS_TASK,
            &zone.id,
            ZoneStatus::AddVpcs,
            json!({ "vpc_ids": vpc_ids }),
        )
        .await
    }

    /// Disassociate VPCs from a private zone
    pub async fn remove_vpcs(&self, zone_id: &str, vpc_ids: &[String]) -> Result<TaskId> {
        let _guard = self.locks().lock(&status_key(zone_id)).await;
        let zone = self.require_available(zone_id).await?;
        require_private(&zone, "remove_vpcs")?;
        if vpc_ids.is_empty() {
            return Err(Error::missing_parameter("vpc_ids"));
        }

        let requested = self.load_vpcs(vpc_ids).await?;
        managed_account(&requested)?;

        let current = self.store().list_zone_vpcs(&zone.id).await?;
        let associated: HashSet<&str> = current.iter().map(|v| v.id.as_str()).collect();
        if let Some(vpc) = requested.iter().find(|v| !associated.contains(v.id.as_str())) {
            return Err(Error::not_found(format!("VPC {} is not in zone {}", vpc.id, zone.name)));
        }

        self.start_task(
            tasks::DNS_ZONE_REMOVE_VPCS_TASK,
            &zone.id,
            ZoneStatus::RemoveVpcs,
            json!({ "vpc_ids": vpc_ids }),
        )
        .await
    }

    /// Push local record sets to every cloud copy of the zone
    pub async fn sync_record_sets(&self, zone_id: &str) -> Result<TaskId> {
        let _guard = self.locks().lock(&status_key(zone_id)).await;
        let zone = self.require_available(zone_id).await?;
        self.start_task(
            tasks::DNS_ZONE_SYNC_RECORD_SETS_TASK,
            &zone.id,
            ZoneStatus::SyncRecordSets,
            json!({}),
        )
        .await
    }

    /// Delete a zone and its remote copies
    ///
    /// Not accepted while another operation is in flight. Remote delete
    /// failures stop the deletion in `delete_failed`.
    pub async fn delete_zone(&self, zone_id: &str) -> Result<TaskId> {
        let _guard = self.locks().lock(&status_key(zone_id)).await;
        let zone = self.store().get_zone(zone_id).await?;
        if zone.status.is_transient() || zone.status == ZoneStatus::Deleted {
            return Err(Error::invalid_status(format!(
                "zone {} is {}, cannot delete",
                zone.name, zone.status
            )));
        }
        self.start_delete(&zone, false).await
    }

    /// Delete a zone in any status, ignoring remote delete failures
    pub async fn purge_zone(&self, zone_id: &str) -> Result<TaskId> {
        let _guard = self.locks().lock(&status_key(zone_id)).await;
        let zone = self.store().get_zone(zone_id).await?;
        self.start_delete(&zone, true).await
    }

    async fn start_delete(&self, zone: &DnsZone, purge: bool) -> Result<TaskId> {
        self.cancel_delayed_sync(&zone.id);
        self.start_task(
            tasks::DNS_ZONE_DELETE_TASK,
            &zone.id,
            ZoneStatus::RemoveVpcs,
            json!({ "purge": purge }),
        )
        .await
    }

    /// Return the zone's cache for an account, creating the row if needed
    ///
    /// Takes the zone lock.
    pub async fn register_cache(&self, zone: &DnsZone, cloudaccount_id: &str) -> Result<DnsZoneCache> {
        let _guard = self.locks().lock(&zone_key(&zone.id)).await;
        self.register_cache_locked(zone, cloudaccount_id).await
    }

    /// [`ZoneEngine::register_cache`] for callers already holding the zone lock
    pub(crate) async fn register_cache_locked(&self, zone: &DnsZone, cloudaccount_id: &str) -> Result<DnsZoneCache> {
        if let Some(cache) = self.store().find_cache(&zone.id, cloudaccount_id).await? {
            return Ok(cache);
        }
        let cache = self
            .store()
            .insert_cache(DnsZoneCache::new(&zone.id, cloudaccount_id, &zone.name))
            .await?;
        debug!("Registered cache {} for zone {} in account {}", cache.id, zone.name, cloudaccount_id);
        Ok(cache)
    }

    /// Remove a zone and everything hanging off it from the store
    ///
    /// Remote copies are not touched.
    pub(crate) async fn remove_local_zone(&self, zone: &DnsZone) -> Result<()> {
        self.cancel_delayed_sync(&zone.id);

        for cache in self.store().list_caches(&zone.id).await? {
            self.store().delete_cache(&cache.id).await?;
        }
        for vpc in self.store().list_zone_vpcs(&zone.id).await? {
            self.store().remove_zone_vpc(&zone.id, &vpc.id).await?;
        }
        for record in self.store().list_record_sets(&zone.id).await? {
            self.policies().delete_record_set(record.id_str()).await?;
        }

        self.set_zone_status(&zone.id, ZoneStatus::Deleted, None).await?;
        self.store().delete_zone(&zone.id).await?;
        info!("Zone {} ({}) removed", zone.name, zone.id);
        Ok(())
    }

    pub(crate) async fn load_vpcs(&self, vpc_ids: &[String]) -> Result<Vec<Vpc>> {
        let mut vpcs = Vec::with_capacity(vpc_ids.len());
        for id in vpc_ids {
            vpcs.push(self.store().get_vpc(id).await?);
        }
        Ok(vpcs)
    }

    async fn require_zone_support(&self, cloudaccount_id: &str, zone_type: ZoneType) -> Result<()> {
        let account = self.store().get_account(cloudaccount_id).await?;
        let caps = self.providers().capabilities(&account.provider)?;
        if !caps.supports_zone_type(zone_type) {
            return Err(Error::not_supported(format!(
                "provider {} of account {} does not support {}",
                account.provider, account.name, zone_type
            )));
        }
        Ok(())
    }
}

fn require_public(zone: &DnsZone, op: &str) -> Result<()> {
    if zone.zone_type != ZoneType::PublicZone {
        return Err(Error::not_supported(format!("{} on {} {}", op, zone.zone_type, zone.name)));
    }
    Ok(())
}

fn require_private(zone: &DnsZone, op: &str) -> Result<()> {
    if zone.zone_type != ZoneType::PrivateZone {
        return Err(Error::not_supported(format!("{} on {} {}", op, zone.zone_type, zone.name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vpc(id: &str, manager: Option<&str>) -> Vpc {
        Vpc {
            id: id.to_string(),
            name: id.to_string(),
            external_id: format!("ext-{}", id),
            region_id: "r1".to_string(),
            manager_id: manager.map(str::to_string),
            cloudaccount_id: manager.map(|m| format!("acct-{}", m)),
        }
    }

    #[test]
    fn test_managed_account_single_manager() {
        let vpcs = vec![vpc("v1", None), vpc("v2", Some("m1")), vpc("v3", Some("m1"))];
        assert_eq!(managed_account(&vpcs).unwrap().as_deref(), Some("acct-m1"));
    }

    #[test]
    fn test_managed_account_unmanaged_only() {
        assert_eq!(managed_account(&[vpc("v1", None)]).unwrap(), None);
        assert_eq!(managed_account(&[]).unwrap(), None);
    }

    #[test]
    fn test_managed_account_mixed_managers() {
        let vpcs = vec![vpc("v1", Some("m1")), vpc("v2", Some("m2"))];
        assert!(matches!(managed_account(&vpcs), Err(Error::Conflict(_))));
    }

    #[test]
    fn test_request_builders() {
        let req = CreateZoneRequest::public("example.com").with_account("acct-1");
        assert_eq!(req.zone_type, ZoneType::PublicZone);
        assert_eq!(req.cloudaccount_id.as_deref(), Some("acct-1"));

        let req = CreateZoneRequest::private("corp.internal", vec!["v1".into()]);
        assert_eq!(req.zone_type, ZoneType::PrivateZone);
        assert_eq!(req.vpc_ids.len(), 1);
    }
}
