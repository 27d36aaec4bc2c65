//! Record-set reconciliation between local rows and cloud copies
//!
//! Two directions share the same diff:
//!
//! - push (`sync_record_sets` task, debounced edits): local rows are the
//!   desired state and every materialized cache is made to match them
//! - import (`import_record_sets`, `import_cloud_zones`): the remote zone
//!   is the source of truth and local rows are made to match it
//!
//! Per-record failures are counted in a [`SyncResult`] and do not stop the
//! pass. A failure to read the remote side is recorded as fatal and leaves
//! every row untouched.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

use super::ZoneEngine;
use crate::diff::{compare_record_sets, without_system_records};
use crate::error::{Error, Result};
use crate::lock::{status_key, zone_key};
use crate::model::{
    CacheStatus, CloudAccount, DnsRecordSet, DnsZone, DnsZoneCache, PolicyType, ZoneStatus, ZoneType,
};
use crate::traits::{CloudDnsZone, DnsCapabilities};

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    pub added: usize,
    pub add_errors: usize,
    pub updated: usize,
    pub update_errors: usize,
    pub deleted: usize,
    pub delete_errors: usize,
    /// Messages of the per-record failures
    pub errors: Vec<String>,
    /// Set when the pass could not run at all
    pub fatal: Option<String>,
}

impl SyncResult {
    /// Anything failed
    pub fn is_error(&self) -> bool {
        self.fatal.is_some() || !self.errors.is_empty()
    }

    /// Number of per-record failures
    pub fn errored(&self) -> usize {
        self.add_errors + self.update_errors + self.delete_errors
    }

    /// Fold another pass into this one
    pub fn merge(&mut self, other: SyncResult) {
        self.added += other.added;
        self.add_errors += other.add_errors;
        self.updated += other.updated;
        self.update_errors += other.update_errors;
        self.deleted += other.deleted;
        self.delete_errors += other.delete_errors;
        self.errors.extend(other.errors);
        self.fatal = match (self.fatal.take(), other.fatal) {
            (Some(a), Some(b)) => Some(format!("{}; {}", a, b)),
            (a, b) => a.or(b),
        };
    }

    /// Failure text for a zone's `status_reason`, `None` when nothing failed
    pub fn failure_reason(&self) -> Option<String> {
        self.is_error().then(|| self.to_string())
    }

    fn fail(message: String) -> Self {
        Self {
            fatal: Some(message),
            ..Default::default()
        }
    }

    fn record_error(&mut self, op: &str, record: &DnsRecordSet, err: Error) {
        warn!("Failed to {} record set {}: {}", op, record, err);
        self.errors.push(format!("{} {}: {}", op, record, err));
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added {} ({} failed), updated {} ({} failed), deleted {} ({} failed)",
            self.added, self.add_errors, self.updated, self.update_errors, self.deleted, self.delete_errors
        )?;
        if let Some(fatal) = &self.fatal {
            write!(f, "; {}", fatal)?;
        }
        if let Some(first) = self.errors.first() {
            write!(f, "; first error: {}", first)?;
        }
        Ok(())
    }
}

/// Remote side of one cache, ready for diffing
struct RemoteView {
    account: CloudAccount,
    zone: Box<dyn CloudDnsZone>,
    capabilities: DnsCapabilities,
    records: Vec<DnsRecordSet>,
}

impl ZoneEngine {
    /// Push local record sets to every materialized cache of the zone
    ///
    /// The caller holds the zone lock.
    pub(crate) async fn push_record_sets(&self, zone: &DnsZone) -> Result<SyncResult> {
        let mut result = SyncResult::default();
        for cache in self.store().list_caches(&zone.id).await? {
            if !cache.is_materialized() {
                continue;
            }
            result.merge(self.push_to_cache(zone, &cache).await?);
        }
        Ok(result)
    }

    /// Push local record sets to one cache
    ///
    /// # Returns
    ///
    /// - `Ok(SyncResult)`: per-record outcome, or a fatal entry when the
    ///   remote records could not be listed
    /// - `Err(Error)`: a local store failure
    pub(crate) async fn push_to_cache(&self, zone: &DnsZone, cache: &DnsZoneCache) -> Result<SyncResult> {
        let remote = match self.remote_view(cache).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!("Cannot read remote records of {} in cache {}: {}", zone.name, cache.id, e);
                return Ok(SyncResult::fail(format!("cache {}: {}", cache.id, e)));
            }
        };
        let local = self.supported_local_records(zone, &remote).await?;
        let diff = compare_record_sets(&remote.records, &local);
        info!(
            "sync {} records for cloud common: {} add: {} del: {} update: {}",
            cache.name,
            diff.common.len(),
            diff.add.len(),
            diff.delete.len(),
            diff.update.len()
        );

        let mut result = SyncResult::default();

        for record in &diff.add {
            match remote.zone.create_record_set(record).await {
                Ok(external_id) => {
                    debug!("Created {} as {}", record, external_id);
                    result.added += 1;
                }
                Err(e) => {
                    result.add_errors += 1;
                    result.record_error("create", record, e);
                }
            }
        }

        for record in &diff.delete {
            match remote.zone.remove_record_set(record).await {
                Ok(()) => result.deleted += 1,
                Err(e) if e.is_not_found() => result.deleted += 1,
                Err(e) => {
                    result.delete_errors += 1;
                    result.record_error("remove", record, e);
                }
            }
        }

        let local_by_id: HashMap<&str, &DnsRecordSet> = local.iter().map(|r| (r.id_str(), r)).collect();
        for matched in &diff.update {
            let Some(desired) = local_by_id.get(matched.id_str()) else {
                continue;
            };
            let mut desired = (*desired).clone();
            desired.external_id = matched.external_id.clone();
            match remote.zone.update_record_set(&desired).await {
                Ok(()) => result.updated += 1,
                Err(e) => {
                    result.update_errors += 1;
                    result.record_error("update", &desired, e);
                }
            }
        }

        Ok(result)
    }

    /// Make the zone's local rows match one cloud copy
    ///
    /// Remote-only records become local rows with their traffic policy,
    /// local-only rows are deleted. Matched records that differ overwrite
    /// the local row only in private zones.
    pub async fn import_record_sets(&self, zone_id: &str, cache_id: &str) -> Result<SyncResult> {
        let _guard = self.locks().lock(&zone_key(zone_id)).await;
        let zone = self.store().get_zone(zone_id).await?;
        let cache = self.store().get_cache(cache_id).await?;
        if cache.dns_zone_id != zone.id {
            return Err(Error::invalid_input(format!("cache {} does not belong to zone {}", cache.id, zone.id)));
        }
        self.import_locked(&zone, &cache).await
    }

    async fn import_locked(&self, zone: &DnsZone, cache: &DnsZoneCache) -> Result<SyncResult> {
        let remote = match self.remote_view(cache).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!("Cannot read remote records of {} in cache {}: {}", zone.name, cache.id, e);
                return Ok(SyncResult::fail(format!("cache {}: {}", cache.id, e)));
            }
        };
        let local = self.supported_local_records(zone, &remote).await?;
        let diff = compare_record_sets(&remote.records, &local);
        info!(
            "import {} records from cloud common: {} adopt: {} drop: {} update: {}",
            cache.name,
            diff.common.len(),
            diff.delete.len(),
            diff.add.len(),
            diff.update.len()
        );

        let provider = remote.account.provider.as_str();
        let mut result = SyncResult::default();

        for record in &diff.delete {
            match self.insert_imported(zone, provider, record).await {
                Ok(()) => result.added += 1,
                Err(e) => {
                    result.add_errors += 1;
                    result.record_error("import", record, e);
                }
            }
        }

        for record in &diff.add {
            match self.policies().delete_record_set(record.id_str()).await {
                Ok(()) => result.deleted += 1,
                Err(e) => {
                    result.delete_errors += 1;
                    result.record_error("drop", record, e);
                }
            }
        }

        if zone.zone_type == ZoneType::PrivateZone {
            for record in &diff.update {
                let remote_shape = record.clone();
                let applied = self
                    .store()
                    .update_record_set(
                        record.id_str(),
                        Box::new(move |r| {
                            r.ttl = remote_shape.ttl;
                            r.enabled = remote_shape.enabled;
                            r.status = remote_shape.status;
                            r.external_id = remote_shape.external_id;
                        }),
                    )
                    .await;
                match applied {
                    Ok(_) => result.updated += 1,
                    Err(e) => {
                        result.update_errors += 1;
                        result.record_error("refresh", record, e);
                    }
                }
            }
        }

        Ok(result)
    }

    async fn insert_imported(&self, zone: &DnsZone, provider: &str, record: &DnsRecordSet) -> Result<()> {
        let row = DnsRecordSet {
            id: None,
            dns_zone_id: zone.id.clone(),
            policy_type: PolicyType::Simple,
            policy_params: None,
            ..record.clone()
        };
        let row = self.store().insert_record_set(row).await?;
        self.policies()
            .set_traffic_policy(row.id_str(), provider, record.policy_type, record.policy_params.clone())
            .await?;
        Ok(())
    }

    async fn remote_view(&self, cache: &DnsZoneCache) -> Result<RemoteView> {
        let (account, provider) = self.provider_for_account(&cache.cloudaccount_id).await?;
        let zone = provider.get_zone(&cache.external_id).await?;
        let records = zone
            .list_record_sets()
            .await?
            .iter()
            .map(|r| DnsRecordSet::from_cloud(r.as_ref()))
            .collect();
        Ok(RemoteView {
            account,
            capabilities: provider.capabilities(),
            zone,
            records: without_system_records(records),
        })
    }

    /// Local rows of the record types the provider can host, with their
    /// policy for that provider
    async fn supported_local_records(&self, zone: &DnsZone, remote: &RemoteView) -> Result<Vec<DnsRecordSet>> {
        let records = self
            .list_record_sets(&zone.id, &remote.account.provider)
            .await?
            .into_iter()
            .filter(|r| remote.capabilities.supports_dns_type(zone.zone_type, r.dns_type))
            .collect();
        Ok(without_system_records(records))
    }

    /// Import every remote zone of a cloud account
    ///
    /// Remote zones are matched to local zones through their cache; unknown
    /// public zones are matched by name, anything else becomes a new local
    /// zone. Caches whose remote zone disappeared are removed, and a private
    /// zone losing its cache is removed with it.
    ///
    /// # Returns
    ///
    /// - `Ok(SyncResult)`: aggregated record import outcome; zones that
    ///   failed to import are listed in `errors`
    /// - `Err(Error)`: the account's zones could not be listed
    pub async fn import_cloud_zones(&self, cloudaccount_id: &str) -> Result<SyncResult> {
        let (account, provider) = self.provider_for_account(cloudaccount_id).await?;
        let remotes = provider.list_zones().await?;
        info!("Importing {} zones from account {}", remotes.len(), account.name);

        let mut result = SyncResult::default();
        let mut seen = HashSet::new();

        for remote in &remotes {
            seen.insert(remote.external_id());
            match self.import_cloud_zone(&account, remote.as_ref()).await {
                Ok(imported) => result.merge(imported),
                Err(e) => {
                    warn!("Failed to import zone {} from account {}: {}", remote.name(), account.name, e);
                    result.errors.push(format!("zone {}: {}", remote.name(), e));
                }
            }
        }

        for cache in self.store().list_account_caches(&account.id).await? {
            if cache.is_materialized() && !seen.contains(&cache.external_id) {
                if let Err(e) = self.remove_stale_cache(&cache).await {
                    warn!("Failed to remove stale cache {}: {}", cache.id, e);
                    result.errors.push(format!("cache {}: {}", cache.id, e));
                }
            }
        }

        Ok(result)
    }

    async fn import_cloud_zone(&self, account: &CloudAccount, remote: &dyn CloudDnsZone) -> Result<SyncResult> {
        // checked before the cache lookup: a task that materializes the
        // cache in between makes the lookup find it
        if let Some(pending) = self.pending_local_copy(account, remote).await? {
            debug!("Skipping remote zone {}: local zone {} is {}", remote.name(), pending.id, pending.status);
            return Ok(SyncResult::default());
        }

        let external_id = remote.external_id();
        let known = self
            .store()
            .list_account_caches(&account.id)
            .await?
            .into_iter()
            .find(|c| c.external_id == external_id);

        let zone = match known {
            Some(cache) => self.store().get_zone(&cache.dns_zone_id).await?,
            None => self.zone_from_cloud(remote).await?,
        };

        let _status = self.locks().lock(&status_key(&zone.id)).await;
        let zone = self.store().get_zone(&zone.id).await?;
        if zone.status != ZoneStatus::Available {
            debug!("Skipping import of zone {} while it is {}", zone.name, zone.status);
            return Ok(SyncResult::default());
        }

        let _guard = self.locks().lock(&zone_key(&zone.id)).await;

        let cache = self.register_cache_locked(&zone, &account.id).await?;
        let remote_name = remote.name();
        let ext = external_id.clone();
        let cache = self
            .store()
            .update_cache(
                &cache.id,
                Box::new(move |c| {
                    c.external_id = ext;
                    c.name = remote_name;
                    c.status = CacheStatus::Available;
                }),
            )
            .await?;

        if let Some(options) = remote.options() {
            if zone.options.as_ref() != Some(&options) {
                self.store()
                    .update_zone(&zone.id, Box::new(move |z| z.options = Some(options)))
                    .await?;
            }
        }

        if zone.zone_type == ZoneType::PrivateZone {
            self.reconcile_vpcs(&zone, account, remote).await?;
        }

        let zone = self.store().get_zone(&zone.id).await?;
        if zone.is_dirty {
            debug!("Skipping record import for dirty zone {}", zone.name);
            return Ok(SyncResult::default());
        }

        self.import_locked(&zone, &cache).await
    }

    /// Local zone of this account whose remote copy is still being created
    ///
    /// Its cache has no remote id yet, so the remote zone cannot be matched
    /// to it until the running task finishes.
    async fn pending_local_copy(&self, account: &CloudAccount, remote: &dyn CloudDnsZone) -> Result<Option<DnsZone>> {
        let name = remote.name().trim_end_matches('.').to_ascii_lowercase();
        for cache in self.store().list_account_caches(&account.id).await? {
            if cache.is_materialized() {
                continue;
            }
            let zone = match self.store().get_zone(&cache.dns_zone_id).await {
                Ok(zone) => zone,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            };
            if zone.name == name && zone.zone_type == remote.zone_type() && zone.status.is_transient() {
                return Ok(Some(zone));
            }
        }
        Ok(None)
    }

    /// Local zone for a remote zone nobody has imported yet
    async fn zone_from_cloud(&self, remote: &dyn CloudDnsZone) -> Result<DnsZone> {
        let name = remote.name().trim_end_matches('.').to_ascii_lowercase();
        let zone_type = remote.zone_type();

        if zone_type == ZoneType::PublicZone {
            let existing = self.store().find_zone_by_name(&name).await?;
            if let Some(zone) = existing.into_iter().find(|z| z.zone_type == ZoneType::PublicZone) {
                return Ok(zone);
            }
        }

        let mut zone = DnsZone::new(name, zone_type);
        zone.options = remote.options();
        let zone = self.store().insert_zone(zone).await?;
        info!("Imported {} {} ({}) from cloud", zone.zone_type, zone.name, zone.id);
        Ok(zone)
    }

    /// Make the zone's managed VPCs of `account` match the remote zone
    async fn reconcile_vpcs(&self, zone: &DnsZone, account: &CloudAccount, remote: &dyn CloudDnsZone) -> Result<()> {
        let mut wanted = HashSet::new();
        for vpc in remote.list_vpcs().await? {
            match self.store().find_vpc_by_external_id(&account.id, &vpc.external_id).await? {
                Some(local) => {
                    wanted.insert(local.id);
                }
                None => debug!("Remote VPC {} of zone {} is unknown locally", vpc.external_id, zone.name),
            }
        }

        let current: HashSet<String> = self
            .store()
            .list_zone_vpcs(&zone.id)
            .await?
            .into_iter()
            .filter(|v| v.is_managed() && v.cloudaccount_id.as_deref() == Some(account.id.as_str()))
            .map(|v| v.id)
            .collect();

        for vpc_id in current.difference(&wanted) {
            self.store().remove_zone_vpc(&zone.id, vpc_id).await?;
        }
        for vpc_id in wanted.difference(&current) {
            self.store().add_zone_vpc(&zone.id, vpc_id).await?;
        }
        Ok(())
    }

    /// Drop a cache whose remote zone was missing from the listing
    ///
    /// The listing may predate a task that created or re-created the remote
    /// zone, so the cache is re-read under the status lock and the remote
    /// zone is looked up once more before anything is removed.
    async fn remove_stale_cache(&self, cache: &DnsZoneCache) -> Result<()> {
        let _status = self.locks().lock(&status_key(&cache.dns_zone_id)).await;
        let cache = match self.store().get_cache(&cache.id).await {
            Ok(cache) => cache,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        let zone = match self.store().get_zone(&cache.dns_zone_id).await {
            Ok(zone) => zone,
            Err(e) if e.is_not_found() => return self.store().delete_cache(&cache.id).await,
            Err(e) => return Err(e),
        };
        if zone.status != ZoneStatus::Available || !cache.is_materialized() {
            debug!("Keeping cache {} of zone {} ({})", cache.id, zone.name, zone.status);
            return Ok(());
        }
        match self.cloud_zone(&cache).await {
            Ok(_) => {
                debug!("Remote zone {} of cache {} still exists", cache.external_id, cache.id);
                return Ok(());
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        info!("Remote copy of zone {} in cache {} is gone", zone.name, cache.id);
        if zone.zone_type == ZoneType::PublicZone {
            return self.store().delete_cache(&cache.id).await;
        }

        let _guard = self.locks().lock(&zone_key(&zone.id)).await;
        self.remove_local_zone(&zone).await
    }
}
