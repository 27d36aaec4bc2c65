// # Table Store
//
// Shared implementation of every repository trait over an in-memory set of
// tables. The memory and file stores differ only in what happens after a
// write: nothing, or an atomic JSON snapshot to disk.
//
// Writes hold the table lock until the snapshot has been persisted, so a
// snapshot on disk never interleaves two writes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::model::{
    CloudAccount, DnsRecordSet, DnsTrafficPolicy, DnsZone, DnsZoneCache, PolicyAttachment, PolicyParams,
    PolicyType, Vpc,
};
use crate::traits::store::{
    AccountStore, Mutator, RecordSetStore, TrafficPolicyStore, VpcStore, ZoneCacheStore, ZoneStore,
};

/// Zone to VPC association row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneVpc {
    pub dns_zone_id: String,
    pub vpc_id: String,
}

/// All persisted rows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    zones: BTreeMap<String, DnsZone>,
    #[serde(default)]
    record_sets: BTreeMap<String, DnsRecordSet>,
    #[serde(default)]
    caches: BTreeMap<String, DnsZoneCache>,
    #[serde(default)]
    policies: BTreeMap<String, DnsTrafficPolicy>,
    #[serde(default)]
    attachments: Vec<PolicyAttachment>,
    #[serde(default)]
    vpcs: BTreeMap<String, Vpc>,
    #[serde(default)]
    zone_vpcs: Vec<ZoneVpc>,
    #[serde(default)]
    accounts: BTreeMap<String, CloudAccount>,
}

impl Tables {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:08}", prefix, self.next_id)
    }

    fn assign_id(&mut self, id: &mut String, prefix: &str) {
        if id.is_empty() {
            *id = self.next_id(prefix);
        }
    }

    /// Total number of rows across all tables
    pub fn row_count(&self) -> usize {
        self.zones.len()
            + self.record_sets.len()
            + self.caches.len()
            + self.policies.len()
            + self.attachments.len()
            + self.vpcs.len()
            + self.zone_vpcs.len()
            + self.accounts.len()
    }
}

/// What to do with the tables after each write
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    async fn save(&self, tables: &Tables) -> Result<()>;
}

/// Repository implementation over [`Tables`]
pub struct TableStore<P> {
    tables: Arc<RwLock<Tables>>,
    persistence: Arc<P>,
}

impl<P> Clone for TableStore<P> {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
            persistence: Arc::clone(&self.persistence),
        }
    }
}

impl<P: Persistence> TableStore<P> {
    pub(crate) fn from_parts(tables: Tables, persistence: P) -> Self {
        Self {
            tables: Arc::new(RwLock::new(tables)),
            persistence: Arc::new(persistence),
        }
    }

    pub(crate) fn persistence(&self) -> &P {
        &self.persistence
    }

    /// Copy of all tables
    pub async fn snapshot(&self) -> Tables {
        self.tables.read().await.clone()
    }

    /// Persist the current tables
    pub async fn flush(&self) -> Result<()> {
        let guard = self.tables.read().await;
        self.persistence.save(&guard).await
    }

    async fn read<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&Tables) -> R + Send,
    {
        let guard = self.tables.read().await;
        f(&guard)
    }

    async fn write<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Tables) -> Result<R> + Send,
        R: Send,
    {
        let mut guard = self.tables.write().await;
        let out = f(&mut guard)?;
        self.persistence.save(&guard).await?;
        Ok(out)
    }
}

fn missing(kind: &str, id: &str) -> Error {
    Error::not_found(format!("{} {}", kind, id))
}

#[async_trait]
impl<P: Persistence> ZoneStore for TableStore<P> {
    async fn insert_zone(&self, mut zone: DnsZone) -> Result<DnsZone> {
        self.write(move |t| {
            t.assign_id(&mut zone.id, "zone");
            if t.zones.contains_key(&zone.id) {
                return Err(Error::conflict(format!("dns zone {} already exists", zone.id)));
            }
            t.zones.insert(zone.id.clone(), zone.clone());
            Ok(zone)
        })
        .await
    }

    async fn get_zone(&self, id: &str) -> Result<DnsZone> {
        self.read(|t| t.zones.get(id).cloned())
            .await
            .ok_or_else(|| missing("dns zone", id))
    }

    async fn find_zone_by_name(&self, name: &str) -> Result<Vec<DnsZone>> {
        Ok(self
            .read(|t| t.zones.values().filter(|z| z.name == name).cloned().collect())
            .await)
    }

    async fn list_zones(&self) -> Result<Vec<DnsZone>> {
        Ok(self.read(|t| t.zones.values().cloned().collect()).await)
    }

    async fn update_zone(&self, id: &str, mutate: Mutator<DnsZone>) -> Result<DnsZone> {
        self.write(|t| {
            let zone = t.zones.get_mut(id).ok_or_else(|| missing("dns zone", id))?;
            mutate(zone);
            Ok(zone.clone())
        })
        .await
    }

    async fn delete_zone(&self, id: &str) -> Result<()> {
        self.write(|t| {
            t.zones.remove(id);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl<P: Persistence> RecordSetStore for TableStore<P> {
    async fn insert_record_set(&self, record: DnsRecordSet) -> Result<DnsRecordSet> {
        self.write(move |t| {
            let mut record = record;
            let id = match record.id.take() {
                Some(id) if !id.is_empty() => id,
                _ => t.next_id("rs"),
            };
            record.id = Some(id.clone());
            t.record_sets.insert(id, record.clone());
            Ok(record)
        })
        .await
    }

    async fn get_record_set(&self, id: &str) -> Result<DnsRecordSet> {
        self.read(|t| t.record_sets.get(id).cloned())
            .await
            .ok_or_else(|| missing("dns record set", id))
    }

    async fn list_record_sets(&self, dns_zone_id: &str) -> Result<Vec<DnsRecordSet>> {
        Ok(self
            .read(|t| {
                t.record_sets
                    .values()
                    .filter(|r| r.dns_zone_id == dns_zone_id)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn update_record_set(&self, id: &str, mutate: Mutator<DnsRecordSet>) -> Result<DnsRecordSet> {
        self.write(|t| {
            let record = t
                .record_sets
                .get_mut(id)
                .ok_or_else(|| missing("dns record set", id))?;
            mutate(record);
            // identity is fixed at insert
            record.id = Some(id.to_string());
            Ok(record.clone())
        })
        .await
    }

    async fn delete_record_set(&self, id: &str) -> Result<()> {
        self.write(|t| {
            t.record_sets.remove(id);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl<P: Persistence> ZoneCacheStore for TableStore<P> {
    async fn insert_cache(&self, mut cache: DnsZoneCache) -> Result<DnsZoneCache> {
        self.write(move |t| {
            let duplicate = t.caches.values().any(|c| {
                c.dns_zone_id == cache.dns_zone_id && c.cloudaccount_id == cache.cloudaccount_id
            });
            if duplicate {
                return Err(Error::conflict(format!(
                    "dns zone {} already has a cache for account {}",
                    cache.dns_zone_id, cache.cloudaccount_id
                )));
            }
            t.assign_id(&mut cache.id, "cache");
            t.caches.insert(cache.id.clone(), cache.clone());
            Ok(cache)
        })
        .await
    }

    async fn get_cache(&self, id: &str) -> Result<DnsZoneCache> {
        self.read(|t| t.caches.get(id).cloned())
            .await
            .ok_or_else(|| missing("dns zone cache", id))
    }

    async fn find_cache(&self, dns_zone_id: &str, cloudaccount_id: &str) -> Result<Option<DnsZoneCache>> {
        Ok(self
            .read(|t| {
                t.caches
                    .values()
                    .find(|c| c.dns_zone_id == dns_zone_id && c.cloudaccount_id == cloudaccount_id)
                    .cloned()
            })
            .await)
    }

    async fn list_caches(&self, dns_zone_id: &str) -> Result<Vec<DnsZoneCache>> {
        Ok(self
            .read(|t| {
                t.caches
                    .values()
                    .filter(|c| c.dns_zone_id == dns_zone_id)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn list_account_caches(&self, cloudaccount_id: &str) -> Result<Vec<DnsZoneCache>> {
        Ok(self
            .read(|t| {
                t.caches
                    .values()
                    .filter(|c| c.cloudaccount_id == cloudaccount_id)
                    .cloned()
                    .collect()
            })
            .await)
    }

    async fn update_cache(&self, id: &str, mutate: Mutator<DnsZoneCache>) -> Result<DnsZoneCache> {
        self.write(|t| {
            let cache = t.caches.get_mut(id).ok_or_else(|| missing("dns zone cache", id))?;
            mutate(cache);
            Ok(cache.clone())
        })
        .await
    }

    async fn delete_cache(&self, id: &str) -> Result<()> {
        self.write(|t| {
            t.caches.remove(id);
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl<P: Persistence> TrafficPolicyStore for TableStore<P> {
    async fn find_policy(
        &self,
        provider: &str,
        policy_type: PolicyType,
        params: Option<&PolicyParams>,
    ) -> Result<Option<DnsTrafficPolicy>> {
        Ok(self
            .read(|t| {
                t.policies
                    .values()
                    .find(|p| p.matches(provider, policy_type, params))
                    .cloned()
            })
            .await)
    }

    async fn get_policy(&self, id: &str) -> Result<DnsTrafficPolicy> {
        self.read(|t| t.policies.get(id).cloned())
            .await
            .ok_or_else(|| missing("dns traffic policy", id))
    }

    async fn insert_policy(&self, mut policy: DnsTrafficPolicy) -> Result<DnsTrafficPolicy> {
        self.write(move |t| {
            t.assign_id(&mut policy.id, "policy");
            t.policies.insert(policy.id.clone(), policy.clone());
            Ok(policy)
        })
        .await
    }

    async fn delete_policy(&self, id: &str) -> Result<()> {
        self.write(|t| {
            t.policies.remove(id);
            t.attachments.retain(|a| a.policy_id != id);
            Ok(())
        })
        .await
    }

    async fn attach_policy(&self, record_id: &str, policy_id: &str) -> Result<()> {
        self.write(|t| {
            if !t.policies.contains_key(policy_id) {
                return Err(missing("dns traffic policy", policy_id));
            }
            let attachment = PolicyAttachment {
                record_id: record_id.to_string(),
                policy_id: policy_id.to_string(),
            };
            if !t.attachments.contains(&attachment) {
                t.attachments.push(attachment);
            }
            Ok(())
        })
        .await
    }

    async fn detach_policy(&self, record_id: &str, policy_id: &str) -> Result<()> {
        self.write(|t| {
            t.attachments
                .retain(|a| !(a.record_id == record_id && a.policy_id == policy_id));
            Ok(())
        })
        .await
    }

    async fn list_record_policies(&self, record_id: &str) -> Result<Vec<DnsTrafficPolicy>> {
        Ok(self
            .read(|t| {
                t.attachments
                    .iter()
                    .filter(|a| a.record_id == record_id)
                    .filter_map(|a| t.policies.get(&a.policy_id).cloned())
                    .collect()
            })
            .await)
    }

    async fn count_policy_attachments(&self, policy_id: &str) -> Result<usize> {
        Ok(self
            .read(|t| t.attachments.iter().filter(|a| a.policy_id == policy_id).count())
            .await)
    }
}

#[async_trait]
impl<P: Persistence> VpcStore for TableStore<P> {
    async fn insert_vpc(&self, mut vpc: Vpc) -> Result<Vpc> {
        self.write(move |t| {
            t.assign_id(&mut vpc.id, "vpc");
            t.vpcs.insert(vpc.id.clone(), vpc.clone());
            Ok(vpc)
        })
        .await
    }

    async fn get_vpc(&self, id: &str) -> Result<Vpc> {
        self.read(|t| t.vpcs.get(id).cloned())
            .await
            .ok_or_else(|| missing("vpc", id))
    }

    async fn find_vpc_by_external_id(&self, cloudaccount_id: &str, external_id: &str) -> Result<Option<Vpc>> {
        Ok(self
            .read(|t| {
                t.vpcs
                    .values()
                    .find(|v| {
                        v.external_id == external_id
                            && v.cloudaccount_id.as_deref() == Some(cloudaccount_id)
                    })
                    .cloned()
            })
            .await)
    }

    async fn list_zone_vpcs(&self, dns_zone_id: &str) -> Result<Vec<Vpc>> {
        Ok(self
            .read(|t| {
                t.zone_vpcs
                    .iter()
                    .filter(|zv| zv.dns_zone_id == dns_zone_id)
                    .filter_map(|zv| t.vpcs.get(&zv.vpc_id).cloned())
                    .collect()
            })
            .await)
    }

    async fn add_zone_vpc(&self, dns_zone_id: &str, vpc_id: &str) -> Result<()> {
        self.write(|t| {
            let row = ZoneVpc {
                dns_zone_id: dns_zone_id.to_string(),
                vpc_id: vpc_id.to_string(),
            };
            if !t.zone_vpcs.contains(&row) {
                t.zone_vpcs.push(row);
            }
            Ok(())
        })
        .await
    }

    async fn remove_zone_vpc(&self, dns_zone_id: &str, vpc_id: &str) -> Result<()> {
        self.write(|t| {
            t.zone_vpcs
                .retain(|zv| !(zv.dns_zone_id == dns_zone_id && zv.vpc_id == vpc_id));
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl<P: Persistence> AccountStore for TableStore<P> {
    async fn insert_account(&self, mut account: CloudAccount) -> Result<CloudAccount> {
        self.write(move |t| {
            t.assign_id(&mut account.id, "account");
            t.accounts.insert(account.id.clone(), account.clone());
            Ok(account)
        })
        .await
    }

    async fn get_account(&self, id: &str) -> Result<CloudAccount> {
        self.read(|t| t.accounts.get(id).cloned())
            .await
            .ok_or_else(|| missing("cloud account", id))
    }

    async fn list_accounts(&self) -> Result<Vec<CloudAccount>> {
        Ok(self.read(|t| t.accounts.values().cloned().collect()).await)
    }
}
