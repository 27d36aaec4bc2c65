// # Store Traits
//
// Strongly-typed repositories, one per entity kind. Each returns concrete
// rows; there is no generic "fetch any model" access.
//
// Single-row updates take a mutator closure that runs while the store
// holds its write lock, so a read-modify-write of one row is atomic with
// respect to other store calls.
//
// `get_*` methods return `Error::NotFound` for a missing id; `find_*`
// methods return `Ok(None)`.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    CloudAccount, DnsRecordSet, DnsTrafficPolicy, DnsZone, DnsZoneCache, PolicyParams, PolicyType, Vpc,
};

/// In-place update applied to one row under the store's write lock
pub type Mutator<T> = Box<dyn FnOnce(&mut T) + Send>;

#[async_trait]
pub trait ZoneStore: Send + Sync {
    /// Insert a zone, assigning an id if it has none
    async fn insert_zone(&self, zone: DnsZone) -> Result<DnsZone>;

    async fn get_zone(&self, id: &str) -> Result<DnsZone>;

    async fn find_zone_by_name(&self, name: &str) -> Result<Vec<DnsZone>>;

    async fn list_zones(&self) -> Result<Vec<DnsZone>>;

    async fn update_zone(&self, id: &str, mutate: Mutator<DnsZone>) -> Result<DnsZone>;

    async fn delete_zone(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait RecordSetStore: Send + Sync {
    /// Insert a record set, assigning an id if it has none
    async fn insert_record_set(&self, record: DnsRecordSet) -> Result<DnsRecordSet>;

    async fn get_record_set(&self, id: &str) -> Result<DnsRecordSet>;

    /// Record sets of a zone, in insertion order
    async fn list_record_sets(&self, dns_zone_id: &str) -> Result<Vec<DnsRecordSet>>;

    async fn update_record_set(&self, id: &str, mutate: Mutator<DnsRecordSet>) -> Result<DnsRecordSet>;

    async fn delete_record_set(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait ZoneCacheStore: Send + Sync {
    /// Insert a cache row
    ///
    /// # Returns
    ///
    /// - `Err(Error::Conflict)` if the zone already has a cache for the account
    async fn insert_cache(&self, cache: DnsZoneCache) -> Result<DnsZoneCache>;

    async fn get_cache(&self, id: &str) -> Result<DnsZoneCache>;

    async fn find_cache(&self, dns_zone_id: &str, cloudaccount_id: &str) -> Result<Option<DnsZoneCache>>;

    async fn list_caches(&self, dns_zone_id: &str) -> Result<Vec<DnsZoneCache>>;

    async fn list_account_caches(&self, cloudaccount_id: &str) -> Result<Vec<DnsZoneCache>>;

    async fn update_cache(&self, id: &str, mutate: Mutator<DnsZoneCache>) -> Result<DnsZoneCache>;

    async fn delete_cache(&self, id: &str) -> Result<()>;
}

#[async_trait]
pub trait TrafficPolicyStore: Send + Sync {
    /// Look up a policy by its dedup triple
    async fn find_policy(
        &self,
        provider: &str,
        policy_type: PolicyType,
        params: Option<&PolicyParams>,
    ) -> Result<Option<DnsTrafficPolicy>>;

    async fn get_policy(&self, id: &str) -> Result<DnsTrafficPolicy>;

    async fn insert_policy(&self, policy: DnsTrafficPolicy) -> Result<DnsTrafficPolicy>;

    async fn delete_policy(&self, id: &str) -> Result<()>;

    /// Attach a policy to a record set (no-op if already attached)
    async fn attach_policy(&self, record_id: &str, policy_id: &str) -> Result<()>;

    /// Detach a policy from a record set (no-op if not attached)
    async fn detach_policy(&self, record_id: &str, policy_id: &str) -> Result<()>;

    /// Policies attached to a record set
    async fn list_record_policies(&self, record_id: &str) -> Result<Vec<DnsTrafficPolicy>>;

    /// Number of record sets referencing a policy
    async fn count_policy_attachments(&self, policy_id: &str) -> Result<usize>;
}

#[async_trait]
pub trait VpcStore: Send + Sync {
    async fn insert_vpc(&self, vpc: Vpc) -> Result<Vpc>;

    async fn get_vpc(&self, id: &str) -> Result<Vpc>;

    /// Find a VPC of an account by its provider id
    async fn find_vpc_by_external_id(&self, cloudaccount_id: &str, external_id: &str) -> Result<Option<Vpc>>;

    /// VPCs associated with a zone
    async fn list_zone_vpcs(&self, dns_zone_id: &str) -> Result<Vec<Vpc>>;

    async fn add_zone_vpc(&self, dns_zone_id: &str, vpc_id: &str) -> Result<()>;

    async fn remove_zone_vpc(&self, dns_zone_id: &str, vpc_id: &str) -> Result<()>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(&self, account: CloudAccount) -> Result<CloudAccount>;

    async fn get_account(&self, id: &str) -> Result<CloudAccount>;

    async fn list_accounts(&self) -> Result<Vec<CloudAccount>>;
}

/// Everything the zone engine persists
pub trait Store:
    ZoneStore + RecordSetStore + ZoneCacheStore + TrafficPolicyStore + VpcStore + AccountStore
{
}

impl<T> Store for T where
    T: ZoneStore + RecordSetStore + ZoneCacheStore + TrafficPolicyStore + VpcStore + AccountStore
{
}
