// # DNS Provider Traits
//
// Uniform capability interface over heterogeneous cloud DNS services.
//
// ## Layers
//
// - `DnsProvider`: a connection to one cloud account. Lists, fetches and
//   creates hosted zones.
// - `CloudDnsZone`: one remote hosted zone. Record-set CRUD, VPC
//   association and deletion.
// - `CloudDnsRecordSet`: one remote record set, normalized into
//   `DnsRecordSet` by the sync engine before diffing.
//
// ## Implementations
//
// - Cloudflare: `dnssync-provider-cloudflare` crate
//
// ## Usage
//
// ```rust,ignore
// let provider = registry.create_provider(&account)?;
// let zone = provider.get_zone(&cache.external_id).await?;
// for record in zone.list_record_sets().await? {
//     let record = DnsRecordSet::from_cloud(record.as_ref());
//     println!("{}", record);
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::model::{CloudAccount, DnsRecordSet, DnsType, PolicyParams, PolicyType, VpcRef, ZoneType};

/// What a provider can host
///
/// Used to validate record-set and zone requests before anything is
/// persisted.
#[derive(Debug, Clone, Default)]
pub struct DnsCapabilities {
    /// Zone types the provider can create
    pub zone_types: Vec<ZoneType>,
    /// Record types per zone type
    pub dns_types: HashMap<ZoneType, Vec<DnsType>>,
    /// Traffic policy types per zone type
    pub policy_types: HashMap<ZoneType, Vec<PolicyType>>,
    /// Allowed params per policy type; a missing entry accepts any params
    pub policy_values: HashMap<PolicyType, Vec<PolicyParams>>,
}

impl DnsCapabilities {
    pub fn supports_zone_type(&self, zone_type: ZoneType) -> bool {
        self.zone_types.contains(&zone_type)
    }

    pub fn supports_dns_type(&self, zone_type: ZoneType, dns_type: DnsType) -> bool {
        self.dns_types
            .get(&zone_type)
            .is_some_and(|types| types.contains(&dns_type))
    }

    pub fn supports_policy_type(&self, zone_type: ZoneType, policy_type: PolicyType) -> bool {
        self.policy_types
            .get(&zone_type)
            .is_some_and(|types| types.contains(&policy_type))
    }

    /// Whether `params` is an allowed value for `policy_type`
    pub fn accepts_policy_value(&self, policy_type: PolicyType, params: Option<&PolicyParams>) -> bool {
        match self.policy_values.get(&policy_type) {
            Some(allowed) if !allowed.is_empty() => allowed
                .iter()
                .any(|value| PolicyParams::equivalent(Some(value), params)),
            _ => true,
        }
    }
}

/// Parameters for creating a remote hosted zone
#[derive(Debug, Clone)]
pub struct ZoneCreateOptions {
    pub name: String,
    pub zone_type: ZoneType,
    /// VPCs to associate on creation (private zones)
    pub vpcs: Vec<VpcRef>,
    /// Opaque provider hints copied from the local zone
    pub options: Option<serde_json::Value>,
}

/// A record set as reported by a provider
///
/// Providers map their own policy encoding onto [`PolicyType`] and
/// [`PolicyParams`] here.
pub trait CloudDnsRecordSet: Send + Sync {
    /// Provider-assigned id
    fn external_id(&self) -> String;
    /// Name relative to the zone; "@" for the apex
    fn name(&self) -> String;
    fn dns_type(&self) -> DnsType;
    fn value(&self) -> String;
    fn ttl(&self) -> u32;
    fn status(&self) -> String;
    fn enabled(&self) -> bool;
    fn policy_type(&self) -> PolicyType;
    fn policy_params(&self) -> Option<PolicyParams>;
}

impl CloudDnsRecordSet for DnsRecordSet {
    fn external_id(&self) -> String {
        self.external_id.clone().unwrap_or_default()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn dns_type(&self) -> DnsType {
        self.dns_type
    }

    fn value(&self) -> String {
        self.value.clone()
    }

    fn ttl(&self) -> u32 {
        self.ttl
    }

    fn status(&self) -> String {
        self.status.clone()
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn policy_type(&self) -> PolicyType {
        self.policy_type
    }

    fn policy_params(&self) -> Option<PolicyParams> {
        self.policy_params.clone()
    }
}

/// One remote hosted zone
///
/// # Idempotency
///
/// `remove_record_set`, `remove_vpc` and `delete` report an already-gone
/// target as `Error::NotFound`; the engine treats that as success.
#[async_trait]
pub trait CloudDnsZone: Send + Sync {
    /// Provider-assigned zone id
    fn external_id(&self) -> String;

    fn name(&self) -> String;

    fn zone_type(&self) -> ZoneType;

    /// Provider-reported status string
    fn status(&self) -> String;

    /// Provider hints to store on an imported local zone
    fn options(&self) -> Option<serde_json::Value> {
        None
    }

    /// VPCs currently associated with the zone (private zones)
    async fn list_vpcs(&self) -> Result<Vec<VpcRef>>;

    /// Fetch all record sets of the zone
    async fn list_record_sets(&self) -> Result<Vec<Box<dyn CloudDnsRecordSet>>>;

    /// Create a record set
    ///
    /// # Returns
    ///
    /// The provider-assigned id of the new record set
    async fn create_record_set(&self, record: &DnsRecordSet) -> Result<String>;

    /// Overwrite the record set identified by `record.external_id`
    async fn update_record_set(&self, record: &DnsRecordSet) -> Result<()>;

    /// Remove the record set identified by `record.external_id`
    async fn remove_record_set(&self, record: &DnsRecordSet) -> Result<()>;

    /// Associate a VPC with the zone
    async fn add_vpc(&self, vpc: &VpcRef) -> Result<()>;

    /// Disassociate a VPC from the zone
    async fn remove_vpc(&self, vpc: &VpcRef) -> Result<()>;

    /// Delete the hosted zone
    async fn delete(&self) -> Result<()>;
}

/// Connection to one cloud account's DNS service
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// Providers perform single-shot API calls and never retry: a failed call
/// is reported back, and the zone state machine records it in the zone's
/// status for an operator to act on.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Registry name of the provider (e.g. "cloudflare")
    fn provider_name(&self) -> &'static str;

    /// Static capabilities of the provider
    fn capabilities(&self) -> DnsCapabilities;

    /// List the account's hosted zones
    async fn list_zones(&self) -> Result<Vec<Box<dyn CloudDnsZone>>>;

    /// Fetch a hosted zone by its provider id
    ///
    /// # Returns
    ///
    /// - `Err(Error::NotFound)` if the zone no longer exists
    async fn get_zone(&self, external_id: &str) -> Result<Box<dyn CloudDnsZone>>;

    /// Create a hosted zone
    async fn create_zone(&self, opts: &ZoneCreateOptions) -> Result<Box<dyn CloudDnsZone>>;
}

/// Helper trait for constructing DNS providers from cloud accounts
pub trait DnsProviderFactory: Send + Sync {
    /// Open a connection for `account`
    ///
    /// # Parameters
    ///
    /// - `account`: cloud account whose `config` carries the credentials
    ///
    /// # Returns
    ///
    /// A boxed DnsProvider trait object
    fn create(&self, account: &CloudAccount) -> Result<Box<dyn DnsProvider>>;

    /// Capabilities of providers built by this factory
    ///
    /// Available without credentials so requests can be validated before
    /// any account is contacted.
    fn capabilities(&self) -> DnsCapabilities;
}
