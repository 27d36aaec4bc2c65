// # Record Set Value Model
//
// Comparison-oriented representation of one DNS record set.
//
// Two record sets are value-equal when name, type, value, TTL, enabled flag
// and traffic policy (type and params) match. Local and remote identities
// and the free-form status never take part in equality, so a record read
// back from a provider compares equal to the local row it was created from.
//
// The sort key (name, type, value, policy type, params) aligns matching
// entries during a diff. TTL and the enabled flag are deliberately outside
// the key: a record that only differs in TTL lines up with its counterpart
// and is reported as an update rather than an add/delete pair.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::traits::CloudDnsRecordSet;

/// Status given to record sets that are in sync with their zone
pub const RECORD_STATUS_AVAILABLE: &str = "available";

/// DNS record types understood by the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DnsType {
    A,
    AAAA,
    CAA,
    CNAME,
    MX,
    NS,
    PTR,
    SOA,
    SPF,
    SRV,
    TXT,
}

impl DnsType {
    /// All known record types
    pub const ALL: [DnsType; 11] = [
        DnsType::A,
        DnsType::AAAA,
        DnsType::CAA,
        DnsType::CNAME,
        DnsType::MX,
        DnsType::NS,
        DnsType::PTR,
        DnsType::SOA,
        DnsType::SPF,
        DnsType::SRV,
        DnsType::TXT,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DnsType::A => "A",
            DnsType::AAAA => "AAAA",
            DnsType::CAA => "CAA",
            DnsType::CNAME => "CNAME",
            DnsType::MX => "MX",
            DnsType::NS => "NS",
            DnsType::PTR => "PTR",
            DnsType::SOA => "SOA",
            DnsType::SPF => "SPF",
            DnsType::SRV => "SRV",
            DnsType::TXT => "TXT",
        }
    }
}

impl fmt::Display for DnsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DnsType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DnsType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::invalid_input(format!("Unknown DNS record type: {}", s)))
    }
}

/// Traffic routing policy attached to a record set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum PolicyType {
    #[default]
    Simple,
    ByCarrier,
    ByGeoLocation,
    BySearchEngine,
    IpRange,
    Weighted,
    Failover,
    Latency,
    MultiValueAnswer,
}

impl PolicyType {
    /// All known policy types
    pub const ALL: [PolicyType; 9] = [
        PolicyType::Simple,
        PolicyType::ByCarrier,
        PolicyType::ByGeoLocation,
        PolicyType::BySearchEngine,
        PolicyType::IpRange,
        PolicyType::Weighted,
        PolicyType::Failover,
        PolicyType::Latency,
        PolicyType::MultiValueAnswer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Simple => "Simple",
            PolicyType::ByCarrier => "ByCarrier",
            PolicyType::ByGeoLocation => "ByGeoLocation",
            PolicyType::BySearchEngine => "BySearchEngine",
            PolicyType::IpRange => "IpRange",
            PolicyType::Weighted => "Weighted",
            PolicyType::Failover => "Failover",
            PolicyType::Latency => "Latency",
            PolicyType::MultiValueAnswer => "MultiValueAnswer",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PolicyType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::invalid_input(format!("Unknown traffic policy type: {}", s)))
    }
}

/// Provider-specific traffic policy parameters
///
/// A typed key/value map. Keys are kept sorted so that the canonical string
/// form is stable and can take part in the diff sort key.
///
/// An empty map carries no information and is never stored: every
/// constructor that accepts optional params runs them through
/// [`PolicyParams::normalize`], which turns `Some(empty)` into `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyParams(BTreeMap<String, serde_json::Value>);

impl PolicyParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Parse params from an untyped JSON value
    ///
    /// `null` and `{}` both yield `None`; anything that is not an object is
    /// rejected.
    pub fn from_value(value: &serde_json::Value) -> Result<Option<Self>> {
        match value {
            serde_json::Value::Null => Ok(None),
            serde_json::Value::Object(map) => {
                let params = Self(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
                Ok(Self::normalize(Some(params)))
            }
            other => Err(Error::invalid_input(format!(
                "Traffic policy params must be an object, got {}",
                other
            ))),
        }
    }

    /// Collapse an empty map into `None`
    pub fn normalize(params: Option<Self>) -> Option<Self> {
        params.filter(|p| !p.is_empty())
    }

    /// Deterministic string form used in sort keys and dedup lookups
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }

    /// Structural equality where `None` and an empty map are the same thing
    pub fn equivalent(a: Option<&Self>, b: Option<&Self>) -> bool {
        a.filter(|p| !p.is_empty()) == b.filter(|p| !p.is_empty())
    }

    /// Canonical string of optional params ("" for none)
    pub fn canonical_opt(params: Option<&Self>) -> String {
        params
            .filter(|p| !p.is_empty())
            .map(Self::canonical)
            .unwrap_or_default()
    }
}

/// Ordering key aligning matching record sets during a diff
pub type SortKey = (String, DnsType, String, PolicyType, String);

/// One DNS record set
///
/// Used both as a persisted local row and as the normalized shape of a
/// record reported by a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsRecordSet {
    /// Local identity, assigned once on insert
    #[serde(default)]
    pub id: Option<String>,
    /// Remote identity, assigned after a successful provider round trip
    #[serde(default)]
    pub external_id: Option<String>,
    /// Owning zone (empty for records that only exist remotely)
    #[serde(default)]
    pub dns_zone_id: String,
    /// Record name relative to the zone ("@" for the apex)
    pub name: String,
    pub dns_type: DnsType,
    /// Record value; multi-valued records join their values with a delimiter
    pub value: String,
    /// Time to live in seconds
    pub ttl: u32,
    pub enabled: bool,
    /// Free-form status, not part of equality
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub policy_type: PolicyType,
    #[serde(default)]
    pub policy_params: Option<PolicyParams>,
}

impl DnsRecordSet {
    /// Create an enabled record set with a simple routing policy
    pub fn new(name: impl Into<String>, dns_type: DnsType, value: impl Into<String>, ttl: u32) -> Self {
        Self {
            id: None,
            external_id: None,
            dns_zone_id: String::new(),
            name: name.into(),
            dns_type,
            value: value.into(),
            ttl,
            enabled: true,
            status: RECORD_STATUS_AVAILABLE.to_string(),
            policy_type: PolicyType::Simple,
            policy_params: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_zone(mut self, dns_zone_id: impl Into<String>) -> Self {
        self.dns_zone_id = dns_zone_id.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_policy(mut self, policy_type: PolicyType, params: Option<PolicyParams>) -> Self {
        self.policy_type = policy_type;
        self.policy_params = PolicyParams::normalize(params);
        self
    }

    /// Normalize a record reported by a provider into the common shape
    pub fn from_cloud(record: &dyn CloudDnsRecordSet) -> Self {
        let external_id = record.external_id();
        Self {
            id: None,
            external_id: (!external_id.is_empty()).then_some(external_id),
            dns_zone_id: String::new(),
            name: record.name(),
            dns_type: record.dns_type(),
            value: record.value(),
            ttl: record.ttl(),
            enabled: record.enabled(),
            status: record.status(),
            policy_type: record.policy_type(),
            policy_params: PolicyParams::normalize(record.policy_params()),
        }
    }

    /// Ordering key: (name, type, value, policy type, canonical params)
    pub fn sort_key(&self) -> SortKey {
        (
            self.name.clone(),
            self.dns_type,
            self.value.clone(),
            self.policy_type,
            PolicyParams::canonical_opt(self.policy_params.as_ref()),
        )
    }

    /// Apex NS/SOA records are owned by the provider and never synced
    pub fn is_apex_system_record(&self) -> bool {
        matches!(self.dns_type, DnsType::NS | DnsType::SOA)
            && (self.name.is_empty() || self.name == "@")
    }

    /// Local id, or an empty string for records that were never persisted
    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }
}

impl PartialEq for DnsRecordSet {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.dns_type == other.dns_type
            && self.value == other.value
            && self.ttl == other.ttl
            && self.policy_type == other.policy_type
            && self.enabled == other.enabled
            && PolicyParams::equivalent(self.policy_params.as_ref(), other.policy_params.as_ref())
    }
}

impl fmt::Display for DnsRecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} ttl={} policy={}",
            self.name, self.dns_type, self.value, self.ttl, self.policy_type
        )?;
        if let Some(params) = &self.policy_params {
            write!(f, " {}", params.canonical())?;
        }
        Ok(())
    }
}
