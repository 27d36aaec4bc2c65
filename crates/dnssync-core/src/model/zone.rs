// # Zone Model
//
// Zones, their per-account caches, and the collaborator rows (cloud
// accounts, VPCs) the zone state machine reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Zone visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneType {
    /// Internet-visible zone
    PublicZone,
    /// Zone resolvable only from associated VPCs
    PrivateZone,
}

impl ZoneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneType::PublicZone => "PublicZone",
            ZoneType::PrivateZone => "PrivateZone",
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zone state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneStatus {
    Creating,
    CreateFailed,
    Available,
    Caching,
    CacheFailed,
    Uncaching,
    UncacheFailed,
    AddVpcs,
    AddVpcsFailed,
    RemoveVpcs,
    RemoveVpcsFailed,
    SyncRecordSets,
    SyncRecordSetsFailed,
    DeleteFailed,
    Deleted,
}

impl ZoneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneStatus::Creating => "creating",
            ZoneStatus::CreateFailed => "create_failed",
            ZoneStatus::Available => "available",
            ZoneStatus::Caching => "caching",
            ZoneStatus::CacheFailed => "cache_failed",
            ZoneStatus::Uncaching => "uncaching",
            ZoneStatus::UncacheFailed => "uncache_failed",
            ZoneStatus::AddVpcs => "add_vpcs",
            ZoneStatus::AddVpcsFailed => "add_vpcs_failed",
            ZoneStatus::RemoveVpcs => "remove_vpcs",
            ZoneStatus::RemoveVpcsFailed => "remove_vpcs_failed",
            ZoneStatus::SyncRecordSets => "sync_record_sets",
            ZoneStatus::SyncRecordSetsFailed => "sync_record_sets_failed",
            ZoneStatus::DeleteFailed => "delete_failed",
            ZoneStatus::Deleted => "deleted",
        }
    }

    /// An operation is in flight for the zone
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ZoneStatus::Creating
                | ZoneStatus::Caching
                | ZoneStatus::Uncaching
                | ZoneStatus::AddVpcs
                | ZoneStatus::RemoveVpcs
                | ZoneStatus::SyncRecordSets
        )
    }

    /// The last operation failed and needs an operator retry
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            ZoneStatus::CreateFailed
                | ZoneStatus::CacheFailed
                | ZoneStatus::UncacheFailed
                | ZoneStatus::AddVpcsFailed
                | ZoneStatus::RemoveVpcsFailed
                | ZoneStatus::SyncRecordSetsFailed
                | ZoneStatus::DeleteFailed
        )
    }

    /// Failure status reached when the operation owning this status fails
    pub fn failed(&self) -> Option<ZoneStatus> {
        match self {
            ZoneStatus::Creating => Some(ZoneStatus::CreateFailed),
            ZoneStatus::Caching => Some(ZoneStatus::CacheFailed),
            ZoneStatus::Uncaching => Some(ZoneStatus::UncacheFailed),
            ZoneStatus::AddVpcs => Some(ZoneStatus::AddVpcsFailed),
            ZoneStatus::RemoveVpcs => Some(ZoneStatus::RemoveVpcsFailed),
            ZoneStatus::SyncRecordSets => Some(ZoneStatus::SyncRecordSetsFailed),
            _ => None,
        }
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DNS namespace managed by the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsZone {
    pub id: String,
    pub name: String,
    /// Immutable after creation
    pub zone_type: ZoneType,
    /// Opaque provider hints passed through on remote zone creation
    #[serde(default)]
    pub options: Option<serde_json::Value>,
    /// Local record sets changed since the last sync
    #[serde(default)]
    pub is_dirty: bool,
    pub enabled: bool,
    pub status: ZoneStatus,
    /// Message of the last failure, cleared on the next successful operation
    #[serde(default)]
    pub status_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DnsZone {
    pub fn new(name: impl Into<String>, zone_type: ZoneType) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            name: name.into(),
            zone_type,
            options: None,
            is_dirty: false,
            enabled: true,
            status: ZoneStatus::Available,
            status_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `status`, recording `reason` (a `None` reason clears it)
    pub fn set_status(&mut self, status: ZoneStatus, reason: Option<String>) {
        self.status = status;
        self.status_reason = reason;
        self.updated_at = Utc::now();
    }

    pub fn is_private(&self) -> bool {
        self.zone_type == ZoneType::PrivateZone
    }
}

/// Cache row lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Creating,
    CreateFailed,
    Available,
    Deleting,
    DeleteFailed,
}

/// A zone materialized against one cloud account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsZoneCache {
    pub id: String,
    pub dns_zone_id: String,
    pub cloudaccount_id: String,
    pub name: String,
    /// Remote zone id; empty until the remote zone exists
    #[serde(default)]
    pub external_id: String,
    pub status: CacheStatus,
}

impl DnsZoneCache {
    pub fn new(dns_zone_id: impl Into<String>, cloudaccount_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            dns_zone_id: dns_zone_id.into(),
            cloudaccount_id: cloudaccount_id.into(),
            name: name.into(),
            external_id: String::new(),
            status: CacheStatus::Creating,
        }
    }

    /// The remote zone has been created
    pub fn is_materialized(&self) -> bool {
        !self.external_id.is_empty()
    }
}

/// Cloud account a zone can be materialized in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudAccount {
    pub id: String,
    pub name: String,
    /// Registered provider name (e.g. "cloudflare")
    pub provider: String,
    /// Provider credentials and settings
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A VPC that private zones can be associated with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vpc {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub region_id: String,
    /// Owning cloud provider manager; `None` for unmanaged VPCs
    #[serde(default)]
    pub manager_id: Option<String>,
    /// Cloud account the manager belongs to
    #[serde(default)]
    pub cloudaccount_id: Option<String>,
}

impl Vpc {
    pub fn is_managed(&self) -> bool {
        self.manager_id.is_some()
    }

    /// Provider-facing handle
    pub fn to_ref(&self) -> VpcRef {
        VpcRef {
            external_id: self.external_id.clone(),
            region_id: self.region_id.clone(),
        }
    }
}

/// VPC identity as a provider sees it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VpcRef {
    pub external_id: String,
    pub region_id: String,
}

/// Validate that a string is a valid zone name
///
/// Basic RFC 1035 checks. A single trailing dot is accepted; at least two
/// labels are required.
pub fn validate_domain_name(domain: &str) -> Result<()> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);

    if domain.is_empty() {
        return Err(Error::invalid_input("Domain name cannot be empty"));
    }

    // Total length limit (RFC 1035: 253 chars max)
    if domain.len() > 253 {
        return Err(Error::invalid_input(format!(
            "Domain name too long: {} chars (max 253). Got: {}",
            domain.len(),
            domain
        )));
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(Error::invalid_input(format!(
            "Domain name needs at least two labels: '{}'",
            domain
        )));
    }

    for label in labels {
        if label.is_empty() {
            return Err(Error::invalid_input(format!("Domain name has empty label: '{}'", domain)));
        }

        if label.len() > 63 {
            return Err(Error::invalid_input(format!(
                "Domain label too long: {} chars (max 63). Label: '{}'",
                label.len(),
                label
            )));
        }

        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(Error::invalid_input(format!(
                "Domain label contains invalid characters. Label: '{}'",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::invalid_input(format!(
                "Domain label cannot start or end with hyphen. Label: '{}'",
                label
            )));
        }
    }

    Ok(())
}
