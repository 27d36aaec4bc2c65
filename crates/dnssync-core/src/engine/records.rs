//! Record-set CRUD and the debounced re-sync trigger
//!
//! Record rows store `Simple` policy fields; the attached traffic policies
//! are authoritative and resolved per provider on read.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::{ZoneEngine, ZoneEvent};
use crate::error::{Error, Result};
use crate::lock::zone_key;
use crate::model::{DnsRecordSet, DnsType, DnsZone, PolicyParams, PolicyType, ZoneStatus};

/// Traffic policy requested for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficPolicyInput {
    pub provider: String,
    pub policy_type: PolicyType,
    #[serde(default)]
    pub params: Option<PolicyParams>,
}

impl TrafficPolicyInput {
    pub fn new(provider: impl Into<String>, policy_type: PolicyType, params: Option<PolicyParams>) -> Self {
        Self {
            provider: provider.into(),
            policy_type,
            params,
        }
    }
}

/// New record set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSetCreate {
    pub dns_zone_id: String,
    pub name: String,
    pub dns_type: DnsType,
    pub value: String,
    pub ttl: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub traffic_policies: Vec<TrafficPolicyInput>,
}

fn default_enabled() -> bool {
    true
}

impl RecordSetCreate {
    pub fn new(
        dns_zone_id: impl Into<String>,
        name: impl Into<String>,
        dns_type: DnsType,
        value: impl Into<String>,
        ttl: u32,
    ) -> Self {
        Self {
            dns_zone_id: dns_zone_id.into(),
            name: name.into(),
            dns_type,
            value: value.into(),
            ttl,
            enabled: true,
            traffic_policies: Vec::new(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_policy(mut self, policy: TrafficPolicyInput) -> Self {
        self.traffic_policies.push(policy);
        self
    }
}

/// Partial record-set update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordSetUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dns_type: Option<DnsType>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Replaces the policy of each listed provider; others keep theirs
    #[serde(default)]
    pub traffic_policies: Option<Vec<TrafficPolicyInput>>,
}

impl ZoneEngine {
    /// Create a record set and schedule a sync of its zone
    pub async fn create_record_set(&self, req: RecordSetCreate) -> Result<DnsRecordSet> {
        let zone = self.live_zone(&req.dns_zone_id).await?;
        validate_fields(&req.name, &req.value, req.ttl)?;
        self.validate_policies(&zone, req.dns_type, &req.traffic_policies)?;

        let record = DnsRecordSet::new(req.name, req.dns_type, req.value, req.ttl)
            .with_zone(&zone.id)
            .with_enabled(req.enabled);
        let record = self.store().insert_record_set(record).await?;
        debug!("Created record set {} in zone {}", record, zone.name);

        self.apply_policies(record.id_str(), req.traffic_policies).await?;
        self.mark_dirty(&zone.id).await?;
        Ok(record)
    }

    /// Update a record set and schedule a sync of its zone
    pub async fn update_record_set(&self, id: &str, req: RecordSetUpdate) -> Result<DnsRecordSet> {
        let current = self.store().get_record_set(id).await?;
        let zone = self.live_zone(&current.dns_zone_id).await?;

        let name = req.name.clone().unwrap_or_else(|| current.name.clone());
        let value = req.value.clone().unwrap_or_else(|| current.value.clone());
        let ttl = req.ttl.unwrap_or(current.ttl);
        let dns_type = req.dns_type.unwrap_or(current.dns_type);
        validate_fields(&name, &value, ttl)?;

        let policies = req.traffic_policies.unwrap_or_default();
        self.validate_policies(&zone, dns_type, &policies)?;
        if req.dns_type.is_some_and(|t| t != current.dns_type) {
            // policies attached for other providers must still fit the new type
            for policy in self.store().list_record_policies(id).await? {
                let caps = self.providers().capabilities(&policy.provider)?;
                if !caps.supports_dns_type(zone.zone_type, dns_type) {
                    return Err(Error::not_supported(format!(
                        "provider {} does not support {} records in a {}",
                        policy.provider, dns_type, zone.zone_type
                    )));
                }
            }
        }

        let enabled = req.enabled;
        let record = self
            .store()
            .update_record_set(
                id,
                Box::new(move |r| {
                    r.name = name;
                    r.value = value;
                    r.ttl = ttl;
                    r.dns_type = dns_type;
                    if let Some(enabled) = enabled {
                        r.enabled = enabled;
                    }
                }),
            )
            .await?;

        self.apply_policies(id, policies).await?;
        self.mark_dirty(&zone.id).await?;
        Ok(record)
    }

    /// Delete a record set, detaching its traffic policies first
    pub async fn delete_record_set(&self, id: &str) -> Result<()> {
        let record = self.store().get_record_set(id).await?;
        self.policies().delete_record_set(id).await?;
        debug!("Deleted record set {}", record);
        self.mark_dirty(&record.dns_zone_id).await
    }

    /// A zone's record sets as `provider` should see them
    ///
    /// Policy fields carry the record's policy for that provider.
    pub async fn list_record_sets(&self, zone_id: &str, provider: &str) -> Result<Vec<DnsRecordSet>> {
        let mut records = self.store().list_record_sets(zone_id).await?;
        for record in &mut records {
            let (policy_type, params) = self.policies().default_policy(record.id_str(), provider).await?;
            record.policy_type = policy_type;
            record.policy_params = params;
        }
        Ok(records)
    }

    /// Flag the zone as changed and (re)arm its delayed sync
    pub async fn mark_dirty(&self, zone_id: &str) -> Result<()> {
        self.store()
            .update_zone(zone_id, Box::new(|z| z.is_dirty = true))
            .await?;
        self.emit_event(ZoneEvent::ZoneMarkedDirty {
            zone_id: zone_id.to_string(),
        });
        self.arm_delayed_sync(zone_id);
        Ok(())
    }

    fn arm_delayed_sync(&self, zone_id: &str) {
        let engine = self.clone();
        let id = zone_id.to_string();
        self.debouncer()
            .arm(zone_id, move || async move { engine.fire_delayed_sync(id).await });
    }

    async fn fire_delayed_sync(self, zone_id: String) {
        if let Err(e) = self.run_delayed_sync(&zone_id).await {
            warn!("Delayed sync of zone {} failed to start: {}", zone_id, e);
        }
    }

    async fn run_delayed_sync(&self, zone_id: &str) -> Result<()> {
        {
            let _guard = self.locks().lock(&zone_key(zone_id)).await;
            let zone = match self.store().get_zone(zone_id).await {
                Ok(zone) => zone,
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e),
            };
            if !zone.is_dirty {
                return Ok(());
            }
            if zone.status.is_transient() {
                debug!("Zone {} is {}, delaying sync", zone.name, zone.status);
                self.arm_delayed_sync(zone_id);
                return Ok(());
            }
            if zone.status != ZoneStatus::Available {
                warn!("Zone {} is {}, record changes stay pending", zone.name, zone.status);
                return Ok(());
            }
            self.store()
                .update_zone(zone_id, Box::new(|z| z.is_dirty = false))
                .await?;
        }

        match self.sync_record_sets(zone_id).await {
            Ok(task_id) => {
                debug!("Delayed sync of zone {} started as {}", zone_id, task_id);
                Ok(())
            }
            Err(Error::InvalidStatus(reason)) => {
                // another operation won the race for the zone
                debug!("Delayed sync of zone {} postponed: {}", zone_id, reason);
                self.store()
                    .update_zone(zone_id, Box::new(|z| z.is_dirty = true))
                    .await?;
                self.arm_delayed_sync(zone_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn live_zone(&self, zone_id: &str) -> Result<DnsZone> {
        let zone = self.store().get_zone(zone_id).await?;
        if zone.status == ZoneStatus::Deleted {
            return Err(Error::not_found(format!("zone {} is deleted", zone_id)));
        }
        Ok(zone)
    }

    fn validate_policies(&self, zone: &DnsZone, dns_type: DnsType, policies: &[TrafficPolicyInput]) -> Result<()> {
        let mut seen = HashSet::new();
        for policy in policies {
            if !seen.insert(policy.provider.as_str()) {
                return Err(Error::invalid_input(format!(
                    "more than one traffic policy for provider {}",
                    policy.provider
                )));
            }

            let caps = self.providers().capabilities(&policy.provider)?;
            if !caps.supports_dns_type(zone.zone_type, dns_type) {
                return Err(Error::not_supported(format!(
                    "provider {} does not support {} records in a {}",
                    policy.provider, dns_type, zone.zone_type
                )));
            }
            if !caps.supports_policy_type(zone.zone_type, policy.policy_type) {
                return Err(Error::not_supported(format!(
                    "provider {} does not support {} policies in a {}",
                    policy.provider, policy.policy_type, zone.zone_type
                )));
            }
            if !caps.accepts_policy_value(policy.policy_type, policy.params.as_ref()) {
                return Err(Error::invalid_input(format!(
                    "provider {} does not accept {} policy value {}",
                    policy.provider,
                    policy.policy_type,
                    PolicyParams::canonical_opt(policy.params.as_ref())
                )));
            }
        }
        Ok(())
    }

    async fn apply_policies(&self, record_id: &str, policies: Vec<TrafficPolicyInput>) -> Result<()> {
        for policy in policies {
            self.policies()
                .set_traffic_policy(record_id, &policy.provider, policy.policy_type, policy.params)
                .await?;
        }
        Ok(())
    }
}

fn validate_fields(name: &str, value: &str, ttl: u32) -> Result<()> {
    if name.is_empty() {
        return Err(Error::missing_parameter("name"));
    }
    if value.is_empty() {
        return Err(Error::missing_parameter("value"));
    }
    if ttl == 0 {
        return Err(Error::invalid_input("ttl must be > 0"));
    }
    Ok(())
}
