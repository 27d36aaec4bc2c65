//! Test doubles and common utilities for contract tests
//!
//! `FakeCloud` is an in-memory DNS provider: hosted zones with record sets
//! and VPC associations, call counters for every mutating call, and switches
//! that make individual calls fail.

#![allow(dead_code)]

use async_trait::async_trait;
use dnssync_core::error::{Error, Result};
use dnssync_core::model::{CloudAccount, DnsRecordSet, DnsType, PolicyParams, PolicyType, Vpc, VpcRef, ZoneType};
use dnssync_core::traits::{
    AccountStore, CloudDnsRecordSet, CloudDnsZone, DnsCapabilities, DnsProvider, DnsProviderFactory, Store,
    VpcStore, ZoneCreateOptions,
};
use dnssync_core::{EngineConfig, MemoryStore, ProviderRegistry, ZoneEngine, ZoneEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub const FAKE_PROVIDER: &str = "fake";

#[derive(Debug, Clone)]
pub struct FakeZoneState {
    pub name: String,
    pub zone_type: ZoneType,
    pub vpcs: Vec<VpcRef>,
    pub records: Vec<DnsRecordSet>,
}

/// Pause point inside one fake provider call
///
/// Once armed, the next call that passes the gate signals `reached` and
/// waits for `release`.
#[derive(Default)]
pub struct Gate {
    armed: AtomicBool,
    reached: Notify,
    release: Notify,
}

impl Gate {
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Wait until a call is parked at the gate
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.reached.notify_one();
            self.release.notified().await;
        }
    }
}

/// Remote side shared by every provider connection the factory opens
#[derive(Default)]
pub struct FakeCloud {
    zones: Mutex<HashMap<String, FakeZoneState>>,
    next_id: AtomicUsize,

    pub create_zone_calls: AtomicUsize,
    pub delete_zone_calls: AtomicUsize,
    pub list_record_calls: AtomicUsize,
    pub create_record_calls: AtomicUsize,
    pub update_record_calls: AtomicUsize,
    pub remove_record_calls: AtomicUsize,
    pub add_vpc_calls: AtomicUsize,
    pub remove_vpc_calls: AtomicUsize,

    pub fail_list_records: AtomicBool,
    pub fail_create_record: AtomicBool,
    pub fail_create_zone: AtomicBool,
    pub fail_delete_zone: AtomicBool,

    /// Parks `list_zones` after it took its snapshot
    pub list_zones_gate: Gate,
    /// Parks `create_zone` after the remote zone exists
    pub create_zone_gate: Gate,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Put a zone on the remote side directly
    pub fn seed_zone(&self, name: &str, zone_type: ZoneType, records: Vec<DnsRecordSet>) -> String {
        let id = self.next_id("remote-zone");
        let records = records
            .into_iter()
            .map(|mut r| {
                if r.external_id.is_none() {
                    r.external_id = Some(self.next_id("remote-record"));
                }
                r
            })
            .collect();
        self.zones.lock().unwrap().insert(
            id.clone(),
            FakeZoneState {
                name: name.to_string(),
                zone_type,
                vpcs: Vec::new(),
                records,
            },
        );
        id
    }

    pub fn seed_vpcs(&self, external_id: &str, vpcs: Vec<VpcRef>) {
        if let Some(zone) = self.zones.lock().unwrap().get_mut(external_id) {
            zone.vpcs = vpcs;
        }
    }

    /// Add a record to a remote zone, returning its remote id
    pub fn put_record(&self, external_id: &str, mut record: DnsRecordSet) -> String {
        let record_id = self.next_id("remote-record");
        record.external_id = Some(record_id.clone());
        if let Some(zone) = self.zones.lock().unwrap().get_mut(external_id) {
            zone.records.push(record);
        }
        record_id
    }

    /// Change remote records behind the engine's back
    pub fn edit_records(&self, external_id: &str, edit: impl FnOnce(&mut Vec<DnsRecordSet>)) {
        if let Some(zone) = self.zones.lock().unwrap().get_mut(external_id) {
            edit(&mut zone.records);
        }
    }

    pub fn drop_zone(&self, external_id: &str) {
        self.zones.lock().unwrap().remove(external_id);
    }

    pub fn zone(&self, external_id: &str) -> Option<FakeZoneState> {
        self.zones.lock().unwrap().get(external_id).cloned()
    }

    pub fn zone_count(&self) -> usize {
        self.zones.lock().unwrap().len()
    }

    pub fn records(&self, external_id: &str) -> Vec<DnsRecordSet> {
        self.zone(external_id).map(|z| z.records).unwrap_or_default()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Total number of record-set mutations sent to the provider
    pub fn record_mutations(&self) -> usize {
        Self::count(&self.create_record_calls)
            + Self::count(&self.update_record_calls)
            + Self::count(&self.remove_record_calls)
    }

    fn with_zone<T>(&self, external_id: &str, f: impl FnOnce(&mut FakeZoneState) -> Result<T>) -> Result<T> {
        let mut zones = self.zones.lock().unwrap();
        let zone = zones
            .get_mut(external_id)
            .ok_or_else(|| Error::not_found(format!("remote zone {}", external_id)))?;
        f(zone)
    }
}

pub fn fake_capabilities() -> DnsCapabilities {
    let mut caps = DnsCapabilities {
        zone_types: vec![ZoneType::PublicZone, ZoneType::PrivateZone],
        ..Default::default()
    };
    let public_types = vec![
        DnsType::A,
        DnsType::AAAA,
        DnsType::CNAME,
        DnsType::MX,
        DnsType::NS,
        DnsType::TXT,
        DnsType::SRV,
    ];
    caps.dns_types.insert(ZoneType::PublicZone, public_types);
    caps.dns_types
        .insert(ZoneType::PrivateZone, vec![DnsType::A, DnsType::CNAME, DnsType::TXT]);
    caps.policy_types.insert(
        ZoneType::PublicZone,
        vec![PolicyType::Simple, PolicyType::ByCarrier, PolicyType::Weighted],
    );
    caps.policy_types
        .insert(ZoneType::PrivateZone, vec![PolicyType::Simple]);
    caps.policy_values.insert(
        PolicyType::ByCarrier,
        ["unicom", "telecom", "cmcc"]
            .into_iter()
            .map(|carrier| PolicyParams::new().with("carrier", carrier))
            .collect(),
    );
    caps
}

pub struct FakeFactory {
    cloud: Arc<FakeCloud>,
}

impl DnsProviderFactory for FakeFactory {
    fn create(&self, _account: &CloudAccount) -> Result<Box<dyn DnsProvider>> {
        Ok(Box::new(FakeProvider {
            cloud: Arc::clone(&self.cloud),
        }))
    }

    fn capabilities(&self) -> DnsCapabilities {
        fake_capabilities()
    }
}

pub struct FakeProvider {
    cloud: Arc<FakeCloud>,
}

impl FakeProvider {
    fn handle(&self, external_id: &str, state: &FakeZoneState) -> Box<dyn CloudDnsZone> {
        Box::new(FakeZone {
            cloud: Arc::clone(&self.cloud),
            external_id: external_id.to_string(),
            name: state.name.clone(),
            zone_type: state.zone_type,
        })
    }
}

#[async_trait]
impl DnsProvider for FakeProvider {
    fn provider_name(&self) -> &'static str {
        FAKE_PROVIDER
    }

    fn capabilities(&self) -> DnsCapabilities {
        fake_capabilities()
    }

    async fn list_zones(&self) -> Result<Vec<Box<dyn CloudDnsZone>>> {
        let zones = self.cloud.zones.lock().unwrap().clone();
        self.cloud.list_zones_gate.pass().await;
        let mut ids: Vec<&String> = zones.keys().collect();
        ids.sort();
        Ok(ids.into_iter().map(|id| self.handle(id, &zones[id])).collect())
    }

    async fn get_zone(&self, external_id: &str) -> Result<Box<dyn CloudDnsZone>> {
        let state = self
            .cloud
            .zone(external_id)
            .ok_or_else(|| Error::not_found(format!("remote zone {}", external_id)))?;
        Ok(self.handle(external_id, &state))
    }

    async fn create_zone(&self, opts: &ZoneCreateOptions) -> Result<Box<dyn CloudDnsZone>> {
        self.cloud.create_zone_calls.fetch_add(1, Ordering::SeqCst);
        if self.cloud.fail_create_zone.load(Ordering::SeqCst) {
            return Err(Error::provider(FAKE_PROVIDER, "zone quota exceeded"));
        }
        let id = self.cloud.seed_zone(&opts.name, opts.zone_type, Vec::new());
        self.cloud.seed_vpcs(&id, opts.vpcs.clone());
        self.cloud.create_zone_gate.pass().await;
        self.get_zone(&id).await
    }
}

pub struct FakeZone {
    cloud: Arc<FakeCloud>,
    external_id: String,
    name: String,
    zone_type: ZoneType,
}

#[async_trait]
impl CloudDnsZone for FakeZone {
    fn external_id(&self) -> String {
        self.external_id.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn zone_type(&self) -> ZoneType {
        self.zone_type
    }

    fn status(&self) -> String {
        "available".to_string()
    }

    async fn list_vpcs(&self) -> Result<Vec<VpcRef>> {
        self.cloud.with_zone(&self.external_id, |z| Ok(z.vpcs.clone()))
    }

    async fn list_record_sets(&self) -> Result<Vec<Box<dyn CloudDnsRecordSet>>> {
        self.cloud.list_record_calls.fetch_add(1, Ordering::SeqCst);
        if self.cloud.fail_list_records.load(Ordering::SeqCst) {
            return Err(Error::provider(FAKE_PROVIDER, "list records timed out"));
        }
        self.cloud.with_zone(&self.external_id, |z| {
            Ok(z.records
                .iter()
                .cloned()
                .map(|r| Box::new(r) as Box<dyn CloudDnsRecordSet>)
                .collect())
        })
    }

    async fn create_record_set(&self, record: &DnsRecordSet) -> Result<String> {
        self.cloud.create_record_calls.fetch_add(1, Ordering::SeqCst);
        if self.cloud.fail_create_record.load(Ordering::SeqCst) {
            return Err(Error::provider(FAKE_PROVIDER, "record rejected"));
        }
        let external_id = self.cloud.next_id("remote-record");
        let mut stored = record.clone();
        stored.id = None;
        stored.dns_zone_id = String::new();
        stored.external_id = Some(external_id.clone());
        self.cloud.with_zone(&self.external_id, |z| {
            z.records.push(stored);
            Ok(external_id)
        })
    }

    async fn update_record_set(&self, record: &DnsRecordSet) -> Result<()> {
        self.cloud.update_record_calls.fetch_add(1, Ordering::SeqCst);
        self.cloud.with_zone(&self.external_id, |z| {
            let existing = z
                .records
                .iter_mut()
                .find(|r| r.external_id.is_some() && r.external_id == record.external_id)
                .ok_or_else(|| Error::not_found(format!("remote record {:?}", record.external_id)))?;
            let external_id = existing.external_id.clone();
            *existing = record.clone();
            existing.id = None;
            existing.dns_zone_id = String::new();
            existing.external_id = external_id;
            Ok(())
        })
    }

    async fn remove_record_set(&self, record: &DnsRecordSet) -> Result<()> {
        self.cloud.remove_record_calls.fetch_add(1, Ordering::SeqCst);
        self.cloud.with_zone(&self.external_id, |z| {
            let before = z.records.len();
            z.records.retain(|r| r.external_id != record.external_id);
            if z.records.len() == before {
                return Err(Error::not_found(format!("remote record {:?}", record.external_id)));
            }
            Ok(())
        })
    }

    async fn add_vpc(&self, vpc: &VpcRef) -> Result<()> {
        self.cloud.add_vpc_calls.fetch_add(1, Ordering::SeqCst);
        self.cloud.with_zone(&self.external_id, |z| {
            z.vpcs.push(vpc.clone());
            Ok(())
        })
    }

    async fn remove_vpc(&self, vpc: &VpcRef) -> Result<()> {
        self.cloud.remove_vpc_calls.fetch_add(1, Ordering::SeqCst);
        self.cloud.with_zone(&self.external_id, |z| {
            z.vpcs.retain(|v| v != vpc);
            Ok(())
        })
    }

    async fn delete(&self) -> Result<()> {
        self.cloud.delete_zone_calls.fetch_add(1, Ordering::SeqCst);
        if self.cloud.fail_delete_zone.load(Ordering::SeqCst) {
            return Err(Error::provider(FAKE_PROVIDER, "zone is locked"));
        }
        self.cloud.drop_zone(&self.external_id);
        Ok(())
    }
}

/// Engine wired to a fresh memory store and a fake cloud account
pub struct Harness {
    pub engine: ZoneEngine,
    pub events: mpsc::Receiver<ZoneEvent>,
    pub store: Arc<MemoryStore>,
    pub cloud: Arc<FakeCloud>,
    pub account: CloudAccount,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig::default()).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let cloud = FakeCloud::new();
        let providers = Arc::new(ProviderRegistry::new());
        providers.register_provider(
            FAKE_PROVIDER,
            Box::new(FakeFactory {
                cloud: Arc::clone(&cloud),
            }),
        );

        let store = Arc::new(MemoryStore::new());
        let account = store
            .insert_account(CloudAccount {
                id: String::new(),
                name: "fake-account".to_string(),
                provider: FAKE_PROVIDER.to_string(),
                config: serde_json::json!({}),
            })
            .await
            .expect("account inserted");

        let (engine, events) = ZoneEngine::new(Arc::clone(&store) as Arc<dyn Store>, providers, config)
            .expect("engine construction succeeds");

        Self {
            engine,
            events,
            store,
            cloud,
            account,
        }
    }

    /// Insert a VPC managed by the fake account
    pub async fn managed_vpc(&self, name: &str) -> Vpc {
        self.store
            .insert_vpc(Vpc {
                id: String::new(),
                name: name.to_string(),
                external_id: format!("vpc-ext-{}", name),
                region_id: "region-1".to_string(),
                manager_id: Some("manager-1".to_string()),
                cloudaccount_id: Some(self.account.id.clone()),
            })
            .await
            .expect("vpc inserted")
    }

    /// Insert a VPC no cloud manager owns
    pub async fn unmanaged_vpc(&self, name: &str) -> Vpc {
        self.store
            .insert_vpc(Vpc {
                id: String::new(),
                name: name.to_string(),
                external_id: String::new(),
                region_id: String::new(),
                manager_id: None,
                cloudaccount_id: None,
            })
            .await
            .expect("vpc inserted")
    }

    /// Wait for a task and fail the test if it does not complete
    pub async fn complete(&self, task_id: &str) {
        let stage = tokio::time::timeout(Duration::from_secs(5), self.engine.wait_task(task_id))
            .await
            .expect("task finishes in time")
            .expect("task is known");
        assert_eq!(stage, dnssync_core::tasks::TaskStage::Complete, "task {} did not complete", task_id);
    }

    /// Drain pending events
    pub fn drain_events(&mut self) -> Vec<ZoneEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn a_record(name: &str, value: &str) -> DnsRecordSet {
    DnsRecordSet::new(name, DnsType::A, value, 600)
}
