//! Contract Test: Zone Deletion
//!
//! Constraints verified:
//! - Deleting a zone removes its remote copies and every local row
//! - A remote failure stops a plain delete in `delete_failed` with nothing
//!   local removed
//! - Purge removes the local zone regardless of remote failures and of the
//!   zone's status

mod common;

use common::*;
use dnssync_core::model::{DnsType, PolicyParams, PolicyType, ZoneStatus};
use dnssync_core::tasks::TaskStage;
use dnssync_core::traits::{RecordSetStore, TrafficPolicyStore, VpcStore, ZoneCacheStore, ZoneStore};
use dnssync_core::{CreateZoneRequest, DnsZone, EngineConfig, Error, RecordSetCreate, TrafficPolicyInput, ZoneEvent};
use std::sync::atomic::Ordering;

async fn harness() -> Harness {
    Harness::with_config(EngineConfig {
        debounce_delay_secs: 3600,
        ..Default::default()
    })
    .await
}

/// Cached public zone with one weighted record, returning the remote id
async fn populated_zone(h: &Harness) -> (DnsZone, String, String) {
    let (zone, task) = h
        .engine
        .create_zone(CreateZoneRequest::public("example.com").with_account(&h.account.id))
        .await
        .unwrap();
    h.complete(&task.unwrap()).await;

    let record = h
        .engine
        .create_record_set(
            RecordSetCreate::new(&zone.id, "www", DnsType::A, "1.1.1.1", 600).with_policy(TrafficPolicyInput::new(
                FAKE_PROVIDER,
                PolicyType::Weighted,
                Some(PolicyParams::new().with("weight", 5)),
            )),
        )
        .await
        .unwrap();
    let task = h.engine.sync_record_sets(&zone.id).await.unwrap();
    h.complete(&task).await;

    let cache = h.store.find_cache(&zone.id, &h.account.id).await.unwrap().unwrap();
    (zone, cache.external_id, record.id.unwrap())
}

#[tokio::test]
async fn delete_removes_remote_and_local_state() {
    let mut h = harness().await;
    let (zone, remote_id, record_id) = populated_zone(&h).await;
    let policy = h.store.list_record_policies(&record_id).await.unwrap().remove(0);
    h.drain_events();

    let task = h.engine.delete_zone(&zone.id).await.unwrap();
    h.complete(&task).await;

    assert!(h.cloud.zone(&remote_id).is_none());
    assert!(matches!(h.store.get_zone(&zone.id).await, Err(Error::NotFound(_))));
    assert!(h.store.list_caches(&zone.id).await.unwrap().is_empty());
    assert!(h.store.list_record_sets(&zone.id).await.unwrap().is_empty());
    assert!(matches!(h.store.get_policy(&policy.id).await, Err(Error::NotFound(_))));

    let statuses: Vec<ZoneStatus> = h
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            ZoneEvent::ZoneStatusChanged { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![ZoneStatus::RemoveVpcs, ZoneStatus::Deleted]);
}

#[tokio::test]
async fn remote_failure_stops_delete_and_purge_finishes_it() {
    let h = harness().await;
    let (zone, remote_id, _) = populated_zone(&h).await;
    h.cloud.fail_delete_zone.store(true, Ordering::SeqCst);

    let task = h.engine.delete_zone(&zone.id).await.unwrap();
    let stage = h.engine.wait_task(&task).await.unwrap();
    assert!(matches!(stage, TaskStage::Failed { .. }));

    let failed = h.store.get_zone(&zone.id).await.unwrap();
    assert_eq!(failed.status, ZoneStatus::DeleteFailed);
    assert!(failed.status_reason.unwrap().contains("zone is locked"));
    assert_eq!(h.store.list_caches(&zone.id).await.unwrap().len(), 1);
    assert_eq!(h.store.list_record_sets(&zone.id).await.unwrap().len(), 1);

    // a failed delete can be retried
    let retry = h.engine.delete_zone(&zone.id).await.unwrap();
    assert!(matches!(h.engine.wait_task(&retry).await.unwrap(), TaskStage::Failed { .. }));

    let task = h.engine.purge_zone(&zone.id).await.unwrap();
    h.complete(&task).await;
    assert!(matches!(h.store.get_zone(&zone.id).await, Err(Error::NotFound(_))));
    assert!(h.store.list_caches(&zone.id).await.unwrap().is_empty());
    // the remote copy outlives the purge
    assert!(h.cloud.zone(&remote_id).is_some());
}

#[tokio::test]
async fn delete_waits_for_idle_zone_but_purge_does_not() {
    let h = harness().await;
    let (zone, _) = h.engine.create_zone(CreateZoneRequest::public("example.com")).await.unwrap();
    h.store
        .update_zone(&zone.id, Box::new(|z| z.status = ZoneStatus::Caching))
        .await
        .unwrap();

    assert!(matches!(h.engine.delete_zone(&zone.id).await, Err(Error::InvalidStatus(_))));
    assert_eq!(h.store.get_zone(&zone.id).await.unwrap().status, ZoneStatus::Caching);

    let task = h.engine.purge_zone(&zone.id).await.unwrap();
    h.complete(&task).await;
    assert!(matches!(h.store.get_zone(&zone.id).await, Err(Error::NotFound(_))));
    assert!(matches!(h.engine.delete_zone(&zone.id).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn deleting_private_zone_detaches_vpcs() {
    let h = harness().await;
    let vpc = h.managed_vpc("a").await;
    let (zone, task) = h
        .engine
        .create_zone(CreateZoneRequest::private("corp.internal", vec![vpc.id.clone()]))
        .await
        .unwrap();
    h.complete(&task.unwrap()).await;
    assert_eq!(h.cloud.zone_count(), 1);

    let task = h.engine.delete_zone(&zone.id).await.unwrap();
    h.complete(&task).await;

    assert_eq!(h.cloud.zone_count(), 0);
    assert!(h.store.list_zone_vpcs(&zone.id).await.unwrap().is_empty());
    // the VPC itself is not ours to delete
    assert_eq!(h.store.get_vpc(&vpc.id).await.unwrap(), vpc);
}
