//! Contract Test: Debounced Record-Set Sync
//!
//! Constraints verified:
//! - A burst of record-set edits produces exactly one sync, no earlier than
//!   the debounce delay after the last edit
//! - A zone busy with another operation postpones the sync instead of
//!   dropping it
//! - A zone in a failed status keeps its pending changes for the next
//!   operator action
//!
//! All tests run on a paused clock.

mod common;

use common::*;
use dnssync_core::model::{DnsType, ZoneStatus};
use dnssync_core::traits::ZoneStore;
use dnssync_core::{CreateZoneRequest, DnsZone, RecordSetCreate, ZoneEvent};
use std::time::Duration;
use tokio::time::Instant;

const DELAY: Duration = Duration::from_secs(10);

async fn cached_zone(h: &Harness) -> DnsZone {
    let (zone, task) = h
        .engine
        .create_zone(CreateZoneRequest::public("example.com").with_account(&h.account.id))
        .await
        .unwrap();
    h.complete(&task.unwrap()).await;
    zone
}

async fn edit(h: &Harness, zone: &DnsZone, n: usize) {
    h.engine
        .create_record_set(RecordSetCreate::new(
            &zone.id,
            format!("host{}", n),
            DnsType::A,
            format!("10.0.0.{}", n),
            600,
        ))
        .await
        .unwrap();
}

fn sync_count(events: &[ZoneEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, ZoneEvent::RecordSetsSynced { .. }))
        .count()
}

/// Block until the next sync event, returning when it arrived
async fn next_sync(h: &mut Harness) -> Instant {
    loop {
        match h.events.recv().await {
            Some(ZoneEvent::RecordSetsSynced { .. }) => return Instant::now(),
            Some(_) => continue,
            None => panic!("event channel closed"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_syncs_once() {
    let mut h = Harness::new().await;
    let zone = cached_zone(&h).await;
    h.drain_events();

    for n in 1..=5 {
        if n > 1 {
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        edit(&h, &zone, n).await;
    }
    let last_edit = Instant::now();
    assert!(h.engine.sync_pending(&zone.id));
    assert_eq!(FakeCloud::count(&h.cloud.list_record_calls), 0);

    let synced_at = next_sync(&mut h).await;
    assert!(synced_at - last_edit >= DELAY);

    // nothing else fires afterwards
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sync_count(&h.drain_events()), 0);

    assert_eq!(FakeCloud::count(&h.cloud.list_record_calls), 1);
    assert_eq!(FakeCloud::count(&h.cloud.create_record_calls), 5);
    let zone = h.store.get_zone(&zone.id).await.unwrap();
    assert!(!zone.is_dirty);
    assert_eq!(zone.status, ZoneStatus::Available);
    assert!(!h.engine.sync_pending(&zone.id));
}

#[tokio::test(start_paused = true)]
async fn busy_zone_postpones_the_sync() {
    let mut h = Harness::new().await;
    let zone = cached_zone(&h).await;

    edit(&h, &zone, 1).await;
    h.store
        .update_zone(&zone.id, Box::new(|z| z.status = ZoneStatus::AddVpcs))
        .await
        .unwrap();

    tokio::time::sleep(DELAY + Duration::from_secs(1)).await;
    assert!(h.engine.sync_pending(&zone.id), "timer re-armed while the zone is busy");
    assert!(h.store.get_zone(&zone.id).await.unwrap().is_dirty);
    assert_eq!(FakeCloud::count(&h.cloud.list_record_calls), 0);

    h.store
        .update_zone(&zone.id, Box::new(|z| z.status = ZoneStatus::Available))
        .await
        .unwrap();
    h.drain_events();
    next_sync(&mut h).await;

    assert_eq!(FakeCloud::count(&h.cloud.create_record_calls), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_zone_keeps_changes_pending() {
    let mut h = Harness::new().await;
    let zone = cached_zone(&h).await;

    edit(&h, &zone, 1).await;
    h.engine
        .set_zone_status(&zone.id, ZoneStatus::CacheFailed, Some("remote zone quota".into()))
        .await
        .unwrap();
    h.drain_events();

    tokio::time::sleep(DELAY * 3).await;
    assert_eq!(sync_count(&h.drain_events()), 0);
    assert!(!h.engine.sync_pending(&zone.id));
    assert!(h.store.get_zone(&zone.id).await.unwrap().is_dirty);
    assert_eq!(FakeCloud::count(&h.cloud.list_record_calls), 0);

    // the next edit after recovery carries the earlier one along
    h.engine
        .set_zone_status(&zone.id, ZoneStatus::Available, None)
        .await
        .unwrap();
    edit(&h, &zone, 2).await;
    next_sync(&mut h).await;
    assert_eq!(FakeCloud::count(&h.cloud.create_record_calls), 2);
}

#[tokio::test(start_paused = true)]
async fn deleting_a_zone_cancels_its_pending_sync() {
    let h = Harness::new().await;
    let zone = cached_zone(&h).await;

    edit(&h, &zone, 1).await;
    assert!(h.engine.sync_pending(&zone.id));

    let task = h.engine.delete_zone(&zone.id).await.unwrap();
    assert!(!h.engine.sync_pending(&zone.id));
    h.complete(&task).await;

    tokio::time::sleep(DELAY * 2).await;
    assert_eq!(FakeCloud::count(&h.cloud.list_record_calls), 0);
    assert_eq!(FakeCloud::count(&h.cloud.create_record_calls), 0);
}
