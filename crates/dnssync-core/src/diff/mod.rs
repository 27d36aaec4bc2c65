//! Record set diff engine
//!
//! Partitions a remote and a local record-set collection into four groups:
//!
//! - `common`: present on both sides and value-equal
//! - `update`: same logical record (equal sort key) but TTL, enabled flag
//!   or another value field differs
//! - `add`: present locally only
//! - `delete`: present remotely only
//!
//! Both sides are sorted by [`DnsRecordSet::sort_key`] and merge-walked, so
//! the cost is O(n log n) for the sorts plus one linear pass. The engine is
//! pure and treats every record type alike; callers drop apex NS/SOA
//! records (see [`without_system_records`]) before comparing.
//!
//! Entries in `common` and `update` carry the remote shape and remote
//! `external_id`, annotated with the local `id` so the caller knows which
//! local row they correspond to.

use crate::model::DnsRecordSet;

/// Four-way partition produced by [`compare_record_sets`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSetDiff {
    /// Matched and value-equal
    pub common: Vec<DnsRecordSet>,
    /// Local only
    pub add: Vec<DnsRecordSet>,
    /// Remote only
    pub delete: Vec<DnsRecordSet>,
    /// Matched but not value-equal
    pub update: Vec<DnsRecordSet>,
}

impl RecordSetDiff {
    /// Nothing to add, delete or update
    pub fn is_in_sync(&self) -> bool {
        self.add.is_empty() && self.delete.is_empty() && self.update.is_empty()
    }
}

/// Compare remote (observed) record sets against local (desired) ones
///
/// # Parameters
///
/// - `remote`: record sets reported by the provider
/// - `local`: record sets from the local store
///
/// # Returns
///
/// The partition described in the module docs. For all inputs
/// `common + update + delete == remote.len()` and
/// `common + update + add == local.len()`.
pub fn compare_record_sets(remote: &[DnsRecordSet], local: &[DnsRecordSet]) -> RecordSetDiff {
    let mut remote = remote.to_vec();
    let mut local = local.to_vec();
    remote.sort_by_cached_key(DnsRecordSet::sort_key);
    local.sort_by_cached_key(DnsRecordSet::sort_key);

    let mut diff = RecordSetDiff::default();
    let (mut i, mut j) = (0, 0);

    while i < local.len() && j < remote.len() {
        let local_key = local[i].sort_key();
        let remote_key = remote[j].sort_key();

        match local_key.cmp(&remote_key) {
            std::cmp::Ordering::Equal => {
                let mut merged = remote[j].clone();
                merged.id = local[i].id.clone();
                merged.dns_zone_id = local[i].dns_zone_id.clone();

                if local[i] == remote[j] {
                    diff.common.push(merged);
                } else {
                    diff.update.push(merged);
                }
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                diff.add.push(local[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                diff.delete.push(remote[j].clone());
                j += 1;
            }
        }
    }

    diff.add.extend(local.drain(i..));
    diff.delete.extend(remote.drain(j..));

    diff
}

/// Drop apex NS/SOA records, which belong to the provider
pub fn without_system_records(records: Vec<DnsRecordSet>) -> Vec<DnsRecordSet> {
    records
        .into_iter()
        .filter(|r| !r.is_apex_system_record())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DnsType, PolicyParams, PolicyType};

    fn ns(value: &str) -> DnsRecordSet {
        DnsRecordSet::new("@", DnsType::NS, value, 86400)
    }

    fn mx(value: &str) -> DnsRecordSet {
        DnsRecordSet::new("@", DnsType::MX, value, 600)
    }

    fn mail_cname() -> DnsRecordSet {
        DnsRecordSet::new("mail", DnsType::CNAME, "qiye.163.com.", 600)
    }

    fn remote_fixture() -> Vec<DnsRecordSet> {
        vec![
            ns("f1g1ns1.dnspod.net.").with_external_id("r-ns1"),
            ns("f1g1ns2.dnspod.net.").with_external_id("r-ns2"),
            mx("qiye163mx01.mxmail.netease.com.").with_external_id("r-mx1"),
            mx("qiye163mx02.mxmail.netease.com.").with_external_id("r-mx2"),
            mail_cname().with_external_id("r-cname"),
        ]
    }

    fn local_fixture() -> Vec<DnsRecordSet> {
        vec![
            ns("f1g1ns1.dnspod.net.").with_id("l-ns1"),
            ns("f1g1ns2.dnspod.net.").with_id("l-ns2"),
            mx("qiye163mx01.mxmail.netease.com.").with_id("l-mx1"),
            mail_cname().with_id("l-cname"),
        ]
    }

    fn assert_complete(diff: &RecordSetDiff, remote: usize, local: usize) {
        assert_eq!(diff.common.len() + diff.update.len() + diff.delete.len(), remote);
        assert_eq!(diff.common.len() + diff.update.len() + diff.add.len(), local);
    }

    #[test]
    fn test_missing_mx_is_one_delete() {
        let remote = remote_fixture();
        let local = local_fixture();

        let diff = compare_record_sets(&remote, &local);

        assert_eq!(diff.common.len(), 4);
        assert_eq!(diff.add.len(), 0);
        assert_eq!(diff.delete.len(), 1);
        assert_eq!(diff.update.len(), 0);
        assert_eq!(diff.delete[0].value, "qiye163mx02.mxmail.netease.com.");
        assert_complete(&diff, remote.len(), local.len());
    }

    #[test]
    fn test_policy_participates_in_matching() {
        let local = vec![
            DnsRecordSet::new("www", DnsType::A, "1.2.3.4", 600)
                .with_id("l-1")
                .with_policy(PolicyType::Weighted, Some(PolicyParams::new().with("weight", 10))),
        ];
        let remote = vec![DnsRecordSet::new("www", DnsType::A, "1.2.3.4", 600).with_external_id("r-1")];

        let diff = compare_record_sets(&remote, &local);

        assert!(diff.common.is_empty());
        assert!(diff.update.is_empty());
        assert_eq!(diff.add.len(), 1);
        assert_eq!(diff.add[0].policy_type, PolicyType::Weighted);
        assert_eq!(diff.delete.len(), 1);
        assert_eq!(diff.delete[0].policy_type, PolicyType::Simple);
    }

    #[test]
    fn test_identity_is_ignored_by_equality() {
        let remote = remote_fixture();
        let mut local = remote.clone();
        for (n, record) in local.iter_mut().enumerate() {
            record.external_id = None;
            record.id = Some(format!("l-{}", n));
            record.status = "pending".to_string();
        }

        let diff = compare_record_sets(&remote, &local);
        assert_eq!(diff.common.len(), remote.len());
        assert!(diff.is_in_sync());
    }

    #[test]
    fn test_self_comparison_is_idempotent() {
        let remote = remote_fixture();

        let diff = compare_record_sets(&remote, &remote);

        assert!(diff.is_in_sync());
        let mut expected = remote.clone();
        expected.sort_by_cached_key(DnsRecordSet::sort_key);
        assert_eq!(diff.common, expected);
    }

    #[test]
    fn test_update_carries_both_identities() {
        let remote = vec![mail_cname().with_external_id("r-cname")];
        let mut changed = mail_cname().with_id("l-cname");
        changed.ttl = 60;

        let diff = compare_record_sets(&remote, &[changed]);

        assert_eq!(diff.update.len(), 1);
        let update = &diff.update[0];
        assert_eq!(update.external_id.as_deref(), Some("r-cname"));
        assert_eq!(update.id.as_deref(), Some("l-cname"));
        // remote shape
        assert_eq!(update.ttl, 600);
    }

    #[test]
    fn test_enabled_flag_mismatch_is_update() {
        let remote = vec![mail_cname().with_external_id("r-cname").with_enabled(false)];
        let local = vec![mail_cname().with_id("l-cname")];

        let diff = compare_record_sets(&remote, &local);
        assert_eq!(diff.update.len(), 1);
        assert!(diff.add.is_empty() && diff.delete.is_empty());
    }

    #[test]
    fn test_duplicate_keys_pair_one_to_one() {
        let remote = vec![mail_cname().with_external_id("r-1")];
        let local = vec![mail_cname().with_id("l-1"), mail_cname().with_id("l-2")];

        let diff = compare_record_sets(&remote, &local);
        assert_eq!(diff.common.len(), 1);
        assert_eq!(diff.add.len(), 1);
        assert_complete(&diff, remote.len(), local.len());
    }

    #[test]
    fn test_empty_sides_drain() {
        let remote = remote_fixture();

        let only_remote = compare_record_sets(&remote, &[]);
        assert_eq!(only_remote.delete.len(), remote.len());
        assert_complete(&only_remote, remote.len(), 0);

        let only_local = compare_record_sets(&[], &remote);
        assert_eq!(only_local.add.len(), remote.len());
        assert_complete(&only_local, 0, remote.len());
    }

    #[test]
    fn test_mixed_partition_is_complete() {
        let remote = remote_fixture();
        let mut local = local_fixture();
        local.push(DnsRecordSet::new("www", DnsType::A, "10.0.0.1", 300).with_id("l-www"));
        local[3].ttl = 1200;

        let diff = compare_record_sets(&remote, &local);

        assert_eq!(diff.add.len(), 1);
        assert_eq!(diff.update.len(), 1);
        assert_eq!(diff.delete.len(), 1);
        assert_complete(&diff, remote.len(), local.len());
    }

    #[test]
    fn test_system_records_filtered() {
        let filtered = without_system_records(remote_fixture());
        assert_eq!(filtered.len(), 3);
        assert!(filtered.iter().all(|r| r.dns_type != DnsType::NS));
    }
}
