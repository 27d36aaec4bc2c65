//! Traffic policy registry
//!
//! Maps a record set's routing policy onto deduplicated policy rows. One row
//! exists per (provider, policy type, params) triple and is shared by every
//! record set that uses it; a row that loses its last attachment is deleted.
//!
//! ## Locking
//!
//! - `record:{id}` serializes policy replacement on one record set
//! - `policy:{provider}` serializes lookup-or-insert and garbage collection
//!   for one provider, so concurrent callers converge on a single row
//!
//! Locks are always taken in that order. A record set row is only deleted
//! while its record lock is held, so a policy replacement cannot attach to
//! a row that is going away.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::lock::{policy_key, record_key, LockManager};
use crate::model::{DnsTrafficPolicy, PolicyParams, PolicyType};
use crate::traits::Store;

/// Traffic policy lookup, dedup and attachment
#[derive(Clone)]
pub struct TrafficPolicyRegistry {
    store: Arc<dyn Store>,
    locks: Arc<LockManager>,
}

impl TrafficPolicyRegistry {
    pub fn new(store: Arc<dyn Store>, locks: Arc<LockManager>) -> Self {
        Self { store, locks }
    }

    /// Return the id of the policy matching the triple, creating it if needed
    ///
    /// `None` and empty params resolve to the same row.
    pub async fn get_or_create(
        &self,
        provider: &str,
        policy_type: PolicyType,
        params: Option<&PolicyParams>,
    ) -> Result<String> {
        let _guard = self.locks.lock(&policy_key(provider)).await;
        self.get_or_create_locked(provider, policy_type, params).await
    }

    async fn get_or_create_locked(
        &self,
        provider: &str,
        policy_type: PolicyType,
        params: Option<&PolicyParams>,
    ) -> Result<String> {
        if let Some(existing) = self.store.find_policy(provider, policy_type, params).await? {
            return Ok(existing.id);
        }

        let policy = self
            .store
            .insert_policy(DnsTrafficPolicy::new(provider, policy_type, params.cloned()))
            .await?;
        tracing::debug!(
            "Created traffic policy {} ({} {} {})",
            policy.id,
            provider,
            policy_type,
            PolicyParams::canonical_opt(params)
        );
        Ok(policy.id)
    }

    /// The policy a record set uses on `provider`
    ///
    /// # Returns
    ///
    /// - `(Simple, None)` when no policy for the provider is attached
    /// - `Err(Error::Duplicate)` when more than one is attached
    pub async fn default_policy(
        &self,
        record_id: &str,
        provider: &str,
    ) -> Result<(PolicyType, Option<PolicyParams>)> {
        let mut attached = self.attached_for(record_id, provider).await?;
        match attached.len() {
            0 => Ok((PolicyType::Simple, None)),
            1 => {
                let policy = attached.remove(0);
                Ok((policy.policy_type, policy.params))
            }
            n => Err(Error::duplicate(format!(
                "record set {} has {} traffic policies for provider {}",
                record_id, n, provider
            ))),
        }
    }

    /// Replace the policy a record set uses on `provider`
    ///
    /// Read current, compare, detach old, get-or-create new, attach: all
    /// under the record's lock. A simple policy without params is the
    /// default and is stored as "no attachment".
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if the attachment changed
    /// - `Err(Error::NotFound)` when the record set no longer exists
    pub async fn set_traffic_policy(
        &self,
        record_id: &str,
        provider: &str,
        policy_type: PolicyType,
        params: Option<PolicyParams>,
    ) -> Result<bool> {
        let params = PolicyParams::normalize(params);
        let _record_guard = self.locks.lock(&record_key(record_id)).await;
        self.store.get_record_set(record_id).await?;

        let current = self.attached_for(record_id, provider).await?;
        if current.len() == 1 && current[0].matches(provider, policy_type, params.as_ref()) {
            return Ok(false);
        }
        let is_default = policy_type == PolicyType::Simple && params.is_none();
        if current.is_empty() && is_default {
            return Ok(false);
        }

        let _policy_guard = self.locks.lock(&policy_key(provider)).await;
        for old in &current {
            self.detach_and_collect(record_id, old).await?;
        }
        if !is_default {
            let policy_id = self
                .get_or_create_locked(provider, policy_type, params.as_ref())
                .await?;
            self.store.attach_policy(record_id, &policy_id).await?;
        }

        tracing::debug!(
            "Record set {} now uses {} policy {} on {}",
            record_id,
            policy_type,
            PolicyParams::canonical_opt(params.as_ref()),
            provider
        );
        Ok(true)
    }

    /// Detach one policy from a record set and collect it if unreferenced
    pub async fn remove_policy(&self, record_id: &str, policy_id: &str) -> Result<()> {
        let policy = match self.store.get_policy(policy_id).await {
            Ok(policy) => policy,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };
        let _guard = self.locks.lock(&policy_key(&policy.provider)).await;
        self.detach_and_collect(record_id, &policy).await
    }

    /// Detach every policy from a record set
    pub async fn detach_all(&self, record_id: &str) -> Result<()> {
        let _guard = self.locks.lock(&record_key(record_id)).await;
        self.detach_all_locked(record_id).await
    }

    /// Delete a record set row together with its policy attachments
    ///
    /// Policies left without attachments are collected. A missing row is
    /// not an error.
    pub async fn delete_record_set(&self, record_id: &str) -> Result<()> {
        let _guard = self.locks.lock(&record_key(record_id)).await;
        self.detach_all_locked(record_id).await?;
        self.store.delete_record_set(record_id).await
    }

    async fn detach_all_locked(&self, record_id: &str) -> Result<()> {
        for policy in self.store.list_record_policies(record_id).await? {
            self.remove_policy(record_id, &policy.id).await?;
        }
        Ok(())
    }

    async fn attached_for(&self, record_id: &str, provider: &str) -> Result<Vec<DnsTrafficPolicy>> {
        Ok(self
            .store
            .list_record_policies(record_id)
            .await?
            .into_iter()
            .filter(|p| p.provider == provider)
            .collect())
    }

    async fn detach_and_collect(&self, record_id: &str, policy: &DnsTrafficPolicy) -> Result<()> {
        self.store.detach_policy(record_id, &policy.id).await?;
        if self.store.count_policy_attachments(&policy.id).await? == 0 {
            self.store.delete_policy(&policy.id).await?;
            tracing::debug!("Removed unreferenced traffic policy {}", policy.id);
        }
        Ok(())
    }
}
