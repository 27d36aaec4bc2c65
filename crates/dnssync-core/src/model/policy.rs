//! Traffic policy rows

use serde::{Deserialize, Serialize};

use super::recordset::{PolicyParams, PolicyType};

/// A deduplicated traffic policy
///
/// One row exists per distinct (provider, policy type, params) triple;
/// record sets reference it through an attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsTrafficPolicy {
    pub id: String,
    pub provider: String,
    pub policy_type: PolicyType,
    #[serde(default)]
    pub params: Option<PolicyParams>,
}

impl DnsTrafficPolicy {
    pub fn new(provider: impl Into<String>, policy_type: PolicyType, params: Option<PolicyParams>) -> Self {
        Self {
            id: String::new(),
            provider: provider.into(),
            policy_type,
            params: PolicyParams::normalize(params),
        }
    }

    /// Same dedup triple, with `None` and empty params treated alike
    pub fn matches(&self, provider: &str, policy_type: PolicyType, params: Option<&PolicyParams>) -> bool {
        self.provider == provider
            && self.policy_type == policy_type
            && PolicyParams::equivalent(self.params.as_ref(), params)
    }
}

/// Link between a record set and a traffic policy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyAttachment {
    pub record_id: String,
    pub policy_id: String,
}
