//! Core traits for the DNS sync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`DnsProvider`] / [`CloudDnsZone`] / [`CloudDnsRecordSet`]: cloud DNS capability interface
//! - [`Store`]: typed repositories for zones, record sets, caches, policies, VPCs and accounts

pub mod dns_provider;
pub mod store;

pub use dns_provider::{
    CloudDnsRecordSet, CloudDnsZone, DnsCapabilities, DnsProvider, DnsProviderFactory, ZoneCreateOptions,
};
pub use store::{
    AccountStore, Mutator, RecordSetStore, Store, TrafficPolicyStore, VpcStore, ZoneCacheStore, ZoneStore,
};
