//! Data model shared by the diff engine, the stores and the zone state machine

pub mod policy;
pub mod recordset;
pub mod zone;

pub use policy::{DnsTrafficPolicy, PolicyAttachment};
pub use recordset::{DnsRecordSet, DnsType, PolicyParams, PolicyType, SortKey, RECORD_STATUS_AVAILABLE};
pub use zone::{
    validate_domain_name, CacheStatus, CloudAccount, DnsZone, DnsZoneCache, Vpc, VpcRef, ZoneStatus,
    ZoneType,
};
