// # dnssync-core
//
// Core library for reconciling DNS zones and record sets with cloud DNS
// providers.
//
// ## Architecture Overview
//
// - **DnsRecordSet** / **DnsZone**: value model shared by every layer
// - **compare_record_sets**: pure diff of remote vs local record sets
// - **TrafficPolicyRegistry**: deduplicated routing policies per provider
// - **ZoneEngine**: zone state machine, record-set CRUD, push and import sync
// - **TaskManager**: runs the asynchronous task behind each zone operation
// - **DnsProvider**: trait implemented by provider crates
// - **ProviderRegistry**: plugin-based registry for DNS providers
// - **Store**: typed repositories, in memory or in a JSON file
//
// ## Design Principles
//
// 1. **Validate, then transition**: requests are checked before a zone
//    leaves `available`; failures never leave a half-started operation
// 2. **Local is desired state**: pushes make providers match local rows,
//    imports adopt what providers report
// 3. **Plugin-Based**: Providers are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library

pub mod config;
pub mod debounce;
pub mod diff;
pub mod engine;
pub mod error;
pub mod lock;
pub mod model;
pub mod policy;
pub mod registry;
pub mod state;
pub mod tasks;
pub mod traits;

// Re-export core types for convenience
pub use config::{AccountConfig, DnsSyncConfig, EngineConfig, ProviderConfig, StoreConfig};
pub use diff::{compare_record_sets, RecordSetDiff};
pub use engine::{
    CreateZoneRequest, RecordSetCreate, RecordSetUpdate, SyncResult, TrafficPolicyInput, ZoneEngine, ZoneEvent,
};
pub use error::{Error, Result};
pub use model::{DnsRecordSet, DnsType, DnsZone, PolicyParams, PolicyType, ZoneStatus, ZoneType};
pub use registry::ProviderRegistry;
pub use state::{FileStore, MemoryStore};
pub use traits::{CloudDnsRecordSet, CloudDnsZone, DnsProvider, DnsProviderFactory, Store};
