// # Store Implementations
//
// Implementations of the repository traits for different persistence
// strategies. Both share the table logic in `tables`.

pub mod file;
pub mod memory;
pub mod tables;

pub use file::{FileStore, JsonFile};
pub use memory::{MemoryStore, Volatile};
pub use tables::{Persistence, TableStore, Tables};
