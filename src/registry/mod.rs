//! Peer registry: record format, persistence and locking

pub mod record;
pub mod store;

pub use record::{PeerKind, PeerRecord, StoredRecord};
pub use store::{PeerStore, RegistryLock};
