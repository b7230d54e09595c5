//! wgden - WireGuard peer registry and configuration renderer
//!
//! Manages a registry of VPN peer identities (one server, many clients)
//! for a point-to-multipoint tunnel network and deterministically renders
//! it into wg-quick interface files.
//!
//! # Architecture
//!
//! Peer identity (keypair, role, subnet scope) is persistent state kept
//! as one record file per peer. Network addresses are never persisted:
//! every load resolves the peer's hostname through DNS, so renumbering a
//! peer is a DNS change, not a registry change. Every registry mutation
//! is followed by a full rebuild of all rendered output.
//!
//! # Features
//!
//! - Atomic, never-partially-visible record and output files
//! - Deterministic rendering: unchanged inputs give byte-identical files
//! - Per-interface lifecycle hook directories with best-effort dispatch
//! - Exclusive registry locking around read-modify-render sequences

pub mod config;
pub mod error;
pub mod keys;
pub mod registry;
pub mod render;
pub mod resolver;
pub mod subnets;

pub use config::WgdenConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WgdenConfig;
    pub use crate::error::{Error, Result};
    pub use crate::keys::{KeypairGenerator, X25519Generator};
    pub use crate::registry::{PeerKind, PeerRecord, PeerStore, RegistryLock};
    pub use crate::render::ConfigRenderer;
    pub use crate::resolver::{AddressResolver, DnsResolver};
}
