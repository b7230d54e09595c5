//! Name resolution adapter
//!
//! Peer addresses are never persisted; every load resolves the peer's
//! FQDN again, so DNS stays the single source of truth for IP
//! assignment.

use std::collections::HashMap;
use std::net::IpAddr;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use tracing::debug;

use crate::error::{Error, Result};

/// Maps a fully-qualified peer hostname to an IPv4 address
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve a FQDN; `Ok(None)` means the name has no address record
    async fn resolve(&self, fqdn: &str) -> Result<Option<Ipv4Addr>>;
}

/// System-configured DNS resolver
pub struct DnsResolver {
    inner: TokioResolver,
}

impl DnsResolver {
    /// Create a resolver from the system configuration
    pub fn from_system() -> Result<Self> {
        let inner = TokioResolver::builder_tokio()
            .map_err(|e| Error::Dns(format!("failed to create resolver: {}", e)))?
            .build();
        Ok(Self { inner })
    }
}

#[async_trait]
impl AddressResolver for DnsResolver {
    async fn resolve(&self, fqdn: &str) -> Result<Option<Ipv4Addr>> {
        debug!(name = fqdn, "resolving peer address");

        match self.inner.lookup_ip(fqdn).await {
            Ok(lookup) => Ok(lookup.iter().find_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })),
            // NXDOMAIN / empty answer: the peer has no entry yet
            Err(e) if e.is_no_records_found() => {
                debug!(name = fqdn, "no address record");
                Ok(None)
            }
            // Timeouts, SERVFAIL and transport failures are resolver
            // problems, not an absent peer
            Err(e) => Err(Error::Dns(format!("lookup for {} failed: {}", fqdn, e))),
        }
    }
}

/// Fixed name-to-address table, for tests and offline dry runs
#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Ipv4Addr>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry
    pub fn insert(&mut self, fqdn: impl Into<String>, addr: Ipv4Addr) -> &mut Self {
        self.entries.insert(fqdn.into(), addr);
        self
    }
}

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self, fqdn: &str) -> Result<Option<Ipv4Addr>> {
        Ok(self.entries.get(fqdn).copied())
    }
}
