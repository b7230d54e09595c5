//! Peer store
//!
//! Persistence and lookup of peer records, one `<name>.peer` file per
//! peer under the registry directory. Identity (keys) is persistent
//! state; the network address is re-resolved on every load.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nix::fcntl::{flock, FlockArg};
use tracing::{debug, info};

use crate::config::WgdenConfig;
use crate::error::{Error, Result};
use crate::keys::KeypairGenerator;
use crate::registry::record::{
    parse_subnet_list, validate_name, PeerKind, PeerRecord, StoredRecord,
};
use crate::resolver::AddressResolver;

/// File extension for persisted peer records
const RECORD_EXT: &str = "peer";

/// Registry of peer identities
pub struct PeerStore {
    dir: PathBuf,
    domain: String,
    server_name: String,
    resolver: Arc<dyn AddressResolver>,
    keygen: Arc<dyn KeypairGenerator>,
}

impl PeerStore {
    /// Open (creating if needed) the registry directory
    pub fn new(
        config: &WgdenConfig,
        resolver: Arc<dyn AddressResolver>,
        keygen: Arc<dyn KeypairGenerator>,
    ) -> Result<Self> {
        std::fs::create_dir_all(config.registry_dir())?;
        Ok(Self {
            dir: config.registry_dir().to_path_buf(),
            domain: config.network.domain.clone(),
            server_name: config.network.server_name.clone(),
            resolver,
            keygen,
        })
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", name, RECORD_EXT))
    }

    fn fqdn(&self, name: &str) -> String {
        format!("{}.{}", name, self.domain)
    }

    /// Check whether a record exists for this name
    pub fn exists(&self, name: &str) -> bool {
        self.record_path(name).is_file()
    }

    /// Create a peer: generate a keypair, validate, persist atomically
    ///
    /// Fails with `DuplicateName` when the record exists and `overwrite`
    /// is false. The name must resolve before the peer can be created.
    pub async fn create(
        &self,
        name: &str,
        kind: PeerKind,
        subnets: &str,
        overwrite: bool,
    ) -> Result<PeerRecord> {
        validate_name(name)?;
        self.check_kind(name, kind)?;

        if self.exists(name) && !overwrite {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let subnets = parse_subnet_list(subnets)?;

        // DNS must already carry an entry for the peer
        let fqdn = self.fqdn(name);
        let address = self
            .resolver
            .resolve(&fqdn)
            .await?
            .ok_or_else(|| Error::UnresolvableName(fqdn.clone()))?;

        let pair = self.keygen.generate();
        let stored = StoredRecord {
            name: name.to_string(),
            kind,
            private_key: pair.private,
            public_key: pair.public,
            subnets,
        };

        self.persist(&stored)?;
        info!(peer = name, kind = %kind, %address, "peer created");

        Ok(stored.with_address(address))
    }

    /// Load a peer record, re-resolving its address
    pub async fn load(&self, name: &str) -> Result<PeerRecord> {
        validate_name(name)?;
        let path = self.record_path(name);
        if !path.is_file() {
            return Err(Error::NotFound(name.to_string()));
        }

        let content = std::fs::read_to_string(&path)?;
        let stored = StoredRecord::parse(name, &content)?;

        let fqdn = self.fqdn(name);
        let address = self
            .resolver
            .resolve(&fqdn)
            .await?
            .ok_or_else(|| Error::UnresolvableName(fqdn.clone()))?;

        debug!(peer = name, %address, "peer loaded");
        Ok(stored.with_address(address))
    }

    /// Remove a peer's record file
    pub fn delete(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        let path = self.record_path(name);
        if !path.is_file() {
            return Err(Error::NotFound(name.to_string()));
        }
        std::fs::remove_file(&path)?;
        info!(peer = name, "peer deleted");
        Ok(())
    }

    /// Load every persisted record, sorted by name
    ///
    /// Enumeration order is an explicit lexicographic sort, not the
    /// directory listing order. A single unreadable record aborts the
    /// whole listing with that record's error.
    pub async fn list_all(&self) -> Result<Vec<PeerRecord>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();

        let mut records = Vec::with_capacity(names.len());
        for name in &names {
            records.push(self.load(name).await?);
        }
        Ok(records)
    }

    /// Load the server record; its absence is fatal for rendering
    pub async fn load_server(&self) -> Result<PeerRecord> {
        let record = self.load(&self.server_name).await?;
        if record.kind != PeerKind::Server {
            return Err(Error::InvalidPeerType(format!(
                "record '{}' is not a server record",
                self.server_name
            )));
        }
        Ok(record)
    }

    /// The configured server name
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Only the configured server name may hold a Server record
    fn check_kind(&self, name: &str, kind: PeerKind) -> Result<()> {
        match kind {
            PeerKind::Server if name != self.server_name => Err(Error::InvalidPeerType(format!(
                "the server peer must be named '{}'",
                self.server_name
            ))),
            PeerKind::Client if name == self.server_name => Err(Error::InvalidPeerType(format!(
                "'{}' is reserved for the server peer",
                self.server_name
            ))),
            _ => Ok(()),
        }
    }

    /// Write a record atomically: the final path only ever holds a
    /// complete record
    fn persist(&self, stored: &StoredRecord) -> Result<()> {
        let path = self.record_path(&stored.name);
        let tmp = path.with_extension("peer.tmp");

        std::fs::write(&tmp, stored.to_file_string())?;
        // Record files carry private keys; owner-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Exclusive advisory lock over the registry directory
///
/// Held by the CLI around every list -> render -> write sequence so the
/// rendered files always reflect a consistent snapshot of the registry.
/// Released when dropped.
#[derive(Debug)]
pub struct RegistryLock {
    _file: File,
}

impl RegistryLock {
    /// Acquire the lock, failing immediately if another process holds it
    pub fn acquire(registry_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(registry_dir)?;
        let path = registry_dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock)
            .map_err(|_| Error::RegistryLocked(path.display().to_string()))?;

        debug!(path = %path.display(), "registry lock acquired");
        Ok(Self { _file: file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::X25519Generator;
    use crate::resolver::StaticResolver;
    use std::net::Ipv4Addr;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> WgdenConfig {
        WgdenConfig::from_str(&format!(
            r#"
[network]
domain = "vpn.test"
server_name = "hub"
vpn_net = "10.127.0.0/16"

[paths]
registry_dir = "{0}/peers"
output_dir = "{0}/rendered"
hooks_dir = "{0}/hooks"
"#,
            dir.display()
        ))
        .unwrap()
    }

    fn test_resolver() -> Arc<StaticResolver> {
        let mut resolver = StaticResolver::new();
        resolver.insert("hub.vpn.test", Ipv4Addr::new(10, 127, 0, 1));
        resolver.insert("alice.vpn.test", Ipv4Addr::new(10, 127, 0, 2));
        resolver.insert("bob.vpn.test", Ipv4Addr::new(10, 127, 0, 3));
        Arc::new(resolver)
    }

    fn test_store(dir: &Path) -> PeerStore {
        PeerStore::new(
            &test_config(dir),
            test_resolver(),
            Arc::new(X25519Generator),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_then_load() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let created = store
            .create("alice", PeerKind::Client, "192.168.7.0/24", false)
            .await
            .unwrap();
        let loaded = store.load("alice").await.unwrap();

        assert_eq!(created.stored(), loaded.stored());
        assert_eq!(loaded.address, Ipv4Addr::new(10, 127, 0, 2));
    }

    #[tokio::test]
    async fn test_duplicate_name() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let first = store.create("alice", PeerKind::Client, "", false).await.unwrap();
        let err = store.create("alice", PeerKind::Client, "", false).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateName(_)));

        // the existing record is untouched
        let loaded = store.load("alice").await.unwrap();
        assert_eq!(loaded.stored(), first.stored());

        // overwrite regenerates keys
        let replaced = store.create("alice", PeerKind::Client, "", true).await.unwrap();
        assert_ne!(replaced.private_key, first.private_key);
    }

    #[tokio::test]
    async fn test_delete_then_load() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store.create("alice", PeerKind::Client, "", false).await.unwrap();
        store.delete("alice").unwrap();

        assert!(matches!(
            store.load("alice").await.unwrap_err(),
            Error::NotFound(_)
        ));
        assert!(matches!(
            store.delete("alice").unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_traversal_name_rejected() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        // a name that escapes the registry dir must be rejected before
        // any path is built, not reported as a missing record
        let outside = dir.path().join("secret.peer");
        std::fs::write(&outside, "NAME=secret\n").unwrap();

        let err = store.load("../secret").await.unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { .. }));

        let err = store.delete("../secret").unwrap_err();
        assert!(matches!(err, Error::InvalidRecord { .. }));
        assert!(outside.is_file());
    }

    /// Resolver whose upstream is down: every lookup errors
    struct OutageResolver;

    #[async_trait::async_trait]
    impl crate::resolver::AddressResolver for OutageResolver {
        async fn resolve(&self, fqdn: &str) -> Result<Option<Ipv4Addr>> {
            Err(Error::Dns(format!("lookup for {} failed: timed out", fqdn)))
        }
    }

    #[tokio::test]
    async fn test_resolver_outage_is_not_an_absent_peer() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());

        // record created while DNS was healthy
        test_store(dir.path())
            .create("alice", PeerKind::Client, "", false)
            .await
            .unwrap();

        let store =
            PeerStore::new(&config, Arc::new(OutageResolver), Arc::new(X25519Generator)).unwrap();

        // an outage must surface as a resolver failure, never as
        // "this peer has no DNS entry"
        let err = store.load("alice").await.unwrap_err();
        assert!(matches!(err, Error::Dns(_)));

        let err = store.create("bob", PeerKind::Client, "", false).await.unwrap_err();
        assert!(matches!(err, Error::Dns(_)));
    }

    #[tokio::test]
    async fn test_unresolvable_name() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let err = store
            .create("ghost", PeerKind::Client, "", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvableName(_)));
    }

    #[tokio::test]
    async fn test_server_name_is_enforced() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let err = store
            .create("alice", PeerKind::Server, "", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPeerType(_)));

        let err = store
            .create("hub", PeerKind::Client, "", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPeerType(_)));
    }

    #[tokio::test]
    async fn test_list_all_sorted() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store.create("hub", PeerKind::Server, "", false).await.unwrap();
        store.create("bob", PeerKind::Client, "", false).await.unwrap();
        store.create("alice", PeerKind::Client, "", false).await.unwrap();

        let names: Vec<_> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["alice", "bob", "hub"]);
    }

    #[tokio::test]
    async fn test_corrupt_record_aborts_listing() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        store.create("alice", PeerKind::Client, "", false).await.unwrap();
        std::fs::write(dir.path().join("peers/bob.peer"), "NAME=bob\n").unwrap();

        let err = store.list_all().await.unwrap_err();
        assert!(err.is_corrupt_state());
    }

    #[tokio::test]
    async fn test_invalid_subnet_rejected() {
        let dir = tempdir().unwrap();
        let store = test_store(dir.path());

        let err = store
            .create("alice", PeerKind::Client, "not-a-subnet", false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_registry_lock_conflict() {
        let dir = tempdir().unwrap();
        let held = RegistryLock::acquire(dir.path()).unwrap();
        assert!(matches!(
            RegistryLock::acquire(dir.path()).unwrap_err(),
            Error::RegistryLocked(_)
        ));
        drop(held);
        assert!(RegistryLock::acquire(dir.path()).is_ok());
    }
}
