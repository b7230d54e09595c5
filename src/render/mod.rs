//! Configuration renderer
//!
//! Produces the authoritative interface files for the server and every
//! client from the full current registry. Rendering is a full rebuild:
//! output files are wholly regenerated and files belonging to deleted
//! peers are pruned, so stale entries cannot survive a registry change.
//!
//! A render is planned entirely in memory (all records loaded, all
//! names resolved, all file text built) before anything is written, so
//! a failure partway through resolution leaves the previous output
//! untouched. Writes themselves go through a temp file and rename.

pub mod client;
pub mod hooks;
pub mod server;

use std::path::PathBuf;

use tracing::{debug, info};

use crate::config::WgdenConfig;
use crate::error::{Error, Result};
use crate::registry::{PeerKind, PeerStore};
use crate::subnets;

/// Extension of rendered interface files
const CONF_EXT: &str = "conf";

/// A fully computed render: every output file's path and content
pub struct RenderPlan {
    /// Peer name and target path/content, server first
    files: Vec<(String, PathBuf, String)>,
}

impl RenderPlan {
    /// Peer names covered by this plan
    pub fn peer_names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|(name, _, _)| name.as_str())
    }
}

/// Renders interface files from the peer registry
pub struct ConfigRenderer<'a> {
    config: &'a WgdenConfig,
    store: &'a PeerStore,
}

impl<'a> ConfigRenderer<'a> {
    pub fn new(config: &'a WgdenConfig, store: &'a PeerStore) -> Self {
        Self { config, store }
    }

    fn conf_path(&self, name: &str) -> PathBuf {
        self.config.output_dir().join(format!("{}.{}", name, CONF_EXT))
    }

    /// Build the complete set of output files in memory
    ///
    /// Fails without touching disk when the server record is absent or
    /// any peer fails to load or resolve.
    pub async fn plan(&self) -> Result<RenderPlan> {
        let server = self.store.load_server().await?;
        let all = self.store.list_all().await?;

        let clients: Vec<_> = all
            .iter()
            .filter(|r| r.kind == PeerKind::Client)
            .cloned()
            .collect();

        // Every peer's extra subnets, merged once for all client files
        let subnet_lists: Vec<String> = all.iter().map(|r| r.subnet_list()).collect();
        let subnet_refs: Vec<&str> = subnet_lists.iter().map(String::as_str).collect();
        let all_subnets = subnets::merge(",", "", &subnet_refs);

        let mut files = Vec::with_capacity(clients.len() + 1);
        files.push((
            server.name.clone(),
            self.conf_path(&server.name),
            server::render_server(self.config, &server, &clients),
        ));
        for record in &clients {
            files.push((
                record.name.clone(),
                self.conf_path(&record.name),
                client::render_client(self.config, record, &server, &all_subnets),
            ));
        }

        Ok(RenderPlan { files })
    }

    /// Write a plan to disk and prune output for peers that no longer
    /// exist
    pub fn apply(&self, plan: &RenderPlan) -> Result<()> {
        std::fs::create_dir_all(self.config.output_dir())?;

        for (name, path, content) in &plan.files {
            hooks::ensure_default(&self.config.hook_dir_for(name))?;
            write_atomic(path, content)?;
            debug!(peer = name, path = %path.display(), "interface file written");
        }

        self.prune(plan)?;
        info!(files = plan.files.len(), "render complete");
        Ok(())
    }

    /// Full rebuild: plan everything, then write everything
    pub async fn render_all(&self) -> Result<()> {
        let plan = self.plan().await?;
        self.apply(&plan)
    }

    /// Remove one client's rendered file, if present
    pub fn remove_client_config(&self, name: &str) -> Result<()> {
        let path = self.conf_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(peer = name, "client interface file removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Delete `.conf` files in the output directory that belong to no
    /// current peer
    fn prune(&self, plan: &RenderPlan) -> Result<()> {
        let keep: Vec<&str> = plan.peer_names().collect();
        for entry in std::fs::read_dir(self.config.output_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CONF_EXT) {
                continue;
            }
            let stem = match path.file_stem().and_then(|s| s.to_str()) {
                Some(s) => s.to_string(),
                None => continue,
            };
            if !keep.contains(&stem.as_str()) {
                std::fs::remove_file(&path)?;
                info!(peer = %stem, "stale interface file pruned");
            }
        }
        Ok(())
    }
}

/// Write a file so readers only ever see complete content
fn write_atomic(path: &std::path::Path, content: &str) -> Result<()> {
    let tmp = path.with_extension("conf.tmp");
    std::fs::write(&tmp, content)?;
    // Interface files carry private keys; owner-only
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::X25519Generator;
    use crate::registry::PeerKind;
    use crate::resolver::StaticResolver;
    use std::net::Ipv4Addr;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn test_config(dir: &Path) -> WgdenConfig {
        WgdenConfig::from_str(&format!(
            r#"
[network]
domain = "vpn.test"
server_name = "hub"
vpn_net = "10.127.0.0/16"
listen_port = 51900

[paths]
registry_dir = "{0}/peers"
output_dir = "{0}/rendered"
hooks_dir = "{0}/hooks"
"#,
            dir.display()
        ))
        .unwrap()
    }

    fn full_resolver() -> Arc<StaticResolver> {
        let mut resolver = StaticResolver::new();
        resolver.insert("hub.vpn.test", Ipv4Addr::new(10, 127, 0, 1));
        resolver.insert("alice.vpn.test", Ipv4Addr::new(10, 127, 0, 2));
        resolver.insert("bob.vpn.test", Ipv4Addr::new(10, 127, 0, 3));
        Arc::new(resolver)
    }

    fn store_with(config: &WgdenConfig, resolver: Arc<StaticResolver>) -> PeerStore {
        PeerStore::new(config, resolver, Arc::new(X25519Generator)).unwrap()
    }

    async fn seed(store: &PeerStore) {
        store.create("hub", PeerKind::Server, "", false).await.unwrap();
        store
            .create("alice", PeerKind::Client, "192.168.7.0/24", false)
            .await
            .unwrap();
        store
            .create("bob", PeerKind::Client, "192.168.8.0/24", false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_render_is_deterministic() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let store = store_with(&config, full_resolver());
        seed(&store).await;

        let renderer = ConfigRenderer::new(&config, &store);
        renderer.render_all().await.unwrap();
        let first: Vec<String> = ["hub", "alice", "bob"]
            .iter()
            .map(|n| std::fs::read_to_string(config.output_dir().join(format!("{}.conf", n))).unwrap())
            .collect();

        renderer.render_all().await.unwrap();
        let second: Vec<String> = ["hub", "alice", "bob"]
            .iter()
            .map(|n| std::fs::read_to_string(config.output_dir().join(format!("{}.conf", n))).unwrap())
            .collect();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_server_file_contents() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let store = store_with(&config, full_resolver());
        seed(&store).await;

        ConfigRenderer::new(&config, &store).render_all().await.unwrap();
        let conf =
            std::fs::read_to_string(config.output_dir().join("hub.conf")).unwrap();

        assert!(conf.contains("[Interface]"));
        assert!(conf.contains("Address = 10.127.0.1/16"));
        assert!(conf.contains("ListenPort = 51900"));
        assert!(conf.contains("SaveConfig = false"));
        for step in hooks::STEPS {
            assert!(conf.contains(&format!("{} = for hook in", step)));
        }

        // client peer blocks, own /32 plus extra subnets, name order
        assert!(conf.contains("AllowedIPs = 10.127.0.2/32,192.168.7.0/24"));
        assert!(conf.contains("AllowedIPs = 10.127.0.3/32,192.168.8.0/24"));
        let alice_at = conf.find("# alice").unwrap();
        let bob_at = conf.find("# bob").unwrap();
        assert!(alice_at < bob_at);
        // the server itself never appears as a peer
        assert_eq!(conf.matches("[Peer]").count(), 2);
    }

    #[tokio::test]
    async fn test_client_file_contents() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let store = store_with(&config, full_resolver());
        seed(&store).await;

        ConfigRenderer::new(&config, &store).render_all().await.unwrap();
        let conf =
            std::fs::read_to_string(config.output_dir().join("alice.conf")).unwrap();

        assert!(conf.contains("Address = 10.127.0.2/16"));
        assert!(conf.contains("MTU = 1280"));
        assert!(conf.contains("Endpoint = hub.vpn.test:51900"));
        assert!(conf.contains("PersistentKeepalive = 25"));
        // routes toward the VPN range and bob's subnet, never its own
        assert!(conf.contains("AllowedIPs = 10.127.0.0/16,192.168.8.0/24"));
        assert!(!conf.contains("192.168.7.0/24"));
    }

    #[tokio::test]
    async fn test_delete_removes_all_traces() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let store = store_with(&config, full_resolver());
        seed(&store).await;

        let renderer = ConfigRenderer::new(&config, &store);
        renderer.render_all().await.unwrap();
        assert!(config.output_dir().join("bob.conf").exists());

        store.delete("bob").unwrap();
        renderer.remove_client_config("bob").unwrap();
        renderer.render_all().await.unwrap();

        assert!(!config.output_dir().join("bob.conf").exists());
        let conf =
            std::fs::read_to_string(config.output_dir().join("hub.conf")).unwrap();
        assert!(!conf.contains("# bob"));
        assert_eq!(conf.matches("[Peer]").count(), 1);
    }

    #[tokio::test]
    async fn test_prune_without_explicit_removal() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let store = store_with(&config, full_resolver());
        seed(&store).await;

        let renderer = ConfigRenderer::new(&config, &store);
        renderer.render_all().await.unwrap();

        // simulate a peer deleted by some other invocation
        store.delete("bob").unwrap();
        renderer.render_all().await.unwrap();
        assert!(!config.output_dir().join("bob.conf").exists());
    }

    #[tokio::test]
    async fn test_unresolvable_server_emits_nothing() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        seed(&store_with(&config, full_resolver())).await;

        // same registry, but the server's DNS entry has vanished
        let mut partial = StaticResolver::new();
        partial.insert("alice.vpn.test", Ipv4Addr::new(10, 127, 0, 2));
        partial.insert("bob.vpn.test", Ipv4Addr::new(10, 127, 0, 3));
        let store = store_with(&config, Arc::new(partial));

        let err = ConfigRenderer::new(&config, &store)
            .render_all()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvableName(_)));
        assert!(!config.output_dir().join("hub.conf").exists());
    }

    #[tokio::test]
    async fn test_failed_plan_preserves_previous_output() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let store = store_with(&config, full_resolver());
        seed(&store).await;

        let renderer = ConfigRenderer::new(&config, &store);
        renderer.render_all().await.unwrap();
        let before =
            std::fs::read_to_string(config.output_dir().join("alice.conf")).unwrap();

        // bob's DNS entry disappears; the whole render must fail without
        // rewriting anything
        let mut partial = StaticResolver::new();
        partial.insert("hub.vpn.test", Ipv4Addr::new(10, 127, 0, 1));
        partial.insert("alice.vpn.test", Ipv4Addr::new(10, 127, 0, 2));
        let broken = store_with(&config, Arc::new(partial));
        assert!(ConfigRenderer::new(&config, &broken).render_all().await.is_err());

        let after =
            std::fs::read_to_string(config.output_dir().join("alice.conf")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_render_fails_without_server() {
        let dir = tempdir().unwrap();
        let config = test_config(dir.path());
        let store = store_with(&config, full_resolver());
        store
            .create("alice", PeerKind::Client, "", false)
            .await
            .unwrap();

        let err = ConfigRenderer::new(&config, &store)
            .render_all()
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
