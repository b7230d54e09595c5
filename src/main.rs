//! wgden - WireGuard peer registry and configuration renderer
//!
//! Command-line front end: every mutating command takes the registry
//! lock, applies the change, and fully regenerates all interface files.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wgden::config::WgdenConfig;
use wgden::error::Result;
use wgden::keys::X25519Generator;
use wgden::registry::{PeerKind, PeerStore, RegistryLock};
use wgden::render::ConfigRenderer;
use wgden::resolver::DnsResolver;

/// wgden - WireGuard peer registry and configuration renderer
#[derive(Parser)]
#[command(name = "wgden")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/wgden/wgden.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "wgden.toml")]
        output: PathBuf,
    },

    /// Create the server peer (if missing) and render everything
    Server {
        /// Extra subnets the server routes, comma-separated CIDRs
        #[arg(long, default_value = "")]
        subnets: String,
    },

    /// Add a client peer
    Add {
        /// Peer name (DNS label under the configured domain)
        name: String,

        /// Extra subnets this peer routes, comma-separated CIDRs
        #[arg(long, default_value = "")]
        subnets: String,

        /// Replace an existing record (regenerates its keys)
        #[arg(long)]
        overwrite: bool,
    },

    /// Remove a client peer and its rendered file
    Remove {
        /// Peer name
        name: String,
    },

    /// List all peers
    List {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show one peer
    Show {
        /// Peer name
        name: String,
    },

    /// Regenerate all interface files from the registry
    Render,

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level);

    match cli.command {
        Commands::Init { output } => run_init(output),
        Commands::Server { subnets } => run_server(cli.config, subnets).await,
        Commands::Add {
            name,
            subnets,
            overwrite,
        } => run_add(cli.config, name, subnets, overwrite).await,
        Commands::Remove { name } => run_remove(cli.config, name).await,
        Commands::List { json } => run_list(cli.config, json).await,
        Commands::Show { name } => run_show(cli.config, name).await,
        Commands::Render => run_render(cli.config).await,
        Commands::Validate => run_validate(cli.config),
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Load the configuration and open the registry
fn open_store(config: &WgdenConfig) -> Result<PeerStore> {
    let resolver = Arc::new(DnsResolver::from_system()?);
    PeerStore::new(config, resolver, Arc::new(X25519Generator))
}

/// Create the server peer if missing, then render
async fn run_server(config_path: PathBuf, subnets: String) -> Result<()> {
    let config = WgdenConfig::from_file(&config_path)?;
    let _lock = RegistryLock::acquire(config.registry_dir())?;
    let store = open_store(&config)?;

    let server_name = config.network.server_name.clone();
    if store.exists(&server_name) {
        tracing::info!(peer = %server_name, "server peer already initialized");
    } else {
        store
            .create(&server_name, PeerKind::Server, &subnets, false)
            .await?;
        println!("Server peer '{}' created", server_name);
    }

    ConfigRenderer::new(&config, &store).render_all().await?;
    Ok(())
}

/// Add a client peer and re-render everything
async fn run_add(
    config_path: PathBuf,
    name: String,
    subnets: String,
    overwrite: bool,
) -> Result<()> {
    let config = WgdenConfig::from_file(&config_path)?;
    let _lock = RegistryLock::acquire(config.registry_dir())?;
    let store = open_store(&config)?;

    let record = store
        .create(&name, PeerKind::Client, &subnets, overwrite)
        .await?;
    println!("Client peer '{}' created ({})", record.name, record.address);

    ConfigRenderer::new(&config, &store).render_all().await?;
    println!(
        "Interface file: {}",
        config.output_dir().join(format!("{}.conf", name)).display()
    );
    Ok(())
}

/// Remove a client peer, its rendered file, and re-render the rest
async fn run_remove(config_path: PathBuf, name: String) -> Result<()> {
    let config = WgdenConfig::from_file(&config_path)?;
    let _lock = RegistryLock::acquire(config.registry_dir())?;
    let store = open_store(&config)?;

    if name == config.network.server_name {
        return Err(wgden::Error::InvalidPeerType(
            "the server peer cannot be removed".into(),
        ));
    }

    store.delete(&name)?;
    let renderer = ConfigRenderer::new(&config, &store);
    renderer.remove_client_config(&name)?;
    renderer.render_all().await?;
    println!("Peer '{}' removed", name);
    Ok(())
}

/// List all peers
async fn run_list(config_path: PathBuf, json: bool) -> Result<()> {
    let config = WgdenConfig::from_file(&config_path)?;
    let store = open_store(&config)?;
    let records = store.list_all().await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records)
                .map_err(|e| wgden::Error::Render(e.to_string()))?
        );
        return Ok(());
    }

    println!("{:<20} {:<8} {:<16} SUBNETS", "NAME", "TYPE", "ADDRESS");
    for record in records {
        println!(
            "{:<20} {:<8} {:<16} {}",
            record.name,
            record.kind,
            record.address,
            record.subnet_list()
        );
    }
    Ok(())
}

/// Show one peer
async fn run_show(config_path: PathBuf, name: String) -> Result<()> {
    let config = WgdenConfig::from_file(&config_path)?;
    let store = open_store(&config)?;
    let record = store.load(&name).await?;

    println!("Name:       {}", record.name);
    println!("Type:       {}", record.kind);
    println!("Hostname:   {}", config.fqdn(&record.name));
    println!("Address:    {}", record.address);
    println!("PublicKey:  {}", record.public_key);
    println!("Subnets:    {}", record.subnet_list());
    println!(
        "Interface:  {}",
        config.output_dir().join(format!("{}.conf", record.name)).display()
    );
    Ok(())
}

/// Regenerate all interface files
async fn run_render(config_path: PathBuf) -> Result<()> {
    let config = WgdenConfig::from_file(&config_path)?;
    let _lock = RegistryLock::acquire(config.registry_dir())?;
    let store = open_store(&config)?;

    ConfigRenderer::new(&config, &store).render_all().await?;
    println!("Rendered into {}", config.output_dir().display());
    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match WgdenConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Domain:      {}", config.network.domain);
            println!("  Server:      {}", config.network.server_name);
            println!("  VPN net:     {}", config.network.vpn_net);
            println!("  Listen port: {}", config.network.listen_port);
            println!("  Endpoint:    {}:{}", config.endpoint_host(), config.network.listen_port);
            println!("  Registry:    {}", config.registry_dir().display());
            println!("  Output:      {}", config.output_dir().display());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Initialize configuration file
fn run_init(output: PathBuf) -> Result<()> {
    let config_content = r#"# wgden Configuration
# Generated configuration file

[network]
# Peers resolve as <name>.<domain>; DNS owns IP assignment
domain = "vpn.example.org"
server_name = "hub"
vpn_net = "10.127.0.0/16"
listen_port = 51820
# Externally reachable server host, written into client Endpoint lines.
# Defaults to the server FQDN; set it explicitly if that name resolves to
# the tunnel-internal address from the clients' side (split-horizon DNS).
# endpoint = "vpn-gw.example.org"
client_mtu = 1280
keepalive_secs = 25

[paths]
registry_dir = "/etc/wgden/peers"
output_dir = "/etc/wgden/rendered"
hooks_dir = "/etc/wgden/hooks"

[logging]
level = "info"
"#;

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("\nEdit the file, make sure DNS carries an entry for the server,");
    println!("then bootstrap with: wgden --config {} server", output.display());

    Ok(())
}
