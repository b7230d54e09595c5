//! Client interface file rendering

use std::fmt::Write as _;

use crate::config::WgdenConfig;
use crate::registry::PeerRecord;
use crate::render::hooks;
use crate::subnets;

/// Render one client interface file: the client's `[Interface]` block
/// plus a single `[Peer]` block pointing at the server.
///
/// `all_subnets` is the merged subnet scope of every peer in the
/// registry; the client's own subnets are excluded so it never routes
/// toward itself through the tunnel.
pub fn render_client(
    config: &WgdenConfig,
    client: &PeerRecord,
    server: &PeerRecord,
    all_subnets: &str,
) -> String {
    let mut out = String::new();

    writeln!(out, "# {} client interface (generated by wgden)", client.name).ok();
    writeln!(out, "[Interface]").ok();
    writeln!(out, "PrivateKey = {}", client.private_key).ok();
    writeln!(
        out,
        "Address = {}/{}",
        client.address,
        config.network.vpn_net.prefix_len()
    )
    .ok();
    writeln!(out, "MTU = {}", config.network.client_mtu).ok();
    let hook_dir = config.hook_dir_for(&client.name);
    for step in hooks::STEPS {
        writeln!(out, "{} = {}", step, hooks::dispatch_command(step, &hook_dir)).ok();
    }

    let allowed = subnets::merge(
        ",",
        &client.subnet_list(),
        &[&config.network.vpn_net.to_string(), all_subnets],
    );

    writeln!(out).ok();
    writeln!(out, "# {}", server.name).ok();
    writeln!(out, "[Peer]").ok();
    writeln!(out, "PublicKey = {}", server.public_key).ok();
    writeln!(
        out,
        "Endpoint = {}:{}",
        config.endpoint_host(),
        config.network.listen_port
    )
    .ok();
    writeln!(out, "AllowedIPs = {}", allowed).ok();
    writeln!(out, "PersistentKeepalive = {}", config.network.keepalive_secs).ok();

    out
}
