//! Server interface file rendering

use std::fmt::Write as _;

use crate::config::WgdenConfig;
use crate::registry::PeerRecord;
use crate::render::hooks;
use crate::subnets;

/// Render the server interface file: one `[Interface]` block followed by
/// one `[Peer]` block per client, in the store's (name-sorted) order.
pub fn render_server(
    config: &WgdenConfig,
    server: &PeerRecord,
    clients: &[PeerRecord],
) -> String {
    let mut out = String::new();

    writeln!(out, "# {} server interface (generated by wgden)", server.name).ok();
    writeln!(out, "[Interface]").ok();
    writeln!(out, "PrivateKey = {}", server.private_key).ok();
    writeln!(
        out,
        "Address = {}/{}",
        server.address,
        config.network.vpn_net.prefix_len()
    )
    .ok();
    writeln!(out, "ListenPort = {}", config.network.listen_port).ok();
    let hook_dir = config.hook_dir_for(&server.name);
    for step in hooks::STEPS {
        writeln!(out, "{} = {}", step, hooks::dispatch_command(step, &hook_dir)).ok();
    }
    writeln!(out, "SaveConfig = false").ok();

    for client in clients {
        let allowed = subnets::merge(
            ",",
            "",
            &[&format!("{}/32", client.address), &client.subnet_list()],
        );
        writeln!(out).ok();
        writeln!(out, "# {}", client.name).ok();
        writeln!(out, "[Peer]").ok();
        writeln!(out, "PublicKey = {}", client.public_key).ok();
        writeln!(out, "AllowedIPs = {}", allowed).ok();
    }

    out
}
