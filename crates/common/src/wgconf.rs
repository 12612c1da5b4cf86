//! WireGuard configuration rendering
//!
//! Two artifacts come out of a snapshot: the interface config handed to
//! `wg-quick` (server side, enabled peers only) and the per-client config a
//! user downloads or scans as a QR code.

use crate::types::{Peer, ServerIdentity, Snapshot};
use std::fmt::Write;

/// Placeholder written when the registry does not hold a client's private key
pub const PRIVATE_KEY_PLACEHOLDER: &str = "REPLACE_ME";

/// Interface hook commands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hooks {
    pub pre_up: String,
    pub post_up: String,
    pub pre_down: String,
    pub post_down: String,
}

/// Settings for the server-side interface block
#[derive(Debug, Clone)]
pub struct InterfaceOptions {
    pub listen_port: u16,
    pub prefix: u8,
    pub hooks: Hooks,
}

/// Settings for downloadable client configs
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub prefix: u8,
    pub dns: Option<String>,
    pub mtu: Option<u16>,
    pub allowed_ips: String,
    pub persistent_keepalive: u16,
}

fn push_hook(out: &mut String, key: &str, command: &str) {
    if !command.trim().is_empty() {
        writeln!(out, "{} = {}", key, command.trim()).ok();
    }
}

/// Render the `wg-quick` interface config: one `[Peer]` per enabled peer.
pub fn render_server_config(snapshot: &Snapshot, opts: &InterfaceOptions) -> String {
    let mut out = String::new();

    out.push_str("# Note: Do not edit this file directly.\n");
    out.push_str("# Your changes will be overwritten!\n\n");
    out.push_str("# Server\n[Interface]\n");
    writeln!(out, "PrivateKey = {}", snapshot.server.private_key).ok();
    writeln!(out, "Address = {}/{}", snapshot.server.address, opts.prefix).ok();
    writeln!(out, "ListenPort = {}", opts.listen_port).ok();
    push_hook(&mut out, "PreUp", &opts.hooks.pre_up);
    push_hook(&mut out, "PostUp", &opts.hooks.post_up);
    push_hook(&mut out, "PreDown", &opts.hooks.pre_down);
    push_hook(&mut out, "PostDown", &opts.hooks.post_down);

    for peer in snapshot.peers().into_iter().filter(|p| p.enabled) {
        write!(out, "\n# Client: {} ({})\n[Peer]\n", peer.name, peer.id).ok();
        writeln!(out, "PublicKey = {}", peer.public_key).ok();
        if let Some(psk) = &peer.pre_shared_key {
            writeln!(out, "PresharedKey = {}", psk).ok();
        }
        writeln!(out, "AllowedIPs = {}/32", peer.address).ok();
    }

    out
}

/// Render the config a client imports.
pub fn render_client_config(server: &ServerIdentity, peer: &Peer, opts: &ClientOptions) -> String {
    let mut out = String::new();

    out.push_str("[Interface]\n");
    writeln!(
        out,
        "PrivateKey = {}",
        peer.private_key.as_deref().unwrap_or(PRIVATE_KEY_PLACEHOLDER)
    ).ok();
    writeln!(out, "Address = {}/{}", peer.address, opts.prefix).ok();
    if let Some(dns) = opts.dns.as_deref().filter(|d| !d.trim().is_empty()) {
        writeln!(out, "DNS = {}", dns).ok();
    }
    if let Some(mtu) = opts.mtu {
        writeln!(out, "MTU = {}", mtu).ok();
    }

    out.push_str("\n[Peer]\n");
    writeln!(out, "PublicKey = {}", server.public_key).ok();
    if let Some(psk) = &peer.pre_shared_key {
        writeln!(out, "PresharedKey = {}", psk).ok();
    }
    writeln!(out, "AllowedIPs = {}", opts.allowed_ips).ok();
    writeln!(out, "PersistentKeepalive = {}", opts.persistent_keepalive).ok();
    writeln!(out, "Endpoint = {}:{}", opts.host, opts.port).ok();

    out
}
