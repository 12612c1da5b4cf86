//! Peer metrics in Prometheus exposition format and as JSON
//!
//! | Series | Type | Labels |
//! |--------|------|--------|
//! | wireguard_configured_peers | gauge | interface |
//! | wireguard_enabled_peers | gauge | interface |
//! | wireguard_connected_peers | gauge | interface |
//! | wireguard_sent_bytes | counter | interface, enabled, address, name |
//! | wireguard_received_bytes | counter | interface, enabled, address, name |
//! | wireguard_latest_handshake_seconds | gauge | interface, enabled, address, name |

use crate::types::ClientView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::net::Ipv4Addr;

/// Per-peer series values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMetrics {
    pub name: String,
    pub address: Ipv4Addr,
    pub enabled: bool,
    pub sent_bytes: u64,
    pub received_bytes: u64,
    /// Seconds since the last handshake, 0 when there has been none
    pub latest_handshake_seconds: u64,
}

/// Metrics for one interface, computed from a status read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub interface: String,
    pub wireguard_configured_peers: u64,
    pub wireguard_enabled_peers: u64,
    pub wireguard_connected_peers: u64,
    pub peers: Vec<PeerMetrics>,
}

impl MetricsReport {
    pub fn from_clients(interface: &str, clients: &[ClientView], now: DateTime<Utc>) -> Self {
        let peers = clients
            .iter()
            .map(|client| PeerMetrics {
                name: client.name.clone(),
                address: client.address,
                enabled: client.enabled,
                sent_bytes: client.transfer_tx.unwrap_or(0),
                received_bytes: client.transfer_rx.unwrap_or(0),
                latest_handshake_seconds: client
                    .latest_handshake_at
                    .map(|at| (now - at).num_seconds().max(0) as u64)
                    .unwrap_or(0),
            })
            .collect();

        Self {
            interface: interface.to_string(),
            wireguard_configured_peers: clients.len() as u64,
            wireguard_enabled_peers: clients.iter().filter(|c| c.enabled).count() as u64,
            wireguard_connected_peers: clients.iter().filter(|c| c.is_connected()).count() as u64,
            peers,
        }
    }

    /// Render in Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let iface = escape_label(&self.interface);

        for (name, help, value) in [
            ("wireguard_configured_peers", "Number of configured peers", self.wireguard_configured_peers),
            ("wireguard_enabled_peers", "Number of enabled peers", self.wireguard_enabled_peers),
            ("wireguard_connected_peers", "Number of connected peers", self.wireguard_connected_peers),
        ] {
            writeln!(out, "# HELP {} {}", name, help).ok();
            writeln!(out, "# TYPE {} gauge", name).ok();
            writeln!(out, "{}{{interface=\"{}\"}} {}", name, iface, value).ok();
            out.push('\n');
        }

        let series: [(&str, &str, &str, fn(&PeerMetrics) -> u64); 3] = [
            ("wireguard_sent_bytes", "Bytes sent to the peer", "counter", |p| p.sent_bytes),
            ("wireguard_received_bytes", "Bytes received from the peer", "counter", |p| p.received_bytes),
            (
                "wireguard_latest_handshake_seconds",
                "Seconds since the last handshake",
                "gauge",
                |p| p.latest_handshake_seconds,
            ),
        ];

        for (name, help, kind, value) in series {
            writeln!(out, "# HELP {} {}", name, help).ok();
            writeln!(out, "# TYPE {} {}", name, kind).ok();
            for peer in &self.peers {
                writeln!(
                    out,
                    "{}{{interface=\"{}\",enabled=\"{}\",address=\"{}\",name=\"{}\"}} {}",
                    name,
                    iface,
                    peer.enabled,
                    peer.address,
                    escape_label(&peer.name),
                    value(peer)
                ).ok();
            }
            out.push('\n');
        }

        out
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
