//! Parser for `wg show <interface> dump` output
//!
//! The first line describes the interface itself (private key, public key,
//! listen port, fwmark). Every following line is one peer, tab separated:
//!
//! ```text
//! public-key  preshared-key  endpoint  allowed-ips  latest-handshake  rx  tx  keepalive
//! ```

use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const PEER_FIELDS: usize = 8;

/// Live state of one peer as reported by the kernel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStatus {
    pub public_key: String,
    pub pre_shared_key: Option<String>,
    pub endpoint: Option<String>,
    pub allowed_ips: Vec<String>,
    pub latest_handshake_at: Option<DateTime<Utc>>,
    pub transfer_rx: u64,
    pub transfer_tx: u64,
    pub persistent_keepalive: Option<u16>,
}

/// Parse a full dump. Lines that are not peer records are skipped.
pub fn parse_dump(output: &str) -> Result<Vec<LiveStatus>> {
    let mut peers = Vec::new();

    for line in output.lines() {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() != PEER_FIELDS {
            continue;
        }
        peers.push(parse_peer_line(&fields)?);
    }

    Ok(peers)
}

fn parse_peer_line(fields: &[&str]) -> Result<LiveStatus> {
    let handshake: i64 = parse_number(fields[4], "latest-handshake")?;
    let latest_handshake_at = if handshake == 0 {
        None
    } else {
        Utc.timestamp_opt(handshake, 0).single()
    };

    Ok(LiveStatus {
        public_key: fields[0].to_string(),
        pre_shared_key: none_marker(fields[1]),
        endpoint: none_marker(fields[2]),
        allowed_ips: none_marker(fields[3])
            .map(|ips| ips.split(',').map(|ip| ip.trim().to_string()).collect())
            .unwrap_or_default(),
        latest_handshake_at,
        transfer_rx: parse_number(fields[5], "transfer-rx")?,
        transfer_tx: parse_number(fields[6], "transfer-tx")?,
        persistent_keepalive: match fields[7] {
            "off" | "0" => None,
            value => Some(parse_number(value, "persistent-keepalive")?),
        },
    })
}

fn none_marker(field: &str) -> Option<String> {
    match field {
        "(none)" | "" => None,
        value => Some(value.to_string()),
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, name: &str) -> Result<T> {
    field.parse().map_err(|_| Error::ExternalCommand {
        command: "wg show dump".to_string(),
        message: format!("unparseable {} field {:?}", name, field),
    })
}
