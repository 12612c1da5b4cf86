//! Core types for wgdesk
//!
//! The JSON snapshot keeps the field names the interface has always been
//! persisted with (`server`, `clients`, camelCase fields), so existing
//! `<interface>.json` files load unchanged.

use crate::address::AddressPool;
use crate::dump::LiveStatus;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;

/// Server identity for the interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerIdentity {
    pub private_key: String,
    pub public_key: String,
    pub address: Ipv4Addr,
}

/// A registered client of the interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    pub id: String,
    pub name: String,
    pub address: Ipv4Addr,
    #[serde(default)]
    pub private_key: Option<String>,
    pub public_key: String,
    #[serde(default)]
    pub pre_shared_key: Option<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub expired_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub one_time_link: Option<String>,
    #[serde(default)]
    pub one_time_link_expires_at: Option<DateTime<Utc>>,
}

impl Peer {
    /// Stamp `updated_at`, always moving it strictly forward.
    pub fn touch(&mut self) {
        self.touch_at(Utc::now());
    }

    pub fn touch_at(&mut self, now: DateTime<Utc>) {
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::microseconds(1)
        };
    }

    /// Enabled peer whose expiry date has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.enabled && self.expired_at.map_or(false, |at| at < now)
    }

    pub fn has_expired_link(&self, now: DateTime<Utc>) -> bool {
        self.one_time_link.is_some()
            && self
                .one_time_link_expires_at
                .map_or(false, |at| at < now)
    }

    pub fn set_one_time_link(&mut self, token: String, expires_at: DateTime<Utc>) {
        self.one_time_link = Some(token);
        self.one_time_link_expires_at = Some(expires_at);
    }

    pub fn clear_one_time_link(&mut self) {
        self.one_time_link = None;
        self.one_time_link_expires_at = None;
    }

    /// Whether the registry holds enough material to hand out a full config
    pub fn downloadable(&self) -> bool {
        self.private_key.is_some()
    }
}

/// Registry snapshot: the unit of persistence and synchronization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub server: ServerIdentity,
    #[serde(default)]
    pub clients: BTreeMap<String, Peer>,
}

impl Snapshot {
    pub fn new(server: ServerIdentity) -> Self {
        Self {
            server,
            clients: BTreeMap::new(),
        }
    }

    pub fn peer(&self, id: &str) -> Result<&Peer> {
        self.clients.get(id).ok_or_else(|| Error::not_found("client", id))
    }

    pub fn peer_mut(&mut self, id: &str) -> Result<&mut Peer> {
        self.clients
            .get_mut(id)
            .ok_or_else(|| Error::not_found("client", id))
    }

    /// Peers ordered by creation time, ties broken by id
    pub fn peers(&self) -> Vec<&Peer> {
        let mut peers: Vec<&Peer> = self.clients.values().collect();
        peers.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        peers
    }

    /// Addresses that the allocator must not hand out, including the server's own
    pub fn occupied_addresses(&self) -> HashSet<Ipv4Addr> {
        std::iter::once(self.server.address)
            .chain(self.clients.values().map(|p| p.address))
            .collect()
    }

    pub fn find_by_link(&self, token: &str) -> Option<&Peer> {
        self.clients
            .values()
            .find(|p| p.one_time_link.as_deref() == Some(token))
    }

    /// Check the cross-peer invariants a restored snapshot has to satisfy
    pub fn validate(&self) -> Result<()> {
        let mut addresses = HashSet::from([self.server.address]);
        let mut public_keys = HashSet::new();

        for (id, peer) in &self.clients {
            if *id != peer.id {
                return Err(Error::Validation(format!(
                    "client key {} does not match client id {}",
                    id, peer.id
                )));
            }
            if !addresses.insert(peer.address) {
                return Err(Error::Validation(format!(
                    "address {} is assigned more than once",
                    peer.address
                )));
            }
            if !public_keys.insert(peer.public_key.as_str()) {
                return Err(Error::Validation(format!(
                    "public key of client {} is not unique",
                    peer.id
                )));
            }
            if peer.one_time_link.is_some() != peer.one_time_link_expires_at.is_some() {
                return Err(Error::Validation(format!(
                    "client {} has a one-time link without an expiry (or the reverse)",
                    peer.id
                )));
            }
        }

        Ok(())
    }

    /// [`validate`](Self::validate), plus every address must be a usable host of `pool`
    pub fn validate_in(&self, pool: &AddressPool) -> Result<()> {
        self.validate()?;

        if !pool.contains_host(self.server.address) {
            return Err(Error::Validation(format!(
                "server address {} is not a usable address in {}",
                self.server.address, pool
            )));
        }
        for peer in self.clients.values() {
            if !pool.contains_host(peer.address) {
                return Err(Error::Validation(format!(
                    "address {} of client {} is not a usable address in {}",
                    peer.address, peer.id, pool
                )));
            }
        }

        Ok(())
    }
}

/// Read-only view of a peer with the live daemon overlay.
///
/// Never carries private or pre-shared key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientView {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub address: Ipv4Addr,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expired_at: Option<DateTime<Utc>>,
    pub one_time_link: Option<String>,
    pub one_time_link_expires_at: Option<DateTime<Utc>>,
    pub downloadable_config: bool,
    pub persistent_keepalive: Option<u16>,
    pub latest_handshake_at: Option<DateTime<Utc>>,
    pub endpoint: Option<String>,
    pub transfer_rx: Option<u64>,
    pub transfer_tx: Option<u64>,
}

impl From<&Peer> for ClientView {
    fn from(peer: &Peer) -> Self {
        Self {
            id: peer.id.clone(),
            name: peer.name.clone(),
            enabled: peer.enabled,
            address: peer.address,
            public_key: peer.public_key.clone(),
            created_at: peer.created_at,
            updated_at: peer.updated_at,
            expired_at: peer.expired_at,
            one_time_link: peer.one_time_link.clone(),
            one_time_link_expires_at: peer.one_time_link_expires_at,
            downloadable_config: peer.downloadable(),
            persistent_keepalive: None,
            latest_handshake_at: None,
            endpoint: None,
            transfer_rx: None,
            transfer_tx: None,
        }
    }
}

impl ClientView {
    pub fn with_live(mut self, live: &LiveStatus) -> Self {
        self.persistent_keepalive = live.persistent_keepalive;
        self.latest_handshake_at = live.latest_handshake_at;
        self.endpoint = live.endpoint.clone();
        self.transfer_rx = Some(live.transfer_rx);
        self.transfer_tx = Some(live.transfer_tx);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.endpoint.is_some()
    }
}
