//! Peer registry for one interface
//!
//! Holds the process-wide snapshot. Every mutation runs under a single async
//! writer lock for the whole load-mutate-persist-sync sequence, so address
//! allocation never sees a stale peer set and file writes never interleave.
//! Readers take an `Arc` of the last committed snapshot and never block on a
//! running `wg` call.
//!
//! A mutation is computed on a copy of the snapshot. The copy only replaces
//! the cached snapshot after the JSON file has been written; a failed native
//! write or reconcile leaves the interface on its last good config until the
//! next successful commit.

use crate::config::{DaemonConfig, FeatureConfig, KeyBackend};
use crate::storage::{DirStorage, Storage};
use crate::sync::ConfigSynchronizer;
use crate::wireguard::{CommandRunner, ShellRunner, WgCli, WgKeyProvider};
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;
use wgdesk_common::{
    crypto::generate_link_token,
    expiry::{end_of_day, one_time_link_ttl},
    parse_ipv4, wgconf, AddressPool, ClientView, Error, KeyProvider, NativeKeyProvider, Peer,
    Result, ServerIdentity, Snapshot,
};

/// Outcome of one scheduler sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Peers disabled because their expiry date passed
    pub disabled: Vec<String>,
    /// Peers whose one-time link was cleared
    pub links_cleared: Vec<String>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.disabled.is_empty() && self.links_cleared.is_empty()
    }
}

/// Registry of the peers of one WireGuard interface
pub struct PeerRegistry {
    config: DaemonConfig,
    sync: ConfigSynchronizer,
    keys: Arc<dyn KeyProvider>,
    writer: Mutex<()>,
    cache: RwLock<Option<Arc<Snapshot>>>,
    interface_up: AtomicBool,
}

impl PeerRegistry {
    pub fn new(
        config: DaemonConfig,
        storage: Arc<dyn Storage>,
        runner: Arc<dyn CommandRunner>,
        keys: Arc<dyn KeyProvider>,
    ) -> Self {
        let sync = ConfigSynchronizer::new(config.clone(), storage, runner);
        Self {
            config,
            sync,
            keys,
            writer: Mutex::new(()),
            cache: RwLock::new(None),
            interface_up: AtomicBool::new(false),
        }
    }

    /// Registry over the config directory, `bash` and the configured key backend
    pub fn from_config(config: DaemonConfig) -> Self {
        let storage = Arc::new(DirStorage::new(&config.config_dir));
        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::default());
        let keys: Arc<dyn KeyProvider> = match config.key_backend {
            KeyBackend::Wg => Arc::new(WgKeyProvider::new(runner.clone())),
            KeyBackend::Native => Arc::new(NativeKeyProvider),
        };
        Self::new(config, storage, runner, keys)
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn wireguard(&self) -> &WgCli {
        self.sync.wireguard()
    }

    pub fn synchronizer(&self) -> &ConfigSynchronizer {
        &self.sync
    }

    fn cached(&self) -> Option<Arc<Snapshot>> {
        self.cache.read().clone()
    }

    /// Current snapshot, loading (and on first boot creating) it if needed.
    ///
    /// The first load in a process also recreates the interface and syncs it.
    pub async fn load(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.cached() {
            return Ok(snapshot);
        }
        let _guard = self.writer.lock().await;
        let (snapshot, _) = self.load_locked().await?;
        Ok(snapshot)
    }

    /// Alias of [`load`](Self::load) for read paths
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.load().await
    }

    /// Drop the cached snapshot and re-read the persisted one
    pub async fn reload(&self) -> Result<Arc<Snapshot>> {
        let _guard = self.writer.lock().await;
        self.cache.write().take();
        let (snapshot, _) = self.load_locked().await?;
        info!("Reloaded {} ({} clients)", self.config.interface, snapshot.clients.len());
        Ok(snapshot)
    }

    /// Must be called with the writer lock held
    async fn load_locked(&self) -> Result<(Arc<Snapshot>, AddressPool)> {
        let pool = self.config.validate()?;
        if let Some(snapshot) = self.cached() {
            return Ok((snapshot, pool));
        }

        let snapshot = match self.sync.load_persisted().await? {
            Some(snapshot) => {
                snapshot.validate_in(&pool)?;
                debug!("Loaded {} clients from {}", snapshot.clients.len(), self.config.json_file_name());
                snapshot
            }
            None => {
                let private_key = self.keys.private_key().await?;
                let public_key = self.keys.public_key(&private_key).await?;
                let server = ServerIdentity {
                    private_key,
                    public_key,
                    address: pool.server_address(),
                };
                info!(
                    "Generated server identity for {} at {}",
                    self.config.interface, server.address
                );
                Snapshot::new(server)
            }
        };

        self.sync.persist_json(&snapshot).await?;
        self.sync.persist_native(&snapshot, &pool).await?;
        if !self.interface_up.load(Ordering::Acquire) {
            self.sync.bring_up().await?;
            self.interface_up.store(true, Ordering::Release);
        }
        self.sync.reconcile().await?;

        let snapshot = Arc::new(snapshot);
        *self.cache.write() = Some(snapshot.clone());
        Ok((snapshot, pool))
    }

    /// Persist `next`, publish it, render and reconcile
    async fn commit(&self, next: Snapshot, pool: &AddressPool) -> Result<Arc<Snapshot>> {
        self.sync.persist_json(&next).await?;

        let next = Arc::new(next);
        *self.cache.write() = Some(next.clone());

        self.sync.persist_native(&next, pool).await?;
        self.sync.reconcile().await?;
        Ok(next)
    }

    /// Run `apply` on a copy of the current snapshot and commit the result
    async fn mutate<T, F>(&self, apply: F) -> Result<T>
    where
        F: FnOnce(&mut Snapshot, &AddressPool) -> Result<T>,
    {
        let _guard = self.writer.lock().await;
        let (current, pool) = self.load_locked().await?;
        let mut next = (*current).clone();
        let out = apply(&mut next, &pool)?;
        self.commit(next, &pool).await?;
        Ok(out)
    }

    /// Mutate a single peer, stamping `updated_at`
    async fn update_peer<F>(&self, id: &str, apply: F) -> Result<Peer>
    where
        F: FnOnce(&mut Peer) -> Result<()>,
    {
        self.mutate(|snapshot, _| {
            let peer = snapshot.peer_mut(id)?;
            apply(peer)?;
            peer.touch();
            Ok(peer.clone())
        })
        .await
    }

    /// Register a new peer with fresh keys and the lowest free address
    pub async fn create(&self, name: &str, expires_on: Option<NaiveDate>) -> Result<Peer> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("client name must not be empty".to_string()));
        }

        // Key generation may shell out; keep it outside the writer lock
        let keys = self.keys.triple().await?;

        let peer = self
            .mutate(|snapshot, pool| {
                let address = pool.allocate(&snapshot.occupied_addresses())?;
                let now = Utc::now();
                let peer = Peer {
                    id: Uuid::new_v4().to_string(),
                    name: name.to_string(),
                    address,
                    private_key: Some(keys.private_key),
                    public_key: keys.public_key,
                    pre_shared_key: Some(keys.pre_shared_key),
                    enabled: true,
                    created_at: now,
                    updated_at: now,
                    expired_at: expires_on.map(end_of_day),
                    one_time_link: None,
                    one_time_link_expires_at: None,
                };
                snapshot.clients.insert(peer.id.clone(), peer.clone());
                Ok(peer)
            })
            .await?;

        info!("Created client {} ({}) at {}", peer.name, peer.id, peer.address);
        Ok(peer)
    }

    pub async fn get(&self, id: &str) -> Result<Peer> {
        let snapshot = self.load().await?;
        snapshot.peer(id).cloned()
    }

    /// All peers in creation order, without private material
    pub async fn list(&self) -> Result<Vec<ClientView>> {
        let snapshot = self.load().await?;
        Ok(snapshot.peers().into_iter().map(ClientView::from).collect())
    }

    /// Remove a peer. Unknown ids are a no-op.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.writer.lock().await;
        let (current, pool) = self.load_locked().await?;
        if !current.clients.contains_key(id) {
            debug!("Delete of unknown client {} ignored", id);
            return Ok(());
        }

        let mut next = (*current).clone();
        next.clients.remove(id);
        self.commit(next, &pool).await?;
        info!("Deleted client {}", id);
        Ok(())
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<Peer> {
        let peer = self
            .update_peer(id, |peer| {
                peer.enabled = enabled;
                Ok(())
            })
            .await?;
        info!(
            "Client {} {}",
            id,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(peer)
    }

    pub async fn enable(&self, id: &str) -> Result<Peer> {
        self.set_enabled(id, true).await
    }

    pub async fn disable(&self, id: &str) -> Result<Peer> {
        self.set_enabled(id, false).await
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<Peer> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("client name must not be empty".to_string()));
        }
        self.update_peer(id, |peer| {
            peer.name = name.to_string();
            Ok(())
        })
        .await
    }

    /// Move a peer to another address inside the pool
    pub async fn readdress(&self, id: &str, address: &str) -> Result<Peer> {
        let address = parse_ipv4(address)?;

        let peer = self
            .mutate(|snapshot, pool| {
                if !pool.contains_host(address) {
                    return Err(Error::Validation(format!(
                        "{} is not a usable address in {}",
                        address, pool
                    )));
                }
                let taken = address == snapshot.server.address
                    || snapshot
                        .clients
                        .values()
                        .any(|p| p.id != id && p.address == address);
                if taken {
                    return Err(Error::Validation(format!("{} is already assigned", address)));
                }

                let peer = snapshot.peer_mut(id)?;
                peer.address = address;
                peer.touch();
                Ok(peer.clone())
            })
            .await?;

        info!("Client {} moved to {}", id, address);
        Ok(peer)
    }

    /// Set or clear the expiry date; the peer expires at the end of that day
    pub async fn set_expiry(&self, id: &str, expires_on: Option<NaiveDate>) -> Result<Peer> {
        self.update_peer(id, |peer| {
            peer.expired_at = expires_on.map(end_of_day);
            Ok(())
        })
        .await
    }

    /// Issue a fresh one-time download link, replacing any previous one
    pub async fn generate_one_time_link(&self, id: &str) -> Result<Peer> {
        let token = generate_link_token();
        self.update_peer(id, |peer| {
            peer.set_one_time_link(token, Utc::now() + one_time_link_ttl());
            Ok(())
        })
        .await
    }

    pub async fn clear_one_time_link(&self, id: &str) -> Result<Peer> {
        self.update_peer(id, |peer| {
            peer.clear_one_time_link();
            Ok(())
        })
        .await
    }

    /// Consume a one-time link and return the peer's config
    pub async fn redeem_one_time_link(&self, token: &str) -> Result<String> {
        let now = Utc::now();
        let (id, rendered) = self
            .mutate(|snapshot, pool| {
                let id = snapshot
                    .find_by_link(token)
                    .filter(|peer| !peer.has_expired_link(now))
                    .map(|peer| peer.id.clone())
                    .ok_or_else(|| Error::not_found("one-time link", token))?;

                let server = snapshot.server.clone();
                let peer = snapshot.peer_mut(&id)?;
                peer.clear_one_time_link();
                peer.touch_at(now);
                let rendered =
                    wgconf::render_client_config(&server, peer, &self.config.client_options(pool));
                Ok((id, rendered))
            })
            .await?;

        info!("One-time link of client {} redeemed", id);
        Ok(rendered)
    }

    /// Config file text a client imports
    pub async fn client_config(&self, id: &str) -> Result<String> {
        let snapshot = self.load().await?;
        let pool = self.config.validate()?;
        let peer = snapshot.peer(id)?;
        Ok(wgconf::render_client_config(
            &snapshot.server,
            peer,
            &self.config.client_options(&pool),
        ))
    }

    /// Payload to encode into a QR code; the plain config text
    pub async fn client_qr_payload(&self, id: &str) -> Result<String> {
        self.client_config(id).await
    }

    /// Serialized copy of the whole snapshot
    pub async fn backup(&self) -> Result<String> {
        let snapshot = self.load().await?;
        Ok(serde_json::to_string_pretty(snapshot.as_ref())?)
    }

    /// Replace the whole snapshot with a backup and resync
    pub async fn restore(&self, raw: &str) -> Result<()> {
        let restored: Snapshot = serde_json::from_str(raw)
            .map_err(|e| Error::Validation(format!("invalid backup: {}", e)))?;
        restored.validate()?;

        let _guard = self.writer.lock().await;
        let (_, pool) = self.load_locked().await?;
        restored.validate_in(&pool)?;
        let count = restored.clients.len();
        self.commit(restored, &pool).await?;
        info!("Restored {} with {} clients", self.config.interface, count);
        Ok(())
    }

    /// Disable expired peers and drop stale one-time links, committing once
    pub async fn sweep(&self, now: DateTime<Utc>, features: FeatureConfig) -> Result<SweepReport> {
        if !features.expiry && !features.one_time_links {
            return Ok(SweepReport::default());
        }

        let _guard = self.writer.lock().await;
        let (current, pool) = self.load_locked().await?;
        let mut next = (*current).clone();
        let mut report = SweepReport::default();

        for peer in next.clients.values_mut() {
            let mut changed = false;
            if features.expiry && peer.is_expired(now) {
                peer.enabled = false;
                report.disabled.push(peer.id.clone());
                changed = true;
            }
            if features.one_time_links && peer.has_expired_link(now) {
                peer.clear_one_time_link();
                report.links_cleared.push(peer.id.clone());
                changed = true;
            }
            if changed {
                peer.touch_at(now);
            }
        }

        if !report.is_empty() {
            self.commit(next, &pool).await?;
            info!(
                "Sweep disabled {} and cleared {} one-time links",
                report.disabled.len(),
                report.links_cleared.len()
            );
        }
        Ok(report)
    }

    /// Bring the interface down on exit
    pub async fn shutdown(&self) {
        self.sync.shutdown().await;
    }
}
