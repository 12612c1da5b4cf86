//! Config synchronization
//!
//! Projects a snapshot onto disk and onto the running interface. The steps
//! are kept separate so the registry can order them and stop at the first
//! failure:
//!
//! 1. `persist_json`   - the recoverable source of truth
//! 2. `persist_native` - the derived `wg-quick` config
//! 3. `reconcile`      - `wg syncconf`, live sessions are kept
//!
//! `bring_up` runs once per process before the first reconcile.

use crate::config::DaemonConfig;
use crate::storage::{Storage, PRIVATE_MODE};
use crate::wireguard::{CommandRunner, WgCli};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wgdesk_common::{wgconf, AddressPool, Error, Result, Snapshot};

/// Writes snapshots and pushes them to the interface
#[derive(Clone)]
pub struct ConfigSynchronizer {
    config: DaemonConfig,
    storage: Arc<dyn Storage>,
    wg: WgCli,
}

impl ConfigSynchronizer {
    pub fn new(
        config: DaemonConfig,
        storage: Arc<dyn Storage>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let wg = WgCli::new(runner, &config.interface, &config.conf_path());
        Self {
            config,
            storage,
            wg,
        }
    }

    pub fn wireguard(&self) -> &WgCli {
        &self.wg
    }

    /// Read the persisted snapshot; `None` on first boot
    pub async fn load_persisted(&self) -> Result<Option<Snapshot>> {
        let Some(raw) = self.storage.read(&self.config.json_file_name()).await? else {
            return Ok(None);
        };
        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        Ok(Some(snapshot))
    }

    /// Render the interface config for `snapshot`
    pub fn render(&self, snapshot: &Snapshot, pool: &AddressPool) -> String {
        wgconf::render_server_config(snapshot, &self.config.interface_options(pool))
    }

    pub async fn persist_json(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)?;
        self.storage
            .write(&self.config.json_file_name(), &json, PRIVATE_MODE)
            .await?;
        debug!("Config saved ({} clients)", snapshot.clients.len());
        Ok(())
    }

    pub async fn persist_native(&self, snapshot: &Snapshot, pool: &AddressPool) -> Result<()> {
        let rendered = self.render(snapshot, pool);
        self.storage
            .write(&self.config.conf_file_name(), &rendered, PRIVATE_MODE)
            .await
    }

    /// Converge the interface's peer table onto the written config
    pub async fn reconcile(&self) -> Result<()> {
        self.wg.sync().await?;
        debug!("Config synced to {}", self.wg.interface());
        Ok(())
    }

    /// Recreate the interface. A failing `down` is expected when it isn't up yet.
    pub async fn bring_up(&self) -> Result<()> {
        if let Err(e) = self.wg.down().await {
            debug!("wg-quick down before startup failed (ignored): {}", e);
        }

        match self.wg.up().await {
            Ok(_) => {
                info!("Interface {} is up", self.wg.interface());
                Ok(())
            }
            Err(Error::ExternalCommand { message, .. })
                if message.contains("Cannot find device") =>
            {
                Err(Error::Environment(format!(
                    "WireGuard exited with the error: Cannot find device \"{}\". \
                     This usually means that your host's kernel does not support WireGuard!",
                    self.wg.interface()
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort teardown on process exit
    pub async fn shutdown(&self) {
        match self.wg.down().await {
            Ok(_) => info!("Interface {} is down", self.wg.interface()),
            Err(e) => warn!("wg-quick down failed during shutdown: {}", e),
        }
    }
}
