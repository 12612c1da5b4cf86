//! Live peer status
//!
//! Merges `wg show <interface> dump` onto a registry read by public key.

use crate::registry::PeerRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use wgdesk_common::{parse_dump, ClientView, LiveStatus, Result, Snapshot};

/// Reads live state from the interface and layers it on the registry
#[derive(Clone)]
pub struct StatusCollector {
    registry: Arc<PeerRegistry>,
}

impl StatusCollector {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Fresh dump of the interface's peers
    pub async fn live(&self) -> Result<Vec<LiveStatus>> {
        let output = self.registry.wireguard().dump().await?;
        parse_dump(&output)
    }

    /// All peers with their live fields filled in
    pub async fn clients(&self) -> Result<Vec<ClientView>> {
        let snapshot = self.registry.snapshot().await?;
        let live = self.live().await?;
        Ok(merge(&snapshot, &live))
    }
}

/// Attach live records to peers by public key.
///
/// Records for keys the registry doesn't know are dropped; peers the interface
/// doesn't report keep empty live fields.
pub fn merge(snapshot: &Snapshot, live: &[LiveStatus]) -> Vec<ClientView> {
    let by_key: HashMap<&str, &LiveStatus> = live
        .iter()
        .map(|status| (status.public_key.as_str(), status))
        .collect();

    snapshot
        .peers()
        .into_iter()
        .map(|peer| {
            let view = ClientView::from(peer);
            match by_key.get(peer.public_key.as_str()) {
                Some(status) => view.with_live(status),
                None => view,
            }
        })
        .collect()
}
