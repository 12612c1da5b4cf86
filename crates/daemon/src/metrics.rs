//! Metrics export
//!
//! Every call takes a fresh status read; nothing is cached between scrapes.

use crate::status::StatusCollector;
use chrono::Utc;
use wgdesk_common::{MetricsReport, Result};

#[derive(Clone)]
pub struct MetricsExporter {
    status: StatusCollector,
}

impl MetricsExporter {
    pub fn new(status: StatusCollector) -> Self {
        Self { status }
    }

    pub async fn report(&self) -> Result<MetricsReport> {
        let clients = self.status.clients().await?;
        let interface = self.status.registry().config().interface.clone();
        Ok(MetricsReport::from_clients(&interface, &clients, Utc::now()))
    }

    /// Prometheus text exposition
    pub async fn prometheus(&self) -> Result<String> {
        Ok(self.report().await?.to_prometheus())
    }

    /// The same numbers as a JSON document
    pub async fn json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.report().await?)?)
    }
}
