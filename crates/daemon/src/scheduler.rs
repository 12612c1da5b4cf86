//! Expiry scheduler
//!
//! Periodically disables expired peers and clears stale one-time links.
//! Sweeps run inline in the loop, so a slow sweep delays the next tick
//! instead of overlapping with it.

use crate::config::FeatureConfig;
use crate::registry::{PeerRegistry, SweepReport};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Runs registry sweeps on a fixed interval
pub struct ExpiryScheduler {
    registry: Arc<PeerRegistry>,
    interval: Duration,
    features: FeatureConfig,
}

impl ExpiryScheduler {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        let config = registry.config();
        Self {
            interval: config.sweep_interval(),
            features: config.features,
            registry,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the sweep loop until the task is dropped
    pub async fn run(&self) {
        if !self.features.expiry && !self.features.one_time_links {
            info!("Expiry scheduler idle: expiry and one-time links are both disabled");
            return;
        }
        info!("Expiry scheduler started ({:?} interval)", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick(Utc::now()).await {
                error!("Expiry sweep failed: {}", e);
            }
        }
    }

    /// One sweep at `now`
    pub async fn tick(&self, now: DateTime<Utc>) -> wgdesk_common::Result<SweepReport> {
        let report = self.registry.sweep(now, self.features).await?;
        if report.is_empty() {
            debug!("Expiry sweep: nothing to do");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::testing::{MemoryStorage, ScriptedRunner, SequentialKeyProvider};
    use chrono::Duration as ChronoDuration;

    fn registry(features: FeatureConfig, runner: Arc<ScriptedRunner>) -> Arc<PeerRegistry> {
        Arc::new(PeerRegistry::new(
            DaemonConfig {
                host: Some("vpn.example.com".to_string()),
                features,
                sweep_interval_secs: 1,
                ..Default::default()
            },
            Arc::new(MemoryStorage::new()),
            runner,
            Arc::new(SequentialKeyProvider::new()),
        ))
    }

    #[tokio::test]
    async fn test_tick_disables_expired_peer() {
        let runner = Arc::new(ScriptedRunner::new());
        let registry = registry(
            FeatureConfig {
                expiry: true,
                one_time_links: false,
            },
            runner,
        );
        let yesterday = (Utc::now() - ChronoDuration::days(1)).date_naive();
        let peer = registry.create("old", Some(yesterday)).await.unwrap();

        let scheduler = ExpiryScheduler::new(registry.clone());
        let report = scheduler.tick(Utc::now()).await.unwrap();
        assert_eq!(report.disabled, vec![peer.id.clone()]);
        assert!(!registry.get(&peer.id).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_run_sweeps_on_interval() {
        let runner = Arc::new(ScriptedRunner::new());
        let registry = registry(
            FeatureConfig {
                expiry: false,
                one_time_links: true,
            },
            runner,
        );
        let peer = registry.create("a", None).await.unwrap();
        registry.generate_one_time_link(&peer.id).await.unwrap();

        // Link still valid: the loop runs but changes nothing
        let scheduler = Arc::new(
            ExpiryScheduler::new(registry.clone()).with_interval(Duration::from_millis(10)),
        );
        let handle = {
            let scheduler = scheduler.clone();
            tokio::spawn(async move { scheduler.run().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(registry.get(&peer.id).await.unwrap().one_time_link.is_some());
    }

    #[tokio::test]
    async fn test_run_returns_when_idle() {
        let runner = Arc::new(ScriptedRunner::new());
        let registry = registry(FeatureConfig::default(), runner);
        // Would never return if it entered the loop
        ExpiryScheduler::new(registry).run().await;
    }
}
