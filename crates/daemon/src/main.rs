//! wgdesk daemon
//!
//! Loads the peer registry for one WireGuard interface, brings the interface
//! up and keeps the expiry scheduler running until interrupted.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wgdesk_daemon::{DaemonConfig, ExpiryScheduler, KeyBackend, PeerRegistry};

#[derive(Parser)]
#[command(name = "wgdeskd")]
#[command(about = "wgdesk daemon - WireGuard peer registry")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WGDESK_CONFIG", default_value = "/etc/wgdesk/config.toml")]
    config: PathBuf,

    /// Public host clients connect to
    #[arg(long, env = "WG_HOST")]
    host: Option<String>,

    /// Listen port of the interface
    #[arg(long, env = "WG_PORT")]
    port: Option<u16>,

    /// Port written into client configs
    #[arg(long, env = "WG_CONFIG_PORT")]
    config_port: Option<u16>,

    /// Interface name
    #[arg(long, env = "WG_INTERFACE")]
    interface: Option<String>,

    /// Directory for <interface>.json and <interface>.conf
    #[arg(long, env = "WG_PATH")]
    path: Option<PathBuf>,

    /// IPv4 range peers are allocated from
    #[arg(long, env = "WG_DEFAULT_ADDRESS_RANGE")]
    address_range: Option<String>,

    /// Client MTU
    #[arg(long, env = "WG_MTU")]
    mtu: Option<u16>,

    /// Client DNS; an empty value disables the line
    #[arg(long, env = "WG_DEFAULT_DNS")]
    dns: Option<String>,

    /// Client AllowedIPs
    #[arg(long, env = "WG_ALLOWED_IPS")]
    allowed_ips: Option<String>,

    /// Client PersistentKeepalive
    #[arg(long, env = "WG_PERSISTENT_KEEPALIVE")]
    persistent_keepalive: Option<u16>,

    /// Uplink device for the default NAT rules
    #[arg(long, env = "WG_DEVICE")]
    device: Option<String>,

    #[arg(long, env = "WG_PRE_UP")]
    pre_up: Option<String>,

    #[arg(long, env = "WG_POST_UP")]
    post_up: Option<String>,

    #[arg(long, env = "WG_PRE_DOWN")]
    pre_down: Option<String>,

    #[arg(long, env = "WG_POST_DOWN")]
    post_down: Option<String>,

    /// Disable peers once their expiry date has passed
    #[arg(long, env = "WG_ENABLE_EXPIRES_TIME")]
    enable_expires_time: Option<bool>,

    /// Clear one-time links once their window has passed
    #[arg(long, env = "WG_ENABLE_ONE_TIME_LINKS")]
    enable_one_time_links: Option<bool>,

    /// Key material backend
    #[arg(long, env = "WG_KEY_BACKEND", value_enum)]
    key_backend: Option<KeyBackend>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    /// Layer command line and environment values over the file config
    fn apply(self, mut config: DaemonConfig) -> DaemonConfig {
        if let Some(host) = self.host {
            config.host = Some(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.config_port.is_some() {
            config.config_port = self.config_port;
        }
        if let Some(interface) = self.interface {
            config.interface = interface;
        }
        if let Some(path) = self.path {
            config.config_dir = path;
        }
        if let Some(range) = self.address_range {
            config.address_range = range;
        }
        if self.mtu.is_some() {
            config.mtu = self.mtu;
        }
        if let Some(dns) = self.dns {
            config.dns = Some(dns).filter(|d| !d.trim().is_empty());
        }
        if let Some(allowed_ips) = self.allowed_ips {
            config.allowed_ips = allowed_ips;
        }
        if let Some(keepalive) = self.persistent_keepalive {
            config.persistent_keepalive = keepalive;
        }
        if let Some(device) = self.device {
            config.device = device;
        }
        if self.pre_up.is_some() {
            config.hooks.pre_up = self.pre_up;
        }
        if self.post_up.is_some() {
            config.hooks.post_up = self.post_up;
        }
        if self.pre_down.is_some() {
            config.hooks.pre_down = self.pre_down;
        }
        if self.post_down.is_some() {
            config.hooks.post_down = self.post_down;
        }
        if let Some(expiry) = self.enable_expires_time {
            config.features.expiry = expiry;
        }
        if let Some(links) = self.enable_one_time_links {
            config.features.one_time_links = links;
        }
        if let Some(backend) = self.key_backend {
            config.key_backend = backend;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("wgdesk daemon v{}", wgdesk_common::VERSION);

    let file_config = DaemonConfig::load(&cli.config)?;
    let config = cli.apply(file_config);
    config.validate()?;

    let registry = Arc::new(PeerRegistry::from_config(config.clone()));
    let snapshot = registry.load().await?;
    info!(
        "Interface {} ready: server {} with {} clients",
        config.interface,
        snapshot.server.address,
        snapshot.clients.len()
    );

    let scheduler = ExpiryScheduler::new(registry.clone());
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    // Wait for shutdown signal
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Received shutdown signal");

    scheduler_handle.abort();
    registry.shutdown().await;
    info!("Daemon shutdown complete");
    Ok(())
}
