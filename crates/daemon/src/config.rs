//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use wgdesk_common::{AddressPool, ClientOptions, Error, Hooks, InterfaceOptions, Result};

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Interface name, also the stem of the state files
    pub interface: String,

    /// Directory holding `<interface>.json` and `<interface>.conf`
    pub config_dir: PathBuf,

    /// Public host clients connect to
    pub host: Option<String>,

    /// Listen port of the interface
    pub port: u16,

    /// Port written into client `Endpoint` lines, defaults to `port`
    pub config_port: Option<u16>,

    /// IPv4 range peers are allocated from
    pub address_range: String,

    /// Client MTU
    pub mtu: Option<u16>,

    /// Client DNS server(s)
    pub dns: Option<String>,

    /// Client-side AllowedIPs
    pub allowed_ips: String,

    /// Client PersistentKeepalive
    pub persistent_keepalive: u16,

    /// Uplink device for the default NAT rules
    pub device: String,

    /// Interface hook commands
    pub hooks: HookConfig,

    /// Scheduler toggles
    pub features: FeatureConfig,

    /// Expiry sweep cadence
    pub sweep_interval_secs: u64,

    /// Where key material comes from
    pub key_backend: KeyBackend,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interface: "wg0".to_string(),
            config_dir: PathBuf::from("/etc/wireguard"),
            host: None,
            port: 51820,
            config_port: None,
            address_range: "10.8.0.0/24".to_string(),
            mtu: None,
            dns: Some("1.1.1.1".to_string()),
            allowed_ips: "0.0.0.0/0, ::/0".to_string(),
            persistent_keepalive: 0,
            device: "eth0".to_string(),
            hooks: HookConfig::default(),
            features: FeatureConfig::default(),
            sweep_interval_secs: 60,
            key_backend: KeyBackend::default(),
        }
    }
}

/// Hook overrides; unset PostUp/PostDown fall back to the NAT rules for the pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HookConfig {
    pub pre_up: Option<String>,
    pub post_up: Option<String>,
    pub pre_down: Option<String>,
    pub post_down: Option<String>,
}

/// Feature toggles for the expiry scheduler
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Disable peers whose expiry date has passed
    pub expiry: bool,

    /// Clear one-time links whose window has passed
    pub one_time_links: bool,
}

/// Key material backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum KeyBackend {
    /// `wg genkey` / `wg pubkey` / `wg genpsk`
    #[default]
    Wg,
    /// In-process x25519
    Native,
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Check required settings and return the parsed address pool
    pub fn validate(&self) -> Result<AddressPool> {
        if self.host.as_deref().map_or(true, |h| h.trim().is_empty()) {
            return Err(Error::Configuration(
                "WG_HOST is not set; clients need a public host to connect to".to_string(),
            ));
        }
        if self.interface.trim().is_empty() {
            return Err(Error::Configuration("interface name is empty".to_string()));
        }
        AddressPool::parse(&self.address_range)
    }

    pub fn json_file_name(&self) -> String {
        format!("{}.json", self.interface)
    }

    pub fn conf_file_name(&self) -> String {
        format!("{}.conf", self.interface)
    }

    /// Path `wg-quick` is pointed at
    pub fn conf_path(&self) -> PathBuf {
        self.config_dir.join(self.conf_file_name())
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Resolved hook commands for `pool`
    pub fn hooks(&self, pool: &AddressPool) -> Hooks {
        let nat = |action: &str| {
            format!(
                "iptables -t nat -{a} POSTROUTING -s {range} -o {device} -j MASQUERADE; \
                 iptables -{a} INPUT -p udp -m udp --dport {port} -j ACCEPT; \
                 iptables -{a} FORWARD -i {iface} -j ACCEPT; \
                 iptables -{a} FORWARD -o {iface} -j ACCEPT;",
                a = action,
                range = pool,
                device = self.device,
                port = self.port,
                iface = self.interface,
            )
        };

        Hooks {
            pre_up: self.hooks.pre_up.clone().unwrap_or_default(),
            post_up: self.hooks.post_up.clone().unwrap_or_else(|| nat("A")),
            pre_down: self.hooks.pre_down.clone().unwrap_or_default(),
            post_down: self.hooks.post_down.clone().unwrap_or_else(|| nat("D")),
        }
    }

    pub fn interface_options(&self, pool: &AddressPool) -> InterfaceOptions {
        InterfaceOptions {
            listen_port: self.port,
            prefix: pool.prefix(),
            hooks: self.hooks(pool),
        }
    }

    pub fn client_options(&self, pool: &AddressPool) -> ClientOptions {
        ClientOptions {
            host: self.host.clone().unwrap_or_default(),
            port: self.config_port.unwrap_or(self.port),
            prefix: pool.prefix(),
            dns: self.dns.clone(),
            mtu: self.mtu,
            allowed_ips: self.allowed_ips.clone(),
            persistent_keepalive: self.persistent_keepalive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn configured() -> DaemonConfig {
        DaemonConfig {
            host: Some("vpn.example.com".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_host_is_configuration_error() {
        let err = DaemonConfig::default().validate().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let blank = DaemonConfig {
            host: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_bad_range_is_configuration_error() {
        let config = DaemonConfig {
            address_range: "10.8.0.x".to_string(),
            ..configured()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_default_hooks_cover_pool() {
        let config = configured();
        let pool = config.validate().unwrap();
        let hooks = config.hooks(&pool);
        assert!(hooks.post_up.contains("-A POSTROUTING -s 10.8.0.0/24 -o eth0"));
        assert!(hooks.post_down.contains("-D FORWARD -o wg0"));
        assert!(hooks.pre_up.is_empty());
    }

    #[test]
    fn test_hook_override() {
        let config = DaemonConfig {
            hooks: HookConfig {
                post_up: Some("echo up".to_string()),
                ..Default::default()
            },
            ..configured()
        };
        let pool = config.validate().unwrap();
        assert_eq!(config.hooks(&pool).post_up, "echo up");
    }

    #[test]
    fn test_client_port_defaults_to_listen_port() {
        let config = DaemonConfig {
            port: 443,
            ..configured()
        };
        let pool = config.validate().unwrap();
        assert_eq!(config.client_options(&pool).port, 443);

        let config = DaemonConfig {
            config_port: Some(8443),
            ..config
        };
        assert_eq!(config.client_options(&pool).port, 8443);
    }

    #[test]
    fn test_load_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("wgdesk.toml");
        std::fs::write(
            &path,
            r#"
host = "vpn.example.com"
address_range = "10.9.0.0/24"
key_backend = "native"

[features]
expiry = true
"#,
        )
        .unwrap();

        let config = DaemonConfig::load(&path).unwrap();
        assert_eq!(config.interface, "wg0");
        assert_eq!(config.address_range, "10.9.0.0/24");
        assert_eq!(config.key_backend, KeyBackend::Native);
        assert!(config.features.expiry);
        assert!(!config.features.one_time_links);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = DaemonConfig::load(Path::new("/nonexistent/wgdesk.toml")).unwrap();
        assert_eq!(config.port, 51820);
    }
}
