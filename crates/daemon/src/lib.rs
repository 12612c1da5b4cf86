//! wgdesk daemon library
//!
//! Peer registry, config synchronization, live status, metrics and the
//! expiry scheduler for a single WireGuard interface. The `wgdeskd` binary
//! wires these together; the capability traits (`Storage`, `CommandRunner`,
//! `KeyProvider`) let everything run without a kernel module.

pub mod config;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod storage;
pub mod sync;
pub mod testing;
pub mod wireguard;

pub use config::{DaemonConfig, FeatureConfig, HookConfig, KeyBackend};
pub use metrics::MetricsExporter;
pub use registry::{PeerRegistry, SweepReport};
pub use scheduler::ExpiryScheduler;
pub use status::StatusCollector;
pub use storage::{DirStorage, Storage};
pub use sync::ConfigSynchronizer;
pub use wireguard::{CommandRunner, ShellCommand, ShellRunner, WgCli, WgKeyProvider};
