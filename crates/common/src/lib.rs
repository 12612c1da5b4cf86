//! wgdesk Common Library
//!
//! Data model, error taxonomy and the pure building blocks of the peer
//! registry: address allocation, key material, config rendering, live status
//! parsing and metrics.

pub mod address;
pub mod crypto;
pub mod dump;
pub mod error;
pub mod expiry;
pub mod metrics;
pub mod types;
pub mod wgconf;

// Re-export commonly used types
pub use address::{parse_ipv4, AddressPool};
pub use crypto::{KeyProvider, KeyTriple, NativeKeyProvider};
pub use dump::{parse_dump, LiveStatus};
pub use error::{Error, Result};
pub use metrics::MetricsReport;
pub use types::*;
pub use wgconf::{ClientOptions, Hooks, InterfaceOptions};

/// wgdesk version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
