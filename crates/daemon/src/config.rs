//! Daemon configuration, persisted via `murmur-settings`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use murmur_settings::default_data_dir_for;
use murmur_tips::config::DEFAULT_ASSET_ADDRESS;

/// Persistent daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Ethereum JSON-RPC endpoint for payment verification.
    pub rpc_url: String,
    /// Payment asset contract address (USDC).
    pub asset_address: String,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Unix socket the IPC server binds.
    pub socket_path: String,
    /// Bound on each chain RPC request.
    pub rpc_timeout_secs: u64,
    /// Tips admitted per payer per day.
    pub max_tips_per_day: u32,
    /// Interval between aggregate reconciliation passes.
    pub reconcile_interval_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://mainnet.base.org".to_string(),
            asset_address: DEFAULT_ASSET_ADDRESS.to_string(),
            db_path: default_data_dir_for("murmur").join("murmur.sqlite"),
            socket_path: "/tmp/murmur.sock".to_string(),
            rpc_timeout_secs: 10,
            max_tips_per_day: 50,
            reconcile_interval_secs: 300,
        }
    }
}
