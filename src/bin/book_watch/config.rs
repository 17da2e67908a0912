//! Configuration for the book watcher.
//!
//! Configuration comes from two sources:
//! - Environment variables (via .env file or shell): connection details,
//!   contract and token addresses
//! - CLI arguments: the pair to watch and polling cadence

use alloy::primitives::Address;
use clap::Parser;

/// Environment configuration (connection details, addresses).
#[derive(Debug, serde::Deserialize)]
pub struct EnvConfig {
    /// Chain ID of the target network
    pub chain_id: u64,

    /// RPC URL for the node
    pub node_rpc_url: String,

    /// Matching market contract address
    pub otc_address: String,

    /// Order book read-support contract address
    pub otc_support_address: String,

    /// Proxy registry contract address
    pub proxy_registry_address: String,

    /// Margin viewer contract address
    pub margin_viewer_address: String,

    /// Migration contract address
    pub migration_address: String,

    /// Base token address of the watched pair
    pub base_token_address: String,

    /// Quote token address of the watched pair
    pub quote_token_address: String,

    /// Confirmation depth considered final (default: 6)
    pub safe_confirmations: Option<u32>,

    /// Block the protocol contracts were deployed at (default: 0)
    pub start_block: Option<u64>,
}

impl EnvConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }

    pub fn parse_address(
        value: &str,
    ) -> Result<Address, alloy::primitives::hex::FromHexError> {
        value.parse()
    }
}

/// CLI arguments for the watched pair.
#[derive(Debug, Parser)]
#[command(name = "book-watch")]
#[command(about = "Streams order book snapshots for one trading pair")]
pub struct CliConfig {
    /// Base token symbol
    #[arg(long, default_value = "WETH")]
    pub base: String,

    /// Base token decimals
    #[arg(long, default_value = "18")]
    pub base_decimals: u8,

    /// Quote token symbol
    #[arg(long, default_value = "DAI")]
    pub quote: String,

    /// Quote token decimals
    #[arg(long, default_value = "18")]
    pub quote_decimals: u8,

    /// Seconds between chain-id/account identity samples
    #[arg(long, default_value = "5")]
    pub identity_interval_seconds: u64,
}
