//! Order book watcher.
//!
//! Connects read-only to a node, runs the chain pulse and the paged book
//! refresher for one trading pair and logs every published snapshot.

mod config;

use std::{process::exit, time::Duration};

use alloy::{
    providers::{DynProvider, ProviderBuilder},
    rpc::client::RpcClient,
};
use clap::Parser;
use tradefront::{
    Network, TradingPair,
    book::spawn_refresher,
    provider::{ProviderMode, ProviderSlot},
    tokens::{AssetClass, Token, TokenRegistry},
};
use tracing::info;
use url::Url;

use config::{CliConfig, EnvConfig};

#[tokio::main]
async fn main() {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    let env_config = match EnvConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to parse environment configuration: {}", e);
            exit(1);
        }
    };

    let cli_config = CliConfig::parse();

    // Set up logging
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let addresses: Vec<_> = [
        &env_config.otc_address,
        &env_config.otc_support_address,
        &env_config.proxy_registry_address,
        &env_config.margin_viewer_address,
        &env_config.migration_address,
        &env_config.base_token_address,
        &env_config.quote_token_address,
    ]
    .iter()
    .map(|raw| match EnvConfig::parse_address(raw) {
        Ok(address) => address,
        Err(e) => {
            eprintln!("Invalid address {}: {}", raw, e);
            exit(1);
        }
    })
    .collect();
    let [otc, otc_support, proxy_registry, margin_viewer, migration, base_address, quote_address] =
        addresses[..]
    else {
        unreachable!()
    };

    let node_url = match Url::parse(&env_config.node_rpc_url) {
        Ok(url) => url,
        Err(e) => {
            eprintln!("Invalid RPC URL: {}", e);
            exit(1);
        }
    };

    // Symbols live for the process lifetime
    let base_symbol: &'static str = cli_config.base.clone().leak();
    let quote_symbol: &'static str = cli_config.quote.clone().leak();

    let registry = TokenRegistry::new(vec![
        Token {
            symbol: base_symbol,
            address: base_address,
            decimals: cli_config.base_decimals,
            display_precision: 4,
            icon: "",
            class: AssetClass::Marginable,
            oracle: None,
        },
        Token {
            symbol: quote_symbol,
            address: quote_address,
            decimals: cli_config.quote_decimals,
            display_precision: 2,
            icon: "",
            class: AssetClass::Cash,
            oracle: None,
        },
    ]);

    let network = Network::custom(
        env_config.chain_id,
        "custom",
        otc,
        otc_support,
        proxy_registry,
        margin_viewer,
        migration,
        env_config.safe_confirmations.unwrap_or(6),
        env_config.start_block.unwrap_or(0),
        registry,
    );
    let pair = TradingPair::new(base_symbol, quote_symbol);

    let rpc_client = RpcClient::new_http(node_url);
    let provider = DynProvider::new(ProviderBuilder::new().connect_client(rpc_client));

    info!(%pair, chain_id = network.chain_id(), "starting book watcher");

    let slot = ProviderSlot::connect(
        provider,
        ProviderMode::ReadOnly,
        Duration::from_secs(cli_config.identity_interval_seconds),
    );
    let (mut book_rx, _refresher) =
        spawn_refresher(slot.provider(), network, pair, slot.pulse().block());

    loop {
        if book_rx.changed().await.is_err() {
            break;
        }
        let snapshot = book_rx.borrow_and_update().clone();
        if let Some(book) = snapshot {
            info!(
                %pair,
                block_number = book.block_number,
                bids = book.buys.len(),
                asks = book.sells.len(),
                best_bid = ?book.best_bid().map(|o| o.price),
                best_ask = ?book.best_ask().map(|o| o.price),
                spread = ?book.spread,
                "order book"
            );
        }
    }
}
