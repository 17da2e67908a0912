//! Reactive on-chain state core for an order-book DEX front-end with a
//! leveraged-margin product.
//!
//! # Overview
//!
//! The crate aggregates independently-refreshing on-chain state into
//! de-duplicated, replay-latest signals and folds user intents into
//! validated view-state:
//!
//! * [`pulse`] normalizes connectivity into chain/account/block/gas signals.
//! * [`balances`] joins per-token balances, dust limits and allowances into
//!   one snapshot per block.
//! * [`book`] pages the matching-market order book until exhausted, with
//!   torn-read retry and carry-forward of emptied sides.
//! * [`margin`] folds proxy discovery, batched vault reads and oracle
//!   prices into a single margin account entity.
//! * [`form`] holds the pure reducers for the instant-trade, limit-offer,
//!   margin-transfer and migration workflows, including transaction
//!   orchestration.
//! * [`tx`] tracks submitted transactions to confirmation depth and
//!   de-duplicates notifications.
//!
//! Rendering, wallet-connector plumbing and analytics are external
//! collaborators; the crate only consumes a [`alloy::providers::Provider`]
//! and exposes typed snapshots.
//!
//! See `./tests` for end-to-end workflow scenarios.

pub mod abi;
pub mod balances;
pub mod book;
pub mod error;
pub mod form;
pub mod margin;
pub mod num;
pub mod provider;
pub mod pulse;
pub mod session;
pub mod testing;
pub mod tokens;
pub mod tx;

use alloy::primitives::{Address, address};

use crate::{
    error::{CoreError, CoreResult},
    tokens::{AssetClass, Token, TokenRegistry},
};

/// Network the front-end is operating on: chain identity, protocol
/// contract addresses and the token registry.
#[derive(Clone, Debug)]
pub struct Network {
    chain_id: u64,
    name: &'static str,
    otc: Address,
    otc_support: Address,
    proxy_registry: Address,
    margin_viewer: Address,
    migration: Address,
    safe_confirmations: u32,
    start_block: u64,
    tokens: TokenRegistry,
}

impl Network {
    /// Ethereum mainnet deployment.
    pub fn mainnet() -> Self {
        let tokens = TokenRegistry::new(vec![
            Token {
                symbol: "DAI",
                address: address!("6B175474E89094C44Da98b954EedeAC495271d0F"),
                decimals: 18,
                display_precision: 2,
                icon: "dai",
                class: AssetClass::Cash,
                oracle: None,
            },
            Token {
                symbol: "WETH",
                address: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
                decimals: 18,
                display_precision: 4,
                icon: "eth",
                class: AssetClass::Marginable,
                oracle: Some(address!("81FE72B5A8d1A857d176C3E7d5Bd2679A9B85763")),
            },
            Token {
                symbol: "MKR",
                address: address!("9f8F72aA9304c8B593d555F12eF6589cC3A579A2"),
                decimals: 18,
                display_precision: 4,
                icon: "mkr",
                class: AssetClass::NonMarginable,
                oracle: None,
            },
            Token {
                symbol: "ZRX",
                address: address!("E41d2489571d322189246DaFA5ebDe1F4699F498"),
                decimals: 18,
                display_precision: 4,
                icon: "zrx",
                class: AssetClass::NonMarginable,
                oracle: None,
            },
            Token {
                symbol: "BAT",
                address: address!("0D8775F648430679A709E98d2b0Cb6250d2887EF"),
                decimals: 18,
                display_precision: 4,
                icon: "bat",
                class: AssetClass::NonMarginable,
                oracle: None,
            },
            Token {
                symbol: "SAI",
                address: address!("89d24A6b4CcB1B6fAA2625fE562bDD9a23260359"),
                decimals: 18,
                display_precision: 2,
                icon: "sai",
                class: AssetClass::NonMarginable,
                oracle: None,
            },
        ]);
        Self {
            chain_id: 1,
            name: "mainnet",
            otc: address!("794e6e91555438aFc3ccF1c5076A74F42133d08D"),
            otc_support: address!("9b3F075b12513afe56Ca2ED838613B7395f57839"),
            proxy_registry: address!("4678f0a6958e4D2Bc4F1BAF7Bc52E8F3564f3fE4"),
            margin_viewer: address!("1D9B52b91f47b0fA2531A4A5a270B5dC6b4e44aB"),
            migration: address!("c73e0383F3Aff3215E6f04B0331D58CeCf0Ab849"),
            safe_confirmations: 6,
            start_block: 4_751_582,
            tokens,
        }
    }

    /// Resolves the network for a wallet-reported chain id.
    pub fn for_chain_id(chain_id: u64) -> CoreResult<Self> {
        match chain_id {
            1 => Ok(Self::mainnet()),
            other => Err(CoreError::UnsupportedNetwork(other)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn custom(
        chain_id: u64,
        name: &'static str,
        otc: Address,
        otc_support: Address,
        proxy_registry: Address,
        margin_viewer: Address,
        migration: Address,
        safe_confirmations: u32,
        start_block: u64,
        tokens: TokenRegistry,
    ) -> Self {
        Self {
            chain_id,
            name,
            otc,
            otc_support,
            proxy_registry,
            margin_viewer,
            migration,
            safe_confirmations,
            start_block,
            tokens,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Matching market holding the order book.
    pub fn otc(&self) -> Address {
        self.otc
    }

    /// Read helper paging through the order book.
    pub fn otc_support(&self) -> Address {
        self.otc_support
    }

    pub fn proxy_registry(&self) -> Address {
        self.proxy_registry
    }

    pub fn margin_viewer(&self) -> Address {
        self.margin_viewer
    }

    pub fn migration(&self) -> Address {
        self.migration
    }

    /// Blocks after which a transaction is considered final on this network.
    pub fn safe_confirmations(&self) -> u32 {
        self.safe_confirmations
    }

    /// Block the protocol contracts were deployed at; log queries never
    /// need to look further back.
    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }
}

/// Pair of tokens traded against each other, `base` priced in `quote`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TradingPair {
    pub base: &'static str,
    pub quote: &'static str,
}

impl TradingPair {
    pub fn new(base: &'static str, quote: &'static str) -> Self {
        Self { base, quote }
    }
}

impl std::fmt::Display for TradingPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mainnet_registry_has_one_cash_asset() {
        let network = Network::mainnet();
        assert_eq!(network.chain_id(), 1);
        assert_eq!(network.tokens().cash().unwrap().symbol, "DAI");
        assert!(network.tokens().marginable().any(|t| t.symbol == "WETH"));
    }

    #[test]
    fn test_unknown_chain_id_rejected() {
        assert!(matches!(
            Network::for_chain_id(42),
            Err(CoreError::UnsupportedNetwork(42))
        ));
        assert_eq!(Network::for_chain_id(1).unwrap().name(), "mainnet");
    }

    #[test]
    fn test_trading_pair_display() {
        assert_eq!(TradingPair::new("WETH", "DAI").to_string(), "WETH/DAI");
    }
}
