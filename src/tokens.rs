//! Static token registry.
//!
//! The registry is configuration the core reads but never mutates: symbol,
//! on-chain address, fixed-point precision, display precision, icon name and
//! asset classification for the margin product.

use alloy::primitives::Address;

use crate::num;

/// How an asset participates in the margin product.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AssetClass {
    /// The debt/settlement asset of margin positions.
    Cash,
    /// Can back a leveraged position.
    Marginable,
    /// Tradable but not accepted as collateral.
    NonMarginable,
}

/// One configured token.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub symbol: &'static str,
    pub address: Address,
    pub decimals: u8,
    pub display_precision: u8,
    pub icon: &'static str,
    pub class: AssetClass,
    /// Price oracle for marginable assets.
    pub oracle: Option<Address>,
}

impl Token {
    pub fn converter(&self) -> num::Converter {
        num::Converter::new(self.decimals)
    }
}

/// Immutable table of all tokens the front-end knows about.
///
/// Balance snapshots are keyed by this registry: their key set is exactly
/// the symbols listed here, no omissions and no extras.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenRegistry {
    tokens: Vec<Token>,
}

impl TokenRegistry {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn get(&self, symbol: &str) -> Option<&Token> {
        self.tokens.iter().find(|t| t.symbol == symbol)
    }

    pub fn by_address(&self, address: Address) -> Option<&Token> {
        self.tokens.iter().find(|t| t.address == address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tokens.iter().map(|t| t.symbol)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Marginable assets in registry order.
    pub fn marginable(&self) -> impl Iterator<Item = &Token> {
        self.tokens
            .iter()
            .filter(|t| t.class == AssetClass::Marginable)
    }

    /// Non-marginable assets in registry order.
    pub fn non_marginable(&self) -> impl Iterator<Item = &Token> {
        self.tokens
            .iter()
            .filter(|t| t.class == AssetClass::NonMarginable)
    }

    /// The cash asset of the margin product.
    pub fn cash(&self) -> Option<&Token> {
        self.tokens.iter().find(|t| t.class == AssetClass::Cash)
    }
}
