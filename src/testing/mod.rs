//! Test fixtures and builders.
//!
//! Everything here is pure: a static token registry, a network wired to
//! fixed addresses and builders for offers and margin assets, so unit and
//! integration tests run without any chain access.
//!
//! # Example
//!
//! ```
//! use fastnum::udec256;
//! use tradefront::testing::MarginAssetBuilder;
//!
//! let asset = MarginAssetBuilder::new("WETH")
//!     .vault_balance(udec256!(10))
//!     .reference_price(udec256!(200))
//!     .debt(udec256!(1000))
//!     .build();
//! assert_eq!(asset.collateralization_ratio().unwrap(), udec256!(2));
//! ```

use alloy::primitives::Address;
use fastnum::{UD256, udec256};

use crate::{
    Network,
    book::{Offer, OfferSide},
    margin::{CashAsset, MarginAccount, MarginAsset, MarginState, NonMarginableAsset},
    tokens::{AssetClass, Token, TokenRegistry},
};

fn addr(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

/// Registry used across the test suite: one cash token, one marginable,
/// one non-marginable and the legacy cash token.
pub fn test_registry() -> TokenRegistry {
    TokenRegistry::new(vec![
        Token {
            symbol: "DAI",
            address: addr(0x11),
            decimals: 18,
            display_precision: 2,
            icon: "dai",
            class: AssetClass::Cash,
            oracle: None,
        },
        Token {
            symbol: "WETH",
            address: addr(0x22),
            decimals: 18,
            display_precision: 4,
            icon: "eth",
            class: AssetClass::Marginable,
            oracle: Some(addr(0x2f)),
        },
        Token {
            symbol: "MKR",
            address: addr(0x33),
            decimals: 18,
            display_precision: 4,
            icon: "mkr",
            class: AssetClass::NonMarginable,
            oracle: None,
        },
        Token {
            symbol: "SAI",
            address: addr(0x44),
            decimals: 18,
            display_precision: 2,
            icon: "sai",
            class: AssetClass::NonMarginable,
            oracle: None,
        },
    ])
}

/// Network with fixed contract addresses and the [`test_registry`].
pub fn test_network() -> Network {
    Network::custom(
        1,
        "test",
        addr(0xa1),
        addr(0xa2),
        addr(0xa3),
        addr(0xa4),
        addr(0xa5),
        6,
        100,
        test_registry(),
    )
}

/// Offer with a derived price and a fixed owner; timestamp equals the id
/// so insertion order is deterministic.
pub fn offer(id: u64, side: OfferSide, base_amount: UD256, quote_amount: UD256) -> Offer {
    Offer::new(id, base_amount, quote_amount, addr(0xee), id, side)
}

/// Builder for margin assets with controlled values.
#[derive(Debug)]
pub struct MarginAssetBuilder {
    symbol: &'static str,
    wallet_balance: UD256,
    margin_balance: UD256,
    vault_balance: UD256,
    debt: UD256,
    reference_price: UD256,
    next_price: Option<UD256>,
    min_coll_ratio: UD256,
    safe_coll_ratio: UD256,
    allowance: bool,
}

impl MarginAssetBuilder {
    pub fn new(symbol: &'static str) -> Self {
        Self {
            symbol,
            wallet_balance: UD256::ZERO,
            margin_balance: UD256::ZERO,
            vault_balance: UD256::ZERO,
            debt: UD256::ZERO,
            reference_price: UD256::ZERO,
            next_price: None,
            min_coll_ratio: udec256!(1.5),
            safe_coll_ratio: udec256!(2.25),
            allowance: true,
        }
    }

    pub fn wallet_balance(mut self, value: UD256) -> Self {
        self.wallet_balance = value;
        self
    }

    pub fn margin_balance(mut self, value: UD256) -> Self {
        self.margin_balance = value;
        self
    }

    pub fn vault_balance(mut self, value: UD256) -> Self {
        self.vault_balance = value;
        self
    }

    pub fn debt(mut self, value: UD256) -> Self {
        self.debt = value;
        self
    }

    pub fn reference_price(mut self, value: UD256) -> Self {
        self.reference_price = value;
        self
    }

    pub fn next_price(mut self, value: UD256) -> Self {
        self.next_price = Some(value);
        self
    }

    pub fn ratios(mut self, min: UD256, safe: UD256) -> Self {
        self.min_coll_ratio = min;
        self.safe_coll_ratio = safe;
        self
    }

    pub fn allowance(mut self, value: bool) -> Self {
        self.allowance = value;
        self
    }

    pub fn build(self) -> MarginAsset {
        MarginAsset {
            symbol: self.symbol,
            wallet_balance: self.wallet_balance,
            margin_balance: self.margin_balance,
            vault_balance: self.vault_balance,
            debt: self.debt,
            reference_price: self.reference_price,
            next_price: self.next_price,
            min_coll_ratio: self.min_coll_ratio,
            safe_coll_ratio: self.safe_coll_ratio,
            liquidation_penalty: udec256!(0.13),
            stability_fee: udec256!(0.005),
            min_debt: udec256!(20),
            allowance: self.allowance,
            history: Vec::new(),
        }
    }
}

/// Builder for whole margin accounts.
#[derive(Debug)]
pub struct MarginAccountBuilder {
    state: MarginState,
    block_number: u64,
    cash_wallet: UD256,
    cash_margin: UD256,
    marginable: Vec<MarginAsset>,
    non_marginable: Vec<NonMarginableAsset>,
}

impl Default for MarginAccountBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MarginAccountBuilder {
    pub fn new() -> Self {
        Self {
            state: MarginState::Setup(addr(0x99)),
            block_number: 1,
            cash_wallet: UD256::ZERO,
            cash_margin: UD256::ZERO,
            marginable: Vec::new(),
            non_marginable: Vec::new(),
        }
    }

    pub fn unset(mut self) -> Self {
        self.state = MarginState::Unset;
        self
    }

    pub fn block_number(mut self, value: u64) -> Self {
        self.block_number = value;
        self
    }

    pub fn cash(mut self, wallet: UD256, margin: UD256) -> Self {
        self.cash_wallet = wallet;
        self.cash_margin = margin;
        self
    }

    pub fn asset(mut self, asset: MarginAsset) -> Self {
        self.marginable.push(asset);
        self
    }

    pub fn non_marginable(mut self, asset: NonMarginableAsset) -> Self {
        self.non_marginable.push(asset);
        self
    }

    pub fn build(self) -> MarginAccount {
        MarginAccount {
            state: self.state,
            block_number: self.block_number,
            cash: CashAsset {
                symbol: "DAI",
                wallet_balance: self.cash_wallet,
                margin_balance: self.cash_margin,
                allowance: true,
                display_precision: 2,
            },
            marginable: self.marginable,
            non_marginable: self.non_marginable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_produce_consistent_account() {
        let account = MarginAccountBuilder::new()
            .cash(udec256!(100), udec256!(50))
            .asset(
                MarginAssetBuilder::new("WETH")
                    .vault_balance(udec256!(10))
                    .reference_price(udec256!(200))
                    .debt(udec256!(500))
                    .build(),
            )
            .build();
        assert_eq!(account.total_debt(), udec256!(500));
        assert_eq!(account.total_collateral_value(), udec256!(2000));
        assert_eq!(account.collateralization_ratio().unwrap(), udec256!(4));
    }
}
