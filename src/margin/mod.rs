//! Margin account aggregation.
//!
//! Combines proxy discovery, one batched multi-asset vault read, oracle
//! next prices and per-asset history into a single [`MarginAccount`]
//! entity. Collateralization ratio and purchasing power are pure functions
//! of balance, debt and price ([`calc`]), recomputed on every snapshot and
//! never cached independently.

pub mod calc;

mod snapshot;

pub use snapshot::{discover_proxy, fetch_history, fetch_margin_account, setup_proxy};

use alloy::primitives::Address;
use fastnum::UD256;

use crate::num::format_amount;

/// Whether the account has a proxy set up for the margin product.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MarginState {
    /// No proxy yet; only wallet-side data is meaningful.
    Unset,
    /// Proxy exists and is owned by the account.
    Setup(Address),
}

/// One display-only history entry for an asset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistoryEvent {
    pub kind: HistoryKind,
    pub amount: UD256,
    pub block_number: u64,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HistoryKind {
    Fund,
    Draw,
}

/// The cash (debt/settlement) asset of the margin product.
#[derive(Clone, Debug, PartialEq)]
pub struct CashAsset {
    pub symbol: &'static str,
    pub wallet_balance: UD256,
    /// Balance held inside the margin position.
    pub margin_balance: UD256,
    pub allowance: bool,
    pub display_precision: u8,
}

impl CashAsset {
    /// Position balance formatted at the asset's display precision.
    pub fn display_margin_balance(&self) -> String {
        format_amount(self.margin_balance, self.display_precision)
    }
}

/// A collateral-capable asset of the margin product.
#[derive(Clone, Debug, PartialEq)]
pub struct MarginAsset {
    pub symbol: &'static str,
    pub wallet_balance: UD256,
    pub margin_balance: UD256,
    pub vault_balance: UD256,
    pub debt: UD256,
    pub reference_price: UD256,
    /// Oracle next price, when published.
    pub next_price: Option<UD256>,
    pub min_coll_ratio: UD256,
    pub safe_coll_ratio: UD256,
    pub liquidation_penalty: UD256,
    /// Annualized from the per-second accumulator.
    pub stability_fee: UD256,
    pub min_debt: UD256,
    pub allowance: bool,
    pub history: Vec<HistoryEvent>,
}

impl MarginAsset {
    /// Collateral value in cash terms at the reference price.
    pub fn collateral_value(&self) -> UD256 {
        calc::collateral_value(self.vault_balance, self.reference_price)
    }

    /// Current collateralization ratio, absent while debt is zero.
    pub fn collateralization_ratio(&self) -> Option<UD256> {
        calc::collateralization_ratio(self.vault_balance, self.reference_price, self.debt)
    }

    /// Additional cash that could be drawn while staying at the safe ratio.
    pub fn purchasing_power(&self) -> UD256 {
        calc::purchasing_power(
            self.vault_balance,
            self.reference_price,
            self.debt,
            self.safe_coll_ratio,
        )
    }
}

/// An asset that can be traded but not used as collateral.
#[derive(Clone, Debug, PartialEq)]
pub struct NonMarginableAsset {
    pub symbol: &'static str,
    pub wallet_balance: UD256,
    pub margin_balance: UD256,
    pub allowance: bool,
}

/// Aggregated margin state of one account at one block.
#[derive(Clone, Debug, PartialEq)]
pub struct MarginAccount {
    pub state: MarginState,
    pub block_number: u64,
    pub cash: CashAsset,
    pub marginable: Vec<MarginAsset>,
    pub non_marginable: Vec<NonMarginableAsset>,
}

impl MarginAccount {
    pub fn proxy(&self) -> Option<Address> {
        match self.state {
            MarginState::Unset => None,
            MarginState::Setup(proxy) => Some(proxy),
        }
    }

    pub fn asset(&self, symbol: &str) -> Option<&MarginAsset> {
        self.marginable.iter().find(|a| a.symbol == symbol)
    }

    pub fn total_debt(&self) -> UD256 {
        self.marginable
            .iter()
            .fold(UD256::ZERO, |acc, a| acc + a.debt)
    }

    pub fn total_collateral_value(&self) -> UD256 {
        self.marginable
            .iter()
            .fold(UD256::ZERO, |acc, a| acc + a.collateral_value())
    }

    /// Account-wide ratio of collateral value to debt value.
    pub fn collateralization_ratio(&self) -> Option<UD256> {
        let debt = self.total_debt();
        if debt == UD256::ZERO {
            return None;
        }
        Some(self.total_collateral_value() / debt)
    }

    /// Account-wide purchasing power: margin cash plus what every asset
    /// could still draw at its safe ratio.
    pub fn purchasing_power(&self) -> UD256 {
        self.marginable
            .iter()
            .fold(self.cash.margin_balance, |acc, a| {
                acc + a.purchasing_power()
            })
    }
}
