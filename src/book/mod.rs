//! Order book snapshot and carry-forward tracking.
//!
//! [`loader`] pages one side of the matching market until exhausted and
//! retries torn reads; this module owns the assembled [`Orderbook`]
//! snapshot, the spread derivation and the carry-forward policy for sides
//! that refresh to empty.

mod loader;


pub use loader::{
    ChainPageSource, MAX_PAGING_ATTEMPTS, OfferPage, OfferPageSource, load_orderbook, load_side,
    spawn_refresher,
};

use alloy::primitives::Address;
use fastnum::{D256, UD256};
use itertools::Itertools;

use crate::TradingPair;

/// Consecutive empty refreshes after which a previously non-empty side is
/// accepted as genuinely empty instead of carried forward.
pub const EMPTY_CONFIRMATIONS: u32 = 3;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OfferSide {
    Buy,
    Sell,
}

impl OfferSide {
    pub fn label(&self) -> &'static str {
        match self {
            OfferSide::Buy => "buy",
            OfferSide::Sell => "sell",
        }
    }
}

/// One outstanding offer in the matching market. Identity is the offer id;
/// a book side never contains the same id twice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Offer {
    pub id: u64,
    pub base_amount: UD256,
    pub quote_amount: UD256,
    pub price: UD256,
    pub owner: Address,
    pub timestamp: u64,
    pub side: OfferSide,
}

impl Offer {
    pub fn new(
        id: u64,
        base_amount: UD256,
        quote_amount: UD256,
        owner: Address,
        timestamp: u64,
        side: OfferSide,
    ) -> Self {
        let price = if base_amount > UD256::ZERO {
            quote_amount / base_amount
        } else {
            UD256::ZERO
        };
        Self {
            id,
            base_amount,
            quote_amount,
            price,
            owner,
            timestamp,
            side,
        }
    }
}

/// Snapshot of both sides of a trading pair at a block.
///
/// Sides are ordered best price first: buys descending, sells ascending.
/// Spread is derived only when both sides are non-empty; a transiently
/// crossed book yields a negative spread which is surfaced, not corrected.
#[derive(Clone, Debug, PartialEq)]
pub struct Orderbook {
    pub pair: TradingPair,
    pub block_number: u64,
    pub buys: Vec<Offer>,
    pub sells: Vec<Offer>,
    pub spread: Option<D256>,
    pub spread_percentage: Option<D256>,
}

impl Orderbook {
    /// Assembles a snapshot: de-duplicates by offer id (overlapping page
    /// reads can return the same offer twice), sorts each side best price
    /// first and derives the spread.
    pub fn assemble(
        pair: TradingPair,
        block_number: u64,
        buys: impl IntoIterator<Item = Offer>,
        sells: impl IntoIterator<Item = Offer>,
    ) -> Self {
        let mut buys: Vec<Offer> = buys.into_iter().unique_by(|o| o.id).collect();
        let mut sells: Vec<Offer> = sells.into_iter().unique_by(|o| o.id).collect();
        buys.sort_by(|a, b| b.price.cmp(&a.price).then(a.timestamp.cmp(&b.timestamp)));
        sells.sort_by(|a, b| a.price.cmp(&b.price).then(a.timestamp.cmp(&b.timestamp)));

        let (spread, spread_percentage) = match (buys.first(), sells.first()) {
            (Some(best_bid), Some(best_ask)) => {
                let spread = best_ask.price.to_signed() - best_bid.price.to_signed();
                let midpoint = (best_ask.price + best_bid.price) / UD256::from(2u64);
                let percentage = if midpoint > UD256::ZERO {
                    Some(spread / midpoint.to_signed())
                } else {
                    None
                };
                (Some(spread), percentage)
            }
            _ => (None, None),
        };

        Self {
            pair,
            block_number,
            buys,
            sells,
            spread,
            spread_percentage,
        }
    }

    pub fn best_bid(&self) -> Option<&Offer> {
        self.buys.first()
    }

    pub fn best_ask(&self) -> Option<&Offer> {
        self.sells.first()
    }

    /// Quote amount obtainable by selling `base_amount` into the bids,
    /// walking levels best first. `None` when liquidity is insufficient.
    pub fn sell_proceeds(&self, base_amount: UD256) -> Option<UD256> {
        Self::sweep(&self.buys, base_amount)
    }

    /// Quote amount needed to buy `base_amount` from the asks.
    /// `None` when liquidity is insufficient.
    pub fn buy_cost(&self, base_amount: UD256) -> Option<UD256> {
        Self::sweep(&self.sells, base_amount)
    }

    fn sweep(side: &[Offer], want: UD256) -> Option<UD256> {
        let mut remaining = want;
        let mut total = UD256::ZERO;
        for offer in side {
            if remaining == UD256::ZERO {
                break;
            }
            let take = remaining.min(offer.base_amount);
            total += take * offer.price;
            remaining -= take;
        }
        (remaining == UD256::ZERO).then_some(total)
    }
}

/// Carry-forward of emptied book sides across refreshes.
///
/// A refresh that returns zero offers on a side while the previous snapshot
/// had offers keeps showing the previous side (stale-but-present beats
/// empty-but-possibly-wrong) until [`EMPTY_CONFIRMATIONS`] consecutive
/// refreshes confirm genuine emptiness.
#[derive(Debug, Default)]
pub struct CarryForward {
    previous: Option<Orderbook>,
    empty_buy_streak: u32,
    empty_sell_streak: u32,
}

impl CarryForward {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a fresh snapshot through the carry-forward policy and returns
    /// the snapshot to publish.
    pub fn apply(&mut self, fresh: Orderbook) -> Orderbook {
        let (buys, buy_streak) = Self::merge_side(
            fresh.buys,
            self.previous.as_ref().map(|p| p.buys.as_slice()),
            self.empty_buy_streak,
        );
        let (sells, sell_streak) = Self::merge_side(
            fresh.sells,
            self.previous.as_ref().map(|p| p.sells.as_slice()),
            self.empty_sell_streak,
        );
        self.empty_buy_streak = buy_streak;
        self.empty_sell_streak = sell_streak;

        let merged = Orderbook::assemble(fresh.pair, fresh.block_number, buys, sells);
        self.previous = Some(merged.clone());
        merged
    }

    fn merge_side(
        fresh: Vec<Offer>,
        previous: Option<&[Offer]>,
        streak: u32,
    ) -> (Vec<Offer>, u32) {
        if !fresh.is_empty() {
            return (fresh, 0);
        }
        match previous {
            Some(prev) if !prev.is_empty() && streak + 1 < EMPTY_CONFIRMATIONS => {
                (prev.to_vec(), streak + 1)
            }
            // Emptiness confirmed, or there was nothing to carry
            _ => (fresh, streak + 1),
        }
    }
}
