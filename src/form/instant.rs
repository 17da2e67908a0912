//! Instant (market order) workflow.
//!
//! The entered base amount is priced by sweeping the current order book;
//! total and effective price are derived on every change, never stored
//! authoritatively. Submission goes through the market's fill-all entry
//! points with a slippage bound around the quoted total.

use alloy::{primitives::Address, providers::DynProvider};
use fastnum::{UD256, udec256};
use tokio::sync::watch;

use super::{Message, SANE_CEILING};
use crate::{
    Network, TradingPair,
    abi::otc::MatchingMarket,
    balances::BalanceSnapshot,
    book::{OfferSide, Orderbook},
    error::{CoreError, CoreResult},
    tx::{TxKind, TxState, spawn_tracked},
};

/// Allowed drift between the quoted total and the on-chain fill.
pub const SLIPPAGE_LIMIT: UD256 = udec256!(0.02);

/// View-state of the instant order form.
#[derive(Clone, Debug, PartialEq)]
pub struct InstantState {
    pub pair: TradingPair,
    pub side: OfferSide,
    /// Entered base amount.
    pub amount: Option<UD256>,
    /// Quote total derived from the book sweep.
    pub total: Option<UD256>,
    /// Effective price, `total / amount`.
    pub price: Option<UD256>,
    pub book: Option<Orderbook>,
    pub balances: Option<BalanceSnapshot>,
    pub connected: bool,
    pub progress: Option<TxState>,
    pub messages: Vec<Message>,
    pub ready: bool,
}

impl InstantState {
    pub fn new(pair: TradingPair) -> Self {
        Self {
            pair,
            side: OfferSide::Sell,
            amount: None,
            total: None,
            price: None,
            book: None,
            balances: None,
            connected: false,
            progress: None,
            messages: Vec::new(),
            ready: false,
        }
    }

    /// Token spent by this order and the amount of it.
    fn payment(&self) -> Option<(&'static str, UD256)> {
        match self.side {
            OfferSide::Sell => self.amount.map(|a| (self.pair.base, a)),
            OfferSide::Buy => self.total.map(|t| (self.pair.quote, t)),
        }
    }

    fn derive(&mut self) {
        self.total = match (self.amount, &self.book) {
            (Some(amount), Some(book)) if amount > UD256::ZERO => match self.side {
                OfferSide::Sell => book.sell_proceeds(amount),
                OfferSide::Buy => book.buy_cost(amount),
            },
            _ => None,
        };
        self.price = match (self.amount, self.total) {
            (Some(amount), Some(total)) if amount > UD256::ZERO => Some(total / amount),
            _ => None,
        };

        let mut messages = Vec::new();
        if !self.connected {
            messages.push(Message::NotConnected);
        }
        if self.progress.is_some() {
            messages.push(Message::InProgress);
        }
        if let Some(amount) = self.amount
            && amount > UD256::ZERO
        {
            if amount > SANE_CEILING {
                messages.push(Message::CeilingAmount {
                    symbol: self.pair.base,
                    maximum: SANE_CEILING,
                });
            }
            if self.total.is_none() {
                messages.push(Message::InsufficientLiquidity);
            }
            if let Some((symbol, payment)) = self.payment()
                && let Some(entry) = self.balances.as_ref().and_then(|b| b.get(symbol))
            {
                if payment > entry.wallet_balance {
                    messages.push(Message::InsufficientBalance { symbol });
                }
                if payment < entry.dust {
                    messages.push(Message::DustAmount {
                        symbol,
                        minimum: entry.dust,
                    });
                }
            }
        }
        self.ready = messages.is_empty()
            && self.total.is_some()
            && self
                .payment()
                .and_then(|(symbol, _)| {
                    self.balances.as_ref().and_then(|b| b.get(symbol))
                })
                .is_some_and(|entry| entry.allowance);
        self.messages = messages;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum InstantChange {
    BookUpdated(Orderbook),
    BalancesUpdated(Option<BalanceSnapshot>),
    AccountConnected(bool),
    AmountChanged(Option<UD256>),
    SideChanged(OfferSide),
    PairChanged(TradingPair),
    ProgressUpdated(TxState),
    ProgressCleared,
}

/// Folds one change into the state; frozen while a progress is attached.
pub fn reduce(mut state: InstantState, change: InstantChange) -> InstantState {
    let frozen = state.progress.is_some();
    match change {
        InstantChange::ProgressUpdated(progress) => state.progress = Some(progress),
        InstantChange::ProgressCleared => {
            state.progress = None;
            state.amount = None;
        }
        _ if frozen => return state,
        InstantChange::BookUpdated(book) => state.book = Some(book),
        InstantChange::BalancesUpdated(balances) => state.balances = balances,
        InstantChange::AccountConnected(connected) => state.connected = connected,
        InstantChange::AmountChanged(amount) => state.amount = amount,
        InstantChange::SideChanged(side) => {
            state.side = side;
            state.amount = None;
        }
        InstantChange::PairChanged(pair) => {
            state.pair = pair;
            state.book = None;
            state.amount = None;
        }
    }
    state.derive();
    state
}

/// Submits the market order with the slippage bound applied around the
/// quoted total.
pub fn proceed(
    provider: &DynProvider,
    network: &Network,
    state: &InstantState,
    account: Address,
    block_rx: watch::Receiver<u64>,
    gas_price_rx: watch::Receiver<Option<u128>>,
) -> CoreResult<watch::Receiver<TxState>> {
    if !state.ready {
        return Err(CoreError::InvalidRequest("instant form not ready".into()));
    }
    let (amount, total) = match (state.amount, state.total) {
        (Some(amount), Some(total)) => (amount, total),
        _ => return Err(CoreError::InvalidRequest("no quoted amount".into())),
    };
    let base = network
        .tokens()
        .get(state.pair.base)
        .ok_or_else(|| CoreError::UnknownToken(state.pair.base.to_string()))?;
    let quote = network
        .tokens()
        .get(state.pair.quote)
        .ok_or_else(|| CoreError::UnknownToken(state.pair.quote.to_string()))?;

    let market = MatchingMarket::new(network.otc(), provider.clone());
    match state.side {
        OfferSide::Sell => {
            let pay = base.converter().to_unsigned(amount);
            let min_fill = quote
                .converter()
                .to_unsigned(total * (UD256::ONE - SLIPPAGE_LIMIT));
            let builder = market
                .sellAllAmount(base.address, pay, quote.address, min_fill)
                .from(account)
                .with_cloned_provider();
            Ok(spawn_tracked(
                builder,
                TxKind::InstantOrder,
                account,
                network,
                block_rx,
                gas_price_rx,
            ))
        }
        OfferSide::Buy => {
            let buy = base.converter().to_unsigned(amount);
            let max_fill = quote
                .converter()
                .to_unsigned(total * (UD256::ONE + SLIPPAGE_LIMIT));
            let builder = market
                .buyAllAmount(base.address, buy, quote.address, max_fill)
                .from(account)
                .with_cloned_provider();
            Ok(spawn_tracked(
                builder,
                TxKind::InstantOrder,
                account,
                network,
                block_rx,
                gas_price_rx,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use fastnum::udec256;

    use super::*;
    use crate::{
        balances::TokenBalance,
        testing::{offer, test_network},
    };

    fn pair() -> TradingPair {
        TradingPair::new("WETH", "DAI")
    }

    fn book() -> Orderbook {
        Orderbook::assemble(
            pair(),
            10,
            [offer(1, OfferSide::Buy, udec256!(2), udec256!(390))],
            [offer(2, OfferSide::Sell, udec256!(3), udec256!(600))],
        )
    }

    fn balances(weth: UD256, dai: UD256) -> BalanceSnapshot {
        let network = test_network();
        BalanceSnapshot::from_parts(
            &network,
            10,
            Address::repeat_byte(1),
            UD256::ZERO,
            [
                TokenBalance {
                    symbol: "WETH",
                    wallet_balance: weth,
                    allowance: true,
                    ..TokenBalance::default()
                },
                TokenBalance {
                    symbol: "DAI",
                    wallet_balance: dai,
                    allowance: true,
                    ..TokenBalance::default()
                },
            ],
        )
    }

    fn form() -> InstantState {
        let state = InstantState::new(pair());
        let state = reduce(state, InstantChange::BookUpdated(book()));
        let state = reduce(
            state,
            InstantChange::BalancesUpdated(Some(balances(udec256!(5), udec256!(1000)))),
        );
        reduce(state, InstantChange::AccountConnected(true))
    }

    #[test]
    fn test_sell_quotes_from_bids() {
        let state = reduce(form(), InstantChange::AmountChanged(Some(udec256!(2))));
        // 2 into the 195-bid
        assert_eq!(state.total, Some(udec256!(390)));
        assert_eq!(state.price, Some(udec256!(195)));
        assert!(state.ready);
    }

    #[test]
    fn test_buy_quotes_from_asks_and_checks_quote_balance() {
        let state = reduce(form(), InstantChange::SideChanged(OfferSide::Buy));
        let state = reduce(state, InstantChange::AmountChanged(Some(udec256!(3))));
        // 3 from the 200-ask costs 600, within the 1000 DAI balance
        assert_eq!(state.total, Some(udec256!(600)));
        assert!(state.ready);

        // Drain the quote balance: same amount is no longer affordable
        let state = reduce(
            state,
            InstantChange::BalancesUpdated(Some(balances(udec256!(5), udec256!(100)))),
        );
        assert!(
            state
                .messages
                .contains(&Message::InsufficientBalance { symbol: "DAI" })
        );
        assert!(!state.ready);
    }

    #[test]
    fn test_insufficient_liquidity() {
        // Bids hold only 2 base
        let state = reduce(form(), InstantChange::AmountChanged(Some(udec256!(4))));
        assert_eq!(state.total, None);
        assert_eq!(state.messages, vec![Message::InsufficientLiquidity]);
        assert!(!state.ready);
    }

    #[test]
    fn test_frozen_while_in_progress() {
        let state = reduce(form(), InstantChange::AmountChanged(Some(udec256!(1))));
        assert!(state.ready);
        let progress = TxState::new(TxKind::InstantOrder, Address::repeat_byte(1), 1, 6);
        let state = reduce(state, InstantChange::ProgressUpdated(progress));

        // A refreshed book does not reprice the in-flight order
        let frozen = reduce(state.clone(), InstantChange::BookUpdated(book()));
        assert_eq!(frozen, state);
        let frozen = reduce(frozen, InstantChange::AmountChanged(Some(udec256!(9))));
        assert_eq!(frozen.amount, Some(udec256!(1)));
    }

    #[test]
    fn test_pair_change_clears_book_and_amount() {
        let state = reduce(form(), InstantChange::AmountChanged(Some(udec256!(1))));
        let state = reduce(
            state,
            InstantChange::PairChanged(TradingPair::new("MKR", "DAI")),
        );
        assert_eq!(state.book, None);
        assert_eq!(state.amount, None);
        assert!(!state.ready);
    }
}
