//! Limit offer workflow: make a resting offer or cancel an own one.
//!
//! Price and amount are independent inputs; the quote total is derived.
//! Unlike the instant workflow no book sweep is involved, the offer simply
//! rests at the entered price.

use alloy::{
    primitives::{Address, U256},
    providers::DynProvider,
};
use fastnum::UD256;
use tokio::sync::watch;

use super::{Message, SANE_CEILING};
use crate::{
    Network, TradingPair,
    abi::otc::MatchingMarket,
    balances::BalanceSnapshot,
    book::OfferSide,
    error::{CoreError, CoreResult},
    tx::{TxKind, TxState, spawn_tracked},
};

/// View-state of the limit offer form.
#[derive(Clone, Debug, PartialEq)]
pub struct OfferFormState {
    pub pair: TradingPair,
    pub side: OfferSide,
    pub price: Option<UD256>,
    /// Base amount.
    pub amount: Option<UD256>,
    /// Derived quote total, `price * amount`.
    pub total: Option<UD256>,
    pub balances: Option<BalanceSnapshot>,
    pub connected: bool,
    pub progress: Option<TxState>,
    pub messages: Vec<Message>,
    pub ready: bool,
}

impl OfferFormState {
    pub fn new(pair: TradingPair) -> Self {
        Self {
            pair,
            side: OfferSide::Sell,
            price: None,
            amount: None,
            total: None,
            balances: None,
            connected: false,
            progress: None,
            messages: Vec::new(),
            ready: false,
        }
    }

    /// Token locked up by the resting offer and the amount of it.
    fn payment(&self) -> Option<(&'static str, UD256)> {
        match self.side {
            OfferSide::Sell => self.amount.map(|a| (self.pair.base, a)),
            OfferSide::Buy => self.total.map(|t| (self.pair.quote, t)),
        }
    }

    fn derive(&mut self) {
        self.total = match (self.price, self.amount) {
            (Some(price), Some(amount)) if price > UD256::ZERO && amount > UD256::ZERO => {
                Some(price * amount)
            }
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
pub enum OfferFormChange {
    BalancesUpdated(Option<BalanceSnapshot>),
    AccountConnected(bool),
    PriceChanged(Option<UD256>),
    AmountChanged(Option<UD256>),
    SideChanged(OfferSide),
    PairChanged(TradingPair),
    ProgressUpdated(TxState),
    ProgressCleared,
}

/// Folds one change into the state; frozen while a progress is attached.
pub fn reduce(mut state: OfferFormState, change: OfferFormChange) -> OfferFormState {
    let frozen = state.progress.is_some();
    match change {
        OfferFormChange::ProgressUpdated(progress) => state.progress = Some(progress),
        OfferFormChange::ProgressCleared => {
            state.progress = None;
            state.amount = None;
            state.price = None;
        }
        _ if frozen => return state,
        OfferFormChange::BalancesUpdated(balances) => state.balances = balances,
        OfferFormChange::AccountConnected(connected) => state.connected = connected,
        OfferFormChange::PriceChanged(price) => state.price = price,
        OfferFormChange::AmountChanged(amount) => state.amount = amount,
        OfferFormChange::SideChanged(side) => {
            state.side = side;
            state.amount = None;
            state.price = None;
        }
        OfferFormChange::PairChanged(pair) => {
            state.pair = pair;
            state.amount = None;
            state.price = None;
        }
    }
    state.derive();
    state
}

/// Places the resting offer.
pub fn proceed(
    provider: &DynProvider,
    network: &Network,
    state: &OfferFormState,
    account: Address,
    block_rx: watch::Receiver<u64>,
    gas_price_rx: watch::Receiver<Option<u128>>,
) -> CoreResult<watch::Receiver<TxState>> {
    if !state.ready {
        return Err(CoreError::InvalidRequest("offer form not ready".into()));
    }
    let (amount, total) = match (state.amount, state.total) {
        (Some(amount), Some(total)) => (amount, total),
        _ => return Err(CoreError::InvalidRequest("no priced amount".into())),
    };
    let base = network
        .tokens()
        .get(state.pair.base)
        .ok_or_else(|| CoreError::UnknownToken(state.pair.base.to_string()))?;
    let quote = network
        .tokens()
        .get(state.pair.quote)
        .ok_or_else(|| CoreError::UnknownToken(state.pair.quote.to_string()))?;

    // A sell locks up base asking for quote, a buy the reverse
    let (pay_amt, pay_gem, buy_amt, buy_gem) = match state.side {
        OfferSide::Sell => (
            base.converter().to_unsigned(amount),
            base.address,
            quote.converter().to_unsigned(total),
            quote.address,
        ),
        OfferSide::Buy => (
            quote.converter().to_unsigned(total),
            quote.address,
            base.converter().to_unsigned(amount),
            base.address,
        ),
    };

    let builder = MatchingMarket::new(network.otc(), provider.clone())
        .offer(pay_amt, pay_gem, buy_amt, buy_gem, U256::ZERO)
        .from(account)
        .with_cloned_provider();
    Ok(spawn_tracked(
        builder,
        TxKind::MakeOffer,
        account,
        network,
        block_rx,
        gas_price_rx,
    ))
}

/// Cancels an own resting offer by id.
pub fn cancel(
    provider: &DynProvider,
    network: &Network,
    account: Address,
    offer_id: u64,
    block_rx: watch::Receiver<u64>,
    gas_price_rx: watch::Receiver<Option<u128>>,
) -> watch::Receiver<TxState> {
    let builder = MatchingMarket::new(network.otc(), provider.clone())
        .cancel(U256::from(offer_id))
        .from(account)
        .with_cloned_provider();
    spawn_tracked(
        builder,
        TxKind::CancelOffer,
        account,
        network,
        block_rx,
        gas_price_rx,
    )
}

#[cfg(test)]
mod tests {
    use fastnum::udec256;

    use super::*;
    use crate::{balances::TokenBalance, testing::test_network};

    fn balances() -> BalanceSnapshot {
        let network = test_network();
        BalanceSnapshot::from_parts(
            &network,
            10,
            Address::repeat_byte(1),
            UD256::ZERO,
            [
                TokenBalance {
                    symbol: "WETH",
                    wallet_balance: udec256!(5),
                    dust: udec256!(0.01),
                    allowance: true,
                    ..TokenBalance::default()
                },
                TokenBalance {
                    symbol: "DAI",
                    wallet_balance: udec256!(500),
                    dust: udec256!(1),
                    allowance: true,
                    ..TokenBalance::default()
                },
            ],
        )
    }

    fn form() -> OfferFormState {
        let state = OfferFormState::new(TradingPair::new("WETH", "DAI"));
        let state = reduce(state, OfferFormChange::BalancesUpdated(Some(balances())));
        reduce(state, OfferFormChange::AccountConnected(true))
    }

    #[test]
    fn test_total_derived_from_price_and_amount() {
        let state = reduce(form(), OfferFormChange::PriceChanged(Some(udec256!(200))));
        let state = reduce(state, OfferFormChange::AmountChanged(Some(udec256!(2))));
        assert_eq!(state.total, Some(udec256!(400)));
        assert!(state.ready);
    }

    #[test]
    fn test_buy_checks_quote_lockup() {
        let state = reduce(form(), OfferFormChange::SideChanged(OfferSide::Buy));
        let state = reduce(state, OfferFormChange::PriceChanged(Some(udec256!(200))));
        let state = reduce(state, OfferFormChange::AmountChanged(Some(udec256!(2))));
        assert!(state.ready);

        // 3 * 200 exceeds the 500 DAI balance
        let state = reduce(state, OfferFormChange::AmountChanged(Some(udec256!(3))));
        assert_eq!(
            state.messages,
            vec![Message::InsufficientBalance { symbol: "DAI" }]
        );
    }

    #[test]
    fn test_dust_amount() {
        let state = reduce(form(), OfferFormChange::PriceChanged(Some(udec256!(200))));
        let state = reduce(state, OfferFormChange::AmountChanged(Some(udec256!(0.005))));
        assert!(state.messages.iter().any(|m| matches!(
            m,
            Message::DustAmount {
                symbol: "WETH",
                ..
            }
        )));
    }

    #[test]
    fn test_incomplete_input_not_ready() {
        let state = reduce(form(), OfferFormChange::AmountChanged(Some(udec256!(1))));
        assert_eq!(state.total, None);
        assert!(!state.ready);
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_frozen_while_in_progress() {
        let state = reduce(form(), OfferFormChange::PriceChanged(Some(udec256!(200))));
        let state = reduce(state, OfferFormChange::AmountChanged(Some(udec256!(1))));
        let progress = TxState::new(TxKind::MakeOffer, Address::repeat_byte(1), 1, 6);
        let state = reduce(state, OfferFormChange::ProgressUpdated(progress));

        let frozen = reduce(state.clone(), OfferFormChange::PriceChanged(Some(udec256!(1))));
        assert_eq!(frozen.price, Some(udec256!(200)));
        assert_eq!(frozen, state);
    }
}
