//! Margin fund/withdraw workflow.
//!
//! Moves an asset between the wallet and the margin position. The reducer
//! is a pure fold over [`TransferChange`]; balances arrive as environment
//! changes from the margin aggregator and are never fetched here.

use alloy::{primitives::Address, providers::DynProvider};
use fastnum::UD256;
use tokio::sync::watch;

use super::{Message, SANE_CEILING};
use crate::{
    Network,
    abi::margin::MarginViewer,
    error::{CoreError, CoreResult},
    num::format_amount,
    tokens::Token,
    tx::{TxKind, TxState, spawn_tracked},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransferKind {
    /// Wallet to margin position.
    Fund,
    /// Margin position back to wallet.
    Withdraw,
}

/// View-state of one transfer form.
#[derive(Clone, Debug, PartialEq)]
pub struct TransferState {
    pub token: &'static str,
    pub display_precision: u8,
    pub kind: TransferKind,
    pub wallet_balance: UD256,
    pub margin_balance: UD256,
    /// Whether the margin contract may pull the token from the wallet.
    pub allowance: bool,
    pub connected: bool,
    pub amount: Option<UD256>,
    pub progress: Option<TxState>,
    pub messages: Vec<Message>,
    pub ready: bool,
}

impl TransferState {
    pub fn new(token: &Token, kind: TransferKind) -> Self {
        Self {
            token: token.symbol,
            display_precision: token.display_precision,
            kind,
            wallet_balance: UD256::ZERO,
            margin_balance: UD256::ZERO,
            allowance: false,
            connected: false,
            amount: None,
            progress: None,
            messages: Vec::new(),
            ready: false,
        }
    }

    /// Position balance formatted at the token's display precision.
    pub fn display_margin_balance(&self) -> String {
        format_amount(self.margin_balance, self.display_precision)
    }

    /// The balance the entered amount is drawn from.
    pub fn available(&self) -> UD256 {
        match self.kind {
            TransferKind::Fund => self.wallet_balance,
            TransferKind::Withdraw => self.margin_balance,
        }
    }

    fn validate(&mut self) {
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
                    symbol: self.token,
                    maximum: SANE_CEILING,
                });
            }
            if amount > self.available() {
                messages.push(Message::InsufficientBalance { symbol: self.token });
            }
        }
        self.ready = messages.is_empty()
            && self.amount.is_some_and(|a| a > UD256::ZERO)
            && (self.kind == TransferKind::Withdraw || self.allowance);
        self.messages = messages;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TransferChange {
    /// Fresh balances from the margin aggregator.
    EnvironmentUpdated {
        wallet_balance: UD256,
        margin_balance: UD256,
        allowance: bool,
    },
    AccountConnected(bool),
    AmountChanged(Option<UD256>),
    KindChanged(TransferKind),
    ProgressUpdated(TxState),
    ProgressCleared,
}

/// Folds one change into the state. While a progress is attached every
/// change except progress updates and clearing is ignored.
pub fn reduce(mut state: TransferState, change: TransferChange) -> TransferState {
    let frozen = state.progress.is_some();
    match change {
        TransferChange::ProgressUpdated(progress) => state.progress = Some(progress),
        TransferChange::ProgressCleared => {
            state.progress = None;
            state.amount = None;
        }
        _ if frozen => return state,
        TransferChange::EnvironmentUpdated {
            wallet_balance,
            margin_balance,
            allowance,
        } => {
            state.wallet_balance = wallet_balance;
            state.margin_balance = margin_balance;
            state.allowance = allowance;
        }
        TransferChange::AccountConnected(connected) => state.connected = connected,
        TransferChange::AmountChanged(amount) => state.amount = amount,
        TransferChange::KindChanged(kind) => {
            state.kind = kind;
            state.amount = None;
        }
    }
    state.validate();
    state
}

/// Submits the transfer and returns the transaction state channel. The
/// caller feeds updates back as [`TransferChange::ProgressUpdated`].
pub fn proceed(
    provider: &DynProvider,
    network: &Network,
    state: &TransferState,
    account: Address,
    block_rx: watch::Receiver<u64>,
    gas_price_rx: watch::Receiver<Option<u128>>,
) -> CoreResult<watch::Receiver<TxState>> {
    if !state.ready {
        return Err(CoreError::InvalidRequest("transfer form not ready".into()));
    }
    let amount = state
        .amount
        .ok_or_else(|| CoreError::InvalidRequest("no amount entered".into()))?;
    let token = network
        .tokens()
        .get(state.token)
        .ok_or_else(|| CoreError::UnknownToken(state.token.to_string()))?;
    let raw = token.converter().to_unsigned(amount);

    let viewer = MarginViewer::new(network.margin_viewer(), provider.clone());
    match state.kind {
        TransferKind::Fund => {
            let builder = viewer
                .fund(token.address, raw)
                .from(account)
                .with_cloned_provider();
            Ok(spawn_tracked(
                builder,
                TxKind::MarginFund {
                    token: token.symbol,
                },
                account,
                network,
                block_rx,
                gas_price_rx,
            ))
        }
        TransferKind::Withdraw => {
            let builder = viewer
                .draw(token.address, raw)
                .from(account)
                .with_cloned_provider();
            Ok(spawn_tracked(
                builder,
                TxKind::MarginDraw {
                    token: token.symbol,
                },
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
    use crate::testing::test_registry;

    fn form(kind: TransferKind) -> TransferState {
        let registry = test_registry();
        let state = TransferState::new(registry.get("DAI").unwrap(), kind);
        reduce(
            reduce(
                state,
                TransferChange::EnvironmentUpdated {
                    wallet_balance: udec256!(100),
                    margin_balance: udec256!(100),
                    allowance: true,
                },
            ),
            TransferChange::AccountConnected(true),
        )
    }

    fn progress() -> TxState {
        TxState::new(
            TxKind::MarginFund { token: "DAI" },
            Address::repeat_byte(1),
            1,
            6,
        )
    }

    #[test]
    fn test_deposit_validates_against_wallet() {
        let state = form(TransferKind::Fund);
        let state = reduce(state, TransferChange::AmountChanged(Some(udec256!(100))));
        assert!(state.ready);
        assert!(state.messages.is_empty());

        let state = reduce(state, TransferChange::AmountChanged(Some(udec256!(101))));
        assert!(!state.ready);
        assert_eq!(
            state.messages,
            vec![Message::InsufficientBalance { symbol: "DAI" }]
        );
    }

    #[test]
    fn test_withdraw_validates_against_margin() {
        let state = form(TransferKind::Withdraw);
        let state = reduce(state, TransferChange::AmountChanged(Some(udec256!(100))));
        assert!(state.ready);

        let state = reduce(state, TransferChange::AmountChanged(Some(udec256!(100.01))));
        assert!(!state.ready);
    }

    #[test]
    fn test_deposit_requires_allowance() {
        let registry = test_registry();
        let state = TransferState::new(registry.get("DAI").unwrap(), TransferKind::Fund);
        let state = reduce(
            state,
            TransferChange::EnvironmentUpdated {
                wallet_balance: udec256!(100),
                margin_balance: UD256::ZERO,
                allowance: false,
            },
        );
        let state = reduce(state, TransferChange::AccountConnected(true));
        let state = reduce(state, TransferChange::AmountChanged(Some(udec256!(50))));
        // Valid input, but the contract cannot pull the token yet
        assert!(state.messages.is_empty());
        assert!(!state.ready);
    }

    #[test]
    fn test_not_connected() {
        let state = form(TransferKind::Fund);
        let state = reduce(state, TransferChange::AccountConnected(false));
        let state = reduce(state, TransferChange::AmountChanged(Some(udec256!(1))));
        assert_eq!(state.messages, vec![Message::NotConnected]);
        assert!(!state.ready);
    }

    #[test]
    fn test_ceiling() {
        let state = form(TransferKind::Fund);
        let state = reduce(
            state,
            TransferChange::AmountChanged(Some(udec256!(2000000000))),
        );
        assert!(state.messages.contains(&Message::CeilingAmount {
            symbol: "DAI",
            maximum: SANE_CEILING,
        }));
    }

    #[test]
    fn test_frozen_while_in_progress() {
        let state = form(TransferKind::Fund);
        let state = reduce(state, TransferChange::AmountChanged(Some(udec256!(50))));
        let state = reduce(state, TransferChange::ProgressUpdated(progress()));
        assert!(state.messages.contains(&Message::InProgress));

        // Environment and input changes bounce off
        let frozen = reduce(
            state.clone(),
            TransferChange::EnvironmentUpdated {
                wallet_balance: UD256::ZERO,
                margin_balance: UD256::ZERO,
                allowance: false,
            },
        );
        assert_eq!(frozen.wallet_balance, state.wallet_balance);
        let frozen = reduce(frozen, TransferChange::AmountChanged(Some(udec256!(1))));
        assert_eq!(frozen.amount, Some(udec256!(50)));

        // Clearing unfreezes and resets the input
        let cleared = reduce(frozen, TransferChange::ProgressCleared);
        assert!(cleared.progress.is_none());
        assert_eq!(cleared.amount, None);
        let thawed = reduce(
            cleared,
            TransferChange::EnvironmentUpdated {
                wallet_balance: udec256!(200),
                margin_balance: udec256!(200),
                allowance: true,
            },
        );
        assert_eq!(thawed.wallet_balance, udec256!(200));
    }

    #[test]
    fn test_display_margin_balance_after_deposit() {
        // 100 in the position, deposit 100, aggregator republishes 200
        let state = form(TransferKind::Fund);
        assert_eq!(state.display_margin_balance(), "100.00");
        let state = reduce(
            state,
            TransferChange::EnvironmentUpdated {
                wallet_balance: UD256::ZERO,
                margin_balance: udec256!(200),
                allowance: true,
            },
        );
        assert_eq!(state.display_margin_balance(), "200.00");
    }

    #[test]
    fn test_display_margin_balance_after_withdrawals() {
        let state = form(TransferKind::Withdraw);
        // Full withdrawal
        let drained = reduce(
            state.clone(),
            TransferChange::EnvironmentUpdated {
                wallet_balance: udec256!(100),
                margin_balance: UD256::ZERO,
                allowance: true,
            },
        );
        assert_eq!(drained.display_margin_balance(), "0.00");

        // Partial withdrawal of 25 from 200
        let partial = reduce(
            state,
            TransferChange::EnvironmentUpdated {
                wallet_balance: udec256!(125),
                margin_balance: udec256!(175),
                allowance: true,
            },
        );
        assert_eq!(partial.display_margin_balance(), "175.00");
    }
}
