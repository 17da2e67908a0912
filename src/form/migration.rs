//! Legacy cash migration workflow: swaps the deprecated stablecoin for the
//! current one, one-way, at par.

use alloy::{primitives::Address, providers::DynProvider};
use fastnum::UD256;
use tokio::sync::watch;

use super::{Message, SANE_CEILING};
use crate::{
    Network,
    abi::migration::Migration,
    error::{CoreError, CoreResult},
    tokens::Token,
    tx::{TxKind, TxState, spawn_tracked},
};

/// View-state of the migration form.
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationState {
    /// Symbol of the legacy cash token being swapped away.
    pub token: &'static str,
    pub legacy_balance: UD256,
    /// Whether the migration contract may pull the legacy token.
    pub allowance: bool,
    pub connected: bool,
    pub amount: Option<UD256>,
    pub progress: Option<TxState>,
    pub messages: Vec<Message>,
    pub ready: bool,
}

impl MigrationState {
    pub fn new(token: &Token) -> Self {
        Self {
            token: token.symbol,
            legacy_balance: UD256::ZERO,
            allowance: false,
            connected: false,
            amount: None,
            progress: None,
            messages: Vec::new(),
            ready: false,
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
            if amount > self.legacy_balance {
                messages.push(Message::InsufficientBalance { symbol: self.token });
            }
        }
        self.ready = messages.is_empty()
            && self.amount.is_some_and(|a| a > UD256::ZERO)
            && self.allowance;
        self.messages = messages;
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MigrationChange {
    EnvironmentUpdated {
        legacy_balance: UD256,
        allowance: bool,
    },
    AccountConnected(bool),
    AmountChanged(Option<UD256>),
    ProgressUpdated(TxState),
    ProgressCleared,
}

/// Folds one change into the state; frozen while a progress is attached.
pub fn reduce(mut state: MigrationState, change: MigrationChange) -> MigrationState {
    let frozen = state.progress.is_some();
    match change {
        MigrationChange::ProgressUpdated(progress) => state.progress = Some(progress),
        MigrationChange::ProgressCleared => {
            state.progress = None;
            state.amount = None;
        }
        _ if frozen => return state,
        MigrationChange::EnvironmentUpdated {
            legacy_balance,
            allowance,
        } => {
            state.legacy_balance = legacy_balance;
            state.allowance = allowance;
        }
        MigrationChange::AccountConnected(connected) => state.connected = connected,
        MigrationChange::AmountChanged(amount) => state.amount = amount,
    }
    state.validate();
    state
}

/// Submits the swap.
pub fn proceed(
    provider: &DynProvider,
    network: &Network,
    state: &MigrationState,
    account: Address,
    block_rx: watch::Receiver<u64>,
    gas_price_rx: watch::Receiver<Option<u128>>,
) -> CoreResult<watch::Receiver<TxState>> {
    if !state.ready {
        return Err(CoreError::InvalidRequest("migration form not ready".into()));
    }
    let amount = state
        .amount
        .ok_or_else(|| CoreError::InvalidRequest("no amount entered".into()))?;
    let token = network
        .tokens()
        .get(state.token)
        .ok_or_else(|| CoreError::UnknownToken(state.token.to_string()))?;
    let raw = token.converter().to_unsigned(amount);

    let builder = Migration::new(network.migration(), provider.clone())
        .swapSaiToDai(raw)
        .from(account)
        .with_cloned_provider();
    Ok(spawn_tracked(
        builder,
        TxKind::Migrate,
        account,
        network,
        block_rx,
        gas_price_rx,
    ))
}

#[cfg(test)]
mod tests {
    use fastnum::udec256;

    use super::*;
    use crate::testing::test_registry;

    fn form() -> MigrationState {
        let registry = test_registry();
        let state = MigrationState::new(registry.get("SAI").unwrap());
        let state = reduce(
            state,
            MigrationChange::EnvironmentUpdated {
                legacy_balance: udec256!(50),
                allowance: true,
            },
        );
        reduce(state, MigrationChange::AccountConnected(true))
    }

    #[test]
    fn test_full_swap_ready() {
        let state = reduce(form(), MigrationChange::AmountChanged(Some(udec256!(50))));
        assert!(state.ready);
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_over_balance_rejected() {
        let state = reduce(form(), MigrationChange::AmountChanged(Some(udec256!(51))));
        assert_eq!(
            state.messages,
            vec![Message::InsufficientBalance { symbol: "SAI" }]
        );
        assert!(!state.ready);
    }

    #[test]
    fn test_requires_allowance() {
        let state = reduce(
            form(),
            MigrationChange::EnvironmentUpdated {
                legacy_balance: udec256!(50),
                allowance: false,
            },
        );
        let state = reduce(state, MigrationChange::AmountChanged(Some(udec256!(10))));
        assert!(state.messages.is_empty());
        assert!(!state.ready);
    }

    #[test]
    fn test_frozen_while_in_progress() {
        let state = reduce(form(), MigrationChange::AmountChanged(Some(udec256!(10))));
        let progress = TxState::new(TxKind::Migrate, Address::repeat_byte(1), 1, 6);
        let state = reduce(state, MigrationChange::ProgressUpdated(progress));
        let frozen = reduce(
            state.clone(),
            MigrationChange::EnvironmentUpdated {
                legacy_balance: UD256::ZERO,
                allowance: false,
            },
        );
        assert_eq!(frozen.legacy_balance, state.legacy_balance);
    }
}
