//! Transaction tracking and notification.
//!
//! A submitted transaction walks WaitingForApproval, WaitingForConfirmation,
//! then Success, Failure or Error. Confirmations are counted against the
//! block signal up to the network's safe depth. Every state update is
//! published through a `watch` channel so the lifecycle can be rendered
//! while it runs.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use alloy::{
    contract::{CallBuilder, CallDecoder},
    network::Ethereum,
    primitives::{Address, TxHash},
    providers::{PendingTransactionBuilder, Provider},
};
use dashmap::DashSet;
use tokio::sync::watch;
use tracing::{debug, error};

use crate::{
    Network,
    error::{CoreError, CoreResult},
};

/// Broadcast transactions unmined after this long are reported as errored.
pub const MINED_TIMEOUT: Duration = Duration::from_secs(600);

static TX_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Monotonic per-process transaction ordinal.
fn next_tx_no() -> u64 {
    TX_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Gas limit sent with a transaction: the estimate plus a 30% safety margin.
pub fn gas_with_safety_margin(estimate: u64) -> u64 {
    estimate.saturating_mul(13) / 10
}

/// Gas price sent with a transaction: the node's current price plus the
/// same 30% margin, so a submission is not underpriced by the next block.
pub fn gas_price_with_safety_margin(price: u128) -> u128 {
    price.saturating_mul(13) / 10
}

/// Confirmation depth of a transaction mined at `mined_block` as of `head`.
pub fn confirmations(head: u64, mined_block: u64) -> u32 {
    (head.saturating_sub(mined_block) + 1).min(u32::MAX as u64) as u32
}

/// What a tracked transaction does, for notification copy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxKind {
    Approve { token: &'static str },
    InstantOrder,
    MakeOffer,
    CancelOffer,
    SetupProxy,
    MarginFund { token: &'static str },
    MarginDraw { token: &'static str },
    Migrate,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TxStatus {
    /// Sitting in the wallet, waiting for the user to sign.
    WaitingForApproval,
    /// Broadcast, waiting to reach safe confirmation depth.
    WaitingForConfirmation { tx_hash: TxHash },
    /// Mined successfully and safely deep.
    Success { tx_hash: TxHash },
    /// Mined but reverted.
    Failure { tx_hash: TxHash },
    /// Never made it into a block, or the provider gave up on it.
    Error { message: String },
}

impl TxStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::WaitingForApproval => "waiting_for_approval",
            Self::WaitingForConfirmation { .. } => "waiting_for_confirmation",
            Self::Success { .. } => "success",
            Self::Failure { .. } => "failure",
            Self::Error { .. } => "error",
        }
    }

    /// Whether the lifecycle can still advance past this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success { .. } | Self::Failure { .. } | Self::Error { .. }
        )
    }
}

/// Observable state of one tracked transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct TxState {
    tx_no: u64,
    kind: TxKind,
    account: Address,
    chain_id: u64,
    status: TxStatus,
    confirmations: u32,
    safe_confirmations: u32,
}

impl TxState {
    pub fn new(
        kind: TxKind,
        account: Address,
        chain_id: u64,
        safe_confirmations: u32,
    ) -> Self {
        Self {
            tx_no: next_tx_no(),
            kind,
            account,
            chain_id,
            status: TxStatus::WaitingForApproval,
            confirmations: 0,
            safe_confirmations,
        }
    }

    pub fn tx_no(&self) -> u64 {
        self.tx_no
    }

    pub fn kind(&self) -> TxKind {
        self.kind
    }

    pub fn account(&self) -> Address {
        self.account
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn status(&self) -> &TxStatus {
        &self.status
    }

    /// Blocks since inclusion, zero until mined.
    pub fn confirmations(&self) -> u32 {
        self.confirmations
    }

    pub fn safe_confirmations(&self) -> u32 {
        self.safe_confirmations
    }

    fn advance(&mut self, status: TxStatus) {
        self.status = status;
    }

    fn set_confirmations(&mut self, confirmations: u32) {
        self.confirmations = confirmations;
    }
}

/// Starts tracking a prepared call: assigns a transaction ordinal, spawns
/// the lifecycle driver and returns the replayed state channel.
///
/// The builder must own its provider (`with_cloned_provider`), it outlives
/// the caller inside the spawned task.
pub(crate) fn spawn_tracked<P, D>(
    builder: CallBuilder<P, D>,
    kind: TxKind,
    account: Address,
    network: &Network,
    block_rx: watch::Receiver<u64>,
    gas_price_rx: watch::Receiver<Option<u128>>,
) -> watch::Receiver<TxState>
where
    P: Provider + 'static,
    D: CallDecoder + Send + Sync + 'static,
{
    let state = TxState::new(
        kind,
        account,
        network.chain_id(),
        network.safe_confirmations(),
    );
    let (state_tx, state_rx) = watch::channel(state.clone());
    tokio::spawn(run_to_completion(
        builder,
        state,
        state_tx,
        block_rx,
        gas_price_rx,
    ));
    state_rx
}

/// Estimates gas, applies the safety margins to both the gas limit and the
/// current gas price, then broadcasts.
pub(crate) async fn send_with_gas_margin<P, D>(
    builder: CallBuilder<P, D>,
    gas_price: Option<u128>,
) -> CoreResult<PendingTransactionBuilder<Ethereum>>
where
    P: Provider,
    D: CallDecoder,
{
    let estimate = builder.estimate_gas().await.map_err(CoreError::from)?;
    let mut builder = builder.gas(gas_with_safety_margin(estimate));
    if let Some(price) = gas_price {
        builder = builder.gas_price(gas_price_with_safety_margin(price));
    }
    builder.send().await.map_err(CoreError::from)
}

/// Drives one transaction from broadcast to a terminal status, publishing
/// every intermediate state through `state_tx`.
pub(crate) async fn run_to_completion<P, D>(
    builder: CallBuilder<P, D>,
    mut state: TxState,
    state_tx: watch::Sender<TxState>,
    mut block_rx: watch::Receiver<u64>,
    gas_price_rx: watch::Receiver<Option<u128>>,
) where
    P: Provider,
    D: CallDecoder,
{
    let _ = state_tx.send(state.clone());

    let gas_price = *gas_price_rx.borrow();
    let pending = match send_with_gas_margin(builder, gas_price).await {
        Ok(pending) => pending,
        Err(e) => {
            error!(tx_no = state.tx_no, %e, "transaction broadcast failed");
            state.advance(TxStatus::Error {
                message: e.to_string(),
            });
            let _ = state_tx.send(state);
            return;
        }
    };

    let tx_hash = *pending.tx_hash();
    state.advance(TxStatus::WaitingForConfirmation { tx_hash });
    let _ = state_tx.send(state.clone());

    let receipt = match tokio::time::timeout(MINED_TIMEOUT, pending.get_receipt()).await {
        Ok(Ok(receipt)) => receipt,
        Ok(Err(e)) => {
            let e = CoreError::from(e);
            error!(tx_no = state.tx_no, %tx_hash, %e, "receipt retrieval failed");
            state.advance(TxStatus::Error {
                message: e.to_string(),
            });
            let _ = state_tx.send(state);
            return;
        }
        Err(_) => {
            error!(tx_no = state.tx_no, %tx_hash, "transaction not mined within timeout");
            state.advance(TxStatus::Error {
                message: "not mined within timeout".to_string(),
            });
            let _ = state_tx.send(state);
            return;
        }
    };

    if !receipt.status() {
        state.advance(TxStatus::Failure { tx_hash });
        let _ = state_tx.send(state);
        return;
    }

    let Some(mined_block) = receipt.block_number else {
        state.advance(TxStatus::Error {
            message: "receipt missing block number".to_string(),
        });
        let _ = state_tx.send(state);
        return;
    };

    loop {
        let head = *block_rx.borrow_and_update();
        let depth = confirmations(head, mined_block);
        if depth != state.confirmations {
            state.set_confirmations(depth);
            let _ = state_tx.send(state.clone());
        }
        if depth >= state.safe_confirmations {
            break;
        }
        if block_rx.changed().await.is_err() {
            debug!(tx_no = state.tx_no, "block signal closed while confirming");
            return;
        }
    }

    state.advance(TxStatus::Success { tx_hash });
    let _ = state_tx.send(state);
}

/// De-duplicates end-user notifications for transaction updates.
///
/// A notification is keyed by account, chain, status and transaction
/// ordinal; re-publishing the same state (as replayed `watch` values do)
/// never notifies twice.
#[derive(Debug, Default)]
pub struct Notifier {
    seen: DashSet<(Address, u64, &'static str, u64)>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `state` is a fresh update the user has not been told about.
    pub fn should_notify(&self, state: &TxState) -> bool {
        self.seen.insert((
            state.account(),
            state.chain_id(),
            state.status().label(),
            state.tx_no(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: TxStatus) -> TxState {
        let mut s = TxState::new(TxKind::Migrate, Address::repeat_byte(1), 1, 6);
        s.advance(status);
        s
    }

    #[test]
    fn test_tx_no_monotonic() {
        let a = TxState::new(TxKind::InstantOrder, Address::ZERO, 1, 6);
        let b = TxState::new(TxKind::InstantOrder, Address::ZERO, 1, 6);
        assert!(b.tx_no() > a.tx_no());
    }

    #[test]
    fn test_gas_safety_margin() {
        assert_eq!(gas_with_safety_margin(100_000), 130_000);
        assert_eq!(gas_with_safety_margin(21_000), 27_300);
    }

    #[test]
    fn test_gas_price_safety_margin() {
        // 20 gwei goes out as 26 gwei
        assert_eq!(
            gas_price_with_safety_margin(20_000_000_000),
            26_000_000_000
        );
        assert_eq!(gas_price_with_safety_margin(1_000_000_000), 1_300_000_000);
    }

    #[test]
    fn test_confirmation_depth() {
        // Inclusion block itself counts as the first confirmation
        assert_eq!(confirmations(100, 100), 1);
        assert_eq!(confirmations(105, 100), 6);
        // Head behind the mined block (reorg window) floors at one
        assert_eq!(confirmations(99, 100), 1);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!TxStatus::WaitingForApproval.is_terminal());
        assert!(
            !TxStatus::WaitingForConfirmation {
                tx_hash: TxHash::ZERO
            }
            .is_terminal()
        );
        assert!(
            TxStatus::Failure {
                tx_hash: TxHash::ZERO
            }
            .is_terminal()
        );
        assert!(
            TxStatus::Error {
                message: "x".into()
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_notifier_dedup() {
        let notifier = Notifier::new();
        let waiting = state(TxStatus::WaitingForApproval);
        assert!(notifier.should_notify(&waiting));
        // Replayed identical state is suppressed
        assert!(!notifier.should_notify(&waiting));

        // Same tx, new status notifies again
        let mut success = waiting.clone();
        success.advance(TxStatus::Success {
            tx_hash: TxHash::ZERO,
        });
        assert!(notifier.should_notify(&success));
        assert!(!notifier.should_notify(&success));
    }

    #[test]
    fn test_notifier_distinguishes_accounts() {
        let notifier = Notifier::new();
        let a = TxState::new(TxKind::Migrate, Address::repeat_byte(1), 1, 6);
        let mut b = a.clone();
        b.account = Address::repeat_byte(2);
        assert!(notifier.should_notify(&a));
        assert!(notifier.should_notify(&b));
    }
}
