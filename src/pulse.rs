//! Chain pulse layer.
//!
//! Normalizes wallet/provider connectivity into a small set of long-lived,
//! de-duplicated, replay-latest signals: chain id, account, block height and
//! gas price. Identity signals are re-sampled on a fixed timer; block height
//! is driven by the provider block watcher; gas price refreshes per block.
//!
//! A failed read never terminates a signal, it is logged and retried on the
//! next tick. Late subscribers immediately observe the last known value.

use std::time::Duration;

use alloy::{
    primitives::Address,
    providers::{DynProvider, Provider},
};
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// Immutable connectivity snapshot, recreated on every tick or wallet event.
/// Consumers compare by value to avoid spurious re-derivation.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChainSignal {
    pub chain_id: Option<u64>,
    pub account: Option<Address>,
    pub block_number: u64,
    pub gas_price: Option<u128>,
}

/// Handle over the running pulse tasks.
///
/// Dropping the pulse aborts its tasks, which is how derivation chains
/// bound to a stale provider are torn down on provider swap.
pub struct Pulse {
    chain_id: watch::Receiver<Option<u64>>,
    account: watch::Receiver<Option<Address>>,
    block: watch::Receiver<u64>,
    gas_price: watch::Receiver<Option<u128>>,
    signal: watch::Receiver<ChainSignal>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Pulse {
    /// Starts sampling the given provider. `identity_interval` is the fixed
    /// timer for chain-id/account re-sampling.
    pub fn start(provider: DynProvider, identity_interval: Duration) -> Self {
        let (chain_tx, chain_rx) = watch::channel(None);
        let (account_tx, account_rx) = watch::channel(None);
        let (block_tx, block_rx) = watch::channel(0u64);
        let (gas_tx, gas_rx) = watch::channel(None);
        let (signal_tx, signal_rx) = watch::channel(ChainSignal::default());

        let identity = tokio::spawn(identity_loop(
            provider.clone(),
            identity_interval,
            chain_tx,
            account_tx,
            signal_tx.clone(),
        ));
        let blocks = tokio::spawn(block_loop(provider, block_tx, gas_tx, signal_tx));

        Self {
            chain_id: chain_rx,
            account: account_rx,
            block: block_rx,
            gas_price: gas_rx,
            signal: signal_rx,
            tasks: vec![identity, blocks],
        }
    }

    pub fn chain_id(&self) -> watch::Receiver<Option<u64>> {
        self.chain_id.clone()
    }

    pub fn account(&self) -> watch::Receiver<Option<Address>> {
        self.account.clone()
    }

    pub fn block(&self) -> watch::Receiver<u64> {
        self.block.clone()
    }

    pub fn gas_price(&self) -> watch::Receiver<Option<u128>> {
        self.gas_price.clone()
    }

    /// Combined snapshot of all four signals.
    pub fn signal(&self) -> watch::Receiver<ChainSignal> {
        self.signal.clone()
    }

    /// Aborts the sampling tasks. Receivers keep replaying the last value
    /// but will never observe a new one.
    pub fn stop(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for Pulse {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Filtered sub-signal of the account channel: resolves only once an
/// account is present, so dependent fetches never run without one.
pub async fn connected_account(rx: &mut watch::Receiver<Option<Address>>) -> CoreResult<Address> {
    let account = rx
        .wait_for(Option::is_some)
        .await
        .map_err(|_| CoreError::NoAccount)?;
    (*account).ok_or(CoreError::NoAccount)
}

/// Publishes a value only when it differs from the last published one.
pub(crate) fn publish_if_changed<T: PartialEq>(tx: &watch::Sender<T>, value: T) -> bool {
    tx.send_if_modified(|current| {
        if *current == value {
            false
        } else {
            *current = value;
            true
        }
    })
}

async fn identity_loop(
    provider: DynProvider,
    interval: Duration,
    chain_tx: watch::Sender<Option<u64>>,
    account_tx: watch::Sender<Option<Address>>,
    signal_tx: watch::Sender<ChainSignal>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;

        match provider.get_chain_id().await {
            Ok(chain_id) => {
                if publish_if_changed(&chain_tx, Some(chain_id)) {
                    debug!(chain_id, "network identity changed");
                }
                signal_tx.send_if_modified(|s| {
                    let changed = s.chain_id != Some(chain_id);
                    s.chain_id = Some(chain_id);
                    changed
                });
            }
            Err(e) => warn!(%e, "chain id read failed, retrying on next tick"),
        }

        match provider.get_accounts().await {
            Ok(accounts) => {
                let account = accounts.first().copied();
                if publish_if_changed(&account_tx, account) {
                    debug!(?account, "account identity changed");
                }
                signal_tx.send_if_modified(|s| {
                    let changed = s.account != account;
                    s.account = account;
                    changed
                });
            }
            Err(e) => warn!(%e, "account read failed, retrying on next tick"),
        }
    }
}

async fn block_loop(
    provider: DynProvider,
    block_tx: watch::Sender<u64>,
    gas_tx: watch::Sender<Option<u128>>,
    signal_tx: watch::Sender<ChainSignal>,
) {
    loop {
        let poller = match provider.watch_blocks().await {
            Ok(poller) => poller,
            Err(e) => {
                warn!(%e, "block watcher setup failed, retrying");
                tokio::time::sleep(provider.client().poll_interval()).await;
                continue;
            }
        };
        let mut blocks = poller.into_stream();

        while let Some(hashes) = blocks.next().await {
            if hashes.is_empty() {
                continue;
            }
            let block_number = match provider.get_block_number().await {
                Ok(n) => n,
                Err(e) => {
                    warn!(%e, "block number read failed, retrying on next block");
                    continue;
                }
            };
            if !publish_if_changed(&block_tx, block_number) {
                continue;
            }
            debug!(block_number, "new block");

            // One gas price read per block, fanned out to all consumers
            let gas_price = match provider.get_gas_price().await {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(%e, "gas price read failed, keeping previous value");
                    *gas_tx.borrow()
                }
            };
            publish_if_changed(&gas_tx, gas_price);

            signal_tx.send_if_modified(|s| {
                let changed = s.block_number != block_number || s.gas_price != gas_price;
                s.block_number = block_number;
                s.gas_price = gas_price;
                changed
            });
        }
        warn!("block watcher stream ended, restarting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_if_changed_deduplicates() {
        let (tx, rx) = watch::channel(0u64);
        assert!(publish_if_changed(&tx, 5));
        assert!(!publish_if_changed(&tx, 5));
        assert!(publish_if_changed(&tx, 6));
        assert_eq!(*rx.borrow(), 6);
    }

    #[tokio::test]
    async fn test_connected_account_waits_for_some() {
        let (tx, mut rx) = watch::channel(None);
        let account = Address::repeat_byte(0x11);
        let waiter = tokio::spawn(async move { connected_account(&mut rx).await });
        tx.send(Some(account)).unwrap();
        assert_eq!(waiter.await.unwrap().unwrap(), account);
    }

    #[tokio::test]
    async fn test_connected_account_errors_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(None::<Address>);
        drop(tx);
        assert!(matches!(
            connected_account(&mut rx).await,
            Err(CoreError::NoAccount)
        ));
    }
}
