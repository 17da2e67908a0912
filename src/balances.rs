//! Balance and allowance aggregation.
//!
//! One [`BalanceSnapshot`] is produced per block (or on demand for a single
//! token) for the connected account. Every configured token appears in
//! every snapshot: a token whose fetch failed degrades to a zero-filled
//! entry flagged [`TokenBalance::fetch_failed`] instead of aborting the
//! whole snapshot. Snapshots are published through a replay-latest channel
//! and de-duplicated by value equality, so per-block re-fetch of unchanged
//! state triggers no downstream recompute.

use std::collections::BTreeMap;

use alloy::{
    eips::BlockId,
    primitives::{Address, U256},
    providers::{DynProvider, Provider},
};
use fastnum::UD256;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    Network,
    abi::{erc20::Erc20, otc::MatchingMarket},
    error::{CoreError, CoreResult},
    pulse::publish_if_changed,
    tokens::Token,
};

/// On-chain allowances at or above this sentinel are treated as unlimited.
/// 2^255, half of the value range; an exact max-uint comparison would
/// misclassify allowances already nibbled by spends.
pub const UNLIMITED_ALLOWANCE_THRESHOLD: U256 =
    U256::from_limbs([0, 0, 0, 0x8000_0000_0000_0000]);

/// Wallet-side state of one configured token.
#[derive(Clone, Default, PartialEq, derive_more::Debug)]
#[debug("{symbol}: {wallet_balance} (dust {dust}, allowance {allowance}, failed {fetch_failed})")]
pub struct TokenBalance {
    pub symbol: &'static str,
    pub wallet_balance: UD256,
    /// Minimum tradable amount for this token.
    pub dust: UD256,
    /// True iff the on-chain allowance for the market is effectively
    /// unlimited (>= the sentinel threshold).
    pub allowance: bool,
    /// Set when this token's reads failed and the entry is zero-filled.
    pub fetch_failed: bool,
}

/// Per-account snapshot of all configured tokens plus the ether balance.
///
/// Invariant: the key set equals the token registry exactly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BalanceSnapshot {
    pub block_number: u64,
    pub account: Address,
    pub ether_balance: UD256,
    balances: BTreeMap<&'static str, TokenBalance>,
}

impl BalanceSnapshot {
    /// Assembles a snapshot from whatever per-token results are available,
    /// zero-filling any token the iterator does not cover so the key set
    /// always equals the registry.
    pub fn from_parts(
        network: &Network,
        block_number: u64,
        account: Address,
        ether_balance: UD256,
        parts: impl IntoIterator<Item = TokenBalance>,
    ) -> Self {
        let mut balances: BTreeMap<&'static str, TokenBalance> = network
            .tokens()
            .iter()
            .map(|t| {
                (
                    t.symbol,
                    TokenBalance {
                        symbol: t.symbol,
                        ..TokenBalance::default()
                    },
                )
            })
            .collect();
        for part in parts {
            if let Some(entry) = balances.get_mut(part.symbol) {
                *entry = part;
            }
        }
        Self {
            block_number,
            account,
            ether_balance,
            balances,
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&TokenBalance> {
        self.balances.get(symbol)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenBalance> {
        self.balances.values()
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }
}

/// Reads one token's balance, dust limit and market allowance at a block.
pub async fn fetch_token(
    provider: &DynProvider,
    network: &Network,
    account: Address,
    token: &Token,
    block_number: u64,
) -> CoreResult<TokenBalance> {
    let block = BlockId::number(block_number);
    let erc20 = Erc20::new(token.address, provider.clone());
    let market = MatchingMarket::new(network.otc(), provider.clone());

    // Builders outlive the joined futures borrowing them
    let balance_call = erc20.balanceOf(account).block(block);
    let allowance_call = erc20.allowance(account, network.otc()).block(block);
    let dust_call = market.getMinSell(token.address).block(block);
    let (balance, allowance, dust) = futures::try_join!(
        balance_call.call().into_future(),
        allowance_call.call().into_future(),
        dust_call.call().into_future(),
    )
    .map_err(CoreError::from)?;

    let converter = token.converter();
    Ok(TokenBalance {
        symbol: token.symbol,
        wallet_balance: converter.from_unsigned(balance),
        dust: converter.from_unsigned(dust),
        allowance: allowance >= UNLIMITED_ALLOWANCE_THRESHOLD,
        fetch_failed: false,
    })
}

/// Reads all configured tokens at a block. A single token failing is
/// isolated: its entry comes back zero-filled with `fetch_failed` set.
pub async fn fetch_snapshot(
    provider: &DynProvider,
    network: &Network,
    account: Address,
    block_number: u64,
) -> BalanceSnapshot {
    let token_futs = network.tokens().iter().map(|token| async move {
        match fetch_token(provider, network, account, token, block_number).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(token = token.symbol, %e, "token balance fetch failed, zero-filling");
                TokenBalance {
                    symbol: token.symbol,
                    fetch_failed: true,
                    ..TokenBalance::default()
                }
            }
        }
    });
    let parts = futures::future::join_all(token_futs).await;

    let ether_balance = match provider
        .get_balance(account)
        .block_id(BlockId::number(block_number))
        .await
    {
        Ok(wei) => crate::num::Converter::new(18).from_unsigned(wei),
        Err(e) => {
            warn!(%e, "ether balance fetch failed, zero-filling");
            UD256::ZERO
        }
    };

    BalanceSnapshot::from_parts(network, block_number, account, ether_balance, parts)
}

/// Spawns the per-block aggregation loop: re-fetches on every new block or
/// account change and multicasts the de-duplicated snapshot.
pub fn spawn_aggregator(
    provider: DynProvider,
    network: Network,
    mut account_rx: watch::Receiver<Option<Address>>,
    mut block_rx: watch::Receiver<u64>,
) -> (
    watch::Receiver<Option<BalanceSnapshot>>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, rx) = watch::channel(None);
    let task = tokio::spawn(async move {
        loop {
            let block_number = *block_rx.borrow_and_update();
            let account = *account_rx.borrow_and_update();

            if let Some(account) = account {
                if block_number > 0 {
                    let snapshot =
                        fetch_snapshot(&provider, &network, account, block_number).await;
                    if publish_if_changed(&tx, Some(snapshot)) {
                        debug!(block_number, "balance snapshot updated");
                    }
                }
            } else {
                // No account, nothing to aggregate
                publish_if_changed(&tx, None);
            }

            tokio::select! {
                changed = block_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = account_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    });
    (rx, task)
}

#[cfg(test)]
mod tests {
    use fastnum::udec256;

    use super::*;
    use crate::testing::test_network;

    #[test]
    fn test_snapshot_key_set_equals_registry() {
        let network = test_network();
        let snapshot = BalanceSnapshot::from_parts(
            &network,
            7,
            Address::repeat_byte(1),
            UD256::ZERO,
            // Only one token reported, the rest must still be present
            [TokenBalance {
                symbol: "DAI",
                wallet_balance: udec256!(170),
                ..TokenBalance::default()
            }],
        );

        let mut expected: Vec<_> = network.tokens().symbols().collect();
        expected.sort();
        let keys: Vec<_> = snapshot.iter().map(|b| b.symbol).collect();
        assert_eq!(keys, expected);
        assert_eq!(snapshot.get("DAI").unwrap().wallet_balance, udec256!(170));
        assert_eq!(snapshot.get("WETH").unwrap().wallet_balance, UD256::ZERO);
    }

    #[test]
    fn test_snapshot_ignores_unknown_token() {
        let network = test_network();
        let snapshot = BalanceSnapshot::from_parts(
            &network,
            7,
            Address::repeat_byte(1),
            UD256::ZERO,
            [TokenBalance {
                symbol: "XYZ",
                wallet_balance: udec256!(1),
                ..TokenBalance::default()
            }],
        );
        assert!(snapshot.get("XYZ").is_none());
        assert_eq!(snapshot.len(), network.tokens().len());
    }

    #[test]
    fn test_allowance_threshold() {
        assert!(U256::MAX >= UNLIMITED_ALLOWANCE_THRESHOLD);
        assert!(UNLIMITED_ALLOWANCE_THRESHOLD > U256::from(u128::MAX));
    }
}
