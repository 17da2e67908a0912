//! Pure form/change reducers for the user-facing workflows.
//!
//! Each workflow owns an immutable state struct and a closed change enum
//! folded by a total-match `reduce`. Reducers are synchronous and
//! side-effect free; the only async surface is `proceed`, which builds the
//! typed contract call and hands it to the tracker, where the gas safety
//! margins are applied. While a transaction progress is attached the
//! form is frozen: environment and input changes are ignored until the
//! progress is cleared, so an in-flight submission can never be invalidated
//! under the user's cursor.

pub mod instant;
pub mod migration;
pub mod offer;
pub mod transfer;

use alloy::{
    primitives::{Address, U256},
    providers::DynProvider,
};
use fastnum::{UD256, udec256};
use tokio::sync::watch;

use crate::{
    Network,
    abi::erc20::Erc20,
    error::{CoreError, CoreResult},
    tx::{TxKind, TxState, spawn_tracked},
};

/// Upper bound on any entered amount; values beyond it are treated as
/// input mistakes rather than trades.
pub const SANE_CEILING: UD256 = udec256!(1000000000);

/// Validation outcome attached to a form state.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// No wallet account is connected.
    NotConnected,
    /// A transaction for this form is already in flight.
    InProgress,
    InsufficientBalance { symbol: &'static str },
    /// Below the market's minimum tradable amount.
    DustAmount { symbol: &'static str, minimum: UD256 },
    /// Above the sane input ceiling.
    CeilingAmount { symbol: &'static str, maximum: UD256 },
    /// The book cannot absorb the requested amount.
    InsufficientLiquidity,
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotConnected => write!(f, "no wallet connected"),
            Self::InProgress => write!(f, "transaction in progress"),
            Self::InsufficientBalance { symbol } => {
                write!(f, "insufficient {symbol} balance")
            }
            Self::DustAmount { symbol, minimum } => {
                write!(f, "{symbol} amount below minimum {minimum}")
            }
            Self::CeilingAmount { symbol, maximum } => {
                write!(f, "{symbol} amount above maximum {maximum}")
            }
            Self::InsufficientLiquidity => write!(f, "not enough liquidity"),
        }
    }
}

/// Grants an effectively-unlimited allowance on `token` to `spender`.
///
/// Shared by every workflow whose pay token needs approval before the
/// first trade, funding or migration.
pub fn approve(
    provider: &DynProvider,
    network: &Network,
    account: Address,
    token_symbol: &str,
    spender: Address,
    block_rx: watch::Receiver<u64>,
    gas_price_rx: watch::Receiver<Option<u128>>,
) -> CoreResult<watch::Receiver<TxState>> {
    let token = network
        .tokens()
        .get(token_symbol)
        .ok_or_else(|| CoreError::UnknownToken(token_symbol.to_string()))?;
    let builder = Erc20::new(token.address, provider.clone())
        .approve(spender, U256::MAX)
        .from(account)
        .with_cloned_provider();
    Ok(spawn_tracked(
        builder,
        TxKind::Approve {
            token: token.symbol,
        },
        account,
        network,
        block_rx,
        gas_price_rx,
    ))
}

#[cfg(test)]
mod tests {
    use alloy::{providers::ProviderBuilder, rpc::client::RpcClient};
    use url::Url;

    use super::*;
    use crate::{testing::test_network, tx::TxStatus};

    fn dead_provider() -> DynProvider {
        let url = Url::parse("http://127.0.0.1:1").unwrap();
        DynProvider::new(ProviderBuilder::new().connect_client(RpcClient::new_http(url)))
    }

    #[tokio::test]
    async fn test_approve_lifecycle_survives_caller_scope() {
        let network = test_network();
        let account = Address::repeat_byte(1);
        let (_block_tx, block_rx) = watch::channel(0u64);
        let (_gas_tx, gas_rx) = watch::channel(Some(20_000_000_000u128));

        let mut rx = {
            let provider = dead_provider();
            approve(
                &provider,
                &network,
                account,
                "DAI",
                network.otc(),
                block_rx,
                gas_rx,
            )
            .unwrap()
            // Provider and every local are gone; the tracker owns its call
        };

        assert_eq!(rx.borrow().status(), &TxStatus::WaitingForApproval);
        assert_eq!(rx.borrow().kind(), TxKind::Approve { token: "DAI" });

        // Nothing listens on that port, so the broadcast attempt must
        // surface as a terminal error rather than hang or leak
        let state = rx
            .wait_for(|s| s.status().is_terminal())
            .await
            .unwrap()
            .clone();
        assert!(matches!(state.status(), TxStatus::Error { .. }));
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let network = test_network();
        let (_block_tx, block_rx) = watch::channel(0u64);
        let (_gas_tx, gas_rx) = watch::channel(None);
        let result = approve(
            &dead_provider(),
            &network,
            Address::repeat_byte(1),
            "XYZ",
            network.otc(),
            block_rx,
            gas_rx,
        );
        assert!(matches!(result, Err(CoreError::UnknownToken(_))));
    }
}
