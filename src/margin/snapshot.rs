//! Margin snapshot retrieval.
//!
//! One batched viewer read per snapshot covers every configured asset;
//! oracle next prices ride a single multicall. History enrichment is
//! display-only and degrades to empty per asset instead of failing the
//! aggregate.

use alloy::{
    eips::BlockId,
    primitives::Address,
    providers::{DynProvider, Provider},
    rpc::types::Filter,
    sol_types::SolEventInterface,
};
use fastnum::{UD256, udec256};
use tokio::sync::watch;
use tracing::warn;

use super::{
    CashAsset, HistoryEvent, HistoryKind, MarginAccount, MarginAsset, MarginState,
    NonMarginableAsset,
};
use crate::{
    Network,
    abi::{
        margin::{
            MarginViewer::{self, AssetInfo, MarginViewerEvents},
            PriceOracle,
        },
        proxy::{DsProxy, ProxyRegistry},
    },
    balances::UNLIMITED_ALLOWANCE_THRESHOLD,
    error::{CoreError, CoreResult},
    num::{self, Converter},
    tokens::AssetClass,
    tx::{TxKind, TxState, spawn_tracked},
};

/// Decimals of viewer-reported prices.
const PRICE_DECIMALS: u8 = 18;
/// Decimals of viewer-reported ratios and penalties.
const RATIO_DECIMALS: u8 = 27;

/// Reads the registry for the account's proxy and verifies the proxy's
/// recorded owner still is the account. A stale registry entry after an
/// ownership transfer is treated identically to having no proxy.
pub async fn discover_proxy(
    provider: &DynProvider,
    network: &Network,
    account: Address,
) -> CoreResult<Option<Address>> {
    let registry = ProxyRegistry::new(network.proxy_registry(), provider.clone());
    let proxy = registry.proxies(account).call().await.map_err(CoreError::from)?;
    if proxy == Address::ZERO {
        return Ok(None);
    }

    let owner = DsProxy::new(proxy, provider.clone())
        .owner()
        .call()
        .await
        .map_err(CoreError::from)?;
    if owner != account {
        warn!(%proxy, %owner, %account, "{}", CoreError::ProxyOwnerMismatch(proxy, account));
        return Ok(None);
    }
    Ok(Some(proxy))
}

/// Builds a fresh proxy for an account that has none, tracked through the
/// transaction lifecycle like any workflow submission. The next snapshot
/// after the build confirms discovers the new proxy.
pub fn setup_proxy(
    provider: &DynProvider,
    network: &Network,
    account: Address,
    block_rx: watch::Receiver<u64>,
    gas_price_rx: watch::Receiver<Option<u128>>,
) -> watch::Receiver<TxState> {
    let builder = ProxyRegistry::new(network.proxy_registry(), provider.clone())
        .build()
        .from(account)
        .with_cloned_provider();
    spawn_tracked(
        builder,
        TxKind::SetupProxy,
        account,
        network,
        block_rx,
        gas_price_rx,
    )
}

/// History log query: the viewer's events from the protocol deployment
/// block up to the head.
fn history_filter(network: &Network) -> Filter {
    Filter::new()
        .address(network.margin_viewer())
        .from_block(network.start_block())
}

/// Fund/draw history of one asset, newest last.
pub async fn fetch_history(
    provider: &DynProvider,
    network: &Network,
    proxy: Address,
    gem: Address,
    converter: Converter,
) -> CoreResult<Vec<HistoryEvent>> {
    let filter = history_filter(network);
    let logs = provider.get_logs(&filter).await.map_err(CoreError::from)?;

    let mut events = Vec::new();
    for log in &logs {
        let Ok(decoded) = MarginViewerEvents::decode_log(&log.inner) else {
            continue;
        };
        let block_number = log.block_number.unwrap_or_default();
        match decoded.data {
            MarginViewerEvents::Funded(e) if e.proxy == proxy && e.gem == gem => {
                events.push(HistoryEvent {
                    kind: HistoryKind::Fund,
                    amount: converter.from_unsigned(e.amount),
                    block_number,
                });
            }
            MarginViewerEvents::Drawn(e) if e.proxy == proxy && e.gem == gem => {
                events.push(HistoryEvent {
                    kind: HistoryKind::Draw,
                    amount: converter.from_unsigned(e.amount),
                    block_number,
                });
            }
            _ => {}
        }
    }
    Ok(events)
}

/// Builds the aggregated margin entity for the account at a block.
pub async fn fetch_margin_account(
    provider: &DynProvider,
    network: &Network,
    account: Address,
    block_number: u64,
) -> CoreResult<MarginAccount> {
    let block = BlockId::number(block_number);
    let proxy = discover_proxy(provider, network, account).await?;
    let state = match proxy {
        Some(proxy) => MarginState::Setup(proxy),
        None => MarginState::Unset,
    };
    // Without a proxy the viewer still reports wallet-side data
    let viewer_subject = proxy.unwrap_or(Address::ZERO);

    let gems: Vec<Address> = network.tokens().iter().map(|t| t.address).collect();
    let viewer = MarginViewer::new(network.margin_viewer(), provider.clone());
    let infos = viewer
        .assetInfo(viewer_subject, gems)
        .block(block)
        .call()
        .await
        .map_err(CoreError::from)?;

    let next_prices = fetch_next_prices(provider, network, block).await;

    let mut histories = Vec::new();
    for token in network.tokens().iter() {
        let history = match proxy {
            Some(proxy) if token.class == AssetClass::Marginable => {
                match fetch_history(provider, network, proxy, token.address, token.converter())
                    .await
                {
                    Ok(history) => history,
                    Err(e) => {
                        // Display-only enrichment, degrade to empty
                        warn!(token = token.symbol, %e, "history fetch failed");
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };
        histories.push(history);
    }

    assemble(network, state, block_number, &infos, &next_prices, histories)
}

/// Oracle next prices for marginable assets, in registry order. Any
/// failure degrades the whole batch to unknown prices.
async fn fetch_next_prices(
    provider: &DynProvider,
    network: &Network,
    block: BlockId,
) -> Vec<Option<UD256>> {
    let oracles: Vec<Option<Address>> = network.tokens().iter().map(|t| t.oracle).collect();
    let known: Vec<Address> = oracles.iter().filter_map(|o| *o).collect();
    if known.is_empty() {
        return vec![None; oracles.len()];
    }

    // Instances outlive the multicall borrowing their builders
    let instances: Vec<_> = known
        .iter()
        .map(|oracle| PriceOracle::new(*oracle, provider.clone()))
        .collect();
    let multicall = provider
        .multicall()
        .block(block)
        .dynamic()
        .extend(instances.iter().map(|oracle| oracle.nextPrice()));
    let results = match multicall.aggregate().await {
        Ok(results) => results,
        Err(e) => {
            warn!(%e, "oracle price read failed, keeping prices unknown");
            return vec![None; oracles.len()];
        }
    };

    let converter = Converter::new(PRICE_DECIMALS);
    let mut per_oracle = results.into_iter();
    oracles
        .iter()
        .map(|oracle| {
            oracle.and_then(|_| {
                per_oracle
                    .next()
                    .and_then(|r| r.has.then(|| converter.from_unsigned(r.price)))
            })
        })
        .collect()
}

/// Pure fold of the fetched parts into the account entity.
pub(crate) fn assemble(
    network: &Network,
    state: MarginState,
    block_number: u64,
    infos: &[AssetInfo],
    next_prices: &[Option<UD256>],
    histories: Vec<Vec<HistoryEvent>>,
) -> CoreResult<MarginAccount> {
    let price_converter = Converter::new(PRICE_DECIMALS);
    let ratio_converter = Converter::new(RATIO_DECIMALS);

    let mut cash = None;
    let mut marginable = Vec::new();
    let mut non_marginable = Vec::new();

    for (i, token) in network.tokens().iter().enumerate() {
        let info = infos
            .get(i)
            .ok_or_else(|| CoreError::Fatal("viewer returned short asset batch".to_string()))?;
        let converter = token.converter();
        let allowance = info.allowance >= UNLIMITED_ALLOWANCE_THRESHOLD;

        match token.class {
            AssetClass::Cash => {
                cash = Some(CashAsset {
                    symbol: token.symbol,
                    wallet_balance: converter.from_unsigned(info.walletBalance),
                    margin_balance: converter.from_unsigned(info.marginBalance),
                    allowance,
                    display_precision: token.display_precision,
                });
            }
            AssetClass::Marginable => {
                let min_coll_ratio: UD256 = ratio_converter.from_unsigned(info.minCollRatio);
                marginable.push(MarginAsset {
                    symbol: token.symbol,
                    wallet_balance: converter.from_unsigned(info.walletBalance),
                    margin_balance: converter.from_unsigned(info.marginBalance),
                    vault_balance: converter.from_unsigned(info.vaultBalance),
                    debt: price_converter.from_unsigned(info.debt),
                    reference_price: price_converter.from_unsigned(info.referencePrice),
                    next_price: next_prices.get(i).copied().flatten(),
                    min_coll_ratio,
                    safe_coll_ratio: min_coll_ratio * udec256!(1.5),
                    liquidation_penalty: ratio_converter
                        .from_unsigned(info.liquidationPenalty),
                    stability_fee: num::annualized_rate(info.stabilityFeePerSecond),
                    min_debt: price_converter.from_unsigned(info.minDebt),
                    allowance,
                    history: histories.get(i).cloned().unwrap_or_default(),
                });
            }
            AssetClass::NonMarginable => {
                non_marginable.push(NonMarginableAsset {
                    symbol: token.symbol,
                    wallet_balance: converter.from_unsigned(info.walletBalance),
                    margin_balance: converter.from_unsigned(info.marginBalance),
                    allowance,
                });
            }
        }
    }

    Ok(MarginAccount {
        state,
        block_number,
        cash: cash
            .ok_or_else(|| CoreError::Fatal("token registry has no cash asset".to_string()))?,
        marginable,
        non_marginable,
    })
}
