//! Paginated order book retrieval.
//!
//! Each side is paged from offer id zero; every page call returns a batch
//! plus the cursor of the next offer, zero once the side is exhausted. A
//! non-first page that comes back entirely empty while the side is known
//! non-empty indicates a torn read (the page landed on a mutated book) and
//! the whole paging sequence for that side is retried.

use alloy::{
    eips::BlockId,
    primitives::{Address, U256},
    providers::DynProvider,
};
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{CarryForward, Offer, OfferSide, Orderbook};
use crate::{
    Network, TradingPair,
    abi::otc_support::OtcSupport,
    error::{CoreError, CoreResult},
    num::Converter,
    pulse::publish_if_changed,
};

/// Attempts per side refresh before the torn-read retry gives up.
pub const MAX_PAGING_ATTEMPTS: usize = 5;

/// One page of a book side.
#[derive(Clone, Debug, Default)]
pub struct OfferPage {
    pub offers: Vec<Offer>,
    /// Cursor of the next offer to page from, zero when exhausted.
    pub next_id: u64,
}

/// Source of book pages. The chain-backed implementation is
/// [`ChainPageSource`]; tests substitute scripted sources.
pub trait OfferPageSource {
    fn page(
        &self,
        side: OfferSide,
        from_id: u64,
    ) -> impl Future<Output = CoreResult<OfferPage>> + Send;
}

/// Pages a matching-market side through the support contract at a pinned
/// block.
pub struct ChainPageSource {
    instance: OtcSupport::OtcSupportInstance<DynProvider>,
    otc: Address,
    base_gem: Address,
    quote_gem: Address,
    base_converter: Converter,
    quote_converter: Converter,
    block: BlockId,
}

impl ChainPageSource {
    pub fn new(
        provider: DynProvider,
        network: &Network,
        pair: TradingPair,
        block_number: u64,
    ) -> CoreResult<Self> {
        let base = network
            .tokens()
            .get(pair.base)
            .ok_or_else(|| CoreError::UnknownToken(pair.base.to_string()))?;
        let quote = network
            .tokens()
            .get(pair.quote)
            .ok_or_else(|| CoreError::UnknownToken(pair.quote.to_string()))?;
        Ok(Self {
            instance: OtcSupport::new(network.otc_support(), provider),
            otc: network.otc(),
            base_gem: base.address,
            quote_gem: quote.address,
            base_converter: base.converter(),
            quote_converter: quote.converter(),
            block: BlockId::number(block_number),
        })
    }
}

impl OfferPageSource for ChainPageSource {
    async fn page(&self, side: OfferSide, from_id: u64) -> CoreResult<OfferPage> {
        // Sell offers pay base for quote; buy offers pay quote for base
        let (pay_gem, buy_gem) = match side {
            OfferSide::Sell => (self.base_gem, self.quote_gem),
            OfferSide::Buy => (self.quote_gem, self.base_gem),
        };
        let page = self
            .instance
            .getOffers(self.otc, pay_gem, buy_gem, U256::from(from_id))
            .block(self.block)
            .call()
            .await
            .map_err(CoreError::from)?;

        let offers = page
            .ids
            .iter()
            .zip(page.payAmts.iter())
            .zip(page.buyAmts.iter())
            .zip(page.owners.iter())
            .zip(page.timestamps.iter())
            .filter(|((((id, _), _), _), _)| !id.is_zero())
            .map(|((((id, pay_amt), buy_amt), owner), timestamp)| {
                let (base_amount, quote_amount) = match side {
                    OfferSide::Sell => (
                        self.base_converter.from_unsigned(*pay_amt),
                        self.quote_converter.from_unsigned(*buy_amt),
                    ),
                    OfferSide::Buy => (
                        self.base_converter.from_unsigned(*buy_amt),
                        self.quote_converter.from_unsigned(*pay_amt),
                    ),
                };
                Offer::new(id.to(), base_amount, quote_amount, *owner, *timestamp, side)
            })
            .collect();

        Ok(OfferPage {
            offers,
            next_id: page.nextId.to(),
        })
    }
}

/// Pages one side until the cursor reaches zero.
///
/// Returns [`CoreError::InconsistentPage`] on a torn read; callers retry
/// the whole sequence, not just the failing page.
pub async fn load_side<S: OfferPageSource>(
    source: &S,
    side: OfferSide,
) -> CoreResult<Vec<Offer>> {
    let mut collected: Vec<Offer> = Vec::new();
    let mut from_id = 0u64;
    loop {
        let page = source.page(side, from_id).await?;
        if from_id != 0 && page.offers.is_empty() && !collected.is_empty() {
            return Err(CoreError::InconsistentPage(side.label(), from_id));
        }
        collected.extend(page.offers);
        from_id = page.next_id;
        if from_id == 0 {
            return Ok(collected);
        }
    }
}

async fn load_side_with_retry<S: OfferPageSource>(
    source: &S,
    side: OfferSide,
) -> CoreResult<Vec<Offer>> {
    for attempt in 1..=MAX_PAGING_ATTEMPTS {
        match load_side(source, side).await {
            Ok(offers) => return Ok(offers),
            Err(e) if e.is_inconsistent_page() => {
                warn!(side = side.label(), attempt, %e, "torn page read, retrying side");
            }
            Err(e) => return Err(e),
        }
    }
    Err(CoreError::PagingRetriesExhausted(MAX_PAGING_ATTEMPTS))
}

/// Loads both sides of the pair and assembles the snapshot.
pub async fn load_orderbook<S: OfferPageSource>(
    source: &S,
    pair: TradingPair,
    block_number: u64,
) -> CoreResult<Orderbook> {
    let (buys, sells) = futures::try_join!(
        load_side_with_retry(source, OfferSide::Buy),
        load_side_with_retry(source, OfferSide::Sell),
    )?;
    Ok(Orderbook::assemble(pair, block_number, buys, sells))
}

/// Spawns the per-block book refresh loop for one pair.
///
/// The returned task is dropped by the caller when the pair or provider
/// changes, which abandons any in-flight paging tied to the old context.
pub fn spawn_refresher(
    provider: DynProvider,
    network: Network,
    pair: TradingPair,
    mut block_rx: watch::Receiver<u64>,
) -> (
    watch::Receiver<Option<Orderbook>>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, rx) = watch::channel(None);
    let task = tokio::spawn(async move {
        let mut carry = CarryForward::new();
        loop {
            let block_number = *block_rx.borrow_and_update();
            if block_number > 0 {
                let refreshed = async {
                    let source =
                        ChainPageSource::new(provider.clone(), &network, pair, block_number)?;
                    load_orderbook(&source, pair, block_number).await
                }
                .await;
                match refreshed {
                    Ok(fresh) => {
                        let published = carry.apply(fresh);
                        if publish_if_changed(&tx, Some(published)) {
                            debug!(%pair, block_number, "order book updated");
                        }
                    }
                    Err(e) => {
                        // Loading-error state: keep the previous snapshot
                        warn!(%pair, block_number, %e, "order book refresh failed");
                    }
                }
            }
            if block_rx.changed().await.is_err() {
                break;
            }
        }
    });
    (rx, task)
}
