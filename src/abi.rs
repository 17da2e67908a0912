//! Typed contract boundary.
//!
//! Every on-chain read and write in the crate goes through one of these
//! generated instances. Interfaces are declared inline, so no ABI artifacts
//! are required at build time.

/// Number of offers returned by a single [`otc_support`] page call.
pub const OFFERS_PER_PAGE: usize = 100;

#[allow(clippy::too_many_arguments)]
pub mod erc20 {
    alloy::sol!(
        #[derive(Debug)]
        #[sol(rpc)]
        interface Erc20 {
            function balanceOf(address owner) external view returns (uint256);
            function allowance(address owner, address spender) external view returns (uint256);
            function approve(address spender, uint256 value) external returns (bool);
            function transfer(address to, uint256 value) external returns (bool);
            function decimals() external view returns (uint8);
        }
    );
}

#[allow(clippy::too_many_arguments)]
pub mod otc {
    alloy::sol!(
        /// On-chain matching market holding the order book.
        #[derive(Debug)]
        #[sol(rpc)]
        interface MatchingMarket {
            function offer(
                uint256 payAmt,
                address payGem,
                uint256 buyAmt,
                address buyGem,
                uint256 pos
            ) external returns (uint256 id);
            function buy(uint256 id, uint256 quantity) external returns (bool);
            function cancel(uint256 id) external returns (bool);
            function getOffer(uint256 id)
                external
                view
                returns (uint256 payAmt, address payGem, uint256 buyAmt, address buyGem);
            function getMinSell(address payGem) external view returns (uint256);
            function sellAllAmount(
                address payGem,
                uint256 payAmt,
                address buyGem,
                uint256 minFillAmount
            ) external returns (uint256 fillAmt);
            function buyAllAmount(
                address buyGem,
                uint256 buyAmt,
                address payGem,
                uint256 maxFillAmount
            ) external returns (uint256 fillAmt);
        }
    );
}

#[allow(clippy::too_many_arguments)]
pub mod otc_support {
    alloy::sol!(
        /// Read-side helper that pages through one side of the book.
        /// A page is a fixed-size batch plus the cursor of the next offer,
        /// zero once the side is exhausted.
        #[derive(Debug)]
        #[sol(rpc)]
        interface OtcSupport {
            function getOffers(
                address otc,
                address payGem,
                address buyGem,
                uint256 fromId
            )
                external
                view
                returns (
                    uint256 nextId,
                    uint256[100] memory ids,
                    uint256[100] memory payAmts,
                    uint256[100] memory buyAmts,
                    address[100] memory owners,
                    uint64[100] memory timestamps
                );
        }
    );
}

#[allow(clippy::too_many_arguments)]
pub mod proxy {
    alloy::sol!(
        #[derive(Debug)]
        #[sol(rpc)]
        interface ProxyRegistry {
            function proxies(address owner) external view returns (address);
            function build() external returns (address proxy);
        }
    );

    alloy::sol!(
        /// Per-user proxy contract batching protocol actions.
        #[derive(Debug)]
        #[sol(rpc)]
        interface DsProxy {
            function owner() external view returns (address);
            function execute(address target, bytes calldata data)
                external
                payable
                returns (bytes memory response);
        }
    );
}

#[allow(clippy::too_many_arguments)]
pub mod margin {
    alloy::sol!(
        #[derive(Debug)]
        #[sol(rpc)]
        interface MarginViewer {
            struct AssetInfo {
                address gem;
                uint256 walletBalance;
                uint256 marginBalance;
                uint256 vaultBalance;
                uint256 debt;
                uint256 lockedCollateralValue;
                uint256 referencePrice;
                uint256 minCollRatio;
                uint256 liquidationPenalty;
                uint256 stabilityFeePerSecond;
                uint256 minDebt;
                uint256 allowance;
            }

            event Funded(address indexed proxy, address indexed gem, uint256 amount);
            event Drawn(address indexed proxy, address indexed gem, uint256 amount);

            function assetInfo(address proxy, address[] calldata gems)
                external
                view
                returns (AssetInfo[] memory infos);

            function fund(address gem, uint256 amount) external;
            function draw(address gem, uint256 amount) external;
        }
    );

    alloy::sol!(
        #[derive(Debug)]
        #[sol(rpc)]
        interface PriceOracle {
            function nextPrice() external view returns (uint256 price, bool has);
        }
    );
}

#[allow(clippy::too_many_arguments)]
pub mod migration {
    alloy::sol!(
        /// Legacy stablecoin to current stablecoin swap.
        #[derive(Debug)]
        #[sol(rpc)]
        interface Migration {
            function swapSaiToDai(uint256 wad) external;
            function swapDaiToSai(uint256 wad) external;
        }
    );
}
