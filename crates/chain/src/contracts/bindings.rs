//! Contract bindings for the lending market, routers, adapters, and tokens.
//!
//! All interfaces live in one `sol!` invocation so the shared structs
//! (`MarketParams`, `Authorization`, `PermitSingle`, `Call`, ...) resolve
//! identically for every contract that takes them.
//!
//! # Usage
//!
//! ```rust,ignore
//! use leverage_chain::contracts::bindings::{IMorpho, MarketParams};
//!
//! let morpho = IMorpho::new(address, provider);
//! let position = morpho.position(market_id, user).call().await?;
//! ```

#![allow(clippy::too_many_arguments)]

use alloy::sol;

sol! {
    // ========================================================================
    // Shared structs
    // ========================================================================

    /// Morpho Blue market parameters. The market id is `keccak256(abi.encode(params))`.
    #[derive(Debug, Default, PartialEq, Eq)]
    struct MarketParams {
        address loanToken;
        address collateralToken;
        address oracle;
        address irm;
        uint256 lltv;
    }

    /// Morpho Blue authorization message (EIP-712).
    #[derive(Debug, PartialEq, Eq)]
    struct Authorization {
        address authorizer;
        address authorized;
        bool isAuthorized;
        uint256 nonce;
        uint256 deadline;
    }

    /// Split ECDSA signature as accepted by Morpho Blue.
    #[derive(Debug, PartialEq, Eq)]
    struct Signature {
        uint8 v;
        bytes32 r;
        bytes32 s;
    }

    /// Permit2 allowance details.
    #[derive(Debug, PartialEq, Eq)]
    struct PermitDetails {
        address token;
        uint160 amount;
        uint48 expiration;
        uint48 nonce;
    }

    /// Permit2 single-token permit (EIP-712).
    #[derive(Debug, PartialEq, Eq)]
    struct PermitSingle {
        PermitDetails details;
        address spender;
        uint256 sigDeadline;
    }

    /// One atomic call executed by Bundler3.
    #[derive(Debug, PartialEq, Eq)]
    struct Call {
        address to;
        bytes data;
        uint256 value;
        bool skipRevert;
        bytes32 callbackHash;
    }

    /// Byte offsets of the amount fields inside aggregator calldata.
    #[derive(Debug, PartialEq, Eq)]
    struct Offsets {
        uint256 exactAmount;
        uint256 limitAmount;
        uint256 quotedAmount;
    }

    // ========================================================================
    // Morpho Blue
    // ========================================================================

    #[sol(rpc)]
    interface IMorpho {
        function market(bytes32 id) external view returns (
            uint128 totalSupplyAssets,
            uint128 totalSupplyShares,
            uint128 totalBorrowAssets,
            uint128 totalBorrowShares,
            uint128 lastUpdate,
            uint128 fee
        );
        function position(bytes32 id, address user) external view returns (
            uint256 supplyShares,
            uint128 borrowShares,
            uint128 collateral
        );
        function isAuthorized(address authorizer, address authorized) external view returns (bool authorized);
        function nonce(address authorizer) external view returns (uint256 current);
        function setAuthorization(address authorized, bool newIsAuthorized) external;
    }

    // ========================================================================
    // Purpose-built bundler (flat `bytes[]` actions)
    // ========================================================================

    interface IBundlerV2 {
        function multicall(bytes[] data) external payable;

        function erc20TransferFrom(address asset, uint256 amount) external payable;
        function erc20Transfer(address asset, address recipient, uint256 amount) external payable;
        function approve2(PermitSingle permitSingle, bytes signature, bool skipRevert) external payable;
        function transferFrom2(address asset, uint256 amount) external payable;

        function erc4626Deposit(address vault, uint256 assets, uint256 minShares, address receiver) external payable;
        function erc4626Redeem(address vault, uint256 shares, uint256 minAssets, address receiver, address owner) external payable;

        function morphoSetAuthorizationWithSig(Authorization authorization, Signature signature, bool skipRevert) external payable;
        function morphoSupplyCollateral(MarketParams marketParams, uint256 assets, address onBehalf, bytes data) external payable;
        function morphoBorrow(MarketParams marketParams, uint256 assets, uint256 shares, uint256 slippageAmount, address receiver) external payable;
        function morphoRepay(MarketParams marketParams, uint256 assets, uint256 shares, uint256 slippageAmount, address onBehalf, bytes data) external payable;
        function morphoWithdrawCollateral(MarketParams marketParams, uint256 assets, address receiver) external payable;
        function morphoFlashLoan(address token, uint256 assets, bytes data) external payable;

        function wrapNative(uint256 amount) external payable;
        function unwrapNative(uint256 amount) external payable;
        function stakeEth(uint256 amount, uint256 minShares, address referral) external payable;
        function wrapStEth(uint256 amount) external payable;
        function unwrapStEth(uint256 amount) external payable;
    }

    // ========================================================================
    // Generalized bundler and its adapters
    // ========================================================================

    interface IBundler3 {
        function multicall(Call[] bundle) external payable;
        function reenter(Call[] bundle) external;
    }

    interface IGeneralAdapter1 {
        function erc20TransferFrom(address token, address receiver, uint256 amount) external;
        function erc20Transfer(address token, address receiver, uint256 amount) external;
        function morphoSupplyCollateral(MarketParams marketParams, uint256 assets, address onBehalf, bytes data) external;
        function morphoBorrow(MarketParams marketParams, uint256 assets, uint256 shares, uint256 minSharePriceE27, address receiver) external;
        function morphoRepay(MarketParams marketParams, uint256 assets, uint256 shares, uint256 maxSharePriceE27, address onBehalf, bytes data) external;
        function morphoWithdrawCollateral(MarketParams marketParams, uint256 assets, address receiver) external;
        function morphoFlashLoan(address token, uint256 assets, bytes data) external;
    }

    interface IParaswapAdapter {
        function sell(
            address augustus,
            bytes callData,
            address srcToken,
            address destToken,
            bool sellEntireBalance,
            Offsets offsets,
            address receiver
        ) external;
        function erc20Transfer(address token, address receiver, uint256 amount) external;
    }

    // ========================================================================
    // Aggregator entry point (v6.2)
    // ========================================================================

    interface IAugustusV6 {
        struct GenericData {
            address srcToken;
            address destToken;
            uint256 fromAmount;
            uint256 toAmount;
            uint256 quotedAmount;
            bytes32 metadata;
            address beneficiary;
        }

        function swapExactAmountIn(
            address executor,
            GenericData swapData,
            uint256 partnerAndFee,
            bytes permit,
            bytes executorData
        ) external payable returns (uint256 receivedAmount, uint256 paraswapShare, uint256 partnerShare);
    }

    // ========================================================================
    // Tokens and vaults
    // ========================================================================

    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256 balance);
        function allowance(address owner, address spender) external view returns (uint256 remaining);
        function approve(address spender, uint256 amount) external returns (bool success);
        function decimals() external view returns (uint8 value);
    }

    #[sol(rpc)]
    interface IERC4626 {
        function asset() external view returns (address assetTokenAddress);
        function previewDeposit(uint256 assets) external view returns (uint256 shares);
        function previewMint(uint256 shares) external view returns (uint256 assets);
        function previewRedeem(uint256 shares) external view returns (uint256 assets);
        function previewWithdraw(uint256 assets) external view returns (uint256 shares);
    }

    #[sol(rpc)]
    interface IWstEth {
        function getWstETHByStETH(uint256 stETHAmount) external view returns (uint256 wstAmount);
        function getStETHByWstETH(uint256 wstETHAmount) external view returns (uint256 stAmount);
    }

    #[sol(rpc)]
    interface IPermit2 {
        function allowance(address user, address token, address spender) external view returns (
            uint160 amount,
            uint48 expiration,
            uint48 nonce
        );
    }
}
