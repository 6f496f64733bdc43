//! Action encoder for the purpose-built bundler.
//!
//! Every action is an ABI-encoded call to the bundler itself; the bundler
//! executes them in order inside `multicall(bytes[])`. A flash loan carries
//! its callback actions as `abi.encode(bytes[])` and the bundler replays them
//! from the lender's callback.
//!
//! # Example
//!
//! ```rust,ignore
//! let callback = ActionBuilder::new()
//!     .erc4626_deposit(vault, amount, min_shares, bundler)
//!     .morpho_supply_collateral(market.clone(), U256::MAX, user)
//!     .morpho_borrow(market, amount, max_shares, bundler);
//!
//! let calldata = ActionBuilder::new()
//!     .erc20_transfer_from(token, principal)
//!     .morpho_flash_loan(loan_token, amount, callback)
//!     .build_multicall();
//! ```

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};

use super::bindings::{Authorization, IBundlerV2, MarketParams, PermitSingle, Signature};

/// Builder for bundler action lists.
#[derive(Debug, Default, Clone)]
pub struct ActionBuilder {
    actions: Vec<Bytes>,
}

impl ActionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push<C: SolCall>(mut self, call: C) -> Self {
        self.actions.push(Bytes::from(call.abi_encode()));
        self
    }

    /// Append every action of another builder.
    pub fn extend(mut self, other: ActionBuilder) -> Self {
        self.actions.extend(other.actions);
        self
    }

    /// Pull `amount` of `asset` from the caller via a plain ERC-20 allowance.
    pub fn erc20_transfer_from(self, asset: Address, amount: U256) -> Self {
        self.push(IBundlerV2::erc20TransferFromCall { asset, amount })
    }

    /// Send `amount` (capped at the bundler balance) of `asset` to `recipient`.
    pub fn erc20_transfer(self, asset: Address, recipient: Address, amount: U256) -> Self {
        self.push(IBundlerV2::erc20TransferCall {
            asset,
            recipient,
            amount,
        })
    }

    /// Consume a signed Permit2 permit.
    pub fn approve2(self, permit: PermitSingle, signature: Bytes) -> Self {
        self.push(IBundlerV2::approve2Call {
            permitSingle: permit,
            signature,
            skipRevert: false,
        })
    }

    /// Pull `amount` of `asset` from the caller through Permit2.
    pub fn transfer_from2(self, asset: Address, amount: U256) -> Self {
        self.push(IBundlerV2::transferFrom2Call { asset, amount })
    }

    pub fn erc4626_deposit(self, vault: Address, assets: U256, min_shares: U256, receiver: Address) -> Self {
        self.push(IBundlerV2::erc4626DepositCall {
            vault,
            assets,
            minShares: min_shares,
            receiver,
        })
    }

    pub fn erc4626_redeem(
        self,
        vault: Address,
        shares: U256,
        min_assets: U256,
        receiver: Address,
        owner: Address,
    ) -> Self {
        self.push(IBundlerV2::erc4626RedeemCall {
            vault,
            shares,
            minAssets: min_assets,
            receiver,
            owner,
        })
    }

    /// Apply a signed Morpho authorization.
    pub fn morpho_set_authorization_with_sig(self, authorization: Authorization, signature: Signature) -> Self {
        self.push(IBundlerV2::morphoSetAuthorizationWithSigCall {
            authorization,
            signature,
            skipRevert: false,
        })
    }

    /// Supply collateral on behalf of `on_behalf`. `U256::MAX` supplies the bundler balance.
    pub fn morpho_supply_collateral(self, market: MarketParams, assets: U256, on_behalf: Address) -> Self {
        self.push(IBundlerV2::morphoSupplyCollateralCall {
            marketParams: market,
            assets,
            onBehalf: on_behalf,
            data: Bytes::new(),
        })
    }

    /// Borrow `assets`, debiting at most `max_shares`.
    pub fn morpho_borrow(self, market: MarketParams, assets: U256, max_shares: U256, receiver: Address) -> Self {
        self.push(IBundlerV2::morphoBorrowCall {
            marketParams: market,
            assets,
            shares: U256::ZERO,
            slippageAmount: max_shares,
            receiver,
        })
    }

    /// Repay `assets`, requiring at least `min_shares` to be burned.
    pub fn morpho_repay_assets(
        self,
        market: MarketParams,
        assets: U256,
        min_shares: U256,
        on_behalf: Address,
    ) -> Self {
        self.push(IBundlerV2::morphoRepayCall {
            marketParams: market,
            assets,
            shares: U256::ZERO,
            slippageAmount: min_shares,
            onBehalf: on_behalf,
            data: Bytes::new(),
        })
    }

    /// Repay exactly `shares`, paying at most `max_assets`.
    pub fn morpho_repay_shares(
        self,
        market: MarketParams,
        shares: U256,
        max_assets: U256,
        on_behalf: Address,
    ) -> Self {
        self.push(IBundlerV2::morphoRepayCall {
            marketParams: market,
            assets: U256::ZERO,
            shares,
            slippageAmount: max_assets,
            onBehalf: on_behalf,
            data: Bytes::new(),
        })
    }

    pub fn morpho_withdraw_collateral(self, market: MarketParams, assets: U256, receiver: Address) -> Self {
        self.push(IBundlerV2::morphoWithdrawCollateralCall {
            marketParams: market,
            assets,
            receiver,
        })
    }

    /// Flash-borrow `assets` of `token`; `callback` runs inside the lender callback.
    pub fn morpho_flash_loan(self, token: Address, assets: U256, callback: ActionBuilder) -> Self {
        let data = callback.encode_callback();
        self.push(IBundlerV2::morphoFlashLoanCall { token, assets, data })
    }

    pub fn wrap_native(self, amount: U256) -> Self {
        self.push(IBundlerV2::wrapNativeCall { amount })
    }

    pub fn unwrap_native(self, amount: U256) -> Self {
        self.push(IBundlerV2::unwrapNativeCall { amount })
    }

    pub fn stake_eth(self, amount: U256, min_shares: U256) -> Self {
        self.push(IBundlerV2::stakeEthCall {
            amount,
            minShares: min_shares,
            referral: Address::ZERO,
        })
    }

    pub fn wrap_st_eth(self, amount: U256) -> Self {
        self.push(IBundlerV2::wrapStEthCall { amount })
    }

    pub fn unwrap_st_eth(self, amount: U256) -> Self {
        self.push(IBundlerV2::unwrapStEthCall { amount })
    }

    /// `abi.encode(bytes[])` payload for a flash-loan callback.
    pub fn encode_callback(&self) -> Bytes {
        Bytes::from(self.actions.abi_encode())
    }

    /// Final `multicall(bytes[])` calldata.
    pub fn build_multicall(self) -> Bytes {
        Bytes::from(IBundlerV2::multicallCall { data: self.actions }.abi_encode())
    }

    /// The encoded actions, in order.
    pub fn actions(&self) -> &[Bytes] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
