//! Call encoder for the generalized bundler and its adapters.
//!
//! The generalized bundler executes a `Call[]` list. Adapters that re-enter
//! it (the flash-loan path) must be given the hash of the exact bundle they
//! will replay: `keccak256(abi.encode(Call[]))`. That hash is also
//! `keccak256(msg.data[4..])` of the `reenter(Call[])` call the adapter makes,
//! which is what the bundler checks before executing the callback.

use alloy::primitives::{keccak256, Address, Bytes, B256, U256};
use alloy::sol_types::{SolCall, SolValue};

use super::bindings::{Call, IBundler3, IGeneralAdapter1, IParaswapAdapter, MarketParams, Offsets};

/// One atomic call executed by the generalized bundler.
pub type Bundler3Call = Call;

/// `abi.encode(Call[])`.
pub fn encode_bundle(bundle: &[Bundler3Call]) -> Bytes {
    Bytes::from(bundle.to_vec().abi_encode())
}

/// Integrity hash committing a re-entering adapter to `bundle`.
pub fn callback_hash(bundle: &[Bundler3Call]) -> B256 {
    keccak256(encode_bundle(bundle))
}

/// Final `multicall(Call[])` calldata.
pub fn multicall(bundle: Vec<Bundler3Call>) -> Bytes {
    Bytes::from(IBundler3::multicallCall { bundle }.abi_encode())
}

fn call<C: SolCall>(to: Address, inner: C) -> Bundler3Call {
    Call {
        to,
        data: Bytes::from(inner.abi_encode()),
        value: U256::ZERO,
        skipRevert: false,
        callbackHash: B256::ZERO,
    }
}

/// Encoder for calls routed through the general adapter.
#[derive(Debug, Clone, Copy)]
pub struct GeneralAdapter {
    pub address: Address,
}

impl GeneralAdapter {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Pull `amount` of `token` from the initiator into `receiver`.
    pub fn erc20_transfer_from(&self, token: Address, receiver: Address, amount: U256) -> Bundler3Call {
        call(
            self.address,
            IGeneralAdapter1::erc20TransferFromCall {
                token,
                receiver,
                amount,
            },
        )
    }

    /// Send `amount` (`U256::MAX` = whole balance) of `token` held by the adapter.
    pub fn erc20_transfer(&self, token: Address, receiver: Address, amount: U256) -> Bundler3Call {
        call(
            self.address,
            IGeneralAdapter1::erc20TransferCall {
                token,
                receiver,
                amount,
            },
        )
    }

    pub fn morpho_supply_collateral(&self, market: MarketParams, assets: U256, on_behalf: Address) -> Bundler3Call {
        call(
            self.address,
            IGeneralAdapter1::morphoSupplyCollateralCall {
                marketParams: market,
                assets,
                onBehalf: on_behalf,
                data: Bytes::new(),
            },
        )
    }

    /// Borrow `assets`, reverting if the realized share price is below `min_share_price_e27`.
    pub fn morpho_borrow(
        &self,
        market: MarketParams,
        assets: U256,
        min_share_price_e27: U256,
        receiver: Address,
    ) -> Bundler3Call {
        call(
            self.address,
            IGeneralAdapter1::morphoBorrowCall {
                marketParams: market,
                assets,
                shares: U256::ZERO,
                minSharePriceE27: min_share_price_e27,
                receiver,
            },
        )
    }

    /// Repay by assets, reverting if the realized share price exceeds `max_share_price_e27`.
    pub fn morpho_repay_assets(
        &self,
        market: MarketParams,
        assets: U256,
        max_share_price_e27: U256,
        on_behalf: Address,
    ) -> Bundler3Call {
        call(
            self.address,
            IGeneralAdapter1::morphoRepayCall {
                marketParams: market,
                assets,
                shares: U256::ZERO,
                maxSharePriceE27: max_share_price_e27,
                onBehalf: on_behalf,
                data: Bytes::new(),
            },
        )
    }

    /// Repay exactly `shares`.
    pub fn morpho_repay_shares(
        &self,
        market: MarketParams,
        shares: U256,
        max_share_price_e27: U256,
        on_behalf: Address,
    ) -> Bundler3Call {
        call(
            self.address,
            IGeneralAdapter1::morphoRepayCall {
                marketParams: market,
                assets: U256::ZERO,
                shares,
                maxSharePriceE27: max_share_price_e27,
                onBehalf: on_behalf,
                data: Bytes::new(),
            },
        )
    }

    pub fn morpho_withdraw_collateral(&self, market: MarketParams, assets: U256, receiver: Address) -> Bundler3Call {
        call(
            self.address,
            IGeneralAdapter1::morphoWithdrawCollateralCall {
                marketParams: market,
                assets,
                receiver,
            },
        )
    }

    /// Flash-borrow `assets` of `token` and replay `callback` from the lender callback.
    ///
    /// The wrapping call carries `callback_hash(callback)`; the bundler refuses
    /// to re-enter with any other bundle.
    pub fn morpho_flash_loan(&self, token: Address, assets: U256, callback: &[Bundler3Call]) -> Bundler3Call {
        let mut wrapped = call(
            self.address,
            IGeneralAdapter1::morphoFlashLoanCall {
                token,
                assets,
                data: encode_bundle(callback),
            },
        );
        wrapped.callbackHash = callback_hash(callback);
        wrapped
    }
}

/// Encoder for calls routed through the swap adapter.
#[derive(Debug, Clone, Copy)]
pub struct SwapAdapterCalls {
    pub address: Address,
}

impl SwapAdapterCalls {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Execute aggregator calldata selling the adapter's `src_token`.
    #[allow(clippy::too_many_arguments)]
    pub fn sell(
        &self,
        augustus: Address,
        calldata: Bytes,
        src_token: Address,
        dest_token: Address,
        sell_entire_balance: bool,
        offsets: Offsets,
        receiver: Address,
    ) -> Bundler3Call {
        call(
            self.address,
            IParaswapAdapter::sellCall {
                augustus,
                callData: calldata,
                srcToken: src_token,
                destToken: dest_token,
                sellEntireBalance: sell_entire_balance,
                offsets,
                receiver,
            },
        )
    }

    pub fn erc20_transfer(&self, token: Address, receiver: Address, amount: U256) -> Bundler3Call {
        call(
            self.address,
            IParaswapAdapter::erc20TransferCall {
                token,
                receiver,
                amount,
            },
        )
    }
}
