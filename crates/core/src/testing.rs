//! In-memory collaborators for unit tests.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use leverage_api::{
    AggregatorError, PriceAggregator, PriceRequest, PriceRoute, SwapBuildParams, SwapSide, SwapTransaction,
};
use leverage_chain::contracts::bindings::IAugustusV6;
use leverage_chain::{LeverageReader, MarketState, Permit2Allowance, PositionState, RawSignature, WalletClient, WalletError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::u256_math::{mul_div_down, mul_div_up};

fn u(x: u64) -> U256 {
    U256::from(x)
}

/// Chain reads backed by fixed values.
///
/// Vault shares are priced at `share_price.0 / share_price.1` assets each and
/// one wrapped staking token unwraps to `staking_rate.0 / staking_rate.1`.
#[derive(Debug)]
pub struct MockReader {
    pub vaults: HashMap<Address, Address>,
    pub share_price: (U256, U256),
    pub staking_rate: (U256, U256),
    pub market: MarketState,
    pub position: PositionState,
    pub authorized: bool,
    pub nonce: U256,
    pub balances: HashMap<Address, U256>,
    pub allowances: HashMap<(Address, Address), U256>,
    pub permit2: Permit2Allowance,
    pub fail_previews: bool,
}

impl Default for MockReader {
    fn default() -> Self {
        Self {
            vaults: HashMap::new(),
            share_price: (u(1), u(1)),
            staking_rate: (u(1), u(1)),
            market: MarketState::default(),
            position: PositionState::default(),
            authorized: false,
            nonce: U256::ZERO,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            permit2: Permit2Allowance::default(),
            fail_previews: false,
        }
    }
}

impl MockReader {
    pub fn with_vault(mut self, vault: Address, asset: Address) -> Self {
        self.vaults.insert(vault, asset);
        self
    }

    pub fn with_share_price(mut self, assets: u64, shares: u64) -> Self {
        self.share_price = (u(assets), u(shares));
        self
    }

    pub fn with_staking_rate(mut self, st: u64, wst: u64) -> Self {
        self.staking_rate = (u(st), u(wst));
        self
    }

    /// The user holds all of a market's debt, at the initial 1e6 shares per asset.
    pub fn with_debt(mut self, borrow_assets: u64, collateral: u64) -> Self {
        let shares = u(borrow_assets) * u(1_000_000);
        self.market = MarketState {
            total_borrow_assets: u(borrow_assets),
            total_borrow_shares: shares,
        };
        self.position = PositionState {
            borrow_shares: shares,
            collateral: u(collateral),
        };
        self
    }

    pub fn with_market(mut self, total_borrow_assets: U256, total_borrow_shares: U256) -> Self {
        self.market = MarketState {
            total_borrow_assets,
            total_borrow_shares,
        };
        self
    }

    pub fn with_balance(mut self, token: Address, amount: u64) -> Self {
        self.balances.insert(token, u(amount));
        self
    }

    pub fn with_allowance(mut self, token: Address, spender: Address, amount: U256) -> Self {
        self.allowances.insert((token, spender), amount);
        self
    }

    pub fn authorized(mut self) -> Self {
        self.authorized = true;
        self
    }

    fn preview(&self) -> Result<()> {
        if self.fail_previews {
            Err(anyhow!("execution reverted"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LeverageReader for MockReader {
    async fn vault_asset(&self, vault: Address) -> Result<Address> {
        self.vaults
            .get(&vault)
            .copied()
            .ok_or_else(|| anyhow!("execution reverted: not a vault"))
    }

    async fn preview_deposit(&self, _vault: Address, assets: U256) -> Result<U256> {
        self.preview()?;
        Ok(mul_div_down(assets, self.share_price.1, self.share_price.0))
    }

    async fn preview_mint(&self, _vault: Address, shares: U256) -> Result<U256> {
        self.preview()?;
        Ok(mul_div_up(shares, self.share_price.0, self.share_price.1))
    }

    async fn preview_redeem(&self, _vault: Address, shares: U256) -> Result<U256> {
        self.preview()?;
        Ok(mul_div_down(shares, self.share_price.0, self.share_price.1))
    }

    async fn preview_withdraw(&self, _vault: Address, assets: U256) -> Result<U256> {
        self.preview()?;
        Ok(mul_div_up(assets, self.share_price.1, self.share_price.0))
    }

    async fn wst_by_st(&self, _wst_eth: Address, st_amount: U256) -> Result<U256> {
        self.preview()?;
        Ok(mul_div_down(st_amount, self.staking_rate.1, self.staking_rate.0))
    }

    async fn st_by_wst(&self, _wst_eth: Address, wst_amount: U256) -> Result<U256> {
        self.preview()?;
        Ok(mul_div_down(wst_amount, self.staking_rate.0, self.staking_rate.1))
    }

    async fn market_state(&self, _morpho: Address, _market_id: B256) -> Result<MarketState> {
        Ok(self.market)
    }

    async fn position(&self, _morpho: Address, _market_id: B256, _user: Address) -> Result<PositionState> {
        Ok(self.position)
    }

    async fn is_authorized(&self, _morpho: Address, _owner: Address, _operator: Address) -> Result<bool> {
        Ok(self.authorized)
    }

    async fn authorization_nonce(&self, _morpho: Address, _owner: Address) -> Result<U256> {
        Ok(self.nonce)
    }

    async fn token_decimals(&self, _token: Address) -> Result<u8> {
        Ok(18)
    }

    async fn token_balance(&self, token: Address, _owner: Address) -> Result<U256> {
        self.balances
            .get(&token)
            .copied()
            .ok_or_else(|| anyhow!("balance unavailable"))
    }

    async fn token_allowance(&self, token: Address, _owner: Address, spender: Address) -> Result<U256> {
        Ok(self.allowances.get(&(token, spender)).copied().unwrap_or_default())
    }

    async fn permit2_allowance(
        &self,
        _permit2: Address,
        _owner: Address,
        _token: Address,
        _spender: Address,
    ) -> Result<Permit2Allowance> {
        Ok(self.permit2)
    }
}

pub const AUGUSTUS: Address = Address::repeat_byte(0x6a);

/// Aggregator pricing every pair at `rate.0 / rate.1` and returning
/// well-formed `swapExactAmountIn` calldata.
#[derive(Debug)]
pub struct MockAggregator {
    pub rate: (U256, U256),
    pub method: String,
    /// Number of upcoming calldata builds whose exact-in amount is off by one.
    pub tampered_builds: AtomicUsize,
    /// Number of upcoming price requests answered with a rate change.
    pub rate_changes: AtomicUsize,
    pub price_requests: Mutex<Vec<PriceRequest>>,
}

impl Default for MockAggregator {
    fn default() -> Self {
        Self {
            rate: (u(1), u(1)),
            method: "swapExactAmountIn".to_string(),
            tampered_builds: AtomicUsize::new(0),
            rate_changes: AtomicUsize::new(0),
            price_requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockAggregator {
    pub fn with_rate(mut self, out: u64, inp: u64) -> Self {
        self.rate = (u(out), u(inp));
        self
    }

    pub fn tampered(self, builds: usize) -> Self {
        self.tampered_builds.store(builds, Ordering::SeqCst);
        self
    }

    pub fn rate_changed(self, requests: usize) -> Self {
        self.rate_changes.store(requests, Ordering::SeqCst);
        self
    }
}

/// `swapExactAmountIn` calldata with the given amounts.
pub fn augustus_calldata(src: Address, dest: Address, exact: U256, limit: U256, quoted: U256) -> Bytes {
    IAugustusV6::swapExactAmountInCall {
        executor: Address::repeat_byte(0xee),
        swapData: IAugustusV6::GenericData {
            srcToken: src,
            destToken: dest,
            fromAmount: exact,
            toAmount: limit,
            quotedAmount: quoted,
            metadata: B256::ZERO,
            beneficiary: Address::ZERO,
        },
        partnerAndFee: U256::ZERO,
        permit: Bytes::new(),
        executorData: Bytes::new(),
    }
    .abi_encode()
    .into()
}

#[async_trait]
impl PriceAggregator for MockAggregator {
    fn aggregator_id(&self) -> &str {
        "mock"
    }

    fn supported_chains(&self) -> &[u64] {
        &[1]
    }

    async fn get_price_route(&self, request: PriceRequest) -> Result<PriceRoute, AggregatorError> {
        let rate_changed = self
            .rate_changes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rate_changed {
            return Err(AggregatorError::RateChanged);
        }
        self.price_requests.lock().push(request.clone());
        Ok(PriceRoute {
            chain_id: request.chain_id,
            src_token: request.src_token,
            src_decimals: request.src_decimals,
            src_amount: request.amount,
            dest_token: request.dest_token,
            dest_decimals: request.dest_decimals,
            dest_amount: mul_div_down(request.amount, self.rate.0, self.rate.1),
            side: SwapSide::Sell,
            contract_address: AUGUSTUS,
            token_transfer_proxy: AUGUSTUS,
            contract_method: self.method.clone(),
            raw: serde_json::Value::Null,
        })
    }

    async fn build_swap_calldata(
        &self,
        route: &PriceRoute,
        params: SwapBuildParams,
    ) -> Result<SwapTransaction, AggregatorError> {
        let tampered = self
            .tampered_builds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let exact = if tampered {
            route.src_amount + U256::from(1u64)
        } else {
            route.src_amount
        };
        Ok(SwapTransaction {
            target: route.contract_address,
            calldata: augustus_calldata(route.src_token, route.dest_token, exact, params.min_output, route.dest_amount),
            value: U256::ZERO,
            output_amount: route.dest_amount,
        })
    }
}

/// What the wallet should do when asked to sign or send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalletBehavior {
    #[default]
    Approve,
    Reject,
    Revert,
}

/// Wallet recording every signature request and transaction.
#[derive(Debug)]
pub struct MockWallet {
    pub address: Address,
    pub signing: WalletBehavior,
    pub sending: WalletBehavior,
    pub signed: Mutex<Vec<B256>>,
    pub sent: Mutex<Vec<(Address, Bytes, U256)>>,
}

impl MockWallet {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            signing: WalletBehavior::Approve,
            sending: WalletBehavior::Approve,
            signed: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl WalletClient for MockWallet {
    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> u64 {
        1
    }

    async fn sign_hash(&self, hash: B256) -> Result<RawSignature, WalletError> {
        match self.signing {
            WalletBehavior::Reject => Err(WalletError::UserRejected),
            WalletBehavior::Revert => Err(WalletError::Signing("device disconnected".to_string())),
            WalletBehavior::Approve => {
                self.signed.lock().push(hash);
                Ok(RawSignature::from_parts(U256::from(1u64), U256::from(2u64), false))
            }
        }
    }

    async fn send_transaction(&self, to: Address, data: Bytes, value: U256) -> Result<B256, WalletError> {
        match self.sending {
            WalletBehavior::Reject => Err(WalletError::UserRejected),
            WalletBehavior::Revert => Err(WalletError::Reverted {
                tx_hash: Some(B256::repeat_byte(0xde)),
                reason: "execution reverted".to_string(),
            }),
            WalletBehavior::Approve => {
                let mut sent = self.sent.lock();
                sent.push((to, data, value));
                Ok(B256::with_last_byte(sent.len() as u8))
            }
        }
    }
}
