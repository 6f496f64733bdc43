//! Read layer for leverage quoting.
//! Uses Alloy providers for type-safe RPC interactions.
//!
//! The quote engine only depends on [`LeverageReader`]; [`ChainReader`] is the
//! RPC-backed implementation. Readers never cache; callers decide what to share.

use alloy::primitives::{Address, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::http::reqwest::Url;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt::Debug;
use tracing::{debug, info, instrument};

use crate::contracts::{IMorpho, IERC20, IERC4626, IPermit2, IWstEth};

/// Borrow-side totals of a lending market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketState {
    pub total_borrow_assets: U256,
    pub total_borrow_shares: U256,
}

/// Borrow-side view of one account in one market.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionState {
    pub borrow_shares: U256,
    pub collateral: U256,
}

/// Permit2 allowance granted by an owner to a spender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Permit2Allowance {
    pub amount: U256,
    pub expiration: u64,
    pub nonce: u64,
}

/// On-chain reads the leverage engine needs.
#[async_trait]
pub trait LeverageReader: Send + Sync + Debug {
    /// Underlying asset of an ERC-4626 vault. Fails for non-vault tokens.
    async fn vault_asset(&self, vault: Address) -> Result<Address>;

    async fn preview_deposit(&self, vault: Address, assets: U256) -> Result<U256>;
    async fn preview_mint(&self, vault: Address, shares: U256) -> Result<U256>;
    async fn preview_redeem(&self, vault: Address, shares: U256) -> Result<U256>;
    async fn preview_withdraw(&self, vault: Address, assets: U256) -> Result<U256>;

    /// wstETH received for wrapping `st_amount` stETH.
    async fn wst_by_st(&self, wst_eth: Address, st_amount: U256) -> Result<U256>;
    /// stETH received for unwrapping `wst_amount` wstETH.
    async fn st_by_wst(&self, wst_eth: Address, wst_amount: U256) -> Result<U256>;

    async fn market_state(&self, morpho: Address, market_id: B256) -> Result<MarketState>;
    async fn position(&self, morpho: Address, market_id: B256, user: Address) -> Result<PositionState>;
    async fn is_authorized(&self, morpho: Address, owner: Address, operator: Address) -> Result<bool>;
    async fn authorization_nonce(&self, morpho: Address, owner: Address) -> Result<U256>;

    async fn token_decimals(&self, token: Address) -> Result<u8>;
    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256>;
    async fn token_allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256>;
    async fn permit2_allowance(
        &self,
        permit2: Address,
        owner: Address,
        token: Address,
        spender: Address,
    ) -> Result<Permit2Allowance>;
}

/// RPC-backed [`LeverageReader`].
#[derive(Debug, Clone)]
pub struct ChainReader {
    rpc_url: String,
}

impl ChainReader {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
        }
    }

    /// Create a reader and verify the endpoint serves `expected_chain_id`.
    pub async fn connect(rpc_url: impl Into<String>, expected_chain_id: u64) -> Result<Self> {
        let reader = Self::new(rpc_url);
        let chain_id = reader.chain_id().await?;
        if chain_id != expected_chain_id {
            anyhow::bail!(
                "RPC {} serves chain {}, expected {}",
                reader.rpc_url,
                chain_id,
                expected_chain_id
            );
        }
        info!(rpc = %reader.rpc_url, chain_id, "Chain reader connected");
        Ok(reader)
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    fn provider(&self) -> Result<impl Provider + Clone> {
        let url: Url = self
            .rpc_url
            .parse()
            .with_context(|| format!("invalid RPC url {}", self.rpc_url))?;
        Ok(ProviderBuilder::new().on_http(url))
    }

    pub async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider()?.get_chain_id().await?)
    }
}

#[async_trait]
impl LeverageReader for ChainReader {
    #[instrument(skip(self), level = "debug")]
    async fn vault_asset(&self, vault: Address) -> Result<Address> {
        let provider = self.provider()?;
        let asset = IERC4626::new(vault, &provider).asset().call().await?;
        Ok(asset.assetTokenAddress)
    }

    async fn preview_deposit(&self, vault: Address, assets: U256) -> Result<U256> {
        let provider = self.provider()?;
        let out = IERC4626::new(vault, &provider).previewDeposit(assets).call().await?;
        Ok(out.shares)
    }

    async fn preview_mint(&self, vault: Address, shares: U256) -> Result<U256> {
        let provider = self.provider()?;
        let out = IERC4626::new(vault, &provider).previewMint(shares).call().await?;
        Ok(out.assets)
    }

    async fn preview_redeem(&self, vault: Address, shares: U256) -> Result<U256> {
        let provider = self.provider()?;
        let out = IERC4626::new(vault, &provider).previewRedeem(shares).call().await?;
        Ok(out.assets)
    }

    async fn preview_withdraw(&self, vault: Address, assets: U256) -> Result<U256> {
        let provider = self.provider()?;
        let out = IERC4626::new(vault, &provider).previewWithdraw(assets).call().await?;
        Ok(out.shares)
    }

    async fn wst_by_st(&self, wst_eth: Address, st_amount: U256) -> Result<U256> {
        let provider = self.provider()?;
        let out = IWstEth::new(wst_eth, &provider).getWstETHByStETH(st_amount).call().await?;
        Ok(out.wstAmount)
    }

    async fn st_by_wst(&self, wst_eth: Address, wst_amount: U256) -> Result<U256> {
        let provider = self.provider()?;
        let out = IWstEth::new(wst_eth, &provider).getStETHByWstETH(wst_amount).call().await?;
        Ok(out.stAmount)
    }

    #[instrument(skip(self), level = "debug")]
    async fn market_state(&self, morpho: Address, market_id: B256) -> Result<MarketState> {
        let provider = self.provider()?;
        let market = IMorpho::new(morpho, &provider).market(market_id).call().await?;
        Ok(MarketState {
            total_borrow_assets: U256::from(market.totalBorrowAssets),
            total_borrow_shares: U256::from(market.totalBorrowShares),
        })
    }

    #[instrument(skip(self), level = "debug")]
    async fn position(&self, morpho: Address, market_id: B256, user: Address) -> Result<PositionState> {
        let provider = self.provider()?;
        let position = IMorpho::new(morpho, &provider).position(market_id, user).call().await?;
        debug!(
            borrow_shares = %position.borrowShares,
            collateral = %position.collateral,
            "Position fetched"
        );
        Ok(PositionState {
            borrow_shares: U256::from(position.borrowShares),
            collateral: U256::from(position.collateral),
        })
    }

    async fn is_authorized(&self, morpho: Address, owner: Address, operator: Address) -> Result<bool> {
        let provider = self.provider()?;
        let out = IMorpho::new(morpho, &provider).isAuthorized(owner, operator).call().await?;
        Ok(out.authorized)
    }

    async fn authorization_nonce(&self, morpho: Address, owner: Address) -> Result<U256> {
        let provider = self.provider()?;
        let out = IMorpho::new(morpho, &provider).nonce(owner).call().await?;
        Ok(out.current)
    }

    async fn token_decimals(&self, token: Address) -> Result<u8> {
        let provider = self.provider()?;
        let out = IERC20::new(token, &provider).decimals().call().await?;
        Ok(out.value)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256> {
        let provider = self.provider()?;
        let out = IERC20::new(token, &provider).balanceOf(owner).call().await?;
        Ok(out.balance)
    }

    async fn token_allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        let provider = self.provider()?;
        let out = IERC20::new(token, &provider).allowance(owner, spender).call().await?;
        Ok(out.remaining)
    }

    async fn permit2_allowance(
        &self,
        permit2: Address,
        owner: Address,
        token: Address,
        spender: Address,
    ) -> Result<Permit2Allowance> {
        let provider = self.provider()?;
        let out = IPermit2::new(permit2, &provider)
            .allowance(owner, token, spender)
            .call()
            .await?;
        Ok(Permit2Allowance {
            amount: U256::from(out.amount),
            expiration: out.expiration.to::<u64>(),
            nonce: out.nonce.to::<u64>(),
        })
    }
}
