//! Wallet abstraction and a local-key transaction sender.
//! Uses Alloy providers for type-safe RPC interactions.
//!
//! The orchestrator talks to [`WalletClient`]. [`TransactionSender`] is the
//! reference implementation backed by a local private key; browser or remote
//! wallets implement the same trait and map their rejection codes to
//! [`WalletError::UserRejected`].

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::transports::http::reqwest::Url;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::contracts::morpho::{authorization_signing_hash, permit_signing_hash};
use crate::contracts::{Authorization, PermitSingle, RawSignature};

/// Errors surfaced by a wallet.
#[derive(Debug, Error)]
pub enum WalletError {
    /// The user declined to sign or send.
    #[error("user rejected the request")]
    UserRejected,

    /// The transaction was mined (or simulated) and reverted.
    #[error("transaction reverted: {reason}")]
    Reverted {
        tx_hash: Option<B256>,
        reason: String,
    },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl WalletError {
    /// Classify a free-form wallet/RPC error message.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        if lower.contains("user rejected") || lower.contains("user denied") || lower.contains("4001") {
            WalletError::UserRejected
        } else if lower.contains("revert") {
            WalletError::Reverted {
                tx_hash: None,
                reason: message,
            }
        } else {
            WalletError::Transport(message)
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self, WalletError::UserRejected)
    }
}

/// Signing and submission capabilities of the connected wallet.
#[async_trait]
pub trait WalletClient: Send + Sync + Debug {
    /// Account that signs and sends.
    fn address(&self) -> Address;

    /// Chain the wallet is connected to.
    fn chain_id(&self) -> u64;

    /// Sign a 32-byte EIP-712 digest.
    async fn sign_hash(&self, hash: B256) -> Result<RawSignature, WalletError>;

    /// Sign a lending-market authorization for `morpho`.
    async fn sign_authorization(
        &self,
        authorization: &Authorization,
        morpho: Address,
    ) -> Result<RawSignature, WalletError> {
        let hash = authorization_signing_hash(authorization, self.chain_id(), morpho);
        self.sign_hash(hash).await
    }

    /// Sign a Permit2 single permit.
    async fn sign_permit(&self, permit: &PermitSingle, permit2: Address) -> Result<RawSignature, WalletError> {
        let hash = permit_signing_hash(permit, self.chain_id(), permit2);
        self.sign_hash(hash).await
    }

    /// Send a transaction and wait for it to be confirmed.
    /// Returns the transaction hash of a successful (non-reverted) receipt.
    async fn send_transaction(&self, to: Address, data: Bytes, value: U256) -> Result<B256, WalletError>;
}

/// Builder for [`TransactionSender`].
pub struct TransactionSenderBuilder {
    rpc_url: String,
    chain_id: u64,
    gas_limit: Option<u64>,
}

impl TransactionSenderBuilder {
    pub fn new(rpc_url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            chain_id,
            gas_limit: None,
        }
    }

    /// Fix the gas limit instead of estimating it.
    pub fn gas_limit(mut self, limit: u64) -> Self {
        self.gas_limit = Some(limit);
        self
    }

    /// Build the sender from a hex private key (with or without 0x prefix).
    pub fn build(self, private_key: &str) -> Result<TransactionSender> {
        let key_str = private_key.trim_start_matches("0x");
        let signer: PrivateKeySigner = key_str.parse()?;
        let signer = signer.with_chain_id(Some(self.chain_id));
        let address = signer.address();
        let rpc_url: Url = self.rpc_url.parse()?;

        info!(
            address = %address,
            chain_id = self.chain_id,
            gas_limit = ?self.gas_limit,
            "Transaction sender initialized"
        );

        Ok(TransactionSender {
            rpc_url,
            wallet: EthereumWallet::from(signer.clone()),
            signer,
            address,
            chain_id: self.chain_id,
            gas_limit: self.gas_limit,
        })
    }
}

/// Local-key wallet that signs digests and sends transactions over HTTP.
/// Nonce, gas price and (unless fixed) gas limit are filled by the provider.
pub struct TransactionSender {
    rpc_url: Url,
    wallet: EthereumWallet,
    signer: PrivateKeySigner,
    address: Address,
    chain_id: u64,
    gas_limit: Option<u64>,
}

impl TransactionSender {
    /// Create a sender with provider-estimated gas.
    pub fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self> {
        TransactionSenderBuilder::new(rpc_url, chain_id).build(private_key)
    }

    /// Get current native balance.
    pub async fn get_balance(&self) -> Result<U256> {
        let provider = ProviderBuilder::new().on_http(self.rpc_url.clone());
        Ok(provider.get_balance(self.address).await?)
    }

    pub fn rpc_url(&self) -> &Url {
        &self.rpc_url
    }
}

#[async_trait]
impl WalletClient for TransactionSender {
    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn sign_hash(&self, hash: B256) -> Result<RawSignature, WalletError> {
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| WalletError::Signing(e.to_string()))?;
        Ok(RawSignature::from_parts(signature.r(), signature.s(), signature.v()))
    }

    #[instrument(skip(self, data), fields(calldata_len = data.len()))]
    async fn send_transaction(&self, to: Address, data: Bytes, value: U256) -> Result<B256, WalletError> {
        let total_start = Instant::now();

        let mut tx = TransactionRequest::default()
            .with_from(self.address)
            .with_to(to)
            .with_input(data)
            .with_value(value)
            .with_chain_id(self.chain_id);
        if let Some(limit) = self.gas_limit {
            tx.set_gas_limit(limit);
        }

        let provider = ProviderBuilder::new()
            .wallet(self.wallet.clone())
            .on_http(self.rpc_url.clone());

        // Estimation failures carry the revert reason; classify them here.
        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| WalletError::classify(e.to_string()))?;
        let tx_hash = *pending.tx_hash();
        let submit_elapsed = total_start.elapsed();

        info!(
            tx_hash = %tx_hash,
            submit_ms = submit_elapsed.as_millis(),
            "Transaction submitted, waiting for confirmation"
        );

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| WalletError::Transport(e.to_string()))?;
        let total_elapsed = total_start.elapsed();

        if receipt.status() {
            info!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                gas_used = receipt.gas_used,
                total_ms = total_elapsed.as_millis(),
                "Transaction confirmed"
            );
            Ok(tx_hash)
        } else {
            warn!(
                tx_hash = %tx_hash,
                block = receipt.block_number.unwrap_or(0),
                total_ms = total_elapsed.as_millis(),
                "Transaction reverted"
            );
            debug!(gas_used = receipt.gas_used, "Reverted receipt");
            Err(WalletError::Reverted {
                tx_hash: Some(tx_hash),
                reason: format!("transaction {tx_hash} reverted on-chain"),
            })
        }
    }
}

impl std::fmt::Debug for TransactionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSender")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("rpc_url", &self.rpc_url.as_str())
            .field("gas_limit", &self.gas_limit)
            .finish_non_exhaustive()
    }
}
