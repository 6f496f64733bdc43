//! Leverage engine chain interaction layer.
//!
//! This crate provides:
//! - Contract bindings for the lending market, both bundlers, adapters and tokens
//! - Calldata encoders for flat bundler actions and generalized `Call[]` bundles
//! - Callback integrity hashing for flash-loan re-entry
//! - EIP-712 authorization and Permit2 message construction
//! - The read layer ([`LeverageReader`]) and wallet layer ([`WalletClient`])

pub mod contracts;
mod provider;
mod signer;

pub use contracts::{
    callback_hash, encode_bundle, ActionBuilder, Bundler3Call, GeneralAdapter, MarketParams,
    RawSignature, SwapAdapterCalls, PERMIT2,
};
pub use provider::{ChainReader, LeverageReader, MarketState, Permit2Allowance, PositionState};
pub use signer::{TransactionSender, TransactionSenderBuilder, WalletClient, WalletError};
