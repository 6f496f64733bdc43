//! Swap-quote aggregator clients.
//!
//! This crate provides:
//! - `PriceAggregator`: the boundary trait for third-party price routes and swap calldata
//! - Velora (ParaSwap) v6.2 HTTP client
//! - Per-chain aggregator registry
//!
//! Everything returned from an aggregator is untrusted; callers re-validate
//! price routes and calldata before submitting anything on-chain.

mod error;
pub mod swap;

pub use error::AggregatorError;
pub use swap::{
    AggregatorRegistry, PriceAggregator, PriceRequest, PriceRoute, SwapBuildParams, SwapSide,
    SwapTransaction, VeloraClient,
};
