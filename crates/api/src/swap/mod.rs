//! Price-route abstractions for swap-backed leverage.
//!
//! This module provides a trait-based abstraction over swap-quote aggregators.
//! An aggregator answers two questions:
//!
//! 1. `get_price_route`: what does selling `amount` of `src` for `dest` yield?
//! 2. `build_swap_calldata`: give me the calldata that executes that price route.
//!
//! Both answers are treated as untrusted by the leverage engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use leverage_api::swap::{AggregatorRegistry, PriceRequest, VeloraClient};
//!
//! let registry = AggregatorRegistry::new().with_aggregator(Arc::new(VeloraClient::new()));
//! let aggregator = registry.for_chain(1).unwrap();
//! let route = aggregator.get_price_route(request).await?;
//! ```

mod velora;

pub use velora::VeloraClient;

use crate::AggregatorError;
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Direction of a priced swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapSide {
    /// Exact amount in, variable amount out.
    #[default]
    Sell,
    /// Exact amount out, variable amount in.
    Buy,
}

impl SwapSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapSide::Sell => "SELL",
            SwapSide::Buy => "BUY",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SELL" => Some(SwapSide::Sell),
            "BUY" => Some(SwapSide::Buy),
            _ => None,
        }
    }
}

/// Parameters for requesting a price route.
#[derive(Debug, Clone)]
pub struct PriceRequest {
    /// Chain the swap executes on
    pub chain_id: u64,
    /// Token sold
    pub src_token: Address,
    /// Decimals of the sold token
    pub src_decimals: u8,
    /// Token bought
    pub dest_token: Address,
    /// Decimals of the bought token
    pub dest_decimals: u8,
    /// Exact amount sold (raw units)
    pub amount: U256,
    /// Address that will execute the swap (the swap adapter)
    pub user: Address,
}

impl PriceRequest {
    /// Create a sell-side price request.
    pub fn sell(
        chain_id: u64,
        src_token: Address,
        src_decimals: u8,
        dest_token: Address,
        dest_decimals: u8,
        amount: U256,
        user: Address,
    ) -> Self {
        Self {
            chain_id,
            src_token,
            src_decimals,
            dest_token,
            dest_decimals,
            amount,
            user,
        }
    }
}

/// Price route returned by an aggregator.
///
/// The typed fields are parsed out of the aggregator payload so they can be
/// cross-checked; `raw` is the untouched payload, echoed back verbatim when
/// requesting calldata.
#[derive(Debug, Clone)]
pub struct PriceRoute {
    pub chain_id: u64,
    pub src_token: Address,
    pub src_decimals: u8,
    pub src_amount: U256,
    pub dest_token: Address,
    pub dest_decimals: u8,
    /// Quoted output amount
    pub dest_amount: U256,
    pub side: SwapSide,
    /// Aggregator entry point (Augustus)
    pub contract_address: Address,
    /// Spender the aggregator pulls tokens through
    pub token_transfer_proxy: Address,
    /// Aggregator method the calldata will call (e.g. "swapExactAmountIn")
    pub contract_method: String,
    pub raw: serde_json::Value,
}

impl PriceRoute {
    /// Whether the route was priced for exactly this token pair and input amount.
    pub fn matches(&self, src_token: Address, dest_token: Address, src_amount: U256) -> bool {
        self.src_token == src_token
            && self.dest_token == dest_token
            && self.src_amount == src_amount
            && self.side == SwapSide::Sell
    }

    /// Addresses the route designates as valid calldata targets.
    pub fn allowed_targets(&self) -> [Address; 2] {
        [self.contract_address, self.token_transfer_proxy]
    }
}

/// Parameters for turning a price route into calldata.
#[derive(Debug, Clone)]
pub struct SwapBuildParams {
    /// Address executing the swap
    pub taker: Address,
    /// Address receiving the output
    pub receiver: Address,
    /// Minimum output the calldata must enforce (computed by the caller)
    pub min_output: U256,
}

/// Swap transaction returned by an aggregator.
#[derive(Debug, Clone)]
pub struct SwapTransaction {
    /// Call target
    pub target: Address,
    /// Raw calldata
    pub calldata: Bytes,
    /// Native value attached
    pub value: U256,
    /// Output amount the price route reported
    pub output_amount: U256,
}

/// Trait for swap-quote aggregators.
///
/// Implement this trait to add support for a new aggregator.
#[async_trait]
pub trait PriceAggregator: Send + Sync + Debug {
    /// Aggregator identifier (e.g., "velora").
    fn aggregator_id(&self) -> &str;

    /// Supported chain IDs.
    fn supported_chains(&self) -> &[u64];

    /// Check if this aggregator supports a specific chain.
    fn supports_chain(&self, chain_id: u64) -> bool {
        self.supported_chains().contains(&chain_id)
    }

    /// Price selling `request.amount` of `src_token` for `dest_token`.
    async fn get_price_route(&self, request: PriceRequest) -> Result<PriceRoute, AggregatorError>;

    /// Build executable calldata for a previously fetched price route.
    async fn build_swap_calldata(
        &self,
        route: &PriceRoute,
        params: SwapBuildParams,
    ) -> Result<SwapTransaction, AggregatorError>;
}

/// Registry selecting an aggregator by chain ID.
#[derive(Debug, Default, Clone)]
pub struct AggregatorRegistry {
    aggregators: HashMap<u64, Arc<dyn PriceAggregator>>,
}

impl AggregatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an aggregator for all chains it supports.
    /// Later registrations replace earlier ones for the same chain.
    pub fn with_aggregator(mut self, aggregator: Arc<dyn PriceAggregator>) -> Self {
        for chain_id in aggregator.supported_chains() {
            self.aggregators.insert(*chain_id, Arc::clone(&aggregator));
        }
        self
    }

    /// Get the aggregator for a chain.
    pub fn for_chain(&self, chain_id: u64) -> Option<Arc<dyn PriceAggregator>> {
        self.aggregators.get(&chain_id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregators.is_empty()
    }
}
