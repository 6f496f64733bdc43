//! Leverage engine core.
//!
//! This crate provides:
//! - Route classification (vault-share, liquid-staking, aggregator swap)
//! - Leverage and deleverage quoting in integer token units
//! - Swap calldata verification against the price route
//! - Bundle encoding for the purpose-built and generalized bundlers
//! - The authorization and submission state machine
//! - Last-request-wins quote scheduling and the touched-market cache
//!
//! Positions live on Morpho Blue; every action is one atomic bundle.

mod bundle;
pub mod config;
mod engine;
mod error;
mod orchestrator;
mod quote;
mod route;
mod sequencer;
pub mod telemetry;
mod touched;
pub mod u256_math;
mod validate;

#[cfg(test)]
mod testing;

pub use bundle::{build_deleverage_bundle, build_leverage_bundle, SignedPrefix, TransactionBundle};
pub use config::{
    config, init_config, AggregatorConfig, AuthConfig, ChainDeployment, DeploymentRegistry, EngineConfig,
    GeneralizedBundler, LiquidStakingPair, LoggingConfig, QuoteConfig,
};
pub use engine::LeverageEngine;
pub use error::LeverageError;
pub use orchestrator::{
    effective_mode, next_step, plan_steps, AuthMode, BundlePreparer, FlowKind, FlowObserver, FlowOrchestrator,
    FlowState, FlowStep, StepPlan, TokenPull,
};
pub use quote::{
    apply_dust_rule, quote_deleverage, quote_leverage, select_close_route, DeleverageQuote, DeleverageRequest,
    Denomination, LeverageQuote, LeverageRequest, QuoteStatus,
};
pub use route::{classify_route, LeverageRoute, LoanMode, RouteContext, RouteKind, RouteSelection};
pub use sequencer::{QuoteSequencer, QuoteTicket};
pub use telemetry::{init_tracing, LogFormat};
pub use touched::{InMemoryTouchedMarkets, TouchedMarket, TouchedMarketStore};
pub use validate::{read_word, validate_swap, ValidatedSwap};
