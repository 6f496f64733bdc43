//! Configuration for the leverage engine.
//!
//! This module provides:
//! - Engine runtime configuration (profiles, quote scheduling, authorization)
//! - Deployment registry (per-chain contract addresses)

mod deployment;
mod engine;

pub use deployment::{ChainDeployment, DeploymentRegistry, GeneralizedBundler, LiquidStakingPair};
pub use engine::{
    config, init_config, AggregatorConfig, AuthConfig, EngineConfig, LoggingConfig, QuoteConfig,
};
