//! Contract bindings and calldata encoders.
//!
//! - [`bindings`]: `sol!` interfaces for the lending market, both bundlers,
//!   their adapters, the aggregator entry point, and tokens
//! - [`bundler`]: flat `bytes[]` action builder for the purpose-built bundler
//! - [`bundler3`]: `Call[]` encoders for the generalized bundler, including
//!   the callback integrity hash
//! - [`morpho`]: market ids and EIP-712 messages
//! - [`augustus`]: fixed calldata layout of the supported swap method
//!
//! # Example
//!
//! ```rust,ignore
//! use leverage_chain::contracts::{bundler3, GeneralAdapter};
//!
//! let adapter = GeneralAdapter::new(general_adapter);
//! let callback = vec![adapter.morpho_supply_collateral(market, U256::MAX, user)];
//! let bundle = vec![adapter.morpho_flash_loan(loan_token, amount, &callback)];
//! let calldata = bundler3::multicall(bundle);
//! ```

pub mod augustus;
pub mod bindings;
pub mod bundler;
pub mod bundler3;
pub mod morpho;

pub use bindings::{
    Authorization, IBundler3, IBundlerV2, IERC20, IERC4626, IGeneralAdapter1, IMorpho,
    IParaswapAdapter, IPermit2, IWstEth, MarketParams, Offsets, PermitSingle, Signature,
};
pub use bundler::ActionBuilder;
pub use bundler3::{callback_hash, encode_bundle, Bundler3Call, GeneralAdapter, SwapAdapterCalls};
pub use morpho::{RawSignature, PERMIT2};
