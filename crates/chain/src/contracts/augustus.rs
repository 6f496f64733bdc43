//! Layout of aggregator calldata the swap adapter knows how to patch.
//!
//! Only `swapExactAmountIn` is supported. Its `GenericData` tuple is static,
//! so the amount fields sit at fixed offsets from the start of the calldata:
//! selector (4) + executor (32) + srcToken (32) + destToken (32).

use alloy::primitives::U256;
use alloy::sol_types::SolCall;

use super::bindings::{IAugustusV6, Offsets};

/// Method name reported by the aggregator for the supported entry point.
pub const SWAP_EXACT_AMOUNT_IN: &str = "swapExactAmountIn";

/// Selector of `swapExactAmountIn` (`0xe3ead59e`).
pub const SWAP_EXACT_AMOUNT_IN_SELECTOR: [u8; 4] = IAugustusV6::swapExactAmountInCall::SELECTOR;

/// Offset of `fromAmount` (exact input).
pub const EXACT_AMOUNT_OFFSET: usize = 100;
/// Offset of `toAmount` (minimum output).
pub const LIMIT_AMOUNT_OFFSET: usize = 132;
/// Offset of `quotedAmount`.
pub const QUOTED_AMOUNT_OFFSET: usize = 164;

/// Offsets handed to the swap adapter so it can rescale a sell-entire-balance swap.
pub fn sell_offsets() -> Offsets {
    Offsets {
        exactAmount: U256::from(EXACT_AMOUNT_OFFSET),
        limitAmount: U256::from(LIMIT_AMOUNT_OFFSET),
        quotedAmount: U256::from(QUOTED_AMOUNT_OFFSET),
    }
}
