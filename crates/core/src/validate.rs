//! Swap calldata verification.
//!
//! Aggregator calldata is untrusted. Before it goes into a bundle, the amounts
//! at the fixed `swapExactAmountIn` offsets must match what was requested and
//! quoted, and the minimum output must equal the locally computed floor.

use alloy::primitives::{Address, Bytes, U256};
use leverage_api::{PriceRoute, SwapTransaction};
use leverage_chain::contracts::augustus::{
    EXACT_AMOUNT_OFFSET, LIMIT_AMOUNT_OFFSET, QUOTED_AMOUNT_OFFSET, SWAP_EXACT_AMOUNT_IN,
    SWAP_EXACT_AMOUNT_IN_SELECTOR,
};
use tracing::{instrument, warn};

use crate::error::LeverageError;
use crate::u256_math::slippage_floor;

/// Swap calldata that passed every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSwap {
    pub augustus: Address,
    pub calldata: Bytes,
    pub src_token: Address,
    pub dest_token: Address,
    pub exact_input: U256,
    pub quoted_output: U256,
    pub min_output: U256,
}

/// Big-endian 32-byte word at `offset`, or `None` if it runs past the end.
pub fn read_word(data: &[u8], offset: usize) -> Option<U256> {
    let end = offset.checked_add(32)?;
    data.get(offset..end).map(U256::from_be_slice)
}

fn word(data: &[u8], offset: usize, field: &str) -> Result<U256, LeverageError> {
    read_word(data, offset).ok_or_else(|| {
        LeverageError::stale(format!(
            "calldata too short for {field} at offset {offset} ({} bytes)",
            data.len()
        ))
    })
}

/// Check `tx` against the price route it was built from and the input amount
/// the bundle will sell.
#[instrument(skip(route, tx), fields(method = %route.contract_method, target = %tx.target))]
pub fn validate_swap(
    route: &PriceRoute,
    tx: &SwapTransaction,
    requested_input: U256,
) -> Result<ValidatedSwap, LeverageError> {
    if route.contract_method != SWAP_EXACT_AMOUNT_IN {
        return Err(LeverageError::UnsupportedSwap {
            method: route.contract_method.clone(),
        });
    }
    let data = tx.calldata.as_ref();
    if data.get(..4) != Some(SWAP_EXACT_AMOUNT_IN_SELECTOR.as_slice()) {
        return Err(LeverageError::UnsupportedSwap {
            method: format!("selector 0x{}", alloy::hex::encode(&data[..data.len().min(4)])),
        });
    }

    let exact_input = word(data, EXACT_AMOUNT_OFFSET, "exact amount")?;
    if exact_input != requested_input || route.src_amount != requested_input {
        warn!(calldata = %exact_input, route = %route.src_amount, requested = %requested_input, "Exact input mismatch");
        return Err(LeverageError::stale(format!(
            "calldata sells {exact_input}, expected {requested_input}"
        )));
    }

    let quoted_output = word(data, QUOTED_AMOUNT_OFFSET, "quoted amount")?;
    if quoted_output != route.dest_amount {
        warn!(calldata = %quoted_output, route = %route.dest_amount, "Quoted output mismatch");
        return Err(LeverageError::stale(format!(
            "calldata quotes {quoted_output}, price route quoted {}",
            route.dest_amount
        )));
    }

    let min_output = slippage_floor(quoted_output);
    let limit = word(data, LIMIT_AMOUNT_OFFSET, "limit amount")?;
    if limit != min_output {
        warn!(calldata = %limit, expected = %min_output, "Minimum output mismatch");
        return Err(LeverageError::stale(format!(
            "calldata minimum output {limit}, expected {min_output}"
        )));
    }

    if !route.allowed_targets().contains(&tx.target) {
        warn!(target = %tx.target, "Calldata target not designated by price route");
        return Err(LeverageError::stale(format!(
            "calldata target {} is not the price route's router",
            tx.target
        )));
    }

    Ok(ValidatedSwap {
        augustus: tx.target,
        calldata: tx.calldata.clone(),
        src_token: route.src_token,
        dest_token: route.dest_token,
        exact_input,
        quoted_output,
        min_output,
    })
}
