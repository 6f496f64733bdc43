//! U256 fixed-point arithmetic for leverage quoting.
//!
//! Every function here is total: products are computed in 512 bits, results
//! that do not fit saturate at `U256::MAX`, and subtractions floor at zero.
//! Nothing in this module can panic on a token amount.

use alloy::primitives::{U256, U512};

/// Basis points denominator (10000 = 100%)
pub const BPS_DENOMINATOR: U256 = U256::from_limbs([10_000u64, 0, 0, 0]);

/// RAY constant: 1e27, the scale of share prices on the generalized bundler
pub const RAY: U256 = U256::from_limbs([0x9fd0_803c_e800_0000, 0x033b_2e3c, 0, 0]);

/// Lowest multiplier: 1.00x
pub const MIN_MULTIPLIER_BPS: u32 = 10_000;
/// Highest multiplier: 10.00x
pub const MAX_MULTIPLIER_BPS: u32 = 100_000;

/// Slippage band applied to every enforced bound (0.50%)
pub const SLIPPAGE_BPS: u64 = 50;

/// Headroom added to share bounds on borrow/repay (0.50%)
pub const SHARE_BUFFER_BPS: u64 = 50;

/// Virtual shares of the lending market's share accounting
pub const VIRTUAL_SHARES: U256 = U256::from_limbs([1_000_000u64, 0, 0, 0]);
/// Virtual assets of the lending market's share accounting
pub const VIRTUAL_ASSETS: U256 = U256::from_limbs([1u64, 0, 0, 0]);

pub const SECONDS_PER_YEAR: f64 = 31_536_000.0;

#[inline(always)]
fn widen(x: U256) -> U512 {
    let l = x.as_limbs();
    U512::from_limbs([l[0], l[1], l[2], l[3], 0, 0, 0, 0])
}

#[inline(always)]
fn narrow(x: U512) -> U256 {
    let l = x.as_limbs();
    if l[4..].iter().all(|limb| *limb == 0) {
        U256::from_limbs([l[0], l[1], l[2], l[3]])
    } else {
        U256::MAX
    }
}

/// `floor(a * b / d)` with a 512-bit intermediate. Zero divisor yields zero.
#[inline(always)]
pub fn mul_div_down(a: U256, b: U256, d: U256) -> U256 {
    if d.is_zero() {
        return U256::ZERO;
    }
    narrow(widen(a) * widen(b) / widen(d))
}

/// `ceil(a * b / d)` with a 512-bit intermediate. Zero divisor yields zero.
#[inline(always)]
pub fn mul_div_up(a: U256, b: U256, d: U256) -> U256 {
    if d.is_zero() {
        return U256::ZERO;
    }
    let d = widen(d);
    let product = widen(a) * widen(b);
    let quotient = product / d;
    if (product % d).is_zero() {
        narrow(quotient)
    } else {
        narrow(quotient + U512::from_limbs([1, 0, 0, 0, 0, 0, 0, 0]))
    }
}

/// Clamp a multiplier into `[MIN_MULTIPLIER_BPS, MAX_MULTIPLIER_BPS]`.
#[inline(always)]
pub fn clamp_multiplier(bps: u32) -> u32 {
    bps.clamp(MIN_MULTIPLIER_BPS, MAX_MULTIPLIER_BPS)
}

/// Extra collateral a flash loan must produce to reach `multiplier_bps` of `base_amount`.
///
/// `max(0, base * multiplier / 10000 - base)`
#[inline(always)]
pub fn flash_collateral_for_multiplier(base_amount: U256, multiplier_bps: u32) -> U256 {
    let target = mul_div_down(base_amount, U256::from(multiplier_bps), BPS_DENOMINATOR);
    target.saturating_sub(base_amount)
}

/// Minimum acceptable output: 0.50% below `amount`, never below 1 for a nonzero amount.
#[inline(always)]
pub fn slippage_floor(amount: U256) -> U256 {
    if amount.is_zero() {
        return U256::ZERO;
    }
    let floored = mul_div_down(amount, U256::from(10_000 - SLIPPAGE_BPS), BPS_DENOMINATOR);
    max(floored, U256::from(1u64))
}

/// Amount that covers `amount` plus the 0.50% band, rounded up.
#[inline(always)]
pub fn slippage_ceil(amount: U256) -> U256 {
    mul_div_up(amount, U256::from(10_000 + SLIPPAGE_BPS), BPS_DENOMINATOR)
}

/// Assets to shares, rounding down.
#[inline(always)]
pub fn to_shares_down(assets: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_down(
        assets,
        total_shares.saturating_add(VIRTUAL_SHARES),
        total_assets.saturating_add(VIRTUAL_ASSETS),
    )
}

/// Assets to shares, rounding up.
#[inline(always)]
pub fn to_shares_up(assets: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_up(
        assets,
        total_shares.saturating_add(VIRTUAL_SHARES),
        total_assets.saturating_add(VIRTUAL_ASSETS),
    )
}

/// Shares to assets, rounding down.
#[inline(always)]
pub fn to_assets_down(shares: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_down(
        shares,
        total_assets.saturating_add(VIRTUAL_ASSETS),
        total_shares.saturating_add(VIRTUAL_SHARES),
    )
}

/// Shares to assets, rounding up. Debt is always valued this way.
#[inline(always)]
pub fn to_assets_up(shares: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_up(
        shares,
        total_assets.saturating_add(VIRTUAL_ASSETS),
        total_shares.saturating_add(VIRTUAL_SHARES),
    )
}

#[inline(always)]
fn with_share_buffer(shares: U256) -> U256 {
    let headroom = mul_div_down(shares, U256::from(SHARE_BUFFER_BPS), BPS_DENOMINATOR);
    shares
        .saturating_add(headroom)
        .saturating_add(U256::from(1u64))
}

/// Maximum borrow shares the caller accepts being debited for `borrow_assets`.
///
/// Round-up conversion with virtual offsets, plus 0.5% and one share. Never
/// below the real conversion.
#[inline(always)]
pub fn borrow_shares_with_buffer(
    borrow_assets: U256,
    total_borrow_assets: U256,
    total_borrow_shares: U256,
) -> U256 {
    with_share_buffer(to_shares_up(borrow_assets, total_borrow_assets, total_borrow_shares))
}

/// Buffered share estimate for repaying `repay_assets`, without virtual offsets.
/// Zero when either total is zero.
#[inline(always)]
pub fn repay_shares_with_buffer(
    repay_assets: U256,
    total_borrow_assets: U256,
    total_borrow_shares: U256,
) -> U256 {
    if total_borrow_assets.is_zero() || total_borrow_shares.is_zero() {
        return U256::ZERO;
    }
    with_share_buffer(mul_div_up(repay_assets, total_borrow_shares, total_borrow_assets))
}

/// Lowest acceptable borrow share price (1e27-scaled) given the maximum shares to debit.
#[inline(always)]
pub fn min_borrow_share_price_e27(borrow_assets: U256, max_shares: U256) -> U256 {
    mul_div_down(borrow_assets, RAY, max_shares)
}

/// Highest acceptable repay share price (1e27-scaled) given the minimum shares to burn.
#[inline(always)]
pub fn max_repay_share_price_e27(repay_assets: U256, min_shares: U256) -> U256 {
    mul_div_up(repay_assets, RAY, min_shares)
}

/// Annualized growth rate between two observations `period_seconds` apart.
///
/// `(current / past) ^ (year / period) - 1`; `None` for non-positive inputs or
/// a non-finite result.
pub fn annualized_apy_from_growth(current_value: f64, past_value: f64, period_seconds: f64) -> Option<f64> {
    if !(current_value > 0.0 && past_value > 0.0 && period_seconds > 0.0) {
        return None;
    }
    let apy = (current_value / past_value).powf(SECONDS_PER_YEAR / period_seconds) - 1.0;
    apy.is_finite().then_some(apy)
}

/// Convert a token amount to f64 units. Use only for display/logging.
#[inline(always)]
pub fn to_f64_units(amount: U256, decimals: u8) -> f64 {
    let limbs = amount.as_limbs();
    let mut value = 0.0f64;
    for limb in limbs.iter().rev() {
        value = value * 18_446_744_073_709_551_616.0 + *limb as f64;
    }
    value / 10f64.powi(decimals as i32)
}

/// Safe minimum of two U256 values
#[inline(always)]
pub fn min(a: U256, b: U256) -> U256 {
    if a < b {
        a
    } else {
        b
    }
}

/// Safe maximum of two U256 values
#[inline(always)]
pub fn max(a: U256, b: U256) -> U256 {
    if a > b {
        a
    } else {
        b
    }
}
