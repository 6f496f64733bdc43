//! Leverage and deleverage quoting.
//!
//! Deterministic routes price through on-chain previews; the swap route prices
//! through the aggregator. Every amount is in token base units.

use alloy::primitives::{Address, U256};
use leverage_api::{PriceAggregator, PriceRequest, PriceRoute};
use leverage_chain::{LeverageReader, MarketState, PositionState};
use tracing::{debug, instrument, warn};

use crate::error::LeverageError;
use crate::route::{LeverageRoute, LoanMode, RouteContext};
use crate::u256_math::{
    borrow_shares_with_buffer, clamp_multiplier, flash_collateral_for_multiplier, min, repay_shares_with_buffer,
    slippage_ceil, slippage_floor, to_assets_up,
};

/// Unit the leverage principal is given in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Denomination {
    #[default]
    Collateral,
    Loan,
}

/// User input for opening or increasing a leveraged position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeverageRequest {
    pub principal: U256,
    pub denomination: Denomination,
    /// Target multiplier in basis points (10 000 = 1.00x)
    pub multiplier_bps: u32,
}

/// User input for unwinding a leveraged position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleverageRequest {
    /// Collateral to withdraw
    pub withdraw_amount: U256,
}

#[derive(Debug, Clone)]
pub struct LeverageQuote {
    pub principal: U256,
    pub principal_token: Address,
    /// Principal expressed in collateral units
    pub principal_collateral: U256,
    pub flash_collateral_amount: U256,
    pub flash_loan_amount: U256,
    pub total_collateral_after: U256,
    /// Upper bound on borrow shares debited for `flash_loan_amount`
    pub max_borrow_shares: U256,
    pub projected_collateral_after: U256,
    pub projected_debt_after: U256,
    /// Execution price route (swap route only)
    pub swap_route: Option<PriceRoute>,
}

impl LeverageQuote {
    pub fn needs_flash_loan(&self) -> bool {
        !self.flash_loan_amount.is_zero()
    }
}

#[derive(Debug, Clone)]
pub struct DeleverageQuote {
    pub withdraw_amount: U256,
    pub repay_amount: U256,
    pub raw_route_repay_amount: U256,
    pub max_collateral_for_full_close: U256,
    pub close_route: bool,
    pub flash_loan_amount: U256,
    pub current_borrow_assets: U256,
    pub current_borrow_shares: U256,
    pub current_collateral: U256,
    /// Buffered share estimate for the partial repay (display only)
    pub repay_shares_estimate: U256,
    pub projected_collateral_after: U256,
    pub projected_debt_after: U256,
    /// Execution price route (swap route only)
    pub swap_route: Option<PriceRoute>,
}

impl DeleverageQuote {
    pub fn needs_flash_loan(&self) -> bool {
        !self.flash_loan_amount.is_zero()
    }
}

/// State of a quote as seen by a caller polling for it.
#[derive(Debug, Clone)]
pub enum QuoteStatus<Q> {
    Idle,
    /// Inputs or reads are still settling; `error` is the last transient failure.
    Loading { error: Option<String> },
    Ready(Q),
    Failed(String),
}

impl<Q> QuoteStatus<Q> {
    pub fn from_result(result: Result<Q, LeverageError>) -> Self {
        match result {
            Ok(quote) => QuoteStatus::Ready(quote),
            Err(e) if e.is_transient() => QuoteStatus::Loading {
                error: Some(e.to_string()),
            },
            Err(e) => QuoteStatus::Failed(e.to_string()),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, QuoteStatus::Loading { .. })
    }

    pub fn ready(&self) -> Option<&Q> {
        match self {
            QuoteStatus::Ready(q) => Some(q),
            _ => None,
        }
    }
}

/// Close route iff there is debt and the withdrawal covers the buffered payoff.
pub fn select_close_route(
    borrow_assets: U256,
    borrow_shares: U256,
    max_collateral_for_full_close: U256,
    withdraw_amount: U256,
) -> bool {
    !borrow_assets.is_zero()
        && !borrow_shares.is_zero()
        && !max_collateral_for_full_close.is_zero()
        && withdraw_amount >= max_collateral_for_full_close
}

/// Keep one unit of debt when an asset repay would zero the position.
///
/// A 1-unit repay of a 1-unit debt is returned unchanged.
pub fn apply_dust_rule(repay_amount: U256, borrow_assets: U256) -> U256 {
    let one = U256::from(1u64);
    if repay_amount.is_zero() || repay_amount != borrow_assets || repay_amount == one {
        return repay_amount;
    }
    repay_amount - one
}

fn borrow_assets(market: &MarketState, position: &PositionState) -> U256 {
    to_assets_up(
        position.borrow_shares,
        market.total_borrow_assets,
        market.total_borrow_shares,
    )
}

async fn load_position(
    reader: &dyn LeverageReader,
    ctx: &RouteContext,
) -> Result<(MarketState, PositionState), LeverageError> {
    futures::try_join!(
        reader.market_state(ctx.morpho, ctx.market_id),
        reader.position(ctx.morpho, ctx.market_id, ctx.user),
    )
    .map_err(LeverageError::read)
}

struct SwapLeg {
    src: Address,
    dest: Address,
    amount: U256,
}

async fn price(
    reader: &dyn LeverageReader,
    aggregator: Option<&dyn PriceAggregator>,
    ctx: &RouteContext,
    executor: Address,
    leg: SwapLeg,
) -> Result<PriceRoute, LeverageError> {
    let aggregator = aggregator.ok_or_else(|| {
        LeverageError::unsupported(format!("no swap aggregator for chain {}", ctx.chain_id))
    })?;
    let src_decimals = reader.token_decimals(leg.src).await.map_err(LeverageError::read)?;
    let dest_decimals = reader.token_decimals(leg.dest).await.map_err(LeverageError::read)?;

    let request = PriceRequest::sell(
        ctx.chain_id,
        leg.src,
        src_decimals,
        leg.dest,
        dest_decimals,
        leg.amount,
        executor,
    );
    let route = aggregator.get_price_route(request).await?;
    if !route.matches(leg.src, leg.dest, leg.amount) {
        return Err(LeverageError::stale(format!(
            "price route is for {} {} -> {}, requested {} {} -> {}",
            route.src_amount, route.src_token, route.dest_token, leg.amount, leg.src, leg.dest
        )));
    }
    Ok(route)
}

/// Smallest wrapped amount that unwraps to at least `st_amount`.
async fn wrapped_covering(
    reader: &dyn LeverageReader,
    wst_eth: Address,
    st_amount: U256,
) -> Result<U256, LeverageError> {
    let wrapped = reader.wst_by_st(wst_eth, st_amount).await.map_err(LeverageError::read)?;
    let unwrapped = reader.st_by_wst(wst_eth, wrapped).await.map_err(LeverageError::read)?;
    if unwrapped < st_amount {
        Ok(wrapped + U256::from(1u64))
    } else {
        Ok(wrapped)
    }
}

pub(crate) fn principal_token(ctx: &RouteContext, denomination: Denomination) -> Address {
    match denomination {
        Denomination::Collateral => ctx.collateral_token(),
        Denomination::Loan => ctx.loan_token(),
    }
}

/// Quote a leverage action.
#[instrument(skip(reader, aggregator, ctx), fields(route = %ctx.route.kind(), market_id = %ctx.market_id))]
pub async fn quote_leverage(
    reader: &dyn LeverageReader,
    aggregator: Option<&dyn PriceAggregator>,
    ctx: &RouteContext,
    request: &LeverageRequest,
) -> Result<LeverageQuote, LeverageError> {
    if request.principal.is_zero() {
        return Err(LeverageError::InvalidInput("principal must be positive".to_string()));
    }
    if request.multiplier_bps == 0 {
        return Err(LeverageError::InvalidInput("multiplier must be positive".to_string()));
    }
    let multiplier = clamp_multiplier(request.multiplier_bps);
    let principal = request.principal;
    let principal_token = principal_token(ctx, request.denomination);

    match reader.token_balance(principal_token, ctx.user).await {
        Ok(balance) if principal > balance => {
            return Err(LeverageError::InvalidInput(format!(
                "principal {principal} exceeds balance {balance}"
            )));
        }
        Ok(_) => {}
        Err(e) => debug!(error = %e, "Balance unknown, skipping principal check"),
    }

    let (market, position) = load_position(reader, ctx).await?;

    let (principal_collateral, flash_collateral_amount, flash_loan_amount, swap_route) = match ctx.route {
        LeverageRoute::VaultShare { vault, .. } => {
            let principal_collateral = match request.denomination {
                Denomination::Collateral => principal,
                Denomination::Loan => reader
                    .preview_deposit(vault, principal)
                    .await
                    .map_err(LeverageError::read)?,
            };
            let flash_collateral = flash_collateral_for_multiplier(principal_collateral, multiplier);
            let flash_loan = if flash_collateral.is_zero() {
                U256::ZERO
            } else {
                reader
                    .preview_mint(vault, flash_collateral)
                    .await
                    .map_err(LeverageError::read)?
            };
            (principal_collateral, flash_collateral, flash_loan, None)
        }
        LeverageRoute::LiquidStaking { collateral, .. } => {
            // Loan-unit principal is stETH or ETH, both stake 1:1 into stETH.
            let principal_collateral = match request.denomination {
                Denomination::Collateral => principal,
                Denomination::Loan => reader
                    .wst_by_st(collateral, principal)
                    .await
                    .map_err(LeverageError::read)?,
            };
            let flash_collateral = flash_collateral_for_multiplier(principal_collateral, multiplier);
            let flash_loan = if flash_collateral.is_zero() {
                U256::ZERO
            } else {
                reader
                    .st_by_wst(collateral, flash_collateral)
                    .await
                    .map_err(LeverageError::read)?
            };
            (principal_collateral, flash_collateral, flash_loan, None)
        }
        LeverageRoute::Swap { swap_adapter, .. } => {
            if request.denomination != Denomination::Collateral {
                return Err(LeverageError::InvalidInput(
                    "swap-route principal must be given in collateral units".to_string(),
                ));
            }
            let target_collateral = flash_collateral_for_multiplier(principal, multiplier);
            if target_collateral.is_zero() {
                (principal, U256::ZERO, U256::ZERO, None)
            } else {
                let reference = price(
                    reader,
                    aggregator,
                    ctx,
                    swap_adapter,
                    SwapLeg {
                        src: ctx.collateral_token(),
                        dest: ctx.loan_token(),
                        amount: target_collateral,
                    },
                )
                .await?;
                let flash_loan = reference.dest_amount;
                if flash_loan.is_zero() {
                    return Err(LeverageError::NoSwapRoute("reference quote returned zero output".to_string()));
                }
                let execution = price(
                    reader,
                    aggregator,
                    ctx,
                    swap_adapter,
                    SwapLeg {
                        src: ctx.loan_token(),
                        dest: ctx.collateral_token(),
                        amount: flash_loan,
                    },
                )
                .await?;
                (principal, execution.dest_amount, flash_loan, Some(execution))
            }
        }
    };

    let total_collateral_after = principal_collateral.saturating_add(flash_collateral_amount);
    let max_borrow_shares = borrow_shares_with_buffer(
        flash_loan_amount,
        market.total_borrow_assets,
        market.total_borrow_shares,
    );
    let current_debt = borrow_assets(&market, &position);

    let quote = LeverageQuote {
        principal,
        principal_token,
        principal_collateral,
        flash_collateral_amount,
        flash_loan_amount,
        total_collateral_after,
        max_borrow_shares,
        projected_collateral_after: position.collateral.saturating_add(total_collateral_after),
        projected_debt_after: current_debt.saturating_add(flash_loan_amount),
        swap_route,
    };
    debug!(
        multiplier_bps = multiplier,
        flash_collateral = %quote.flash_collateral_amount,
        flash_loan = %quote.flash_loan_amount,
        total_collateral_after = %quote.total_collateral_after,
        "Leverage quote"
    );
    Ok(quote)
}

/// Quote a deleverage action.
#[instrument(skip(reader, aggregator, ctx), fields(route = %ctx.route.kind(), market_id = %ctx.market_id))]
pub async fn quote_deleverage(
    reader: &dyn LeverageReader,
    aggregator: Option<&dyn PriceAggregator>,
    ctx: &RouteContext,
    request: &DeleverageRequest,
) -> Result<DeleverageQuote, LeverageError> {
    ctx.route.deleverage_support().map_err(LeverageError::unsupported)?;

    let withdraw = request.withdraw_amount;
    if withdraw.is_zero() {
        return Err(LeverageError::InvalidInput("withdraw amount must be positive".to_string()));
    }

    let (market, position) = load_position(reader, ctx).await?;
    if withdraw > position.collateral {
        return Err(LeverageError::InvalidInput(format!(
            "withdraw amount {withdraw} exceeds collateral {}",
            position.collateral
        )));
    }

    let debt = borrow_assets(&market, &position);
    let payoff = slippage_ceil(debt);

    let (raw_route_repay_amount, max_collateral_for_full_close, swap_route) = match ctx.route {
        LeverageRoute::VaultShare { vault, .. } => {
            let raw = reader
                .preview_redeem(vault, withdraw)
                .await
                .map_err(LeverageError::read)?;
            let max_close = if payoff.is_zero() {
                U256::ZERO
            } else {
                reader
                    .preview_withdraw(vault, payoff)
                    .await
                    .map_err(LeverageError::read)?
            };
            (raw, max_close, None)
        }
        LeverageRoute::LiquidStaking {
            collateral,
            loan_mode: LoanMode::Direct,
            ..
        } => {
            let raw = reader
                .st_by_wst(collateral, withdraw)
                .await
                .map_err(LeverageError::read)?;
            let max_close = if payoff.is_zero() {
                U256::ZERO
            } else {
                wrapped_covering(reader, collateral, payoff).await?
            };
            (raw, max_close, None)
        }
        LeverageRoute::LiquidStaking {
            loan_mode: LoanMode::WrappedNative,
            ..
        } => {
            // deleverage_support() rejected this above
            return Err(LeverageError::unsupported("wrapped-native staking route is leverage only"));
        }
        LeverageRoute::Swap { swap_adapter, .. } => {
            let execution = price(
                reader,
                aggregator,
                ctx,
                swap_adapter,
                SwapLeg {
                    src: ctx.collateral_token(),
                    dest: ctx.loan_token(),
                    amount: withdraw,
                },
            )
            .await?;
            let max_close = if payoff.is_zero() {
                U256::ZERO
            } else {
                let reference = price(
                    reader,
                    aggregator,
                    ctx,
                    swap_adapter,
                    SwapLeg {
                        src: ctx.loan_token(),
                        dest: ctx.collateral_token(),
                        amount: payoff,
                    },
                )
                .await?;
                slippage_ceil(reference.dest_amount)
            };
            (slippage_floor(execution.dest_amount), max_close, Some(execution))
        }
    };

    let close_route = select_close_route(debt, position.borrow_shares, max_collateral_for_full_close, withdraw);
    // The loan-token sweep after a swap reverts on a zero balance, so the
    // repay stays one unit under the enforced minimum output.
    let repay_limit = if swap_route.is_some() {
        raw_route_repay_amount.saturating_sub(U256::from(1u64))
    } else {
        raw_route_repay_amount
    };
    let capped = min(repay_limit, debt);
    let repay_amount = if close_route { capped } else { apply_dust_rule(capped, debt) };
    let flash_loan_amount = if close_route { payoff } else { repay_amount };

    if !close_route && repay_amount.is_zero() && !debt.is_zero() {
        warn!(withdraw = %withdraw, "Withdrawal converts to zero loan tokens, nothing to repay");
    }

    let quote = DeleverageQuote {
        withdraw_amount: withdraw,
        repay_amount,
        raw_route_repay_amount,
        max_collateral_for_full_close,
        close_route,
        flash_loan_amount,
        current_borrow_assets: debt,
        current_borrow_shares: position.borrow_shares,
        current_collateral: position.collateral,
        repay_shares_estimate: repay_shares_with_buffer(
            repay_amount,
            market.total_borrow_assets,
            market.total_borrow_shares,
        ),
        projected_collateral_after: if close_route {
            U256::ZERO
        } else {
            position.collateral.saturating_sub(withdraw)
        },
        projected_debt_after: if close_route {
            U256::ZERO
        } else {
            debt.saturating_sub(repay_amount)
        },
        swap_route,
    };
    debug!(
        close_route = quote.close_route,
        repay = %quote.repay_amount,
        raw_repay = %quote.raw_route_repay_amount,
        max_close = %quote.max_collateral_for_full_close,
        flash_loan = %quote.flash_loan_amount,
        "Deleverage quote"
    );
    Ok(quote)
}
