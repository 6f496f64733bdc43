//! Atomic transaction bundles.
//!
//! Deterministic routes encode a flat action list for the purpose-built
//! bundler. The swap route encodes a nested `Call[]` list for the generalized
//! bundler, binding each flash-loan callback to its wrapping call by hash.
//! No call may skip a revert.

use alloy::primitives::{Address, Bytes, U256};
use leverage_chain::contracts::augustus::sell_offsets;
use leverage_chain::contracts::bundler3;
use leverage_chain::contracts::{Authorization, PermitSingle};
use leverage_chain::{ActionBuilder, Bundler3Call, GeneralAdapter, RawSignature, SwapAdapterCalls};
use tracing::{debug, instrument};

use crate::error::LeverageError;
use crate::quote::{DeleverageQuote, LeverageQuote};
use crate::route::{LeverageRoute, LoanMode, RouteContext, RouteKind};
use crate::u256_math::{max_repay_share_price_e27, min_borrow_share_price_e27, slippage_floor};
use crate::validate::ValidatedSwap;

/// Signed messages folded into the head of a deterministic-route bundle.
#[derive(Debug, Clone, Default)]
pub struct SignedPrefix {
    /// Lending-market authorization of the bundler
    pub authorization: Option<(Authorization, RawSignature)>,
    /// Permit2 transfer permit for the principal
    pub permit: Option<(PermitSingle, RawSignature)>,
}

impl SignedPrefix {
    pub fn is_empty(&self) -> bool {
        self.authorization.is_none() && self.permit.is_none()
    }
}

/// One ready-to-send transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionBundle {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub route: RouteKind,
    /// Top-level calls (flash-loan callbacks count as one)
    pub action_count: usize,
}

fn with_prefix(prefix: &SignedPrefix) -> ActionBuilder {
    match &prefix.authorization {
        Some((authorization, signature)) => {
            ActionBuilder::new().morpho_set_authorization_with_sig(authorization.clone(), signature.to_split())
        }
        None => ActionBuilder::new(),
    }
}

fn pull_principal(actions: ActionBuilder, prefix: &SignedPrefix, token: Address, amount: U256) -> ActionBuilder {
    match &prefix.permit {
        Some((permit, signature)) => actions
            .approve2(permit.clone(), signature.to_packed())
            .transfer_from2(token, amount),
        None => actions.erc20_transfer_from(token, amount),
    }
}

/// Run `callback` inside a flash loan of `amount`, or inline when nothing is borrowed.
fn flash_or_inline(actions: ActionBuilder, token: Address, amount: U256, callback: ActionBuilder) -> ActionBuilder {
    if amount.is_zero() {
        actions.extend(callback)
    } else {
        actions.morpho_flash_loan(token, amount, callback)
    }
}

fn flat_bundle(route: RouteKind, to: Address, actions: ActionBuilder) -> TransactionBundle {
    let action_count = actions.len();
    TransactionBundle {
        to,
        data: actions.build_multicall(),
        value: U256::ZERO,
        route,
        action_count,
    }
}

fn nested_bundle(to: Address, calls: Vec<Bundler3Call>) -> TransactionBundle {
    let action_count = calls.len();
    TransactionBundle {
        to,
        data: bundler3::multicall(calls),
        value: U256::ZERO,
        route: RouteKind::Swap,
        action_count,
    }
}

fn expect_swap<'a>(
    swap: Option<&'a ValidatedSwap>,
    src: Address,
    dest: Address,
    amount: U256,
) -> Result<&'a ValidatedSwap, LeverageError> {
    let swap = swap.ok_or_else(|| LeverageError::stale("no validated swap calldata for the swap route"))?;
    if swap.src_token != src || swap.dest_token != dest || swap.exact_input != amount {
        return Err(LeverageError::stale(format!(
            "swap sells {} {} for {}, bundle needs {} {} for {}",
            swap.exact_input, swap.src_token, swap.dest_token, amount, src, dest
        )));
    }
    Ok(swap)
}

/// Encode a leverage bundle for `quote`.
///
/// `swap` is required on the swap route and ignored elsewhere.
#[instrument(skip_all, fields(route = %ctx.route.kind(), flash_loan = %quote.flash_loan_amount))]
pub fn build_leverage_bundle(
    ctx: &RouteContext,
    quote: &LeverageQuote,
    swap: Option<&ValidatedSwap>,
    prefix: &SignedPrefix,
) -> Result<TransactionBundle, LeverageError> {
    let market = &ctx.market;
    let user = ctx.user;
    let loan_denominated = quote.principal_token == ctx.loan_token() && quote.principal_token != ctx.collateral_token();

    let bundle = match ctx.route {
        LeverageRoute::VaultShare { bundler, vault, .. } => {
            let mut actions = pull_principal(with_prefix(prefix), prefix, quote.principal_token, quote.principal);
            if loan_denominated {
                actions = actions.erc4626_deposit(
                    vault,
                    quote.principal,
                    slippage_floor(quote.principal_collateral),
                    bundler,
                );
            }

            let callback = if quote.needs_flash_loan() {
                ActionBuilder::new()
                    .erc4626_deposit(
                        vault,
                        quote.flash_loan_amount,
                        slippage_floor(quote.flash_collateral_amount),
                        bundler,
                    )
                    .morpho_supply_collateral(market.clone(), U256::MAX, user)
                    .morpho_borrow(market.clone(), quote.flash_loan_amount, quote.max_borrow_shares, bundler)
            } else {
                ActionBuilder::new().morpho_supply_collateral(market.clone(), U256::MAX, user)
            };

            flat_bundle(
                RouteKind::VaultShare,
                bundler,
                flash_or_inline(actions, ctx.loan_token(), quote.flash_loan_amount, callback),
            )
        }
        LeverageRoute::LiquidStaking { bundler, loan_mode, .. } => {
            let actions = pull_principal(with_prefix(prefix), prefix, quote.principal_token, quote.principal);

            let mut callback = ActionBuilder::new();
            if loan_mode == LoanMode::WrappedNative && (quote.needs_flash_loan() || loan_denominated) {
                let expected = if loan_denominated {
                    quote.total_collateral_after
                } else {
                    quote.flash_collateral_amount
                };
                // stETH shares equal wstETH units
                callback = callback
                    .unwrap_native(U256::MAX)
                    .stake_eth(U256::MAX, slippage_floor(expected));
            }
            if quote.needs_flash_loan() || loan_denominated {
                callback = callback.wrap_st_eth(U256::MAX);
            }
            callback = callback.morpho_supply_collateral(market.clone(), U256::MAX, user);
            if quote.needs_flash_loan() {
                callback =
                    callback.morpho_borrow(market.clone(), quote.flash_loan_amount, quote.max_borrow_shares, bundler);
            }

            flat_bundle(
                RouteKind::LiquidStaking,
                bundler,
                flash_or_inline(actions, ctx.loan_token(), quote.flash_loan_amount, callback),
            )
        }
        LeverageRoute::Swap {
            router,
            general_adapter,
            swap_adapter,
        } => {
            let adapter = GeneralAdapter::new(general_adapter);
            let mut calls = vec![adapter.erc20_transfer_from(ctx.collateral_token(), general_adapter, quote.principal)];

            if quote.needs_flash_loan() {
                let swap = expect_swap(swap, ctx.loan_token(), ctx.collateral_token(), quote.flash_loan_amount)?;
                let callback = vec![
                    adapter.erc20_transfer(ctx.loan_token(), swap_adapter, quote.flash_loan_amount),
                    SwapAdapterCalls::new(swap_adapter).sell(
                        swap.augustus,
                        swap.calldata.clone(),
                        ctx.loan_token(),
                        ctx.collateral_token(),
                        false,
                        sell_offsets(),
                        general_adapter,
                    ),
                    adapter.morpho_supply_collateral(market.clone(), U256::MAX, user),
                    adapter.morpho_borrow(
                        market.clone(),
                        quote.flash_loan_amount,
                        min_borrow_share_price_e27(quote.flash_loan_amount, quote.max_borrow_shares),
                        general_adapter,
                    ),
                ];
                calls.push(adapter.morpho_flash_loan(ctx.loan_token(), quote.flash_loan_amount, &callback));
            } else {
                calls.push(adapter.morpho_supply_collateral(market.clone(), U256::MAX, user));
            }

            nested_bundle(router, calls)
        }
    };

    debug!(to = %bundle.to, actions = bundle.action_count, bytes = bundle.data.len(), "Leverage bundle built");
    Ok(bundle)
}

/// Encode a deleverage bundle for `quote`.
#[instrument(skip_all, fields(route = %ctx.route.kind(), close = quote.close_route, flash_loan = %quote.flash_loan_amount))]
pub fn build_deleverage_bundle(
    ctx: &RouteContext,
    quote: &DeleverageQuote,
    swap: Option<&ValidatedSwap>,
    prefix: &SignedPrefix,
) -> Result<TransactionBundle, LeverageError> {
    let market = &ctx.market;
    let user = ctx.user;
    let leftover = quote.current_collateral.saturating_sub(quote.withdraw_amount);

    let bundle = match ctx.route {
        LeverageRoute::VaultShare { bundler, .. }
        | LeverageRoute::LiquidStaking {
            bundler,
            loan_mode: LoanMode::Direct,
            ..
        } => {
            let mut callback = ActionBuilder::new();
            if quote.close_route {
                callback = callback.morpho_repay_shares(
                    market.clone(),
                    quote.current_borrow_shares,
                    quote.flash_loan_amount,
                    user,
                );
            } else if !quote.repay_amount.is_zero() {
                callback = callback.morpho_repay_assets(market.clone(), quote.repay_amount, U256::from(1u64), user);
            }
            callback = callback.morpho_withdraw_collateral(market.clone(), quote.withdraw_amount, bundler);
            callback = match ctx.route {
                LeverageRoute::VaultShare { vault, .. } => callback.erc4626_redeem(
                    vault,
                    quote.withdraw_amount,
                    slippage_floor(quote.raw_route_repay_amount),
                    bundler,
                    bundler,
                ),
                _ => callback.unwrap_st_eth(quote.withdraw_amount),
            };
            if quote.close_route && !leftover.is_zero() {
                callback = callback.morpho_withdraw_collateral(market.clone(), leftover, user);
            }

            let mut actions = flash_or_inline(with_prefix(prefix), ctx.loan_token(), quote.flash_loan_amount, callback);
            // A zero-amount transfer reverts, so sweep only when something is left over.
            if quote.close_route || quote.repay_amount < quote.raw_route_repay_amount {
                actions = actions.erc20_transfer(ctx.loan_token(), user, U256::MAX);
            }

            flat_bundle(ctx.route.kind(), bundler, actions)
        }
        LeverageRoute::LiquidStaking {
            loan_mode: LoanMode::WrappedNative,
            ..
        } => {
            return Err(LeverageError::unsupported("wrapped-native staking route is leverage only"));
        }
        LeverageRoute::Swap {
            router,
            general_adapter,
            swap_adapter,
        } => {
            let swap = expect_swap(swap, ctx.collateral_token(), ctx.loan_token(), quote.withdraw_amount)?;
            let adapter = GeneralAdapter::new(general_adapter);

            let mut callback = Vec::with_capacity(4);
            if quote.close_route {
                callback.push(adapter.morpho_repay_shares(
                    market.clone(),
                    quote.current_borrow_shares,
                    max_repay_share_price_e27(quote.flash_loan_amount, quote.current_borrow_shares),
                    user,
                ));
            } else if !quote.repay_amount.is_zero() {
                callback.push(adapter.morpho_repay_assets(
                    market.clone(),
                    quote.repay_amount,
                    max_repay_share_price_e27(quote.repay_amount, U256::from(1u64)),
                    user,
                ));
            }
            callback.push(adapter.morpho_withdraw_collateral(market.clone(), quote.withdraw_amount, swap_adapter));
            callback.push(SwapAdapterCalls::new(swap_adapter).sell(
                swap.augustus,
                swap.calldata.clone(),
                ctx.collateral_token(),
                ctx.loan_token(),
                false,
                sell_offsets(),
                general_adapter,
            ));
            if quote.close_route && !leftover.is_zero() {
                callback.push(adapter.morpho_withdraw_collateral(market.clone(), leftover, user));
            }

            let mut calls = if quote.needs_flash_loan() {
                vec![adapter.morpho_flash_loan(ctx.loan_token(), quote.flash_loan_amount, &callback)]
            } else {
                callback
            };
            // The quoted repay stays below the enforced swap output, so the sweep never moves zero.
            calls.push(adapter.erc20_transfer(ctx.loan_token(), user, U256::MAX));

            nested_bundle(router, calls)
        }
    };

    debug!(to = %bundle.to, actions = bundle.action_count, bytes = bundle.data.len(), "Deleverage bundle built");
    Ok(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainDeployment;
    use crate::testing::{augustus_calldata, AUGUSTUS};
    use alloy::primitives::B256;
    use alloy::sol_types::{SolCall, SolValue};
    use leverage_chain::contracts::{IBundler3, IBundlerV2, IGeneralAdapter1, IParaswapAdapter};
    use leverage_chain::{callback_hash, MarketParams};

    const BUNDLER: Address = Address::repeat_byte(0xb1);
    const VAULT: Address = Address::repeat_byte(0x44);
    const LOAN: Address = Address::repeat_byte(0x45);
    const USER: Address = Address::repeat_byte(0x99);
    const ROUTER: Address = Address::repeat_byte(0x03);
    const GA1: Address = Address::repeat_byte(0x0a);
    const PARASWAP: Address = Address::repeat_byte(0x05);

    fn u(x: u64) -> U256 {
        U256::from(x)
    }

    fn ctx(route: LeverageRoute) -> RouteContext {
        let market = MarketParams {
            loanToken: LOAN,
            collateralToken: VAULT,
            ..Default::default()
        };
        RouteContext::new(&ChainDeployment::mainnet(), USER, market, route)
    }

    fn vault_route() -> LeverageRoute {
        LeverageRoute::VaultShare {
            bundler: BUNDLER,
            vault: VAULT,
            underlying: LOAN,
        }
    }

    fn swap_route() -> LeverageRoute {
        LeverageRoute::Swap {
            router: ROUTER,
            general_adapter: GA1,
            swap_adapter: PARASWAP,
        }
    }

    fn leverage_quote(flash_loan: u64) -> LeverageQuote {
        LeverageQuote {
            principal: u(1_000),
            principal_token: VAULT,
            principal_collateral: u(1_000),
            flash_collateral_amount: u(flash_loan),
            flash_loan_amount: u(flash_loan),
            total_collateral_after: u(1_000 + flash_loan),
            max_borrow_shares: u(flash_loan) * u(1_000_000),
            projected_collateral_after: u(1_000 + flash_loan),
            projected_debt_after: u(flash_loan),
            swap_route: None,
        }
    }

    fn deleverage_quote(close_route: bool) -> DeleverageQuote {
        DeleverageQuote {
            withdraw_amount: u(if close_route { 1_005 } else { 400 }),
            repay_amount: u(if close_route { 1_000 } else { 400 }),
            raw_route_repay_amount: u(if close_route { 1_005 } else { 400 }),
            max_collateral_for_full_close: u(1_005),
            close_route,
            flash_loan_amount: u(if close_route { 1_005 } else { 400 }),
            current_borrow_assets: u(1_000),
            current_borrow_shares: u(1_000_000_000),
            current_collateral: u(10_000),
            repay_shares_estimate: U256::ZERO,
            projected_collateral_after: U256::ZERO,
            projected_debt_after: U256::ZERO,
            swap_route: None,
        }
    }

    fn swap(src: Address, dest: Address, amount: u64) -> ValidatedSwap {
        ValidatedSwap {
            augustus: AUGUSTUS,
            calldata: augustus_calldata(src, dest, u(amount), slippage_floor(u(amount)), u(amount)),
            src_token: src,
            dest_token: dest,
            exact_input: u(amount),
            quoted_output: u(amount),
            min_output: slippage_floor(u(amount)),
        }
    }

    fn selectors(actions: &[Bytes]) -> Vec<[u8; 4]> {
        actions
            .iter()
            .map(|a| [a[0], a[1], a[2], a[3]])
            .collect()
    }

    fn flat_actions(bundle: &TransactionBundle) -> Vec<Bytes> {
        IBundlerV2::multicallCall::abi_decode(&bundle.data, true).unwrap().data
    }

    fn callback_actions(flash_loan: &Bytes) -> Vec<Bytes> {
        let call = IBundlerV2::morphoFlashLoanCall::abi_decode(flash_loan, true).unwrap();
        Vec::<Bytes>::abi_decode(&call.data, true).unwrap()
    }

    #[test]
    fn test_vault_leverage_shape() {
        let bundle =
            build_leverage_bundle(&ctx(vault_route()), &leverage_quote(2_000), None, &SignedPrefix::default()).unwrap();
        assert_eq!(bundle.to, BUNDLER);

        let actions = flat_actions(&bundle);
        assert_eq!(
            selectors(&actions),
            vec![
                IBundlerV2::erc20TransferFromCall::SELECTOR,
                IBundlerV2::morphoFlashLoanCall::SELECTOR
            ]
        );

        let callback = callback_actions(&actions[1]);
        assert_eq!(
            selectors(&callback),
            vec![
                IBundlerV2::erc4626DepositCall::SELECTOR,
                IBundlerV2::morphoSupplyCollateralCall::SELECTOR,
                IBundlerV2::morphoBorrowCall::SELECTOR,
            ]
        );

        let deposit = IBundlerV2::erc4626DepositCall::abi_decode(&callback[0], true).unwrap();
        assert_eq!(deposit.assets, u(2_000));
        assert_eq!(deposit.minShares, slippage_floor(u(2_000)));

        let borrow = IBundlerV2::morphoBorrowCall::abi_decode(&callback[2], true).unwrap();
        assert_eq!(borrow.receiver, BUNDLER);
        assert_eq!(borrow.slippageAmount, u(2_000_000_000));
    }

    #[test]
    fn test_signed_prefix_leads_the_bundle() {
        let authorization = leverage_chain::contracts::morpho::authorization(USER, BUNDLER, U256::ZERO, 100);
        let permit = leverage_chain::contracts::morpho::permit_single(VAULT, u(1_000), BUNDLER, 0, 100, 100);
        let signature = RawSignature::from_parts(u(1), u(2), true);
        let prefix = SignedPrefix {
            authorization: Some((authorization, signature)),
            permit: Some((permit, signature)),
        };

        let bundle = build_leverage_bundle(&ctx(vault_route()), &leverage_quote(2_000), None, &prefix).unwrap();
        assert_eq!(
            selectors(&flat_actions(&bundle)),
            vec![
                IBundlerV2::morphoSetAuthorizationWithSigCall::SELECTOR,
                IBundlerV2::approve2Call::SELECTOR,
                IBundlerV2::transferFrom2Call::SELECTOR,
                IBundlerV2::morphoFlashLoanCall::SELECTOR,
            ]
        );
    }

    #[test]
    fn test_one_x_leverage_skips_flash_loan() {
        let bundle =
            build_leverage_bundle(&ctx(vault_route()), &leverage_quote(0), None, &SignedPrefix::default()).unwrap();
        assert_eq!(
            selectors(&flat_actions(&bundle)),
            vec![
                IBundlerV2::erc20TransferFromCall::SELECTOR,
                IBundlerV2::morphoSupplyCollateralCall::SELECTOR
            ]
        );
    }

    #[test]
    fn test_wrapped_native_staking_leverage() {
        let route = LeverageRoute::LiquidStaking {
            bundler: BUNDLER,
            collateral: VAULT,
            paired: LOAN,
            loan_mode: LoanMode::WrappedNative,
        };
        let bundle = build_leverage_bundle(&ctx(route), &leverage_quote(2_000), None, &SignedPrefix::default()).unwrap();
        let actions = flat_actions(&bundle);
        assert_eq!(
            selectors(&callback_actions(&actions[1])),
            vec![
                IBundlerV2::unwrapNativeCall::SELECTOR,
                IBundlerV2::stakeEthCall::SELECTOR,
                IBundlerV2::wrapStEthCall::SELECTOR,
                IBundlerV2::morphoSupplyCollateralCall::SELECTOR,
                IBundlerV2::morphoBorrowCall::SELECTOR,
            ]
        );

        let err = build_deleverage_bundle(&ctx(route), &deleverage_quote(false), None, &SignedPrefix::default())
            .unwrap_err();
        assert!(matches!(err, LeverageError::UnsupportedRoute { .. }));
    }

    fn staking_route() -> LeverageRoute {
        LeverageRoute::LiquidStaking {
            bundler: BUNDLER,
            collateral: VAULT,
            paired: LOAN,
            loan_mode: LoanMode::Direct,
        }
    }

    #[test]
    fn test_direct_staking_leverage_wraps_before_supply() {
        let bundle =
            build_leverage_bundle(&ctx(staking_route()), &leverage_quote(2_000), None, &SignedPrefix::default())
                .unwrap();
        assert_eq!(bundle.to, BUNDLER);
        assert_eq!(bundle.route, RouteKind::LiquidStaking);

        let actions = flat_actions(&bundle);
        assert_eq!(
            selectors(&actions),
            vec![
                IBundlerV2::erc20TransferFromCall::SELECTOR,
                IBundlerV2::morphoFlashLoanCall::SELECTOR
            ]
        );
        let flash = IBundlerV2::morphoFlashLoanCall::abi_decode(&actions[1], true).unwrap();
        assert_eq!(flash.token, LOAN);
        assert_eq!(flash.assets, u(2_000));

        let callback = callback_actions(&actions[1]);
        assert_eq!(
            selectors(&callback),
            vec![
                IBundlerV2::wrapStEthCall::SELECTOR,
                IBundlerV2::morphoSupplyCollateralCall::SELECTOR,
                IBundlerV2::morphoBorrowCall::SELECTOR,
            ]
        );
        let wrap = IBundlerV2::wrapStEthCall::abi_decode(&callback[0], true).unwrap();
        assert_eq!(wrap.amount, U256::MAX);
    }

    #[test]
    fn test_direct_staking_close_deleverage_unwraps_withdrawal() {
        let quote = deleverage_quote(true);
        let bundle =
            build_deleverage_bundle(&ctx(staking_route()), &quote, None, &SignedPrefix::default()).unwrap();
        assert_eq!(bundle.route, RouteKind::LiquidStaking);

        let actions = flat_actions(&bundle);
        assert_eq!(
            selectors(&actions),
            vec![
                IBundlerV2::morphoFlashLoanCall::SELECTOR,
                IBundlerV2::erc20TransferCall::SELECTOR
            ]
        );

        let callback = callback_actions(&actions[0]);
        assert_eq!(
            selectors(&callback),
            vec![
                IBundlerV2::morphoRepayCall::SELECTOR,
                IBundlerV2::morphoWithdrawCollateralCall::SELECTOR,
                IBundlerV2::unwrapStEthCall::SELECTOR,
                IBundlerV2::morphoWithdrawCollateralCall::SELECTOR,
            ]
        );
        let unwrap = IBundlerV2::unwrapStEthCall::abi_decode(&callback[2], true).unwrap();
        assert_eq!(unwrap.amount, quote.withdraw_amount);
    }

    #[test]
    fn test_direct_staking_partial_deleverage() {
        let bundle =
            build_deleverage_bundle(&ctx(staking_route()), &deleverage_quote(false), None, &SignedPrefix::default())
                .unwrap();
        let actions = flat_actions(&bundle);
        assert_eq!(actions.len(), 1);
        assert_eq!(
            selectors(&callback_actions(&actions[0])),
            vec![
                IBundlerV2::morphoRepayCall::SELECTOR,
                IBundlerV2::morphoWithdrawCollateralCall::SELECTOR,
                IBundlerV2::unwrapStEthCall::SELECTOR,
            ]
        );
    }

    #[test]
    fn test_vault_close_deleverage() {
        let bundle =
            build_deleverage_bundle(&ctx(vault_route()), &deleverage_quote(true), None, &SignedPrefix::default())
                .unwrap();
        let actions = flat_actions(&bundle);
        assert_eq!(
            selectors(&actions),
            vec![
                IBundlerV2::morphoFlashLoanCall::SELECTOR,
                IBundlerV2::erc20TransferCall::SELECTOR
            ]
        );

        let flash = IBundlerV2::morphoFlashLoanCall::abi_decode(&actions[0], true).unwrap();
        assert_eq!(flash.assets, u(1_005));

        let callback = callback_actions(&actions[0]);
        assert_eq!(
            selectors(&callback),
            vec![
                IBundlerV2::morphoRepayCall::SELECTOR,
                IBundlerV2::morphoWithdrawCollateralCall::SELECTOR,
                IBundlerV2::erc4626RedeemCall::SELECTOR,
                IBundlerV2::morphoWithdrawCollateralCall::SELECTOR,
            ]
        );
        let repay = IBundlerV2::morphoRepayCall::abi_decode(&callback[0], true).unwrap();
        assert_eq!(repay.assets, U256::ZERO);
        assert_eq!(repay.shares, u(1_000_000_000));
        assert_eq!(repay.slippageAmount, u(1_005));

        let leftover = IBundlerV2::morphoWithdrawCollateralCall::abi_decode(&callback[3], true).unwrap();
        assert_eq!(leftover.assets, u(10_000 - 1_005));
        assert_eq!(leftover.receiver, USER);
    }

    #[test]
    fn test_vault_partial_deleverage_repays_assets_without_sweep() {
        let bundle =
            build_deleverage_bundle(&ctx(vault_route()), &deleverage_quote(false), None, &SignedPrefix::default())
                .unwrap();
        let actions = flat_actions(&bundle);
        // repay equals the redeemed amount, nothing to sweep
        assert_eq!(actions.len(), 1);

        let callback = callback_actions(&actions[0]);
        let repay = IBundlerV2::morphoRepayCall::abi_decode(&callback[0], true).unwrap();
        assert_eq!(repay.assets, u(400));
        assert_eq!(repay.shares, U256::ZERO);
        assert_eq!(repay.slippageAmount, u(1));
        assert_eq!(callback.len(), 3);
    }

    #[test]
    fn test_swap_leverage_binds_callback_hash() {
        let quote = leverage_quote(2_000);
        let validated = swap(LOAN, VAULT, 2_000);
        let bundle =
            build_leverage_bundle(&ctx(swap_route()), &quote, Some(&validated), &SignedPrefix::default()).unwrap();
        assert_eq!(bundle.to, ROUTER);

        let calls = IBundler3::multicallCall::abi_decode(&bundle.data, true).unwrap().bundle;
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| !c.skipRevert));
        assert_eq!(calls[0].callbackHash, B256::ZERO);

        let flash = IGeneralAdapter1::morphoFlashLoanCall::abi_decode(&calls[1].data, true).unwrap();
        let callback = Vec::<Bundler3Call>::abi_decode(&flash.data, true).unwrap();
        assert_eq!(calls[1].callbackHash, callback_hash(&callback));
        assert_eq!(callback.len(), 4);
        assert_eq!(callback[1].to, PARASWAP);

        let sell = IParaswapAdapter::sellCall::abi_decode(&callback[1].data, true).unwrap();
        assert_eq!(sell.callData, validated.calldata);
        assert_eq!(sell.receiver, GA1);
        assert!(!sell.sellEntireBalance);

        let borrow = IGeneralAdapter1::morphoBorrowCall::abi_decode(&callback[3].data, true).unwrap();
        assert_eq!(
            borrow.minSharePriceE27,
            min_borrow_share_price_e27(u(2_000), quote.max_borrow_shares)
        );
    }

    #[test]
    fn test_swap_leverage_rejects_mismatched_swap() {
        let err = build_leverage_bundle(
            &ctx(swap_route()),
            &leverage_quote(2_000),
            Some(&swap(LOAN, VAULT, 1_999)),
            &SignedPrefix::default(),
        )
        .unwrap_err();
        assert!(err.is_stale_quote());

        let err = build_leverage_bundle(&ctx(swap_route()), &leverage_quote(2_000), None, &SignedPrefix::default())
            .unwrap_err();
        assert!(err.is_stale_quote());
    }

    #[test]
    fn test_swap_close_deleverage() {
        let quote = deleverage_quote(true);
        let bundle = build_deleverage_bundle(
            &ctx(swap_route()),
            &quote,
            Some(&swap(VAULT, LOAN, 1_005)),
            &SignedPrefix::default(),
        )
        .unwrap();

        let calls = IBundler3::multicallCall::abi_decode(&bundle.data, true).unwrap().bundle;
        assert_eq!(calls.len(), 2);
        let sweep = IGeneralAdapter1::erc20TransferCall::abi_decode(&calls[1].data, true).unwrap();
        assert_eq!(sweep.receiver, USER);
        assert_eq!(sweep.amount, U256::MAX);

        let flash = IGeneralAdapter1::morphoFlashLoanCall::abi_decode(&calls[0].data, true).unwrap();
        let callback = Vec::<Bundler3Call>::abi_decode(&flash.data, true).unwrap();
        assert_eq!(callback.len(), 4);

        let repay = IGeneralAdapter1::morphoRepayCall::abi_decode(&callback[0].data, true).unwrap();
        assert_eq!(repay.shares, quote.current_borrow_shares);
        assert_eq!(
            repay.maxSharePriceE27,
            max_repay_share_price_e27(u(1_005), quote.current_borrow_shares)
        );

        let withdraw = IGeneralAdapter1::morphoWithdrawCollateralCall::abi_decode(&callback[1].data, true).unwrap();
        assert_eq!(withdraw.receiver, PARASWAP);
    }

    #[test]
    fn test_swap_partial_deleverage_repays_assets_then_sweeps() {
        let mut quote = deleverage_quote(false);
        quote.raw_route_repay_amount = slippage_floor(u(400));
        quote.repay_amount = quote.raw_route_repay_amount - u(1);
        quote.flash_loan_amount = quote.repay_amount;
        let bundle = build_deleverage_bundle(
            &ctx(swap_route()),
            &quote,
            Some(&swap(VAULT, LOAN, 400)),
            &SignedPrefix::default(),
        )
        .unwrap();
        assert_eq!(bundle.to, ROUTER);

        let calls = IBundler3::multicallCall::abi_decode(&bundle.data, true).unwrap().bundle;
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| !c.skipRevert));

        let flash = IGeneralAdapter1::morphoFlashLoanCall::abi_decode(&calls[0].data, true).unwrap();
        assert_eq!(flash.assets, u(397));
        let callback = Vec::<Bundler3Call>::abi_decode(&flash.data, true).unwrap();
        assert_eq!(calls[0].callbackHash, callback_hash(&callback));
        // no leftover withdrawal on a partial unwind
        assert_eq!(callback.len(), 3);

        let repay = IGeneralAdapter1::morphoRepayCall::abi_decode(&callback[0].data, true).unwrap();
        assert_eq!(repay.assets, u(397));
        assert_eq!(repay.shares, U256::ZERO);
        assert_eq!(repay.maxSharePriceE27, max_repay_share_price_e27(u(397), u(1)));

        let withdraw = IGeneralAdapter1::morphoWithdrawCollateralCall::abi_decode(&callback[1].data, true).unwrap();
        assert_eq!(withdraw.assets, u(400));
        assert_eq!(withdraw.receiver, PARASWAP);

        let sell = IParaswapAdapter::sellCall::abi_decode(&callback[2].data, true).unwrap();
        assert_eq!(sell.receiver, GA1);
        assert!(quote.repay_amount < swap(VAULT, LOAN, 400).min_output);

        let sweep = IGeneralAdapter1::erc20TransferCall::abi_decode(&calls[1].data, true).unwrap();
        assert_eq!(sweep.token, LOAN);
        assert_eq!(sweep.amount, U256::MAX);
    }
}
