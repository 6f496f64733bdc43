//! Route classification.
//!
//! A (chain, collateral, loan) pair resolves to at most one [`LeverageRoute`].
//! Classification happens once; the resulting [`RouteContext`] is immutable
//! and is passed explicitly through quoting, bundling and execution.

use alloy::primitives::{Address, B256};
use leverage_chain::{LeverageReader, MarketParams};
use std::fmt;
use tracing::{debug, info, instrument};

use crate::config::ChainDeployment;
use crate::error::LeverageError;

/// How the loan token of a liquid-staking route relates to the staking token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanMode {
    /// Loan token is the rebasing staking token itself.
    Direct,
    /// Loan token is the chain's wrapped native token. Leverage only.
    WrappedNative,
}

/// Route kinds, for logging and plan selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    VaultShare,
    LiquidStaking,
    Swap,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteKind::VaultShare => write!(f, "vault-share"),
            RouteKind::LiquidStaking => write!(f, "liquid-staking"),
            RouteKind::Swap => write!(f, "swap"),
        }
    }
}

/// Strategy used to loop collateral and debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeverageRoute {
    /// Collateral is an ERC-4626 vault whose underlying asset is the loan token.
    VaultShare {
        bundler: Address,
        vault: Address,
        underlying: Address,
    },
    /// Collateral is the wrapped staking token.
    LiquidStaking {
        bundler: Address,
        collateral: Address,
        paired: Address,
        loan_mode: LoanMode,
    },
    /// Anything else, priced by the swap aggregator.
    Swap {
        router: Address,
        general_adapter: Address,
        swap_adapter: Address,
    },
}

impl LeverageRoute {
    pub fn kind(&self) -> RouteKind {
        match self {
            LeverageRoute::VaultShare { .. } => RouteKind::VaultShare,
            LeverageRoute::LiquidStaking { .. } => RouteKind::LiquidStaking,
            LeverageRoute::Swap { .. } => RouteKind::Swap,
        }
    }

    /// Contract the bundle transaction is sent to.
    pub fn execution_target(&self) -> Address {
        match self {
            LeverageRoute::VaultShare { bundler, .. } | LeverageRoute::LiquidStaking { bundler, .. } => *bundler,
            LeverageRoute::Swap { router, .. } => *router,
        }
    }

    /// Account that must be authorized to manage the user's position.
    pub fn position_operator(&self) -> Address {
        match self {
            LeverageRoute::VaultShare { bundler, .. } | LeverageRoute::LiquidStaking { bundler, .. } => *bundler,
            LeverageRoute::Swap { general_adapter, .. } => *general_adapter,
        }
    }

    /// Account that pulls the user's tokens.
    pub fn token_spender(&self) -> Address {
        self.position_operator()
    }

    /// Whether authorization and token permits may be signed and folded into the bundle.
    pub fn supports_signature_auth(&self) -> bool {
        match self {
            LeverageRoute::VaultShare { .. } | LeverageRoute::LiquidStaking { .. } => true,
            LeverageRoute::Swap { .. } => false,
        }
    }

    /// `Err(reason)` when this route cannot unwind positions.
    pub fn deleverage_support(&self) -> Result<(), String> {
        match self {
            LeverageRoute::LiquidStaking {
                loan_mode: LoanMode::WrappedNative,
                ..
            } => Err("deleverage is not available when the loan token is the wrapped native token".to_string()),
            LeverageRoute::VaultShare { .. }
            | LeverageRoute::LiquidStaking {
                loan_mode: LoanMode::Direct,
                ..
            }
            | LeverageRoute::Swap { .. } => Ok(()),
        }
    }
}

/// Outcome of classification for both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSelection {
    pub route: Option<LeverageRoute>,
    pub leverage: Result<(), String>,
    pub deleverage: Result<(), String>,
}

impl RouteSelection {
    fn found(route: LeverageRoute) -> Self {
        Self {
            route: Some(route),
            leverage: Ok(()),
            deleverage: route.deleverage_support(),
        }
    }

    fn none(reason: String) -> Self {
        Self {
            route: None,
            leverage: Err(reason.clone()),
            deleverage: Err(reason),
        }
    }

    pub fn leverage_route(&self) -> Result<LeverageRoute, LeverageError> {
        match (&self.route, &self.leverage) {
            (Some(route), Ok(())) => Ok(*route),
            (_, Err(reason)) => Err(LeverageError::unsupported(reason.clone())),
            (None, Ok(())) => Err(LeverageError::unsupported("no route")),
        }
    }

    pub fn deleverage_route(&self) -> Result<LeverageRoute, LeverageError> {
        match (&self.route, &self.deleverage) {
            (Some(route), Ok(())) => Ok(*route),
            (_, Err(reason)) => Err(LeverageError::unsupported(reason.clone())),
            (None, Ok(())) => Err(LeverageError::unsupported("no route")),
        }
    }
}

/// Determine the route for `market` on `deployment`'s chain.
///
/// Read failures while probing are treated as "not this route", never as errors.
#[instrument(skip(reader, deployment, market), fields(chain_id = deployment.chain_id, collateral = %market.collateralToken, loan = %market.loanToken))]
pub async fn classify_route(
    reader: &dyn LeverageReader,
    deployment: &ChainDeployment,
    market: &MarketParams,
) -> RouteSelection {
    let collateral = market.collateralToken;
    let loan = market.loanToken;

    if let Some(bundler) = deployment.bundler {
        match reader.vault_asset(collateral).await {
            Ok(asset) if asset == loan => {
                info!(route = %RouteKind::VaultShare, "Route selected");
                return RouteSelection::found(LeverageRoute::VaultShare {
                    bundler,
                    vault: collateral,
                    underlying: asset,
                });
            }
            Ok(asset) => debug!(asset = %asset, "Collateral vault asset is not the loan token"),
            Err(e) => debug!(error = %e, "Collateral is not a vault"),
        }

        if let Some(pair) = deployment.liquid_staking {
            if collateral == pair.wst_eth {
                let loan_mode = if loan == pair.st_eth {
                    Some(LoanMode::Direct)
                } else if deployment.wrapped_native == Some(loan) {
                    Some(LoanMode::WrappedNative)
                } else {
                    None
                };

                if let Some(loan_mode) = loan_mode {
                    info!(route = %RouteKind::LiquidStaking, loan_mode = ?loan_mode, "Route selected");
                    return RouteSelection::found(LeverageRoute::LiquidStaking {
                        bundler,
                        collateral,
                        paired: loan,
                        loan_mode,
                    });
                }
            }
        }
    }

    if let Some(generalized) = deployment.generalized {
        info!(route = %RouteKind::Swap, "Route selected");
        return RouteSelection::found(LeverageRoute::Swap {
            router: generalized.bundler3,
            general_adapter: generalized.general_adapter,
            swap_adapter: generalized.swap_adapter,
        });
    }

    let reason = format!(
        "no leverage route for collateral {collateral} and loan token {loan} on chain {}",
        deployment.chain_id
    );
    info!(reason = %reason, "No route");
    RouteSelection::none(reason)
}

/// Everything fixed for one quote-build-submit cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteContext {
    pub chain_id: u64,
    pub user: Address,
    pub market: MarketParams,
    pub market_id: B256,
    pub morpho: Address,
    pub permit2: Address,
    pub route: LeverageRoute,
}

impl RouteContext {
    pub fn new(deployment: &ChainDeployment, user: Address, market: MarketParams, route: LeverageRoute) -> Self {
        Self {
            chain_id: deployment.chain_id,
            user,
            market_id: market.id(),
            market,
            morpho: deployment.morpho,
            permit2: deployment.permit2,
            route,
        }
    }

    pub fn collateral_token(&self) -> Address {
        self.market.collateralToken
    }

    pub fn loan_token(&self) -> Address {
        self.market.loanToken
    }
}
