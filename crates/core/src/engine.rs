//! Engine facade: route lookup, quoting, bundle preparation and execution.

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use leverage_api::{AggregatorRegistry, PriceAggregator, PriceRoute, SwapBuildParams, VeloraClient};
use leverage_chain::{LeverageReader, MarketParams, WalletClient};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::bundle::{build_deleverage_bundle, build_leverage_bundle, SignedPrefix, TransactionBundle};
use crate::config::{ChainDeployment, DeploymentRegistry, EngineConfig};
use crate::error::LeverageError;
use crate::orchestrator::{
    AuthMode, BundlePreparer, FlowKind, FlowObserver, FlowOrchestrator, FlowState, TokenPull,
};
use crate::quote::{
    principal_token, quote_deleverage, quote_leverage, DeleverageQuote, DeleverageRequest, LeverageQuote,
    LeverageRequest,
};
use crate::route::{classify_route, LeverageRoute, RouteContext, RouteSelection};
use crate::sequencer::QuoteSequencer;
use crate::touched::{InMemoryTouchedMarkets, TouchedMarketStore};
use crate::u256_math::slippage_floor;
use crate::validate::{validate_swap, ValidatedSwap};

/// Shared entry point for every leverage and deleverage action.
#[derive(Debug, Clone)]
pub struct LeverageEngine {
    reader: Arc<dyn LeverageReader>,
    aggregators: AggregatorRegistry,
    deployments: DeploymentRegistry,
    config: EngineConfig,
    touched: Arc<dyn TouchedMarketStore>,
}

impl LeverageEngine {
    /// Engine with a Velora client configured from `config.aggregator`.
    pub fn new(reader: Arc<dyn LeverageReader>, deployments: DeploymentRegistry, config: EngineConfig) -> Self {
        let velora = VeloraClient::new()
            .with_base_url(config.aggregator.base_url.clone())
            .with_partner(config.aggregator.partner.clone());
        Self {
            reader,
            aggregators: AggregatorRegistry::new().with_aggregator(Arc::new(velora)),
            deployments,
            config,
            touched: Arc::new(InMemoryTouchedMarkets::new()),
        }
    }

    pub fn with_aggregators(mut self, aggregators: AggregatorRegistry) -> Self {
        self.aggregators = aggregators;
        self
    }

    pub fn with_touched_store(mut self, touched: Arc<dyn TouchedMarketStore>) -> Self {
        self.touched = touched;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn touched_markets(&self) -> &Arc<dyn TouchedMarketStore> {
        &self.touched
    }

    /// Fresh last-request-wins scheduler using the configured debounce.
    pub fn quote_sequencer(&self) -> QuoteSequencer {
        QuoteSequencer::new(self.config.quote.debounce())
    }

    pub fn deployment(&self, chain_id: u64) -> Result<&ChainDeployment, LeverageError> {
        self.deployments
            .get(chain_id)
            .ok_or_else(|| LeverageError::unsupported(format!("no deployment for chain {chain_id}")))
    }

    fn aggregator(&self, chain_id: u64) -> Option<Arc<dyn PriceAggregator>> {
        self.aggregators.for_chain(chain_id)
    }

    pub async fn classify(&self, chain_id: u64, market: &MarketParams) -> Result<RouteSelection, LeverageError> {
        let deployment = self.deployment(chain_id)?;
        Ok(classify_route(self.reader.as_ref(), deployment, market).await)
    }

    /// Context for leveraging `user`'s position in `market`.
    pub async fn leverage_context(
        &self,
        chain_id: u64,
        user: Address,
        market: MarketParams,
    ) -> Result<RouteContext, LeverageError> {
        let route = self.classify(chain_id, &market).await?.leverage_route()?;
        Ok(RouteContext::new(self.deployment(chain_id)?, user, market, route))
    }

    /// Context for unwinding `user`'s position in `market`.
    pub async fn deleverage_context(
        &self,
        chain_id: u64,
        user: Address,
        market: MarketParams,
    ) -> Result<RouteContext, LeverageError> {
        let route = self.classify(chain_id, &market).await?.deleverage_route()?;
        Ok(RouteContext::new(self.deployment(chain_id)?, user, market, route))
    }

    pub async fn quote_leverage(
        &self,
        ctx: &RouteContext,
        request: &LeverageRequest,
    ) -> Result<LeverageQuote, LeverageError> {
        let aggregator = self.aggregator(ctx.chain_id);
        quote_leverage(self.reader.as_ref(), aggregator.as_deref(), ctx, request).await
    }

    pub async fn quote_deleverage(
        &self,
        ctx: &RouteContext,
        request: &DeleverageRequest,
    ) -> Result<DeleverageQuote, LeverageError> {
        let aggregator = self.aggregator(ctx.chain_id);
        quote_deleverage(self.reader.as_ref(), aggregator.as_deref(), ctx, request).await
    }

    /// Fetch and verify swap calldata for `price_route` selling `requested`.
    async fn swap_calldata(
        &self,
        ctx: &RouteContext,
        price_route: Option<&PriceRoute>,
        requested: U256,
    ) -> Result<Option<ValidatedSwap>, LeverageError> {
        let LeverageRoute::Swap { swap_adapter, .. } = ctx.route else {
            return Ok(None);
        };
        let Some(price_route) = price_route else {
            return Ok(None);
        };
        if requested.is_zero() {
            return Ok(None);
        }
        let aggregator = self
            .aggregator(ctx.chain_id)
            .ok_or_else(|| LeverageError::unsupported(format!("no swap aggregator for chain {}", ctx.chain_id)))?;

        // The adapter sells from its own balance and keeps the output until sweeping it.
        let tx = aggregator
            .build_swap_calldata(
                price_route,
                SwapBuildParams {
                    taker: swap_adapter,
                    receiver: swap_adapter,
                    min_output: slippage_floor(price_route.dest_amount),
                },
            )
            .await?;
        validate_swap(price_route, &tx, requested).map(Some)
    }

    /// Quote, fetch calldata if needed, and encode a leverage bundle.
    #[instrument(skip(self, ctx, prefix), fields(route = %ctx.route.kind(), market_id = %ctx.market_id))]
    pub async fn prepare_leverage(
        &self,
        ctx: &RouteContext,
        request: &LeverageRequest,
        prefix: &SignedPrefix,
    ) -> Result<TransactionBundle, LeverageError> {
        let quote = self.quote_leverage(ctx, request).await?;
        let swap = self
            .swap_calldata(ctx, quote.swap_route.as_ref(), quote.flash_loan_amount)
            .await?;
        build_leverage_bundle(ctx, &quote, swap.as_ref(), prefix)
    }

    /// Quote, fetch calldata if needed, and encode a deleverage bundle.
    #[instrument(skip(self, ctx, prefix), fields(route = %ctx.route.kind(), market_id = %ctx.market_id))]
    pub async fn prepare_deleverage(
        &self,
        ctx: &RouteContext,
        request: &DeleverageRequest,
        prefix: &SignedPrefix,
    ) -> Result<TransactionBundle, LeverageError> {
        let quote = self.quote_deleverage(ctx, request).await?;
        let swap = self
            .swap_calldata(ctx, quote.swap_route.as_ref(), quote.withdraw_amount)
            .await?;
        build_deleverage_bundle(ctx, &quote, swap.as_ref(), prefix)
    }

    fn orchestrator(
        &self,
        kind: FlowKind,
        ctx: &RouteContext,
        mode: Option<AuthMode>,
        pull: Option<TokenPull>,
        wallet: Arc<dyn WalletClient>,
        observer: Option<Arc<dyn FlowObserver>>,
    ) -> FlowOrchestrator {
        let flow = FlowOrchestrator::new(
            kind,
            ctx.clone(),
            mode.unwrap_or(self.config.auth.default_mode),
            pull,
            self.config.auth.clone(),
            Arc::clone(&self.reader),
            wallet,
            Arc::clone(&self.touched),
        );
        match observer {
            Some(observer) => flow.with_observer(observer),
            None => flow,
        }
    }

    /// Authorize, sign or approve as needed, then submit a leverage bundle.
    ///
    /// `mode` defaults to the configured authorization mode.
    pub async fn execute_leverage(
        &self,
        ctx: &RouteContext,
        request: LeverageRequest,
        wallet: Arc<dyn WalletClient>,
        mode: Option<AuthMode>,
        observer: Option<Arc<dyn FlowObserver>>,
    ) -> FlowState {
        let pull = TokenPull {
            token: principal_token(ctx, request.denomination),
            amount: request.principal,
        };
        debug!(token = %pull.token, amount = %pull.amount, "Starting leverage flow");
        let flow = self.orchestrator(FlowKind::Leverage, ctx, mode, Some(pull), wallet, observer);
        let preparer = LeveragePreparer {
            engine: self,
            ctx,
            request,
        };
        flow.run(&preparer).await
    }

    /// Authorize if needed, then submit a deleverage bundle.
    pub async fn execute_deleverage(
        &self,
        ctx: &RouteContext,
        request: DeleverageRequest,
        wallet: Arc<dyn WalletClient>,
        mode: Option<AuthMode>,
        observer: Option<Arc<dyn FlowObserver>>,
    ) -> FlowState {
        let flow = self.orchestrator(FlowKind::Deleverage, ctx, mode, None, wallet, observer);
        let preparer = DeleveragePreparer {
            engine: self,
            ctx,
            request,
        };
        flow.run(&preparer).await
    }
}

struct LeveragePreparer<'a> {
    engine: &'a LeverageEngine,
    ctx: &'a RouteContext,
    request: LeverageRequest,
}

#[async_trait]
impl BundlePreparer for LeveragePreparer<'_> {
    async fn prepare(&self, prefix: &SignedPrefix) -> Result<TransactionBundle, LeverageError> {
        self.engine.prepare_leverage(self.ctx, &self.request, prefix).await
    }
}

struct DeleveragePreparer<'a> {
    engine: &'a LeverageEngine,
    ctx: &'a RouteContext,
    request: DeleverageRequest,
}

#[async_trait]
impl BundlePreparer for DeleveragePreparer<'_> {
    async fn prepare(&self, prefix: &SignedPrefix) -> Result<TransactionBundle, LeverageError> {
        self.engine.prepare_deleverage(self.ctx, &self.request, prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quote::Denomination;
    use crate::route::RouteKind;
    use crate::testing::{MockAggregator, MockReader, MockWallet};
    use alloy::sol_types::SolCall;
    use leverage_chain::contracts::IBundler3;

    const USER: Address = Address::repeat_byte(0x99);
    const COLLATERAL: Address = Address::repeat_byte(0x44);
    const LOAN: Address = Address::repeat_byte(0x45);

    fn u(x: u64) -> U256 {
        U256::from(x)
    }

    fn market() -> MarketParams {
        MarketParams {
            loanToken: LOAN,
            collateralToken: COLLATERAL,
            ..Default::default()
        }
    }

    fn lever(principal: u64, multiplier_bps: u32) -> LeverageRequest {
        LeverageRequest {
            principal: u(principal),
            denomination: Denomination::Collateral,
            multiplier_bps,
        }
    }

    fn engine(reader: MockReader, aggregator: Arc<MockAggregator>) -> LeverageEngine {
        LeverageEngine::new(Arc::new(reader), DeploymentRegistry::builtin(), EngineConfig::default())
            .with_aggregators(AggregatorRegistry::new().with_aggregator(aggregator))
    }

    fn swap_ctx() -> RouteContext {
        let deployment = ChainDeployment::mainnet();
        let generalized = deployment.generalized.unwrap();
        RouteContext::new(
            &deployment,
            USER,
            market(),
            LeverageRoute::Swap {
                router: generalized.bundler3,
                general_adapter: generalized.general_adapter,
                swap_adapter: generalized.swap_adapter,
            },
        )
    }

    #[tokio::test]
    async fn test_context_follows_classification() {
        let engine = engine(
            MockReader::default().with_vault(COLLATERAL, LOAN),
            Arc::new(MockAggregator::default()),
        );
        let ctx = engine.leverage_context(1, USER, market()).await.unwrap();
        assert_eq!(ctx.route.kind(), RouteKind::VaultShare);
        assert_eq!(Some(ctx.route.execution_target()), ChainDeployment::mainnet().bundler);

        let err = engine.leverage_context(10, USER, market()).await.unwrap_err();
        assert!(matches!(err, LeverageError::UnsupportedRoute { .. }));
    }

    #[tokio::test]
    async fn test_prepare_swap_leverage_validates_calldata() {
        let engine = engine(MockReader::default(), Arc::new(MockAggregator::default()));
        let bundle = engine
            .prepare_leverage(&swap_ctx(), &lever(1_000, 20_000), &SignedPrefix::default())
            .await
            .unwrap();

        assert_eq!(bundle.route, RouteKind::Swap);
        assert_eq!(Some(bundle.to), ChainDeployment::mainnet().generalized.map(|g| g.bundler3));
        assert!(IBundler3::multicallCall::abi_decode(&bundle.data, true).is_ok());
    }

    #[tokio::test]
    async fn test_prepare_rejects_tampered_calldata() {
        let engine = engine(MockReader::default(), Arc::new(MockAggregator::default().tampered(1)));
        let err = engine
            .prepare_leverage(&swap_ctx(), &lever(1_000, 20_000), &SignedPrefix::default())
            .await
            .unwrap_err();
        assert!(err.is_stale_quote());
    }

    #[tokio::test]
    async fn test_execute_recovers_from_one_stale_quote() {
        let generalized = ChainDeployment::mainnet().generalized.unwrap();
        let reader = MockReader::default()
            .authorized()
            .with_allowance(COLLATERAL, generalized.general_adapter, U256::MAX);
        let aggregator = Arc::new(MockAggregator::default().tampered(1));
        let engine = engine(reader, Arc::clone(&aggregator));
        let wallet = Arc::new(MockWallet::new(USER));

        let state = engine
            .execute_leverage(&swap_ctx(), lever(1_000, 20_000), wallet.clone(), None, None)
            .await;

        assert!(matches!(state, FlowState::Completed { .. }), "{state:?}");
        assert_eq!(wallet.sent_count(), 1);
        assert_eq!(wallet.sent.lock()[0].0, generalized.bundler3);
        // reference and execution price per attempt
        assert_eq!(aggregator.price_requests.lock().len(), 4);
        assert!(engine.touched_markets().contains(1, swap_ctx().market_id));
    }

    #[tokio::test]
    async fn test_execute_fails_after_second_stale_quote() {
        let generalized = ChainDeployment::mainnet().generalized.unwrap();
        let reader = MockReader::default()
            .authorized()
            .with_allowance(COLLATERAL, generalized.general_adapter, U256::MAX);
        let engine = engine(reader, Arc::new(MockAggregator::default().tampered(2)));
        let wallet = Arc::new(MockWallet::new(USER));

        let state = engine
            .execute_leverage(&swap_ctx(), lever(1_000, 20_000), wallet.clone(), None, None)
            .await;

        assert!(matches!(state, FlowState::Failed { .. }));
        assert_eq!(wallet.sent_count(), 0);
        assert!(!engine.touched_markets().contains(1, swap_ctx().market_id));
    }

    #[tokio::test]
    async fn test_execute_requotes_after_rate_change() {
        let generalized = ChainDeployment::mainnet().generalized.unwrap();
        let reader = MockReader::default().authorized().with_debt(1_000, 10_000);
        let aggregator = Arc::new(MockAggregator::default().rate_changed(1));
        let engine = engine(reader, Arc::clone(&aggregator));
        let wallet = Arc::new(MockWallet::new(USER));

        let state = engine
            .execute_deleverage(
                &swap_ctx(),
                DeleverageRequest { withdraw_amount: u(400) },
                wallet.clone(),
                None,
                None,
            )
            .await;

        assert!(matches!(state, FlowState::Completed { .. }), "{state:?}");
        assert_eq!(wallet.sent_count(), 1);
        assert_eq!(wallet.sent.lock()[0].0, generalized.bundler3);
        // the rejected request is not recorded; the retry prices execution and reference
        assert_eq!(aggregator.price_requests.lock().len(), 2);
        assert!(engine.touched_markets().contains(1, swap_ctx().market_id));
    }

    #[tokio::test]
    async fn test_execute_fails_after_second_rate_change() {
        let reader = MockReader::default().authorized().with_debt(1_000, 10_000);
        let engine = engine(reader, Arc::new(MockAggregator::default().rate_changed(2)));
        let wallet = Arc::new(MockWallet::new(USER));

        let state = engine
            .execute_deleverage(
                &swap_ctx(),
                DeleverageRequest { withdraw_amount: u(400) },
                wallet.clone(),
                None,
                None,
            )
            .await;

        assert!(matches!(state, FlowState::Failed { .. }), "{state:?}");
        assert_eq!(wallet.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_execute_vault_deleverage_with_signed_authorization() {
        let reader = MockReader::default().with_vault(COLLATERAL, LOAN).with_debt(1_000, 10_000);
        let engine = engine(reader, Arc::new(MockAggregator::default()));
        let ctx = engine.deleverage_context(1, USER, market()).await.unwrap();
        let wallet = Arc::new(MockWallet::new(USER));

        let state = engine
            .execute_deleverage(
                &ctx,
                DeleverageRequest { withdraw_amount: u(400) },
                wallet.clone(),
                Some(AuthMode::Signature),
                None,
            )
            .await;

        assert!(matches!(state, FlowState::Completed { .. }), "{state:?}");
        // authorization is signed, not sent
        assert_eq!(wallet.signed.lock().len(), 1);
        assert_eq!(wallet.sent_count(), 1);
        assert_eq!(Some(wallet.sent.lock()[0].0), ChainDeployment::mainnet().bundler);
    }

    #[test]
    fn test_sequencer_uses_configured_debounce() {
        let engine = engine(MockReader::default(), Arc::new(MockAggregator::default()));
        let sequencer = engine.quote_sequencer();
        let ticket = sequencer.issue();
        assert!(sequencer.is_current(ticket));
    }
}
