//! Authorization and submission state machine.
//!
//! A flow is planned once from read-only chain state, then driven one step at
//! a time. [`next_step`] is the pure transition function; [`FlowOrchestrator`]
//! is the only place that signs, sends, or records anything.

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use leverage_chain::contracts::morpho::{authorization, permit_single};
use leverage_chain::contracts::{IMorpho, IERC20};
use leverage_chain::{LeverageReader, WalletClient};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::bundle::{SignedPrefix, TransactionBundle};
use crate::config::AuthConfig;
use crate::error::LeverageError;
use crate::route::RouteContext;
use crate::touched::TouchedMarketStore;

/// How the router gets the right to act for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Signed authorization and Permit2 transfer folded into the bundle
    #[default]
    Signature,
    /// Separate on-chain authorization and ERC-20 approval
    Transaction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Leverage,
    Deleverage,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowKind::Leverage => write!(f, "leverage"),
            FlowKind::Deleverage => write!(f, "deleverage"),
        }
    }
}

/// Steps in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowStep {
    /// One-time ERC-20 approval of Permit2
    ApproveDelegate,
    AuthorizeRouter,
    SignTransferPermit,
    ApproveToken,
    Execute,
}

pub type StepPlan = SmallVec<[FlowStep; 5]>;

/// Observable state of a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Running(FlowStep),
    Completed { tx_hash: B256 },
    Failed { message: String },
    /// The user declined a prompt. Not an error.
    Cancelled,
}

impl FlowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowState::Completed { .. } | FlowState::Failed { .. } | FlowState::Cancelled
        )
    }
}

/// Receives every state transition of a flow.
pub trait FlowObserver: Send + Sync {
    fn on_transition(&self, kind: FlowKind, state: &FlowState);
}

/// Produces the bundle to submit. Called again after a stale quote.
#[async_trait]
pub trait BundlePreparer: Send + Sync {
    async fn prepare(&self, prefix: &SignedPrefix) -> Result<TransactionBundle, LeverageError>;
}

/// Token pulled from the user by a leverage bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPull {
    pub token: Address,
    pub amount: U256,
}

/// Mode actually used on this route.
pub fn effective_mode(ctx: &RouteContext, requested: AuthMode) -> AuthMode {
    if ctx.route.supports_signature_auth() {
        requested
    } else {
        AuthMode::Transaction
    }
}

/// Plan the steps of a flow, skipping those already satisfied on-chain.
#[instrument(skip(reader, ctx), fields(route = %ctx.route.kind(), user = %ctx.user))]
pub async fn plan_steps(
    reader: &dyn LeverageReader,
    ctx: &RouteContext,
    kind: FlowKind,
    mode: AuthMode,
    pull: Option<TokenPull>,
) -> Result<StepPlan, LeverageError> {
    let mode = effective_mode(ctx, mode);
    let operator = ctx.route.position_operator();
    let spender = ctx.route.token_spender();
    let pull = match kind {
        FlowKind::Leverage => pull,
        FlowKind::Deleverage => None,
    };

    let authorized = reader
        .is_authorized(ctx.morpho, ctx.user, operator)
        .await
        .map_err(LeverageError::read)?;

    let mut plan = StepPlan::new();
    match mode {
        AuthMode::Signature => {
            if let Some(pull) = pull {
                let delegated = reader
                    .token_allowance(pull.token, ctx.user, ctx.permit2)
                    .await
                    .map_err(LeverageError::read)?;
                if delegated < pull.amount {
                    plan.push(FlowStep::ApproveDelegate);
                }
            }
            if !authorized {
                plan.push(FlowStep::AuthorizeRouter);
            }
            if pull.is_some() {
                plan.push(FlowStep::SignTransferPermit);
            }
        }
        AuthMode::Transaction => {
            if !authorized {
                plan.push(FlowStep::AuthorizeRouter);
            }
            if let Some(pull) = pull {
                let allowance = reader
                    .token_allowance(pull.token, ctx.user, spender)
                    .await
                    .map_err(LeverageError::read)?;
                if allowance < pull.amount {
                    plan.push(FlowStep::ApproveToken);
                }
            }
        }
    }
    plan.push(FlowStep::Execute);

    debug!(mode = ?mode, steps = ?plan.as_slice(), "Flow planned");
    Ok(plan)
}

/// Step after `current`, or the first step when nothing ran yet.
pub fn next_step(plan: &[FlowStep], current: Option<FlowStep>) -> Option<FlowStep> {
    match current {
        None => plan.first().copied(),
        Some(step) => {
            let index = plan.iter().position(|s| *s == step)?;
            plan.get(index + 1).copied()
        }
    }
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

/// Drives one flow to a terminal state.
pub struct FlowOrchestrator {
    kind: FlowKind,
    ctx: RouteContext,
    mode: AuthMode,
    pull: Option<TokenPull>,
    auth: AuthConfig,
    reader: Arc<dyn LeverageReader>,
    wallet: Arc<dyn WalletClient>,
    touched: Arc<dyn TouchedMarketStore>,
    observer: Option<Arc<dyn FlowObserver>>,
    on_success: Option<Box<dyn Fn() + Send + Sync>>,
    state: Mutex<FlowState>,
    prefix: Mutex<SignedPrefix>,
}

impl fmt::Debug for FlowOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowOrchestrator")
            .field("kind", &self.kind)
            .field("route", &self.ctx.route.kind())
            .field("mode", &self.mode)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl FlowOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: FlowKind,
        ctx: RouteContext,
        mode: AuthMode,
        pull: Option<TokenPull>,
        auth: AuthConfig,
        reader: Arc<dyn LeverageReader>,
        wallet: Arc<dyn WalletClient>,
        touched: Arc<dyn TouchedMarketStore>,
    ) -> Self {
        let mode = effective_mode(&ctx, mode);
        Self {
            kind,
            ctx,
            mode,
            pull,
            auth,
            reader,
            wallet,
            touched,
            observer: None,
            on_success: None,
            state: Mutex::new(FlowState::Idle),
            prefix: Mutex::new(SignedPrefix::default()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FlowObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Callback fired once after a confirmed submission.
    pub fn on_success(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn state(&self) -> FlowState {
        self.state.lock().clone()
    }

    fn transition(&self, state: FlowState) {
        info!(flow = %self.kind, state = ?state, "Flow transition");
        *self.state.lock() = state.clone();
        if let Some(observer) = &self.observer {
            observer.on_transition(self.kind, &state);
        }
    }

    /// Plan and run every step. Returns the terminal state.
    #[instrument(skip_all, fields(flow = %self.kind, route = %self.ctx.route.kind(), market_id = %self.ctx.market_id))]
    pub async fn run(&self, preparer: &dyn BundlePreparer) -> FlowState {
        let outcome = self.drive(preparer).await;
        let terminal = match outcome {
            Ok(tx_hash) => {
                self.touched.record_touched_market(self.ctx.chain_id, self.ctx.market_id);
                if let Some(callback) = &self.on_success {
                    callback();
                }
                FlowState::Completed { tx_hash }
            }
            Err(e) if e.is_silent() => {
                info!("User declined, flow cancelled");
                FlowState::Cancelled
            }
            Err(e) => {
                warn!(error = %e, "Flow failed");
                FlowState::Failed { message: e.to_string() }
            }
        };
        self.transition(terminal.clone());
        terminal
    }

    async fn drive(&self, preparer: &dyn BundlePreparer) -> Result<B256, LeverageError> {
        if self.wallet.address() != self.ctx.user {
            return Err(LeverageError::InvalidInput(format!(
                "wallet {} does not own the position of {}",
                self.wallet.address(),
                self.ctx.user
            )));
        }
        if self.wallet.chain_id() != self.ctx.chain_id {
            return Err(LeverageError::InvalidInput(format!(
                "wallet is on chain {}, route is on chain {}",
                self.wallet.chain_id(),
                self.ctx.chain_id
            )));
        }

        let plan = plan_steps(self.reader.as_ref(), &self.ctx, self.kind, self.mode, self.pull).await?;
        let mut current = None;
        while let Some(step) = next_step(&plan, current) {
            self.transition(FlowState::Running(step));
            if let Some(tx_hash) = self.execute_step(step, preparer).await? {
                return Ok(tx_hash);
            }
            current = Some(step);
        }
        Err(LeverageError::InvalidInput("flow plan has no execute step".to_string()))
    }

    /// Run one step. Returns the bundle hash once `Execute` succeeds.
    #[instrument(skip(self, preparer))]
    async fn execute_step(&self, step: FlowStep, preparer: &dyn BundlePreparer) -> Result<Option<B256>, LeverageError> {
        match step {
            FlowStep::ApproveDelegate => {
                let pull = self.require_pull()?;
                let data = IERC20::approveCall {
                    spender: self.ctx.permit2,
                    amount: U256::MAX,
                }
                .abi_encode();
                let tx = self
                    .wallet
                    .send_transaction(pull.token, Bytes::from(data), U256::ZERO)
                    .await
                    .map_err(LeverageError::from_approval)?;
                debug!(tx_hash = %tx, "Permit2 approved");
            }
            FlowStep::AuthorizeRouter => match self.mode {
                AuthMode::Signature => {
                    let nonce = self
                        .reader
                        .authorization_nonce(self.ctx.morpho, self.ctx.user)
                        .await
                        .map_err(LeverageError::read)?;
                    let message = authorization(
                        self.ctx.user,
                        self.ctx.route.position_operator(),
                        nonce,
                        now_secs() + self.auth.signature_deadline_secs,
                    );
                    let signature = self
                        .wallet
                        .sign_authorization(&message, self.ctx.morpho)
                        .await
                        .map_err(LeverageError::from_authorization)?;
                    self.prefix.lock().authorization = Some((message, signature));
                }
                AuthMode::Transaction => {
                    let data = IMorpho::setAuthorizationCall {
                        authorized: self.ctx.route.position_operator(),
                        newIsAuthorized: true,
                    }
                    .abi_encode();
                    let tx = self
                        .wallet
                        .send_transaction(self.ctx.morpho, Bytes::from(data), U256::ZERO)
                        .await
                        .map_err(LeverageError::from_authorization)?;
                    debug!(tx_hash = %tx, "Router authorized");
                }
            },
            FlowStep::SignTransferPermit => {
                let pull = self.require_pull()?;
                let spender = self.ctx.route.token_spender();
                let allowance = self
                    .reader
                    .permit2_allowance(self.ctx.permit2, self.ctx.user, pull.token, spender)
                    .await
                    .map_err(LeverageError::read)?;
                let now = now_secs();
                let permit = permit_single(
                    pull.token,
                    pull.amount,
                    spender,
                    allowance.nonce,
                    now + self.auth.permit_expiration_secs,
                    now + self.auth.signature_deadline_secs,
                );
                let signature = self
                    .wallet
                    .sign_permit(&permit, self.ctx.permit2)
                    .await
                    .map_err(LeverageError::from_approval)?;
                self.prefix.lock().permit = Some((permit, signature));
            }
            FlowStep::ApproveToken => {
                let pull = self.require_pull()?;
                let data = IERC20::approveCall {
                    spender: self.ctx.route.token_spender(),
                    amount: pull.amount,
                }
                .abi_encode();
                let tx = self
                    .wallet
                    .send_transaction(pull.token, Bytes::from(data), U256::ZERO)
                    .await
                    .map_err(LeverageError::from_approval)?;
                debug!(tx_hash = %tx, "Token approved");
            }
            FlowStep::Execute => {
                let prefix = self.prefix.lock().clone();
                let bundle = match preparer.prepare(&prefix).await {
                    Err(e) if e.is_stale_quote() => {
                        warn!(error = %e, "Quote went stale, re-quoting once");
                        preparer.prepare(&prefix).await?
                    }
                    other => other?,
                };
                let tx_hash = self
                    .wallet
                    .send_transaction(bundle.to, bundle.data, bundle.value)
                    .await
                    .map_err(LeverageError::from_submission)?;
                info!(tx_hash = %tx_hash, actions = bundle.action_count, "Bundle confirmed");
                return Ok(Some(tx_hash));
            }
        }
        Ok(None)
    }

    fn require_pull(&self) -> Result<TokenPull, LeverageError> {
        self.pull
            .ok_or_else(|| LeverageError::InvalidInput("step needs a token to pull".to_string()))
    }
}
