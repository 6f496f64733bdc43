//! Velora (ParaSwap) aggregator client.
//!
//! Prices via `GET /prices` and builds calldata via `POST /transactions/{network}`
//! against the v6.2 Augustus contracts.

use super::{PriceAggregator, PriceRequest, PriceRoute, SwapBuildParams, SwapSide, SwapTransaction};
use crate::AggregatorError;
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Chains with a v6.2 Augustus deployment.
const SUPPORTED_CHAINS: &[u64] = &[1, 10, 56, 137, 8453, 42161, 43114];

/// API version whose calldata layout the engine validates.
const API_VERSION: &str = "6.2";

/// Velora HTTP client.
#[derive(Clone)]
pub struct VeloraClient {
    client: reqwest::Client,
    base_url: String,
    /// Partner tag sent with every request
    partner: String,
    supported_chains: Vec<u64>,
}

impl std::fmt::Debug for VeloraClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VeloraClient")
            .field("base_url", &self.base_url)
            .field("partner", &self.partner)
            .field("supported_chains", &self.supported_chains)
            .finish()
    }
}

impl VeloraClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: "https://api.paraswap.io".to_string(),
            partner: "leverage-engine".to_string(),
            supported_chains: SUPPORTED_CHAINS.to_vec(),
        }
    }

    /// Use a custom API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Use a custom partner tag.
    pub fn with_partner(mut self, partner: impl Into<String>) -> Self {
        self.partner = partner.into();
        self
    }

    /// Map an error body onto the error taxonomy.
    fn classify_error(status: u16, body: &str) -> AggregatorError {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|e| e.error)
            .unwrap_or_else(|| body.to_string());
        let lower = message.to_lowercase();

        if lower.contains("rate has changed") || lower.contains("price has changed") {
            AggregatorError::RateChanged
        } else if lower.contains("no routes") || lower.contains("no route") {
            AggregatorError::NoRoute(message)
        } else {
            AggregatorError::Api {
                status,
                body: message,
            }
        }
    }

    fn parse_amount(field: &str, value: &str) -> Result<U256, AggregatorError> {
        U256::from_str_radix(value, 10).map_err(|e| {
            AggregatorError::InvalidResponse(format!("{field} is not a decimal integer: {e}"))
        })
    }

    fn parse_address(field: &str, value: &str) -> Result<Address, AggregatorError> {
        value
            .parse()
            .map_err(|e| AggregatorError::InvalidResponse(format!("{field} is not an address: {e}")))
    }

    /// Convert an API price route into the typed representation.
    fn convert_price_route(chain_id: u64, raw: serde_json::Value) -> Result<PriceRoute, AggregatorError> {
        let api: ApiPriceRoute = serde_json::from_value(raw.clone())
            .map_err(|e| AggregatorError::InvalidResponse(e.to_string()))?;

        let side = SwapSide::parse(&api.side)
            .ok_or_else(|| AggregatorError::InvalidResponse(format!("unknown side {}", api.side)))?;

        Ok(PriceRoute {
            chain_id,
            src_token: Self::parse_address("srcToken", &api.src_token)?,
            src_decimals: api.src_decimals,
            src_amount: Self::parse_amount("srcAmount", &api.src_amount)?,
            dest_token: Self::parse_address("destToken", &api.dest_token)?,
            dest_decimals: api.dest_decimals,
            dest_amount: Self::parse_amount("destAmount", &api.dest_amount)?,
            side,
            contract_address: Self::parse_address("contractAddress", &api.contract_address)?,
            token_transfer_proxy: Self::parse_address(
                "tokenTransferProxy",
                &api.token_transfer_proxy,
            )?,
            contract_method: api.contract_method,
            raw,
        })
    }

    fn convert_transaction(
        route: &PriceRoute,
        api: ApiTransaction,
    ) -> Result<SwapTransaction, AggregatorError> {
        let data = api.data.trim_start_matches("0x");
        let calldata = hex::decode(data)
            .map(Bytes::from)
            .map_err(|e| AggregatorError::InvalidResponse(format!("calldata is not hex: {e}")))?;

        let value = match api.value.as_deref() {
            Some(v) if !v.is_empty() => Self::parse_amount("value", v)?,
            _ => U256::ZERO,
        };

        Ok(SwapTransaction {
            target: Self::parse_address("to", &api.to)?,
            calldata,
            value,
            output_amount: route.dest_amount,
        })
    }
}

impl Default for VeloraClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceAggregator for VeloraClient {
    fn aggregator_id(&self) -> &str {
        "velora"
    }

    fn supported_chains(&self) -> &[u64] {
        &self.supported_chains
    }

    #[instrument(skip(self), fields(src = %request.src_token, dest = %request.dest_token, amount = %request.amount))]
    async fn get_price_route(&self, request: PriceRequest) -> Result<PriceRoute, AggregatorError> {
        if !self.supports_chain(request.chain_id) {
            return Err(AggregatorError::UnsupportedChain(request.chain_id));
        }

        let url = format!("{}/prices", self.base_url);
        debug!(chain_id = request.chain_id, "Requesting price route from Velora");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("srcToken", request.src_token.to_string()),
                ("srcDecimals", request.src_decimals.to_string()),
                ("destToken", request.dest_token.to_string()),
                ("destDecimals", request.dest_decimals.to_string()),
                ("amount", request.amount.to_string()),
                ("side", SwapSide::Sell.as_str().to_string()),
                ("network", request.chain_id.to_string()),
                ("userAddress", request.user.to_string()),
                ("partner", self.partner.clone()),
                ("version", API_VERSION.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Velora price request failed");
            return Err(Self::classify_error(status.as_u16(), &body));
        }

        let parsed: PricesResponse = serde_json::from_str(&body)
            .map_err(|e| AggregatorError::InvalidResponse(e.to_string()))?;
        if let Some(error) = parsed.error {
            return Err(Self::classify_error(status.as_u16(), &json!({ "error": error }).to_string()));
        }
        let raw = parsed
            .price_route
            .ok_or_else(|| AggregatorError::InvalidResponse("missing priceRoute".to_string()))?;

        let route = Self::convert_price_route(request.chain_id, raw)?;
        debug!(
            dest_amount = %route.dest_amount,
            method = %route.contract_method,
            "Velora price route received"
        );
        Ok(route)
    }

    #[instrument(skip(self, route), fields(src = %route.src_token, dest = %route.dest_token, min_output = %params.min_output))]
    async fn build_swap_calldata(
        &self,
        route: &PriceRoute,
        params: SwapBuildParams,
    ) -> Result<SwapTransaction, AggregatorError> {
        let url = format!(
            "{}/transactions/{}?ignoreChecks=true&ignoreGasEstimate=true",
            self.base_url, route.chain_id
        );

        let body = json!({
            "srcToken": route.src_token.to_string(),
            "srcDecimals": route.src_decimals,
            "destToken": route.dest_token.to_string(),
            "destDecimals": route.dest_decimals,
            "srcAmount": route.src_amount.to_string(),
            "destAmount": params.min_output.to_string(),
            "priceRoute": route.raw,
            "userAddress": params.taker.to_string(),
            "receiver": params.receiver.to_string(),
            "partner": self.partner,
        });

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Velora transaction build failed");
            return Err(Self::classify_error(status.as_u16(), &text));
        }

        let api: ApiTransaction = serde_json::from_str(&text)
            .map_err(|e| AggregatorError::InvalidResponse(e.to_string()))?;
        let tx = Self::convert_transaction(route, api)?;
        debug!(target = %tx.target, calldata_len = tx.calldata.len(), "Velora calldata built");
        Ok(tx)
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PricesResponse {
    #[serde(rename = "priceRoute")]
    price_route: Option<serde_json::Value>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPriceRoute {
    src_token: String,
    src_decimals: u8,
    src_amount: String,
    dest_token: String,
    dest_decimals: u8,
    dest_amount: String,
    side: String,
    contract_address: String,
    token_transfer_proxy: String,
    contract_method: String,
}

#[derive(Debug, Deserialize)]
struct ApiTransaction {
    to: String,
    data: String,
    value: Option<String>,
}
