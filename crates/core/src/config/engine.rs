//! Engine configuration with profile support.
//!
//! Provides centralized configuration for quoting, authorization and the
//! aggregator client, with named profiles (default, conservative, fast).

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::orchestrator::AuthMode;
use crate::telemetry::LogFormat;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    /// Quote scheduling
    #[serde(default)]
    pub quote: QuoteConfig,

    /// Router authorization and token permits
    #[serde(default)]
    pub auth: AuthConfig,

    /// Swap-quote aggregator client
    #[serde(default)]
    pub aggregator: AggregatorConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_profile_name() -> String {
    "default".to_string()
}

/// Quote scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// Quiet period after an input edit before a quote is requested (milliseconds)
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    300
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl QuoteConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Authorization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Mode used on routes that support both (swap routes always use transactions)
    #[serde(default)]
    pub default_mode: AuthMode,

    /// Validity of a signed router authorization (seconds)
    #[serde(default = "default_signature_deadline")]
    pub signature_deadline_secs: u64,

    /// Validity of the Permit2 allowance granted by a transfer permit (seconds)
    #[serde(default = "default_permit_expiration")]
    pub permit_expiration_secs: u64,
}

fn default_signature_deadline() -> u64 {
    3_600
}
fn default_permit_expiration() -> u64 {
    3_600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_mode: AuthMode::default(),
            signature_deadline_secs: default_signature_deadline(),
            permit_expiration_secs: default_permit_expiration(),
        }
    }
}

/// Aggregator client parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default = "default_aggregator_url")]
    pub base_url: String,

    /// Partner tag sent with every request
    #[serde(default = "default_partner")]
    pub partner: String,
}

fn default_aggregator_url() -> String {
    "https://api.paraswap.io".to_string()
}
fn default_partner() -> String {
    "leverage-engine".to_string()
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_aggregator_url(),
            partner: default_partner(),
        }
    }
}

/// Log output parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,

    /// Filter directives used when `RUST_LOG` is unset
    #[serde(default)]
    pub directives: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            quote: QuoteConfig::default(),
            auth: AuthConfig::default(),
            aggregator: AggregatorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Transaction-mode authorization, short signature windows, slower re-quotes.
    pub fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            quote: QuoteConfig { debounce_ms: 750 },
            auth: AuthConfig {
                default_mode: AuthMode::Transaction,
                signature_deadline_secs: 600,
                permit_expiration_secs: 600,
            },
            ..Self::default()
        }
    }

    /// Signature-mode authorization and near-immediate re-quotes.
    pub fn fast() -> Self {
        Self {
            profile: "fast".to_string(),
            quote: QuoteConfig { debounce_ms: 100 },
            auth: AuthConfig {
                default_mode: AuthMode::Signature,
                ..AuthConfig::default()
            },
            ..Self::default()
        }
    }

    /// Get profile from environment variable LEVERAGE_PROFILE, or default.
    /// Supported values: default, conservative, fast, or a path to a TOML file.
    pub fn from_env() -> Self {
        let profile = std::env::var("LEVERAGE_PROFILE").unwrap_or_else(|_| "default".to_string());
        match profile.to_lowercase().as_str() {
            "conservative" | "safe" => Self::conservative(),
            "fast" => Self::fast(),
            "default" | "" => Self::default(),
            path if path.ends_with(".toml") => Self::from_file(&profile).unwrap_or_else(|e| {
                tracing::warn!(path = %profile, error = %e, "Failed to load config file, using default");
                Self::default()
            }),
            other => {
                tracing::warn!(profile = other, "Unknown profile, using default");
                Self::default()
            }
        }
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(debounce_ms = self.quote.debounce_ms, "Quote scheduling");
        tracing::info!(
            default_mode = ?self.auth.default_mode,
            signature_deadline_secs = self.auth.signature_deadline_secs,
            permit_expiration_secs = self.auth.permit_expiration_secs,
            "Authorization"
        );
        tracing::info!(
            base_url = %self.aggregator.base_url,
            partner = %self.aggregator.partner,
            "Aggregator"
        );
    }
}

/// Global configuration holder using lazy initialization.
use std::sync::OnceLock;

static GLOBAL_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Initialize global configuration.
pub fn init_config(config: EngineConfig) {
    let _ = GLOBAL_CONFIG.set(config);
}

/// Get the global configuration, initializing from environment if needed.
pub fn config() -> &'static EngineConfig {
    GLOBAL_CONFIG.get_or_init(EngineConfig::from_env)
}
