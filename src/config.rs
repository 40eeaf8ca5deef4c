//! Process-wide configuration, read once at startup from the environment.
//!
//! Every component receives the pieces it needs by value or reference at
//! construction time; nothing reads the environment after `AppConfig::from_env`
//! returns.

use std::time::Duration;

use anyhow::{Context, Result};

/// Identifiers and credentials for the external generative inference service.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Cloud project id. When set, requests go to the regional
    /// `aiplatform` endpoint authenticated with `access_token`.
    pub project_id: Option<String>,
    pub location: String,
    pub model: String,
    /// API key for the public endpoint (used when `project_id` is unset).
    pub api_key: Option<String>,
    /// OAuth bearer token for the regional endpoint.
    pub access_token: Option<String>,
    /// Base URL of the public endpoint. Overridable for local stubs.
    pub base_url: String,
}

/// Marketplace search API location.
#[derive(Debug, Clone)]
pub struct MarketplaceConfig {
    pub base_url: String,
    /// Site id segment of the search path, e.g. `MLB`.
    pub site: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub inference: InferenceConfig,
    pub marketplace: MarketplaceConfig,
    /// Upper bound for every outbound call; expiry is a non-fatal outcome.
    pub external_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let port = env_or("PORT", "3000")
            .parse::<u16>()
            .context("PORT must be a number")?;

        let timeout_secs = env_or("EXTERNAL_TIMEOUT_SECS", "8")
            .parse::<u64>()
            .context("EXTERNAL_TIMEOUT_SECS must be a number")?;

        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port,
            environment: env_or("APP_ENV", "development"),
            inference: InferenceConfig {
                project_id: std::env::var("INFERENCE_PROJECT_ID").ok(),
                location: env_or("INFERENCE_LOCATION", "us-central1"),
                model: env_or("INFERENCE_MODEL", "gemini-2.0-flash"),
                api_key: std::env::var("INFERENCE_API_KEY").ok(),
                access_token: std::env::var("INFERENCE_ACCESS_TOKEN").ok(),
                base_url: env_or(
                    "INFERENCE_BASE_URL",
                    "https://generativelanguage.googleapis.com/v1beta",
                ),
            },
            marketplace: MarketplaceConfig {
                base_url: env_or("MARKETPLACE_BASE_URL", "https://api.mercadolibre.com"),
                site: env_or("MARKETPLACE_SITE", "MLB"),
            },
            external_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
