use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod assembler;
mod config;
mod depreciation;
mod error;
mod extraction;
mod inference;
mod marketplace;
mod models;
mod valuation;

use api::AppState;
use config::AppConfig;
use depreciation::DepreciationTable;
use extraction::ExtractionStage;
use inference::{GeminiClient, GenerativeClient};
use marketplace::{HttpSearchExecutor, MarketplaceFallbackChain, SearchExecutor};
use valuation::ValuationStage;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asset_appraiser=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    info!(
        model = %config.inference.model,
        marketplace = %config.marketplace.base_url,
        "Starting asset appraiser"
    );

    let client: Arc<dyn GenerativeClient> = Arc::new(GeminiClient::new(
        config.inference.clone(),
        config.external_timeout,
    ));
    let table = Arc::new(DepreciationTable::standard());
    let executor: Arc<dyn SearchExecutor> = Arc::new(HttpSearchExecutor::new(
        &config.marketplace,
        config.external_timeout,
    ));

    let state = AppState {
        extraction: Arc::new(ExtractionStage::new(client.clone())),
        valuation: Arc::new(ValuationStage::new(client, table)),
        marketplace: Arc::new(MarketplaceFallbackChain::new(executor)),
        expose_traces: !config.is_production(),
    };

    let app = api::router(state);

    let addr = SocketAddr::new(
        config.host.parse().context("Invalid HOST")?,
        config.port,
    );
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind listener")?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
