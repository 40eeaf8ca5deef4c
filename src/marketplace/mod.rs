//! Marketplace search with an ordered fallback chain.
//!
//! The marketplace API is unreliable and bot-hostile, so one logical search is
//! shaped three different ways and tried in a fixed order until a shape gets
//! through. Strategies are data ([`StrategyDescriptor`]) consumed by one
//! generic first-success-wins loop; adding a fourth shape is a table change.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MarketplaceConfig;
use crate::models::MarketplaceOffer;

/// How the query is carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    /// Structured `q`/`limit` query parameters.
    QueryParams,
    /// Parameters encoded literally into the URL, for the case where
    /// structured-parameter requests are filtered but plain URLs are not.
    InlineUrl,
}

/// One request-shaping strategy: identifier, header set, wire shape.
#[derive(Debug, Clone, Copy)]
pub struct StrategyDescriptor {
    pub id: &'static str,
    pub headers: &'static [(&'static str, &'static str)],
    pub shape: RequestShape,
}

const BROWSER_HEADERS: &[(&str, &str)] = &[
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    ),
    ("Accept-Language", "pt-BR,pt;q=0.9,en;q=0.8"),
    ("Referer", "https://www.mercadolivre.com.br/"),
];

const MINIMAL_HEADERS: &[(&str, &str)] = &[("User-Agent", "curl/8.4.0")];

/// The fixed strategy ladder, tried strictly in this order.
pub const STRATEGIES: [StrategyDescriptor; 3] = [
    StrategyDescriptor {
        id: "basic",
        headers: &[],
        shape: RequestShape::QueryParams,
    },
    StrategyDescriptor {
        id: "browser_headers",
        headers: BROWSER_HEADERS,
        shape: RequestShape::QueryParams,
    },
    StrategyDescriptor {
        id: "url_embedded",
        headers: MINIMAL_HEADERS,
        shape: RequestShape::InlineUrl,
    },
];

/// Raw offer as the marketplace API returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOffer {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub price: f64,
    #[serde(rename = "currency_id", default = "default_currency")]
    pub currency_id: String,
    #[serde(rename = "available_quantity", default)]
    pub available_quantity: u32,
    #[serde(default)]
    pub condition: String,
    #[serde(default)]
    pub seller: Option<RawSeller>,
    #[serde(rename = "official_store_id", default)]
    pub official_store_id: Option<u64>,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub thumbnail: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawSeller {
    #[serde(default)]
    pub nickname: String,
}

fn default_currency() -> String {
    "BRL".to_string()
}

/// Parsed body of a successful search response.
#[derive(Debug)]
pub struct SearchPayload {
    pub results: Vec<RawOffer>,
    pub total: u64,
}

/// Terminal outcome of a single strategy attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(SearchPayload),
    /// 200 but the results collection was absent or the body malformed.
    EmptyResult,
    /// Any non-200 status.
    ServerError(u16),
    /// Transport error or timeout.
    NetworkError(String),
}

impl AttemptOutcome {
    fn label(&self) -> String {
        match self {
            Self::Success(_) => "sucesso".to_string(),
            Self::EmptyResult => "resultado_vazio".to_string(),
            Self::ServerError(status) => format!("erro_servidor_{status}"),
            Self::NetworkError(_) => "erro_rede".to_string(),
        }
    }
}

/// Diagnostic record of one attempt, surfaced in the response debug block.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyAttempt {
    #[serde(rename = "estrategia")]
    pub strategy_id: &'static str,
    #[serde(rename = "resultado")]
    pub outcome: String,
}

/// Executes one shaped attempt. Seam for substituting scripted outcomes in
/// tests.
#[async_trait]
pub trait SearchExecutor: Send + Sync {
    async fn attempt(
        &self,
        strategy: &StrategyDescriptor,
        term: &str,
        limit: u32,
    ) -> AttemptOutcome;
}

/// Production executor against the marketplace search API.
pub struct HttpSearchExecutor {
    client: Client,
    base_url: String,
    site: String,
    timeout: Duration,
}

impl HttpSearchExecutor {
    pub fn new(config: &MarketplaceConfig, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            site: config.site.clone(),
            timeout,
        }
    }

    fn search_url(&self) -> String {
        format!("{}/sites/{}/search", self.base_url, self.site)
    }
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    results: Option<Vec<RawOffer>>,
    paging: Option<Paging>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    #[serde(default)]
    total: u64,
}

#[async_trait]
impl SearchExecutor for HttpSearchExecutor {
    async fn attempt(
        &self,
        strategy: &StrategyDescriptor,
        term: &str,
        limit: u32,
    ) -> AttemptOutcome {
        let url = self.search_url();
        let builder = match strategy.shape {
            RequestShape::QueryParams => self
                .client
                .get(&url)
                .query(&[("q", term), ("limit", &limit.to_string())]),
            RequestShape::InlineUrl => self.client.get(format!(
                "{url}?q={}&limit={limit}",
                urlencoding::encode(term)
            )),
        };

        let builder = strategy
            .headers
            .iter()
            .fold(builder, |b, (name, value)| b.header(*name, *value))
            .timeout(self.timeout);

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::NetworkError(e.to_string()),
        };

        let status = response.status().as_u16();
        if status != 200 {
            return AttemptOutcome::ServerError(status);
        }

        match response.json::<SearchBody>().await {
            Ok(SearchBody {
                results: Some(results),
                paging,
            }) => {
                let total = paging.map_or(results.len() as u64, |p| p.total);
                AttemptOutcome::Success(SearchPayload { results, total })
            }
            Ok(SearchBody { results: None, .. }) => AttemptOutcome::EmptyResult,
            Err(_) => AttemptOutcome::EmptyResult,
        }
    }
}

/// Successful chain result, tagged with the strategy that got through.
#[derive(Debug)]
pub struct SearchSuccess {
    pub strategy_used: &'static str,
    pub offers: Vec<MarketplaceOffer>,
    pub total_matched: u64,
    pub attempts: Vec<StrategyAttempt>,
}

#[derive(Debug)]
pub enum SearchOutcome {
    Success(SearchSuccess),
    /// Normal, reportable terminal state; not escalated as a hard error.
    AllStrategiesFailed { attempts: Vec<StrategyAttempt> },
}

pub struct MarketplaceFallbackChain {
    executor: Arc<dyn SearchExecutor>,
}

impl MarketplaceFallbackChain {
    pub fn new(executor: Arc<dyn SearchExecutor>) -> Self {
        Self { executor }
    }

    /// Tries each strategy in ladder order and short-circuits on the first
    /// success. A failed attempt never surfaces an error to the caller; it
    /// only advances the chain.
    pub async fn search(&self, term: &str, limit: u32) -> SearchOutcome {
        let mut attempts = Vec::with_capacity(STRATEGIES.len());

        for strategy in &STRATEGIES {
            debug!(strategy = strategy.id, term, "Trying marketplace strategy");

            match self.executor.attempt(strategy, term, limit).await {
                AttemptOutcome::Success(payload) => {
                    attempts.push(StrategyAttempt {
                        strategy_id: strategy.id,
                        outcome: "sucesso".to_string(),
                    });
                    let offers = filter_offers(payload.results);
                    info!(
                        strategy = strategy.id,
                        offers = offers.len(),
                        total = payload.total,
                        "Marketplace search succeeded"
                    );
                    return SearchOutcome::Success(SearchSuccess {
                        strategy_used: strategy.id,
                        offers,
                        total_matched: payload.total,
                        attempts,
                    });
                }
                outcome => {
                    warn!(
                        strategy = strategy.id,
                        outcome = %outcome.label(),
                        "Marketplace strategy failed, advancing"
                    );
                    attempts.push(StrategyAttempt {
                        strategy_id: strategy.id,
                        outcome: outcome.label(),
                    });
                }
            }
        }

        SearchOutcome::AllStrategiesFailed { attempts }
    }
}

/// Keeps only sellable offers: `price > 0` and stock on hand.
pub fn filter_offers(raw: Vec<RawOffer>) -> Vec<MarketplaceOffer> {
    raw.into_iter()
        .filter(|offer| offer.price > 0.0 && offer.available_quantity > 0)
        .map(|offer| MarketplaceOffer {
            title: offer.title,
            price: offer.price,
            currency: offer.currency_id,
            stock_quantity: offer.available_quantity,
            condition: offer.condition,
            seller_name: offer.seller.map(|s| s.nickname).unwrap_or_default(),
            is_official_store: offer.official_store_id.is_some(),
            listing_url: offer.permalink,
            thumbnail_url: offer.thumbnail,
        })
        .collect()
}
