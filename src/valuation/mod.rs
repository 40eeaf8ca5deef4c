//! Valuation stage: extracted attributes in, depreciated current value out.
//!
//! One web-grounded price lookup per run. A reply that reports no price, or
//! that fails the JSON contract, becomes a `Grounding` outcome (HTTP 200 for
//! the caller, manual follow-up expected); only transport-level failures
//! bubble up as errors.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::depreciation::{DepreciationTable, depreciate};
use crate::error::StageError;
use crate::inference::{GenerateRequest, GenerativeClient, strip_code_fences};
use crate::models::{ValuationResult, is_na};

/// Locale/price-intent suffix appended to every search query.
const QUERY_SUFFIX: &str = "preço de mercado Brasil";

/// Identifying attributes the stage builds its query from.
#[derive(Debug, Clone)]
pub struct ValuationInput {
    pub product_name: String,
    pub model: String,
    pub brand: String,
    pub condition: String,
    pub asset_tag: String,
    pub category: Option<String>,
}

pub struct ValuationStage {
    client: Arc<dyn GenerativeClient>,
    table: Arc<DepreciationTable>,
}

/// Reply contract for the grounded price lookup. Either
/// `{priceFound: true, marketValue, source, queryUsed}` or
/// `{priceFound: false, reason}`; anything else is a grounding failure.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PriceReply {
    #[serde(rename = "priceFound")]
    price_found: bool,
    #[serde(rename = "marketValue", default)]
    market_value: Option<f64>,
    #[serde(default)]
    source: Option<String>,
    #[serde(rename = "queryUsed", default)]
    query_used: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

impl ValuationStage {
    pub fn new(client: Arc<dyn GenerativeClient>, table: Arc<DepreciationTable>) -> Self {
        Self { client, table }
    }

    /// Runs one valuation. `Err(StageError::Grounding)` means the service
    /// found no confident price; other errors are transport-level.
    pub async fn run(&self, input: &ValuationInput) -> Result<ValuationResult, StageError> {
        let Some(query) = build_query(input) else {
            return Err(StageError::Grounding(
                "nenhum atributo identificável disponível para a busca".to_string(),
            ));
        };

        let raw = self
            .client
            .generate(GenerateRequest {
                prompt: price_prompt(&query),
                images: vec![],
                force_json: true,
                web_grounded: true,
            })
            .await?;

        let reply = match serde_json::from_str::<PriceReply>(strip_code_fences(&raw)) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Price reply violated the JSON contract: {e}");
                return Err(StageError::Grounding(format!(
                    "resposta fora do contrato: {e}"
                )));
            }
        };

        if !reply.price_found {
            let reason = reply
                .reason
                .unwrap_or_else(|| "serviço não informou motivo".to_string());
            info!(query = %query, "No grounded price found: {reason}");
            return Err(StageError::Grounding(reason));
        }

        // priceFound without a positive value is a contract violation, and no
        // default price is ever substituted.
        let market_value = match reply.market_value {
            Some(value) if value > 0.0 => value,
            _ => {
                return Err(StageError::Grounding(
                    "priceFound sem marketValue positivo".to_string(),
                ));
            }
        };

        let factor = self.table.factor_for_labels(
            &input.condition,
            input.category.as_deref().unwrap_or(""),
        );

        let result = ValuationResult {
            market_value_estimate: market_value,
            current_value_estimate: depreciate(market_value, factor),
            depreciation_factor: factor,
            price_source: reply.source.unwrap_or_else(|| "desconhecida".to_string()),
            query_used: reply.query_used.unwrap_or(query),
        };

        info!(
            asset = %input.asset_tag,
            market = result.market_value_estimate,
            current = result.current_value_estimate,
            factor,
            "Valuation completed"
        );

        Ok(result)
    }
}

/// Concatenates the non-`N/A` identifying fields plus the locale suffix.
/// Returns `None` when no identifying field carries a usable value.
pub fn build_query(input: &ValuationInput) -> Option<String> {
    let parts: Vec<&str> = [&input.brand, &input.product_name, &input.model]
        .into_iter()
        .map(String::as_str)
        .filter(|v| !is_na(v))
        .collect();

    if parts.is_empty() {
        return None;
    }

    Some(format!("{} {QUERY_SUFFIX}", parts.join(" ")))
}

fn price_prompt(query: &str) -> String {
    format!(
        "Pesquise na web o preço de mercado atual do seguinte item no Brasil: \"{query}\".\n\n\
         Responda SOMENTE com JSON puro, sem markdown e sem texto ao redor:\n\
         - Se encontrar um preço confiável: {{\"priceFound\": true, \"marketValue\": <valor em BRL>, \"source\": \"<origem do preço>\", \"queryUsed\": \"<consulta utilizada>\"}}\n\
         - Se não encontrar: {{\"priceFound\": false, \"reason\": \"<motivo>\"}}\n\
         Não inclua nenhum campo além dos listados e não escreva prosa."
    )
}
