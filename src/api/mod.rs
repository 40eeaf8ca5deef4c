//! HTTP surface: the extraction, valuation and marketplace-search endpoints.
//!
//! Wire contract notes:
//! - grounding failure is a logical outcome, returned with HTTP 200;
//! - an exhausted marketplace chain is HTTP 500 with `tentativas: 3`;
//! - extraction failures still return a schema-conformant all-`N/A` payload;
//! - CORS permits any origin. Fixed policy, not configurable.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::routing::post;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::assembler::ResultAssembler;
use crate::error::StageError;
use crate::extraction::{ExtractionOutcome, ExtractionStage};
use crate::marketplace::{MarketplaceFallbackChain, SearchOutcome, StrategyAttempt};
use crate::models::{AssetRecord, MarketplaceOffer, PhotoPayload, PhotoSet};
use crate::valuation::{ValuationInput, ValuationStage};

const DEFAULT_SEARCH_LIMIT: u32 = 10;
const MAX_SEARCH_LIMIT: u32 = 50;

#[derive(Clone)]
pub struct AppState {
    pub extraction: Arc<ExtractionStage>,
    pub valuation: Arc<ValuationStage>,
    pub marketplace: Arc<MarketplaceFallbackChain>,
    /// When set (non-production), 500 responses carry a diagnostic trace.
    pub expose_traces: bool,
}

pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/api/patrimonio/extrair", post(extract_asset))
        .route("/api/patrimonio/avaliar", post(appraise_asset))
        .route(
            "/api/mercado/buscar",
            get(search_marketplace_get).post(search_marketplace_post),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    #[serde(rename = "imagens")]
    pub images: Vec<PhotoPayload>,
}

#[derive(Debug, Serialize)]
struct ExtractResponse {
    status: &'static str,
    #[serde(rename = "dados", skip_serializing_if = "Option::is_none")]
    data: Option<AssetRecord>,
    #[serde(rename = "mensagem")]
    message: String,
}

async fn extract_asset(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Response {
    let photos = PhotoSet::new(request.images);

    match state.extraction.run(&photos).await {
        ExtractionOutcome::Success(report) => {
            let record = ResultAssembler::assemble(report, None);
            (
                StatusCode::OK,
                Json(ExtractResponse {
                    status: "Sucesso",
                    data: Some(record),
                    message: "Extração concluída com sucesso".to_string(),
                }),
            )
                .into_response()
        }
        ExtractionOutcome::Failure {
            error: StageError::Validation(message),
            ..
        } => (
            StatusCode::BAD_REQUEST,
            Json(ExtractResponse {
                status: "Falha",
                data: None,
                message,
            }),
        )
            .into_response(),
        ExtractionOutcome::Failure {
            error,
            fallback,
        } => {
            error!("Extraction failed: {error}");
            // Best-effort payload: every field carries the sentinel so the
            // consumer still receives the full schema.
            let record = ResultAssembler::assemble(fallback, None);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ExtractResponse {
                    status: "Falha",
                    data: Some(record),
                    message: error.to_string(),
                }),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppraiseRequest {
    #[serde(rename = "nome_produto")]
    pub product_name: String,
    #[serde(rename = "modelo")]
    pub model: String,
    #[serde(rename = "marca")]
    pub brand: String,
    #[serde(rename = "estado")]
    pub condition: String,
    #[serde(rename = "numero_patrimonio")]
    pub asset_tag: String,
    #[serde(rename = "categoria_depreciacao", default)]
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
struct AppraiseResponse {
    status: &'static str,
    #[serde(rename = "dados")]
    data: Value,
    #[serde(rename = "mensagem", skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

async fn appraise_asset(
    State(state): State<AppState>,
    Json(request): Json<AppraiseRequest>,
) -> Response {
    let input = ValuationInput {
        product_name: request.product_name,
        model: request.model,
        brand: request.brand,
        condition: request.condition,
        asset_tag: request.asset_tag,
        category: request.category,
    };

    match state.valuation.run(&input).await {
        Ok(result) => (
            StatusCode::OK,
            Json(AppraiseResponse {
                status: "Sucesso",
                data: serde_json::to_value(&result).unwrap_or(Value::Null),
                message: None,
                trace: None,
            }),
        )
            .into_response(),
        // Expected outcome, not an HTTP error: the caller prompts for manual
        // entry.
        Err(StageError::Grounding(reason)) => (
            StatusCode::OK,
            Json(AppraiseResponse {
                status: "Falha_Grounding",
                data: json!({}),
                message: Some(reason),
                trace: None,
            }),
        )
            .into_response(),
        Err(error) => {
            error!("Valuation failed: {error}");
            let trace = state.expose_traces.then(|| format!("{error:?}"));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AppraiseResponse {
                    status: "Falha",
                    data: json!({}),
                    message: Some(error.to_string()),
                    trace,
                }),
            )
                .into_response()
        }
    }
}

/// Post-chain filters the caller can apply to the offer list.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SearchFilters {
    #[serde(rename = "condicao", default)]
    pub condition: Option<String>,
    #[serde(rename = "apenas_loja_oficial", default)]
    pub official_store_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(rename = "termo")]
    pub term: String,
    #[serde(rename = "limite", default)]
    pub limit: Option<u32>,
    #[serde(rename = "filtros", default)]
    pub filters: Option<SearchFilters>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQueryParams {
    #[serde(rename = "termo")]
    pub term: String,
    #[serde(rename = "limite", default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct SearchSuccessResponse {
    sucesso: bool,
    estrategia: &'static str,
    #[serde(rename = "termo_buscado")]
    term: String,
    #[serde(rename = "total_encontrado")]
    total_matched: u64,
    #[serde(rename = "total_retornado")]
    total_returned: usize,
    produtos: Vec<MarketplaceOffer>,
    debug: SearchDebug,
}

#[derive(Debug, Serialize)]
struct SearchDebug {
    tentativas: Vec<StrategyAttempt>,
}

#[derive(Debug, Serialize)]
struct SearchFailureResponse {
    sucesso: bool,
    mensagem: String,
    tentativas: usize,
}

async fn search_marketplace_get(
    State(state): State<AppState>,
    Query(params): Query<SearchQueryParams>,
) -> Response {
    run_search(&state, params.term, params.limit, None).await
}

async fn search_marketplace_post(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Response {
    run_search(&state, request.term, request.limit, request.filters).await
}

async fn run_search(
    state: &AppState,
    term: String,
    limit: Option<u32>,
    filters: Option<SearchFilters>,
) -> Response {
    if term.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "sucesso": false, "mensagem": "Termo de busca obrigatório" })),
        )
            .into_response();
    }

    let limit = limit
        .unwrap_or(DEFAULT_SEARCH_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);

    match state.marketplace.search(term.trim(), limit).await {
        SearchOutcome::Success(result) => {
            let mut offers = result.offers;
            if let Some(filters) = filters {
                apply_filters(&mut offers, &filters);
            }
            offers.truncate(limit as usize);

            (
                StatusCode::OK,
                Json(SearchSuccessResponse {
                    sucesso: true,
                    estrategia: result.strategy_used,
                    term,
                    total_matched: result.total_matched,
                    total_returned: offers.len(),
                    produtos: offers,
                    debug: SearchDebug {
                        tentativas: result.attempts,
                    },
                }),
            )
                .into_response()
        }
        SearchOutcome::AllStrategiesFailed { attempts } => {
            let failure = StageError::AllStrategiesFailed {
                attempts: attempts.len(),
            };
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(SearchFailureResponse {
                    sucesso: false,
                    mensagem: failure.to_string(),
                    tentativas: attempts.len(),
                }),
            )
                .into_response()
        }
    }
}

fn apply_filters(offers: &mut Vec<MarketplaceOffer>, filters: &SearchFilters) {
    if let Some(condition) = &filters.condition {
        offers.retain(|offer| offer.condition.eq_ignore_ascii_case(condition));
    }
    if filters.official_store_only {
        offers.retain(|offer| offer.is_official_store);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::depreciation::DepreciationTable;
    use crate::inference::{GenerateRequest, GenerativeClient};
    use crate::marketplace::{
        AttemptOutcome, RawOffer, RawSeller, SearchExecutor, SearchPayload, StrategyDescriptor,
    };
    use crate::models::NA;

    struct StubClient {
        reply: Option<String>,
    }

    #[async_trait::async_trait]
    impl GenerativeClient for StubClient {
        fn model_id(&self) -> &str {
            "stub-model"
        }

        async fn generate(&self, _request: GenerateRequest) -> Result<String, StageError> {
            match &self.reply {
                Some(text) => Ok(text.clone()),
                None => Err(StageError::Inference("connection refused".to_string())),
            }
        }
    }

    struct ScriptedExecutor {
        outcomes: Mutex<VecDeque<AttemptOutcome>>,
    }

    #[async_trait::async_trait]
    impl SearchExecutor for ScriptedExecutor {
        async fn attempt(
            &self,
            _strategy: &StrategyDescriptor,
            _term: &str,
            _limit: u32,
        ) -> AttemptOutcome {
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(AttemptOutcome::NetworkError("script exhausted".to_string()))
        }
    }

    fn state_with(reply: Option<&str>, outcomes: Vec<AttemptOutcome>) -> AppState {
        let client: Arc<dyn GenerativeClient> = Arc::new(StubClient {
            reply: reply.map(str::to_string),
        });
        let executor: Arc<dyn SearchExecutor> = Arc::new(ScriptedExecutor {
            outcomes: Mutex::new(outcomes.into()),
        });

        AppState {
            extraction: Arc::new(ExtractionStage::new(client.clone())),
            valuation: Arc::new(ValuationStage::new(
                client,
                Arc::new(DepreciationTable::standard()),
            )),
            marketplace: Arc::new(MarketplaceFallbackChain::new(executor)),
            expose_traces: false,
        }
    }

    async fn send(
        state: AppState,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                builder.body(Body::from(value.to_string())).unwrap()
            }
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn extraction_reply() -> String {
        r#"{
            "numero_patrimonio": "PAT-0042",
            "nome_produto": "Notebook",
            "modelo": "Latitude 5420",
            "marca": "Dell",
            "descricao": "Notebook corporativo",
            "classificacao": {
                "estado": "Bom",
                "categoria_depreciacao": "Equipamentos de Informática",
                "justificativa_estado": "Sem danos visíveis",
                "justificativa_categoria": "Equipamento de computação"
            },
            "confianca_geral": 0.9
        }"#
        .to_string()
    }

    fn image(n: usize) -> Value {
        json!({ "data": format!("payload-{n}"), "mimeType": "image/jpeg" })
    }

    fn offer(title: &str, price: f64, quantity: u32, official: bool) -> RawOffer {
        RawOffer {
            title: title.to_string(),
            price,
            currency_id: "BRL".to_string(),
            available_quantity: quantity,
            condition: "used".to_string(),
            seller: Some(RawSeller {
                nickname: "LOJA_X".to_string(),
            }),
            official_store_id: official.then_some(1),
            permalink: String::new(),
            thumbnail: String::new(),
        }
    }

    #[tokio::test]
    async fn health_responds_ok() {
        let (status, body) = send(state_with(None, vec![]), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn single_image_is_rejected_with_400() {
        let state = state_with(Some(&extraction_reply()), vec![]);
        let (status, body) = send(
            state,
            "POST",
            "/api/patrimonio/extrair",
            Some(json!({ "imagens": [image(1)] })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "Falha");
        assert_eq!(body["mensagem"], "Mínimo de 2 imagens necessárias");
        assert!(body.get("dados").is_none());
    }

    #[tokio::test]
    async fn extraction_success_returns_canonical_record() {
        let state = state_with(Some(&extraction_reply()), vec![]);
        let (status, body) = send(
            state,
            "POST",
            "/api/patrimonio/extrair",
            Some(json!({ "imagens": [image(1), image(2)] })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Sucesso");
        assert_eq!(body["dados"]["patrimonio"]["marca"], "Dell");
        assert_eq!(body["dados"]["avaliacao_presente"], false);
        assert_eq!(body["dados"]["metadados"]["imagens_processadas"], 2);
        assert_eq!(body["dados"]["metadados"]["modelo_inferencia"], "stub-model");
    }

    #[tokio::test]
    async fn extraction_failure_returns_500_with_sentinel_payload() {
        let state = state_with(None, vec![]);
        let (status, body) = send(
            state,
            "POST",
            "/api/patrimonio/extrair",
            Some(json!({ "imagens": [image(1), image(2)] })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "Falha");
        assert_eq!(body["dados"]["patrimonio"]["nome_produto"], NA);
        assert_eq!(body["dados"]["patrimonio"]["classificacao"]["estado"], NA);
    }

    fn appraise_body() -> Value {
        json!({
            "nome_produto": "Notebook",
            "modelo": "Latitude 5420",
            "marca": "Dell",
            "estado": "Bom",
            "numero_patrimonio": "PAT-0042",
            "categoria_depreciacao": "Equipamentos de Informática"
        })
    }

    #[tokio::test]
    async fn appraisal_success_applies_depreciation() {
        let reply = r#"{"priceFound": true, "marketValue": 4200.50, "source": "ml", "queryUsed": "q"}"#;
        let state = state_with(Some(reply), vec![]);
        let (status, body) = send(
            state,
            "POST",
            "/api/patrimonio/avaliar",
            Some(appraise_body()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Sucesso");
        assert_eq!(body["dados"]["fator_depreciacao"], 0.80);
        assert_eq!(body["dados"]["valor_atual_estimado"], 3360.40);
    }

    #[tokio::test]
    async fn grounding_failure_is_http_200() {
        let reply = r#"{"priceFound": false, "reason": "sem ofertas comparáveis"}"#;
        let state = state_with(Some(reply), vec![]);
        let (status, body) = send(
            state,
            "POST",
            "/api/patrimonio/avaliar",
            Some(appraise_body()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Falha_Grounding");
        assert_eq!(body["dados"], json!({}));
        assert_eq!(body["mensagem"], "sem ofertas comparáveis");
    }

    #[tokio::test]
    async fn appraisal_transport_failure_is_http_500() {
        let state = state_with(None, vec![]);
        let (status, body) = send(
            state,
            "POST",
            "/api/patrimonio/avaliar",
            Some(appraise_body()),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "Falha");
        assert!(body.get("trace").is_none());
    }

    #[tokio::test]
    async fn marketplace_search_reports_strategy_and_offers() {
        let outcomes = vec![AttemptOutcome::Success(SearchPayload {
            results: vec![
                offer("Notebook Dell", 3500.0, 2, false),
                offer("sem estoque", 100.0, 0, false),
            ],
            total: 2,
        })];
        let state = state_with(None, outcomes);
        let (status, body) = send(
            state,
            "GET",
            "/api/mercado/buscar?termo=notebook%20dell&limite=5",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sucesso"], true);
        assert_eq!(body["estrategia"], "basic");
        assert_eq!(body["termo_buscado"], "notebook dell");
        assert_eq!(body["total_encontrado"], 2);
        assert_eq!(body["total_retornado"], 1);
        assert_eq!(body["produtos"][0]["titulo"], "Notebook Dell");
        assert_eq!(body["debug"]["tentativas"][0]["resultado"], "sucesso");
    }

    #[tokio::test]
    async fn exhausted_chain_is_http_500_with_three_attempts() {
        let outcomes = vec![
            AttemptOutcome::ServerError(403),
            AttemptOutcome::ServerError(500),
            AttemptOutcome::NetworkError("timeout".to_string()),
        ];
        let state = state_with(None, outcomes);
        let (status, body) = send(
            state,
            "POST",
            "/api/mercado/buscar",
            Some(json!({ "termo": "notebook", "limite": 10 })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["sucesso"], false);
        assert_eq!(body["tentativas"], 3);
    }

    #[tokio::test]
    async fn official_store_filter_is_applied() {
        let outcomes = vec![AttemptOutcome::Success(SearchPayload {
            results: vec![
                offer("comum", 100.0, 1, false),
                offer("oficial", 200.0, 1, true),
            ],
            total: 2,
        })];
        let state = state_with(None, outcomes);
        let (status, body) = send(
            state,
            "POST",
            "/api/mercado/buscar",
            Some(json!({
                "termo": "notebook",
                "filtros": { "apenas_loja_oficial": true }
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_retornado"], 1);
        assert_eq!(body["produtos"][0]["titulo"], "oficial");
    }

    #[tokio::test]
    async fn blank_search_term_is_rejected_before_any_attempt() {
        let state = state_with(None, vec![]);
        let (status, body) = send(
            state,
            "POST",
            "/api/mercado/buscar",
            Some(json!({ "termo": "   " })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["sucesso"], false);
    }

    #[tokio::test]
    async fn preflight_is_answered_with_200_for_any_origin() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/api/patrimonio/extrair")
            .header(header::ORIGIN, "https://inventario.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = router(state_with(None, vec![]))
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .map(|v| v.to_str().unwrap()),
            Some("*")
        );
    }
}
