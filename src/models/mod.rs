//! Data models for asset records, extraction results and marketplace offers.
//!
//! Rust field names are English; the wire names (request/response JSON and the
//! inference-service contract) stay in Portuguese via serde renames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel for a field that was unreadable or read below the confidence
/// threshold. Distinct from an empty string: it is an explicit "don't know".
pub const NA: &str = "N/A";

/// Version stamp attached to every extraction's metadata.
pub const PIPELINE_VERSION: &str = "2.1.0";

/// Returns true when a field carries no usable value (empty or the sentinel).
pub fn is_na(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NA)
}

/// One encoded photograph: base64 payload plus declared MIME type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoPayload {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// Ordered photo set submitted for one extraction request.
///
/// A single photo is insufficient for cross-angle corroboration, so the
/// extraction stage rejects sets shorter than two before any outbound call.
#[derive(Debug, Clone)]
pub struct PhotoSet {
    photos: Vec<PhotoPayload>,
}

impl PhotoSet {
    pub fn new(photos: Vec<PhotoPayload>) -> Self {
        Self { photos }
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhotoPayload> {
        self.photos.iter()
    }
}

/// Physical condition of an asset, as classified by the inference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Excellent,
    Good,
    Regular,
    Poor,
    VeryPoor,
}

impl Condition {
    /// Parses the Portuguese wire label, tolerating case and missing accents.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "excelente" => Some(Self::Excellent),
            "bom" => Some(Self::Good),
            "regular" => Some(Self::Regular),
            "ruim" => Some(Self::Poor),
            "péssimo" | "pessimo" => Some(Self::VeryPoor),
            _ => None,
        }
    }
}

/// Depreciation category of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetCategory {
    ItEquipment,
    Furniture,
    Vehicles,
    Other,
}

impl AssetCategory {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "equipamentos de informática" | "equipamentos de informatica" | "informática"
            | "informatica" => Some(Self::ItEquipment),
            "móveis" | "moveis" => Some(Self::Furniture),
            "veículos" | "veiculos" => Some(Self::Vehicles),
            "outros" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Condition and category classification with the service's justifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Classification {
    #[serde(rename = "estado")]
    pub condition: String,
    #[serde(rename = "categoria_depreciacao")]
    pub depreciation_category: String,
    #[serde(rename = "justificativa_estado")]
    pub condition_rationale: String,
    #[serde(rename = "justificativa_categoria")]
    pub category_rationale: String,
}

/// Structured attributes extracted from the photo set.
///
/// Every scalar field independently resolves to [`NA`] when its read
/// confidence is below 80% or the field is unreadable; a partially-guessed
/// value is never surfaced as real data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionResult {
    #[serde(rename = "numero_patrimonio")]
    pub asset_tag: String,
    #[serde(rename = "nome_produto")]
    pub product_name: String,
    #[serde(rename = "modelo")]
    pub model: String,
    #[serde(rename = "marca")]
    pub brand: String,
    #[serde(rename = "descricao")]
    pub description: String,
    #[serde(rename = "classificacao")]
    pub classification: Classification,
    /// Advisory overall confidence reported by the service; copied into
    /// metadata and not re-scored by the pipeline.
    #[serde(rename = "confianca_geral", default, skip_serializing)]
    pub overall_confidence: Option<f64>,
}

impl ExtractionResult {
    /// Fully-populated record where every field is the sentinel. Used as the
    /// schema-conformant payload for failed extractions.
    pub fn unreadable() -> Self {
        Self {
            asset_tag: NA.to_string(),
            product_name: NA.to_string(),
            model: NA.to_string(),
            brand: NA.to_string(),
            description: NA.to_string(),
            classification: Classification {
                condition: NA.to_string(),
                depreciation_category: NA.to_string(),
                condition_rationale: NA.to_string(),
                category_rationale: NA.to_string(),
            },
            overall_confidence: None,
        }
    }
}

/// Processing metadata attached to every extraction outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionMetadata {
    #[serde(rename = "data_extracao")]
    pub extracted_at: DateTime<Utc>,
    #[serde(rename = "imagens_processadas")]
    pub images_processed: usize,
    #[serde(rename = "modelo_inferencia")]
    pub inference_model: String,
    #[serde(rename = "versao_pipeline")]
    pub pipeline_version: String,
    #[serde(rename = "confianca", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Market-value estimate after applying the depreciation schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationResult {
    #[serde(rename = "valor_mercado_estimado")]
    pub market_value_estimate: f64,
    #[serde(rename = "valor_atual_estimado")]
    pub current_value_estimate: f64,
    #[serde(rename = "fator_depreciacao")]
    pub depreciation_factor: f64,
    #[serde(rename = "fonte_preco")]
    pub price_source: String,
    #[serde(rename = "consulta_utilizada")]
    pub query_used: String,
}

/// One marketplace listing, already filtered for `price > 0` and stock.
#[derive(Debug, Clone, Serialize)]
pub struct MarketplaceOffer {
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "preco")]
    pub price: f64,
    #[serde(rename = "moeda")]
    pub currency: String,
    #[serde(rename = "quantidade_estoque")]
    pub stock_quantity: u32,
    #[serde(rename = "condicao")]
    pub condition: String,
    #[serde(rename = "vendedor")]
    pub seller_name: String,
    #[serde(rename = "loja_oficial")]
    pub is_official_store: bool,
    #[serde(rename = "link")]
    pub listing_url: String,
    #[serde(rename = "imagem")]
    pub thumbnail_url: String,
}

/// Canonical asset record: extraction output merged with an optional
/// valuation, under a single stable schema.
#[derive(Debug, Clone, Serialize)]
pub struct AssetRecord {
    #[serde(rename = "patrimonio")]
    pub asset: ExtractionResult,
    #[serde(rename = "avaliacao", skip_serializing_if = "Option::is_none")]
    pub valuation: Option<ValuationResult>,
    #[serde(rename = "avaliacao_presente")]
    pub has_valuation: bool,
    #[serde(rename = "metadados")]
    pub metadata: ExtractionMetadata,
    #[serde(rename = "data_processamento")]
    pub processed_at: DateTime<Utc>,
}
