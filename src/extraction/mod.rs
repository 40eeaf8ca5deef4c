//! Extraction stage: photo set in, confidence-gated asset attributes out.
//!
//! The stage makes exactly one inference call. Any failure after validation
//! (service error or malformed reply) is absorbed into a structured failure
//! carrying an all-`N/A` record, so downstream consumers always receive a
//! schema-conformant payload.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::StageError;
use crate::inference::{GenerateRequest, GenerativeClient, strip_code_fences};
use crate::models::{ExtractionMetadata, ExtractionResult, PIPELINE_VERSION, PhotoSet};

/// Minimum photos for cross-angle corroboration.
pub const MIN_PHOTOS: usize = 2;

pub const INSUFFICIENT_PHOTOS_MESSAGE: &str = "Mínimo de 2 imagens necessárias";

/// Hard cap on the description field, enforced post-hoc because the
/// instruction contract alone cannot be trusted.
const MAX_DESCRIPTION_CHARS: usize = 200;

/// Instruction contract sent with every extraction call. Forbids hedging,
/// restricts the description to the asset itself, and mandates the `N/A`
/// sentinel below the 80% confidence threshold.
const EXTRACTION_PROMPT: &str = r#"Você é um assistente de inventário patrimonial corporativo. Analise as fotografias do ativo físico e devolva SOMENTE um objeto JSON, sem markdown e sem texto ao redor, exatamente com esta estrutura:

{
  "numero_patrimonio": "...",
  "nome_produto": "...",
  "modelo": "...",
  "marca": "...",
  "descricao": "...",
  "classificacao": {
    "estado": "Excelente | Bom | Regular | Ruim | Péssimo",
    "categoria_depreciacao": "Equipamentos de Informática | Móveis | Veículos | Outros",
    "justificativa_estado": "...",
    "justificativa_categoria": "..."
  },
  "confianca_geral": 0.0
}

Regras obrigatórias:
- Se a confiança de leitura de um campo for inferior a 80%, ou o campo estiver ilegível nas fotos, preencha exatamente "N/A". Nunca deduza ou invente um valor.
- Não use linguagem especulativa ("parece", "possivelmente", "talvez").
- "descricao" tem no máximo 200 caracteres e descreve apenas o ativo em si. Ignore móveis ao redor, paredes, ambiente e pessoas.
- "confianca_geral" é um número entre 0 e 1 refletindo a leitura geral.
- Não inclua nenhum campo além dos listados. A resposta deve ser JSON puro."#;

/// Result plus the metadata stamped onto it.
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub result: ExtractionResult,
    pub metadata: ExtractionMetadata,
}

/// Outcome of one extraction run. A failure still carries a fully-populated
/// (all-`N/A`) fallback record.
#[derive(Debug)]
pub enum ExtractionOutcome {
    Success(ExtractionReport),
    Failure {
        error: StageError,
        fallback: ExtractionReport,
    },
}

pub struct ExtractionStage {
    client: Arc<dyn GenerativeClient>,
}

impl ExtractionStage {
    pub fn new(client: Arc<dyn GenerativeClient>) -> Self {
        Self { client }
    }

    pub async fn run(&self, photos: &PhotoSet) -> ExtractionOutcome {
        if photos.len() < MIN_PHOTOS {
            // Rejected before any outbound call.
            return ExtractionOutcome::Failure {
                error: StageError::Validation(INSUFFICIENT_PHOTOS_MESSAGE.to_string()),
                fallback: self.fallback_report(photos.len(), None),
            };
        }

        let request = GenerateRequest {
            prompt: EXTRACTION_PROMPT.to_string(),
            images: photos.iter().cloned().collect(),
            force_json: true,
            web_grounded: false,
        };

        let raw = match self.client.generate(request).await {
            Ok(text) => text,
            Err(error) => {
                warn!("Extraction inference call failed: {error}");
                return ExtractionOutcome::Failure {
                    error,
                    fallback: self.fallback_report(photos.len(), None),
                };
            }
        };

        match serde_json::from_str::<ExtractionResult>(strip_code_fences(&raw)) {
            Ok(mut result) => {
                clamp_description(&mut result);
                info!(
                    product = %result.product_name,
                    images = photos.len(),
                    "Extraction completed"
                );
                let confidence = result.overall_confidence;
                ExtractionOutcome::Success(ExtractionReport {
                    metadata: self.metadata(photos.len(), confidence),
                    result,
                })
            }
            Err(e) => {
                warn!("Extraction reply was not valid JSON: {e}");
                ExtractionOutcome::Failure {
                    error: StageError::Parse(e.to_string()),
                    fallback: self.fallback_report(photos.len(), None),
                }
            }
        }
    }

    fn metadata(&self, images_processed: usize, confidence: Option<f64>) -> ExtractionMetadata {
        ExtractionMetadata {
            extracted_at: Utc::now(),
            images_processed,
            inference_model: self.client.model_id().to_string(),
            pipeline_version: PIPELINE_VERSION.to_string(),
            confidence,
        }
    }

    fn fallback_report(&self, images_processed: usize, confidence: Option<f64>) -> ExtractionReport {
        ExtractionReport {
            result: ExtractionResult::unreadable(),
            metadata: self.metadata(images_processed, confidence),
        }
    }
}

fn clamp_description(result: &mut ExtractionResult) {
    if result.description.chars().count() > MAX_DESCRIPTION_CHARS {
        result.description = result.description.chars().take(MAX_DESCRIPTION_CHARS).collect();
    }
}
