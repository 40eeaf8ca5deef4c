//! Error taxonomy shared by the pipeline stages.
//!
//! The variants map one-to-one onto the outcomes the HTTP layer distinguishes:
//! `Validation` never reaches an external service, `Grounding` is an expected
//! non-exceptional outcome, and `AllStrategiesFailed` is the terminal state of
//! the marketplace fallback chain.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StageError {
    /// Malformed or insufficient input, rejected before any outbound call.
    #[error("{0}")]
    Validation(String),

    /// The external inference or price service was unreachable or errored.
    #[error("Falha no serviço de inferência: {0}")]
    Inference(String),

    /// The service reply was not well-formed JSON after fence stripping.
    #[error("Resposta do serviço não é JSON válido: {0}")]
    Parse(String),

    /// The price service explicitly reported no confident price.
    #[error("Nenhum preço confiável encontrado: {0}")]
    Grounding(String),

    /// Every strategy in the marketplace chain was exhausted.
    #[error("Todas as {attempts} estratégias de busca falharam")]
    AllStrategiesFailed { attempts: usize },
}
