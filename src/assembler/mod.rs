//! Final merge of stage outputs into the canonical asset record.

use chrono::Utc;

use crate::extraction::ExtractionReport;
use crate::models::{AssetRecord, ValuationResult};

/// Pure merge: no network, no state. Guarantees a single stable output
/// schema regardless of which upstream stages succeeded.
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(report: ExtractionReport, valuation: Option<ValuationResult>) -> AssetRecord {
        AssetRecord {
            has_valuation: valuation.is_some(),
            asset: report.result,
            valuation,
            metadata: report.metadata,
            processed_at: Utc::now(),
        }
    }
}
