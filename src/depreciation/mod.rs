//! Static depreciation schedule keyed by (condition, category).

use crate::models::{AssetCategory, Condition};

/// Applied when no (condition, category) entry matches. This is an explicit
/// policy, not a missing entry.
pub const DEFAULT_FACTOR: f64 = 0.70;

/// Lookup from (condition, asset category) to a depreciation factor in (0,1].
/// Built once at startup; read-only afterwards.
pub struct DepreciationTable {
    entries: Vec<((Condition, AssetCategory), f64)>,
}

impl DepreciationTable {
    /// The standard corporate schedule.
    pub fn standard() -> Self {
        use AssetCategory::{Furniture, ItEquipment, Other, Vehicles};
        use Condition::{Excellent, Good, Poor, Regular, VeryPoor};

        let entries = vec![
            ((Excellent, ItEquipment), 0.90),
            ((Excellent, Furniture), 0.90),
            ((Excellent, Vehicles), 0.85),
            ((Excellent, Other), 0.85),
            ((Good, ItEquipment), 0.80),
            ((Good, Furniture), 0.80),
            ((Good, Vehicles), 0.75),
            ((Good, Other), 0.75),
            ((Regular, ItEquipment), 0.65),
            ((Regular, Furniture), 0.65),
            ((Regular, Vehicles), 0.60),
            ((Regular, Other), 0.60),
            ((Poor, ItEquipment), 0.45),
            ((Poor, Furniture), 0.50),
            ((Poor, Vehicles), 0.40),
            ((Poor, Other), 0.45),
            ((VeryPoor, ItEquipment), 0.25),
            ((VeryPoor, Furniture), 0.30),
            ((VeryPoor, Vehicles), 0.20),
            ((VeryPoor, Other), 0.25),
        ];

        Self { entries }
    }

    pub fn factor(&self, condition: Option<Condition>, category: Option<AssetCategory>) -> f64 {
        let (Some(condition), Some(category)) = (condition, category) else {
            return DEFAULT_FACTOR;
        };

        self.entries
            .iter()
            .find(|((c, k), _)| *c == condition && *k == category)
            .map_or(DEFAULT_FACTOR, |(_, factor)| *factor)
    }

    /// Lookup straight from wire labels; unparseable labels fall back to the
    /// default factor.
    pub fn factor_for_labels(&self, condition: &str, category: &str) -> f64 {
        self.factor(Condition::parse(condition), AssetCategory::parse(category))
    }
}

/// Rounds a currency amount to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Current-value estimate: market value times the depreciation factor,
/// rounded to 2 decimal places.
pub fn depreciate(market_value: f64, factor: f64) -> f64 {
    round2(market_value * factor)
}
