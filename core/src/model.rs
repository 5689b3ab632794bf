//! Colonisation domain model: construction sites and their commodity
//! requirements.
//!
//! These are the persisted shapes; derived values (remaining amounts,
//! percentages, status) are computed on read rather than stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery status of a single commodity requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommodityStatus {
    NotStarted,
    InProgress,
    Completed,
}

/// Where a site record last came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    #[default]
    Journal,
    Enrichment,
}

/// One commodity requirement line within a construction site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commodity {
    /// Internal journal name, e.g. `"steel"` or `"$Steel_Name;"`.
    pub name: String,
    /// Human-facing name; falls back to `name` when the journal omits it.
    pub name_localised: String,
    pub required_amount: u64,
    pub provided_amount: u64,
    /// Payment per unit in credits.
    pub payment: u64,
}

impl Commodity {
    pub fn remaining_amount(&self) -> u64 {
        self.required_amount.saturating_sub(self.provided_amount)
    }

    /// Delivery progress in percent; a zero requirement counts as complete.
    pub fn progress_percentage(&self) -> f64 {
        if self.required_amount == 0 {
            return 100.0;
        }
        (self.provided_amount as f64 / self.required_amount as f64) * 100.0
    }

    pub fn status(&self) -> CommodityStatus {
        if self.provided_amount >= self.required_amount {
            CommodityStatus::Completed
        } else if self.provided_amount > 0 {
            CommodityStatus::InProgress
        } else {
            CommodityStatus::NotStarted
        }
    }
}

/// One construction/depot entity, keyed by its market id.
///
/// Market ids are assigned once by the game and never reused, so they are the
/// stable identity for everything ingestion does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionSite {
    pub market_id: i64,
    pub station_name: String,
    pub station_type: String,
    pub system_name: String,
    pub system_address: i64,
    /// Overall completion percentage as reported by the game (0..=100).
    pub construction_progress: f64,
    pub construction_complete: bool,
    pub construction_failed: bool,
    pub commodities: Vec<Commodity>,
    pub last_updated: DateTime<Utc>,
    pub last_source: DataSource,
}

impl ConstructionSite {
    /// Total units still needed across all commodity lines.
    pub fn total_commodities_needed(&self) -> u64 {
        self.commodities.iter().map(Commodity::remaining_amount).sum()
    }

    /// Overall commodity delivery progress; empty requirement lists count as
    /// complete (placeholder sites discovered via docking report 100 here
    /// until a depot snapshot arrives).
    pub fn commodities_progress_percentage(&self) -> f64 {
        let total_required: u64 = self.commodities.iter().map(|c| c.required_amount).sum();
        if total_required == 0 {
            return 100.0;
        }
        let total_provided: u64 = self.commodities.iter().map(|c| c.provided_amount).sum();
        (total_provided as f64 / total_required as f64) * 100.0
    }
}

/// Normalise a journal commodity identifier into a stable matching key.
///
/// The game uses slightly different strings for the same commodity across
/// event kinds (`"aluminium"` vs `"$Aluminium_Name;"`). Contribution events
/// must still find the requirement line a depot snapshot created, so both
/// sides are reduced to a canonical lower-case token: trim, lower-case, strip
/// a `$...;` wrapper, strip a trailing `_name` suffix.
pub fn normalise_commodity_key(name: &str) -> String {
    let mut key = name.trim().to_lowercase();
    if key.starts_with('$') && key.ends_with(';') {
        key = key[1..key.len() - 1].to_string();
    }
    if let Some(stripped) = key.strip_suffix("_name") {
        key = stripped.to_string();
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commodity(required: u64, provided: u64) -> Commodity {
        Commodity {
            name: "steel".into(),
            name_localised: "Steel".into(),
            required_amount: required,
            provided_amount: provided,
            payment: 3000,
        }
    }

    #[test]
    fn remaining_never_goes_negative() {
        assert_eq!(commodity(100, 250).remaining_amount(), 0);
        assert_eq!(commodity(1000, 300).remaining_amount(), 700);
    }

    #[test]
    fn zero_requirement_is_complete() {
        let c = commodity(0, 0);
        assert_eq!(c.progress_percentage(), 100.0);
        assert_eq!(c.status(), CommodityStatus::Completed);
    }

    #[test]
    fn status_from_delivered_vs_required() {
        assert_eq!(commodity(10, 0).status(), CommodityStatus::NotStarted);
        assert_eq!(commodity(10, 3).status(), CommodityStatus::InProgress);
        assert_eq!(commodity(10, 10).status(), CommodityStatus::Completed);
    }

    #[test]
    fn commodity_key_normalisation() {
        assert_eq!(normalise_commodity_key("aluminium"), "aluminium");
        assert_eq!(normalise_commodity_key("$Aluminium_Name;"), "aluminium");
        assert_eq!(normalise_commodity_key("  Steel "), "steel");
        assert_eq!(normalise_commodity_key("$CMM_Composite_Name;"), "cmm_composite");
        assert_eq!(normalise_commodity_key(""), "");
    }
}
