//! Typed journal events.
//!
//! The game has shipped two payload shapes for both colonisation event kinds
//! over its lifetime; the parser folds them into the single internal shapes
//! defined here, so nothing downstream ever sees the historical variants.

use chrono::{DateTime, Utc};

/// One commodity requirement line from a depot snapshot, already normalized
/// from either the legacy `Commodities` or the current `ResourcesRequired`
/// payload shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CommoditySnapshot {
    pub name: String,
    pub name_localised: String,
    pub required: u64,
    pub provided: u64,
    pub payment: u64,
}

/// Full-state report for one construction site.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionDepotEvent {
    pub timestamp: DateTime<Utc>,
    pub market_id: i64,
    pub station_name: String,
    pub station_type: String,
    pub system_name: String,
    pub system_address: i64,
    pub construction_progress: f64,
    pub construction_complete: bool,
    pub construction_failed: bool,
    pub commodities: Vec<CommoditySnapshot>,
}

/// One delivered-amount observation for a single commodity.
///
/// In the legacy flat shape `amount` is the absolute running total for the
/// commodity at this site (`TotalQuantity`). In the list shape no cumulative
/// total exists, so `amount` is the observed contribution; the store's
/// max-merge keeps either interpretation safe under replay.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributionEntry {
    pub name: String,
    pub name_localised: String,
    pub amount: u64,
}

/// Incremental delivery report for one or more commodities of one site.
#[derive(Debug, Clone, PartialEq)]
pub struct ContributionEvent {
    pub timestamp: DateTime<Utc>,
    pub market_id: i64,
    pub entries: Vec<ContributionEntry>,
}

/// Current observer location, emitted on game load and after moves.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationEvent {
    pub timestamp: DateTime<Utc>,
    pub star_system: String,
    pub system_address: i64,
    pub station_name: Option<String>,
    pub station_type: Option<String>,
    pub market_id: Option<i64>,
    pub docked: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FsdJumpEvent {
    pub timestamp: DateTime<Utc>,
    pub star_system: String,
    pub system_address: i64,
    pub jump_dist: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DockedEvent {
    pub timestamp: DateTime<Utc>,
    pub station_name: String,
    pub station_type: String,
    pub star_system: String,
    pub system_address: i64,
    pub market_id: i64,
}

impl DockedEvent {
    /// Whether the station itself is a colonisation construction site.
    pub fn is_construction_site(&self) -> bool {
        self.station_type.contains("Colonisation") || self.station_type.contains("Construction")
    }
}

/// The active commander's identity; scopes enrichment preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct CommanderEvent {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub fid: String,
}

/// Location report for a fleet carrier (sibling feature; ignored by
/// colonisation ingestion).
#[derive(Debug, Clone, PartialEq)]
pub struct CarrierLocationEvent {
    pub timestamp: DateTime<Utc>,
    pub carrier_id: i64,
    pub star_system: String,
    pub system_address: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CarrierStatsEvent {
    pub timestamp: DateTime<Utc>,
    pub carrier_id: i64,
    pub name: String,
    pub callsign: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CarrierTradeOrderEvent {
    pub timestamp: DateTime<Utc>,
    pub carrier_id: i64,
    pub commodity: String,
    pub commodity_localised: Option<String>,
    pub purchase_order: u64,
    pub sale_order: u64,
    pub price: u64,
}

/// A single parsed journal line.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEvent {
    ConstructionDepot(ConstructionDepotEvent),
    Contribution(ContributionEvent),
    Location(LocationEvent),
    FsdJump(FsdJumpEvent),
    Docked(DockedEvent),
    Commander(CommanderEvent),
    CarrierLocation(CarrierLocationEvent),
    CarrierStats(CarrierStatsEvent),
    CarrierTradeOrder(CarrierTradeOrderEvent),
}
