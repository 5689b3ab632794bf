//! Journal line parser.
//!
//! Each journal line is a standalone JSON object with an `event` tag. Only
//! the enumerated relevant tags produce events; everything else — including
//! malformed JSON and unsupported payload shapes — yields `None` so that one
//! bad line can never abort a file.
//!
//! Shape detection is a two-step decode: probe for the discriminating field,
//! then build the one normalized internal shape. Both the UK and US spellings
//! of the colonisation tags are accepted.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::events::*;

pub fn parse_line(line: &str) -> Option<JournalEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let data: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("skipping malformed journal line: {e}");
            return None;
        }
    };

    let event_tag = data.get("event")?.as_str()?;
    let timestamp = parse_timestamp(&data)?;

    match event_tag {
        "ColonisationConstructionDepot" | "ColonizationConstructionDepot" => {
            parse_construction_depot(&data, timestamp)
        }
        "ColonisationContribution" | "ColonizationContribution" => {
            parse_contribution(&data, timestamp)
        }
        "Location" => parse_location(&data, timestamp),
        "FSDJump" => parse_fsd_jump(&data, timestamp),
        "Docked" => parse_docked(&data, timestamp),
        "Commander" => parse_commander(&data, timestamp),
        "CarrierLocation" => parse_carrier_location(&data, timestamp),
        "CarrierStats" => parse_carrier_stats(&data, timestamp),
        "CarrierTradeOrder" => parse_carrier_trade_order(&data, timestamp),
        _ => None,
    }
}

fn parse_timestamp(data: &Value) -> Option<DateTime<Utc>> {
    let raw = data.get("timestamp")?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn str_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)?.as_str().map(str::to_string)
}

fn u64_field(data: &Value, key: &str) -> u64 {
    data.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn i64_field(data: &Value, key: &str) -> Option<i64> {
    data.get(key).and_then(Value::as_i64)
}

// ── ColonisationConstructionDepot ────────────────────────────────────────────

fn parse_construction_depot(data: &Value, timestamp: DateTime<Utc>) -> Option<JournalEvent> {
    let market_id = i64_field(data, "MarketID")?;

    // Station name can live in StationName or Name depending on client version.
    let station_name = str_field(data, "StationName")
        .or_else(|| str_field(data, "Name"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown Station".to_string());

    // System fields are sometimes missing from the colonisation event
    // entirely; ingestion fills them from the tracker or an existing site.
    let system_name = str_field(data, "StarSystem")
        .or_else(|| str_field(data, "SystemName"))
        .or_else(|| str_field(data, "System"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Unknown System".to_string());

    let commodities = if let Some(list) = data.get("Commodities").and_then(Value::as_array) {
        // Legacy shape: Total/Delivered.
        list.iter()
            .map(|c| snapshot_from(c, "Total", "Delivered"))
            .collect()
    } else if let Some(list) = data.get("ResourcesRequired").and_then(Value::as_array) {
        // Current shape: RequiredAmount/ProvidedAmount.
        list.iter()
            .map(|c| snapshot_from(c, "RequiredAmount", "ProvidedAmount"))
            .collect()
    } else {
        Vec::new()
    };

    Some(JournalEvent::ConstructionDepot(ConstructionDepotEvent {
        timestamp,
        market_id,
        station_name,
        station_type: str_field(data, "StationType").unwrap_or_else(|| "Unknown".to_string()),
        system_name,
        system_address: i64_field(data, "SystemAddress").unwrap_or(0),
        construction_progress: data
            .get("ConstructionProgress")
            .and_then(Value::as_f64)
            .unwrap_or(0.0),
        construction_complete: data
            .get("ConstructionComplete")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        construction_failed: data
            .get("ConstructionFailed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        commodities,
    }))
}

fn snapshot_from(entry: &Value, required_key: &str, provided_key: &str) -> CommoditySnapshot {
    let name = str_field(entry, "Name").unwrap_or_default();
    let name_localised = str_field(entry, "Name_Localised")
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| name.clone());
    CommoditySnapshot {
        name,
        name_localised,
        required: u64_field(entry, required_key),
        provided: u64_field(entry, provided_key),
        payment: u64_field(entry, "Payment"),
    }
}

// ── ColonisationContribution ─────────────────────────────────────────────────

fn parse_contribution(data: &Value, timestamp: DateTime<Utc>) -> Option<JournalEvent> {
    let market_id = i64_field(data, "MarketID")?;

    // Legacy flat shape: one commodity with an absolute running total.
    if data.get("Commodity").is_some() {
        let name = str_field(data, "Commodity")?;
        let name_localised = str_field(data, "Commodity_Localised")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| name.clone());
        let quantity = u64_field(data, "Quantity");
        let amount = data
            .get("TotalQuantity")
            .and_then(Value::as_u64)
            .unwrap_or(quantity);

        return Some(JournalEvent::Contribution(ContributionEvent {
            timestamp,
            market_id,
            entries: vec![ContributionEntry {
                name,
                name_localised,
                amount,
            }],
        }));
    }

    // Current shape: a Contributions array, one entry per commodity.
    if let Some(list) = data.get("Contributions").and_then(Value::as_array) {
        let entries: Vec<ContributionEntry> = list
            .iter()
            .filter_map(|c| {
                let name = str_field(c, "Name").or_else(|| str_field(c, "Commodity"))?;
                let name_localised = str_field(c, "Name_Localised")
                    .or_else(|| str_field(c, "Commodity_Localised"))
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| name.clone());
                Some(ContributionEntry {
                    name,
                    name_localised,
                    amount: u64_field(c, "Amount"),
                })
            })
            .collect();

        if entries.is_empty() {
            return None;
        }
        return Some(JournalEvent::Contribution(ContributionEvent {
            timestamp,
            market_id,
            entries,
        }));
    }

    tracing::warn!(market_id, "unsupported contribution payload shape, ignoring");
    None
}

// ── Context events ───────────────────────────────────────────────────────────

fn parse_location(data: &Value, timestamp: DateTime<Utc>) -> Option<JournalEvent> {
    Some(JournalEvent::Location(LocationEvent {
        timestamp,
        star_system: str_field(data, "StarSystem")?,
        system_address: i64_field(data, "SystemAddress").unwrap_or(0),
        station_name: str_field(data, "StationName"),
        station_type: str_field(data, "StationType"),
        market_id: i64_field(data, "MarketID"),
        docked: data.get("Docked").and_then(Value::as_bool).unwrap_or(false),
    }))
}

fn parse_fsd_jump(data: &Value, timestamp: DateTime<Utc>) -> Option<JournalEvent> {
    Some(JournalEvent::FsdJump(FsdJumpEvent {
        timestamp,
        star_system: str_field(data, "StarSystem")?,
        system_address: i64_field(data, "SystemAddress").unwrap_or(0),
        jump_dist: data.get("JumpDist").and_then(Value::as_f64).unwrap_or(0.0),
    }))
}

fn parse_docked(data: &Value, timestamp: DateTime<Utc>) -> Option<JournalEvent> {
    Some(JournalEvent::Docked(DockedEvent {
        timestamp,
        station_name: str_field(data, "StationName")?,
        station_type: str_field(data, "StationType").unwrap_or_else(|| "Unknown".to_string()),
        star_system: str_field(data, "StarSystem")?,
        system_address: i64_field(data, "SystemAddress").unwrap_or(0),
        market_id: i64_field(data, "MarketID")?,
    }))
}

fn parse_commander(data: &Value, timestamp: DateTime<Utc>) -> Option<JournalEvent> {
    Some(JournalEvent::Commander(CommanderEvent {
        timestamp,
        name: str_field(data, "Name")?,
        fid: str_field(data, "FID").unwrap_or_default(),
    }))
}

// ── Fleet carrier events ─────────────────────────────────────────────────────

fn parse_carrier_location(data: &Value, timestamp: DateTime<Utc>) -> Option<JournalEvent> {
    Some(JournalEvent::CarrierLocation(CarrierLocationEvent {
        timestamp,
        carrier_id: i64_field(data, "CarrierID")?,
        star_system: str_field(data, "StarSystem")?,
        system_address: i64_field(data, "SystemAddress").unwrap_or(0),
    }))
}

fn parse_carrier_stats(data: &Value, timestamp: DateTime<Utc>) -> Option<JournalEvent> {
    Some(JournalEvent::CarrierStats(CarrierStatsEvent {
        timestamp,
        carrier_id: i64_field(data, "CarrierID")?,
        name: str_field(data, "Name").unwrap_or_else(|| "Unknown Carrier".to_string()),
        callsign: str_field(data, "Callsign"),
    }))
}

fn parse_carrier_trade_order(data: &Value, timestamp: DateTime<Utc>) -> Option<JournalEvent> {
    Some(JournalEvent::CarrierTradeOrder(CarrierTradeOrderEvent {
        timestamp,
        carrier_id: i64_field(data, "CarrierID")?,
        commodity: str_field(data, "Commodity").unwrap_or_default(),
        commodity_localised: str_field(data, "Commodity_Localised"),
        purchase_order: u64_field(data, "PurchaseOrder"),
        sale_order: u64_field(data, "SaleOrder"),
        price: u64_field(data, "Price"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_json_yields_none() {
        assert_eq!(parse_line("{not json"), None);
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn irrelevant_event_yields_none() {
        let line = r#"{"timestamp":"2025-05-01T12:00:00Z","event":"Music","MusicTrack":"NoTrack"}"#;
        assert_eq!(parse_line(line), None);
    }

    #[test]
    fn missing_timestamp_yields_none() {
        let line = r#"{"event":"FSDJump","StarSystem":"Sol","SystemAddress":1}"#;
        assert_eq!(parse_line(line), None);
    }

    #[test]
    fn depot_legacy_commodities_shape() {
        let line = r#"{"timestamp":"2025-05-01T12:00:00Z","event":"ColonisationConstructionDepot",
            "MarketID":42,"StationName":"Orbital Alpha","StationType":"SpaceConstructionDepot",
            "StarSystem":"Alpha","SystemAddress":99,"ConstructionProgress":12.5,
            "ConstructionComplete":false,"ConstructionFailed":false,
            "Commodities":[{"Name":"steel","Name_Localised":"Steel","Total":1000,"Delivered":250,"Payment":3000}]}"#;

        let Some(JournalEvent::ConstructionDepot(event)) = parse_line(line) else {
            panic!("expected depot event");
        };
        assert_eq!(event.market_id, 42);
        assert_eq!(event.system_name, "Alpha");
        assert_eq!(event.commodities.len(), 1);
        let c = &event.commodities[0];
        assert_eq!((c.required, c.provided, c.payment), (1000, 250, 3000));
    }

    #[test]
    fn depot_resources_required_shape_normalizes() {
        let line = r#"{"timestamp":"2025-05-01T12:00:00Z","event":"ColonizationConstructionDepot",
            "MarketID":43,"Name":"Outpost Beta","StarSystem":"Beta",
            "ResourcesRequired":[{"Name":"$Titanium_Name;","RequiredAmount":500,"ProvidedAmount":120,"Payment":2100}]}"#;

        let Some(JournalEvent::ConstructionDepot(event)) = parse_line(line) else {
            panic!("expected depot event");
        };
        assert_eq!(event.station_name, "Outpost Beta");
        let c = &event.commodities[0];
        assert_eq!(c.name, "$Titanium_Name;");
        // Localised name falls back to the raw name.
        assert_eq!(c.name_localised, "$Titanium_Name;");
        assert_eq!((c.required, c.provided), (500, 120));
    }

    #[test]
    fn depot_missing_station_and_system_get_placeholders() {
        let line = r#"{"timestamp":"2025-05-01T12:00:00Z","event":"ColonisationConstructionDepot","MarketID":44}"#;
        let Some(JournalEvent::ConstructionDepot(event)) = parse_line(line) else {
            panic!("expected depot event");
        };
        assert_eq!(event.station_name, "Unknown Station");
        assert_eq!(event.system_name, "Unknown System");
        assert!(event.commodities.is_empty());
    }

    #[test]
    fn contribution_legacy_flat_shape_uses_running_total() {
        let line = r#"{"timestamp":"2025-05-01T12:00:00Z","event":"ColonisationContribution",
            "MarketID":42,"Commodity":"steel","Commodity_Localised":"Steel",
            "Quantity":100,"TotalQuantity":600,"CreditsReceived":300000}"#;

        let Some(JournalEvent::Contribution(event)) = parse_line(line) else {
            panic!("expected contribution event");
        };
        assert_eq!(event.entries.len(), 1);
        assert_eq!(event.entries[0].name, "steel");
        assert_eq!(event.entries[0].amount, 600);
    }

    #[test]
    fn contribution_list_shape_yields_one_entry_per_element() {
        let line = r#"{"timestamp":"2025-05-01T12:00:00Z","event":"ColonisationContribution",
            "MarketID":3960951554,
            "Contributions":[
                {"Name":"$Titanium_name;","Name_Localised":"Titanium","Amount":23},
                {"Name":"$Steel_name;","Name_Localised":"Steel","Amount":10}]}"#;

        let Some(JournalEvent::Contribution(event)) = parse_line(line) else {
            panic!("expected contribution event");
        };
        assert_eq!(event.entries.len(), 2);
        assert_eq!(event.entries[0].name_localised, "Titanium");
        assert_eq!(event.entries[0].amount, 23);
        assert_eq!(event.entries[1].amount, 10);
    }

    #[test]
    fn contribution_unknown_shape_yields_none() {
        let line = r#"{"timestamp":"2025-05-01T12:00:00Z","event":"ColonisationContribution","MarketID":42}"#;
        assert_eq!(parse_line(line), None);
    }

    #[test]
    fn docked_flags_construction_sites() {
        let line = r#"{"timestamp":"2025-05-01T12:00:00Z","event":"Docked",
            "StationName":"Construction Site: Orbital Alpha","StationType":"SpaceConstructionDepot",
            "StarSystem":"Alpha","SystemAddress":99,"MarketID":42}"#;

        let Some(JournalEvent::Docked(event)) = parse_line(line) else {
            panic!("expected docked event");
        };
        assert!(event.is_construction_site());

        let line = r#"{"timestamp":"2025-05-01T12:00:00Z","event":"Docked",
            "StationName":"Jameson Memorial","StationType":"Orbis",
            "StarSystem":"Shinrarta Dezhra","SystemAddress":3,"MarketID":128666762}"#;
        let Some(JournalEvent::Docked(event)) = parse_line(line) else {
            panic!("expected docked event");
        };
        assert!(!event.is_construction_site());
    }

    #[test]
    fn carrier_events_parse() {
        let line = r#"{"timestamp":"2025-12-15T10:50:30Z","event":"CarrierLocation",
            "CarrierType":"FleetCarrier","CarrierID":3700569600,
            "StarSystem":"Lupus Dark Region BQ-Y d66","SystemAddress":2278253693331,"BodyID":0}"#;
        assert!(matches!(parse_line(line), Some(JournalEvent::CarrierLocation(_))));

        let line = r#"{"timestamp":"2025-12-15T11:17:37Z","event":"CarrierTradeOrder",
            "CarrierID":3700569600,"BlackMarket":false,"Commodity":"titanium","SaleOrder":23,"Price":4446}"#;
        let Some(JournalEvent::CarrierTradeOrder(event)) = parse_line(line) else {
            panic!("expected trade order event");
        };
        assert_eq!(event.sale_order, 23);
    }
}
