//! Read-side aggregation.
//!
//! Computes per-system reports and cross-site commodity totals from the site
//! store, optionally merged with the external enrichment source. The merge
//! is strictly never-regress: enrichment can complete things and add
//! completed things, but can never downgrade or invent in-progress work.

use hashbrown::HashMap;
use serde::Serialize;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use crate::enrichment::{EnrichedSite, EnrichmentSource};
use crate::model::{Commodity, ConstructionSite, DataSource, normalise_commodity_key};
use crate::store::{Result, SiteStore};

#[cfg(test)]
mod tests;

/// Aggregated view of one star system.
#[derive(Debug, Clone, Serialize)]
pub struct SystemReport {
    pub system_name: String,
    pub sites: Vec<ConstructionSite>,
    pub total_sites: usize,
    pub completed_sites: usize,
    pub in_progress_sites: usize,
    pub completion_percentage: f64,
}

/// One commodity summed across every site of a system.
#[derive(Debug, Clone, Serialize)]
pub struct CommodityAggregate {
    pub name: String,
    pub name_localised: String,
    pub total_required: u64,
    pub total_provided: u64,
    pub total_remaining: u64,
    pub progress_percentage: f64,
    /// Stations whose own remaining amount for this commodity is > 0.
    pub sites_requiring: Vec<String>,
    pub average_payment: f64,
}

/// Headline numbers for one system.
#[derive(Debug, Clone, Serialize)]
pub struct SystemSummary {
    pub system_name: String,
    pub total_sites: usize,
    pub completed_sites: usize,
    pub in_progress_sites: usize,
    pub completion_percentage: f64,
    pub total_commodities_needed: u64,
    pub unique_commodities: usize,
    pub most_needed: Option<MostNeeded>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MostNeeded {
    pub name: String,
    pub amount: u64,
}

pub struct DataAggregator {
    store: Arc<SiteStore>,
    enrichment: Option<Arc<dyn EnrichmentSource>>,
    /// When set, systems with any local data skip enrichment entirely.
    prefer_local_for_visited: bool,
}

impl DataAggregator {
    pub fn new(
        store: Arc<SiteStore>,
        enrichment: Option<Arc<dyn EnrichmentSource>>,
        prefer_local_for_visited: bool,
    ) -> Self {
        Self {
            store,
            enrichment,
            prefer_local_for_visited,
        }
    }

    /// All sites of one system, merged with enrichment under the
    /// never-regress rules. Sites come back sorted by station name so
    /// consecutive reads diff cleanly.
    pub async fn system_report(&self, system_name: &str) -> Result<SystemReport> {
        let mut sites = self.store.sites_in_system(system_name)?;

        if let Some(source) = &self.enrichment
            && !(self.prefer_local_for_visited && !sites.is_empty())
        {
            match source.system_sites(system_name).await {
                Ok(enriched) => {
                    sites = self.merge_enriched(system_name, sites, enriched)?;
                }
                Err(e) => {
                    // Best effort: a dead or slow enrichment source degrades
                    // the read to local-only.
                    tracing::warn!(system = system_name, error = %e, "enrichment fetch failed");
                }
            }
        }

        sites.sort_by(|a, b| a.station_name.cmp(&b.station_name));
        Ok(report_from_sites(system_name, sites))
    }

    /// Commodities still needed across the system, most-needed first.
    /// Fully delivered commodities are excluded.
    pub async fn shopping_list(&self, system_name: &str) -> Result<Vec<CommodityAggregate>> {
        let report = self.system_report(system_name).await?;
        Ok(aggregate_commodities(&report.sites))
    }

    pub async fn system_summary(&self, system_name: &str) -> Result<SystemSummary> {
        let report = self.system_report(system_name).await?;
        let commodities = aggregate_commodities(&report.sites);

        let most_needed = commodities.first().map(|c| MostNeeded {
            name: c.name_localised.clone(),
            amount: c.total_remaining,
        });

        Ok(SystemSummary {
            system_name: report.system_name,
            total_sites: report.total_sites,
            completed_sites: report.completed_sites,
            in_progress_sites: report.in_progress_sites,
            completion_percentage: report.completion_percentage,
            total_commodities_needed: commodities.iter().map(|c| c.total_remaining).sum(),
            unique_commodities: commodities.len(),
            most_needed,
        })
    }

    /// Apply enrichment records on top of local sites.
    ///
    /// Matching is by station identity (normalised name), not market id —
    /// the enrichment contract does not expose market ids. Rules:
    /// - a local, incomplete site that enrichment reports complete is
    ///   upgraded (and persisted);
    /// - a completed enrichment-only site is added under a synthetic
    ///   market id (and persisted, tagged as enrichment-sourced);
    /// - enrichment never downgrades local data and never introduces an
    ///   in-progress site the observer has not seen.
    fn merge_enriched(
        &self,
        system_name: &str,
        local_sites: Vec<ConstructionSite>,
        enriched: Vec<EnrichedSite>,
    ) -> Result<Vec<ConstructionSite>> {
        let mut merged: Vec<ConstructionSite> = local_sites;

        for record in enriched {
            if !record.is_completed {
                // No phantom in-progress sites.
                continue;
            }

            let key = station_key(&record.station_name);
            match merged
                .iter_mut()
                .find(|site| station_key(&site.station_name) == key)
            {
                Some(site) if !site.construction_complete => {
                    tracing::info!(
                        station = %site.station_name,
                        system = system_name,
                        "marking site complete from enrichment data"
                    );
                    upgrade_to_complete(site, &record);
                    self.store.upsert_site(site)?;
                }
                Some(_) => {} // Already complete locally; local data wins.
                None => {
                    let site = site_from_enriched(system_name, &record);
                    tracing::info!(
                        station = %site.station_name,
                        system = system_name,
                        "adding completed site known only to enrichment"
                    );
                    self.store.upsert_site(&site)?;
                    merged.push(site);
                }
            }
        }

        Ok(merged)
    }
}

fn report_from_sites(system_name: &str, sites: Vec<ConstructionSite>) -> SystemReport {
    let total_sites = sites.len();
    let completed_sites = sites.iter().filter(|s| s.construction_complete).count();
    let completion_percentage = if total_sites == 0 {
        0.0
    } else {
        (completed_sites as f64 / total_sites as f64) * 100.0
    };
    SystemReport {
        system_name: system_name.to_string(),
        sites,
        total_sites,
        completed_sites,
        in_progress_sites: total_sites - completed_sites,
        completion_percentage,
    }
}

fn aggregate_commodities(sites: &[ConstructionSite]) -> Vec<CommodityAggregate> {
    struct Accumulator {
        name: String,
        name_localised: String,
        total_required: u64,
        total_provided: u64,
        sites_requiring: Vec<String>,
        payments: Vec<u64>,
    }

    let mut by_key: HashMap<String, Accumulator> = HashMap::new();

    for site in sites {
        for commodity in &site.commodities {
            let acc = by_key
                .entry(normalise_commodity_key(&commodity.name))
                .or_insert_with(|| Accumulator {
                    name: commodity.name.clone(),
                    name_localised: commodity.name_localised.clone(),
                    total_required: 0,
                    total_provided: 0,
                    sites_requiring: Vec::new(),
                    payments: Vec::new(),
                });
            acc.total_required += commodity.required_amount;
            acc.total_provided += commodity.provided_amount;
            if commodity.remaining_amount() > 0 {
                acc.sites_requiring.push(site.station_name.clone());
            }
            acc.payments.push(commodity.payment);
        }
    }

    let mut aggregates: Vec<CommodityAggregate> = by_key
        .into_values()
        .filter_map(|acc| {
            let total_remaining = acc.total_required.saturating_sub(acc.total_provided);
            if total_remaining == 0 {
                return None;
            }
            let progress_percentage = if acc.total_required == 0 {
                100.0
            } else {
                (acc.total_provided as f64 / acc.total_required as f64) * 100.0
            };
            let average_payment = if acc.payments.is_empty() {
                0.0
            } else {
                acc.payments.iter().sum::<u64>() as f64 / acc.payments.len() as f64
            };
            Some(CommodityAggregate {
                name: acc.name,
                name_localised: acc.name_localised,
                total_required: acc.total_required,
                total_provided: acc.total_provided,
                total_remaining,
                progress_percentage,
                sites_requiring: acc.sites_requiring,
                average_payment,
            })
        })
        .collect();

    // Most-needed first; name as tie-breaker for a stable listing.
    aggregates.sort_by(|a, b| {
        b.total_remaining
            .cmp(&a.total_remaining)
            .then_with(|| a.name.cmp(&b.name))
    });
    aggregates
}

fn station_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn upgrade_to_complete(site: &mut ConstructionSite, record: &EnrichedSite) {
    site.construction_complete = true;
    site.construction_failed = record.is_failed;
    site.construction_progress = site.construction_progress.max(record.progress);

    if site.commodities.is_empty() && !record.commodities.is_empty() {
        // Placeholder site with no depot snapshot yet: adopt the
        // enrichment commodity snapshot wholesale.
        site.commodities = record.commodities.iter().map(commodity_from_enriched).collect();
    } else {
        for commodity in &mut site.commodities {
            if commodity.provided_amount < commodity.required_amount {
                commodity.provided_amount = commodity.required_amount;
            }
        }
    }
}

fn commodity_from_enriched(record: &crate::enrichment::EnrichedCommodity) -> Commodity {
    Commodity {
        name: record.name.clone(),
        name_localised: if record.name_localised.is_empty() {
            record.name.clone()
        } else {
            record.name_localised.clone()
        },
        required_amount: record.required,
        provided_amount: record.provided,
        payment: record.payment,
    }
}

fn site_from_enriched(system_name: &str, record: &EnrichedSite) -> ConstructionSite {
    ConstructionSite {
        market_id: synthetic_market_id(system_name, &record.station_name),
        station_name: record.station_name.clone(),
        station_type: if record.station_type.is_empty() {
            "Unknown".to_string()
        } else {
            record.station_type.clone()
        },
        system_name: system_name.to_string(),
        system_address: 0,
        construction_progress: if record.progress > 0.0 {
            record.progress
        } else {
            100.0
        },
        construction_complete: true,
        construction_failed: record.is_failed,
        commodities: record.commodities.iter().map(commodity_from_enriched).collect(),
        last_updated: chrono::Utc::now(),
        last_source: DataSource::Enrichment,
    }
}

/// Enrichment records carry no market id, but the store is keyed by one.
/// Derive a deterministic negative id from the site identity; real market
/// ids are always positive, so the ranges cannot collide.
fn synthetic_market_id(system_name: &str, station_name: &str) -> i64 {
    let mut hasher = DefaultHasher::new();
    station_key(station_name).hash(&mut hasher);
    system_name.trim().to_lowercase().hash(&mut hasher);
    -1 - (hasher.finish() >> 1) as i64
}
