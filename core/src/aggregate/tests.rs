use super::*;
use crate::enrichment::{EnrichedCommodity, EnrichmentError};
use async_trait::async_trait;
use chrono::Utc;

fn local_site(market_id: i64, station: &str, complete: bool) -> ConstructionSite {
    ConstructionSite {
        market_id,
        station_name: station.into(),
        station_type: "SpaceConstructionDepot".into(),
        system_name: "Alpha".into(),
        system_address: 99,
        construction_progress: if complete { 100.0 } else { 40.0 },
        construction_complete: complete,
        construction_failed: false,
        commodities: vec![Commodity {
            name: "steel".into(),
            name_localised: "Steel".into(),
            required_amount: 1000,
            provided_amount: if complete { 1000 } else { 400 },
            payment: 3000,
        }],
        last_updated: Utc::now(),
        last_source: DataSource::Journal,
    }
}

fn enriched(station: &str, completed: bool) -> EnrichedSite {
    EnrichedSite {
        station_name: station.into(),
        station_type: "SpaceConstructionDepot".into(),
        system_name: "Alpha".into(),
        progress: 100.0,
        is_completed: completed,
        is_failed: false,
        commodities: vec![EnrichedCommodity {
            name: "steel".into(),
            name_localised: "Steel".into(),
            required: 1000,
            provided: 1000,
            payment: 3000,
        }],
    }
}

struct StubSource(Vec<EnrichedSite>);

#[async_trait]
impl EnrichmentSource for StubSource {
    async fn system_sites(
        &self,
        _system: &str,
    ) -> std::result::Result<Vec<EnrichedSite>, EnrichmentError> {
        Ok(self.0.clone())
    }
}

struct FailingSource;

#[async_trait]
impl EnrichmentSource for FailingSource {
    async fn system_sites(
        &self,
        _system: &str,
    ) -> std::result::Result<Vec<EnrichedSite>, EnrichmentError> {
        Err(EnrichmentError::Status(reqwest::StatusCode::BAD_GATEWAY))
    }
}

fn aggregator(
    store: Arc<SiteStore>,
    source: Option<Arc<dyn EnrichmentSource>>,
    prefer_local: bool,
) -> DataAggregator {
    DataAggregator::new(store, source, prefer_local)
}

#[tokio::test]
async fn local_only_report_counts_sites() {
    let store = Arc::new(SiteStore::open_in_memory().unwrap());
    store.upsert_site(&local_site(1, "Orbital Alpha", false)).unwrap();
    store.upsert_site(&local_site(2, "Depot Beta", true)).unwrap();

    let agg = aggregator(store, None, true);
    let report = agg.system_report("Alpha").await.unwrap();
    assert_eq!(report.total_sites, 2);
    assert_eq!(report.completed_sites, 1);
    assert_eq!(report.in_progress_sites, 1);
    assert_eq!(report.completion_percentage, 50.0);
    // Sorted by station name.
    assert_eq!(report.sites[0].station_name, "Depot Beta");
}

#[tokio::test]
async fn enrichment_upgrades_incomplete_local_site() {
    let store = Arc::new(SiteStore::open_in_memory().unwrap());
    store.upsert_site(&local_site(1, "Orbital Alpha", false)).unwrap();

    let source: Arc<dyn EnrichmentSource> = Arc::new(StubSource(vec![enriched("Orbital Alpha", true)]));
    let agg = aggregator(Arc::clone(&store), Some(source), false);

    let report = agg.system_report("Alpha").await.unwrap();
    assert_eq!(report.total_sites, 1);
    assert!(report.sites[0].construction_complete);
    // Commodity snapshot topped up to required.
    assert_eq!(report.sites[0].commodities[0].provided_amount, 1000);

    // The upgrade is persisted.
    let stored = store.site_by_market_id(1).unwrap().unwrap();
    assert!(stored.construction_complete);
}

#[tokio::test]
async fn enrichment_never_downgrades_complete_local_site() {
    let store = Arc::new(SiteStore::open_in_memory().unwrap());
    store.upsert_site(&local_site(1, "Orbital Alpha", true)).unwrap();

    let mut record = enriched("Orbital Alpha", true);
    record.is_failed = true;
    record.progress = 10.0;
    let source: Arc<dyn EnrichmentSource> = Arc::new(StubSource(vec![record]));
    let agg = aggregator(Arc::clone(&store), Some(source), false);

    let report = agg.system_report("Alpha").await.unwrap();
    let site = &report.sites[0];
    assert!(site.construction_complete);
    assert!(!site.construction_failed);
    assert_eq!(site.construction_progress, 100.0);
}

#[tokio::test]
async fn enrichment_only_completed_site_is_added() {
    let store = Arc::new(SiteStore::open_in_memory().unwrap());

    let source: Arc<dyn EnrichmentSource> = Arc::new(StubSource(vec![enriched("Relay Gamma", true)]));
    let agg = aggregator(Arc::clone(&store), Some(source), false);

    let report = agg.system_report("Alpha").await.unwrap();
    assert_eq!(report.total_sites, 1);
    let site = &report.sites[0];
    assert_eq!(site.station_name, "Relay Gamma");
    assert!(site.construction_complete);
    assert_eq!(site.last_source, DataSource::Enrichment);
    assert!(site.market_id < 0, "synthetic ids are negative");

    // Persisted too.
    assert_eq!(store.sites_in_system("Alpha").unwrap().len(), 1);
}

#[tokio::test]
async fn enrichment_never_introduces_in_progress_sites() {
    let store = Arc::new(SiteStore::open_in_memory().unwrap());

    let source: Arc<dyn EnrichmentSource> = Arc::new(StubSource(vec![enriched("Relay Gamma", false)]));
    let agg = aggregator(store, Some(source), false);

    let report = agg.system_report("Alpha").await.unwrap();
    assert_eq!(report.total_sites, 0);
}

#[tokio::test]
async fn prefer_local_skips_enrichment_for_visited_systems() {
    let store = Arc::new(SiteStore::open_in_memory().unwrap());
    store.upsert_site(&local_site(1, "Orbital Alpha", false)).unwrap();

    // Would upgrade the local site if consulted.
    let source: Arc<dyn EnrichmentSource> = Arc::new(StubSource(vec![enriched("Orbital Alpha", true)]));
    let agg = aggregator(store, Some(source), true);

    let report = agg.system_report("Alpha").await.unwrap();
    assert!(!report.sites[0].construction_complete);
}

#[tokio::test]
async fn enrichment_failure_degrades_to_local_only() {
    let store = Arc::new(SiteStore::open_in_memory().unwrap());
    store.upsert_site(&local_site(1, "Orbital Alpha", false)).unwrap();

    let agg = aggregator(store, Some(Arc::new(FailingSource)), false);
    let report = agg.system_report("Alpha").await.unwrap();
    assert_eq!(report.total_sites, 1);
    assert!(!report.sites[0].construction_complete);
}

#[tokio::test]
async fn shopping_list_sorts_by_remaining_and_excludes_done() {
    let store = Arc::new(SiteStore::open_in_memory().unwrap());
    let mut site_a = local_site(1, "Orbital Alpha", false);
    site_a.commodities = vec![
        Commodity {
            name: "steel".into(),
            name_localised: "Steel".into(),
            required_amount: 1000,
            provided_amount: 300,
            payment: 3000,
        },
        Commodity {
            name: "aluminium".into(),
            name_localised: "Aluminium".into(),
            required_amount: 200,
            provided_amount: 200,
            payment: 500,
        },
    ];
    let mut site_b = local_site(2, "Depot Beta", false);
    site_b.commodities = vec![
        Commodity {
            // Same commodity under its journal wrapper name; must merge.
            name: "$Steel_Name;".into(),
            name_localised: "Steel".into(),
            required_amount: 500,
            provided_amount: 0,
            payment: 3200,
        },
        Commodity {
            name: "titanium".into(),
            name_localised: "Titanium".into(),
            required_amount: 400,
            provided_amount: 0,
            payment: 2100,
        },
    ];
    store.upsert_site(&site_a).unwrap();
    store.upsert_site(&site_b).unwrap();

    let agg = aggregator(store, None, true);
    let list = agg.shopping_list("Alpha").await.unwrap();

    // Fully provided aluminium is excluded; steel (1200 remaining) beats
    // titanium (400 remaining).
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].name_localised, "Steel");
    assert_eq!(list[0].total_remaining, 1200);
    assert_eq!(list[0].total_required, 1500);
    assert_eq!(list[0].average_payment, 3100.0);
    // Report sites are sorted by station name, so Depot Beta contributes first.
    assert_eq!(list[0].sites_requiring, vec!["Depot Beta", "Orbital Alpha"]);
    assert_eq!(list[1].name_localised, "Titanium");
    assert_eq!(list[1].sites_requiring, vec!["Depot Beta"]);
}

#[tokio::test]
async fn summary_reports_most_needed_commodity() {
    let store = Arc::new(SiteStore::open_in_memory().unwrap());
    store.upsert_site(&local_site(1, "Orbital Alpha", false)).unwrap();

    let agg = aggregator(store, None, true);
    let summary = agg.system_summary("Alpha").await.unwrap();
    assert_eq!(summary.total_sites, 1);
    assert_eq!(summary.unique_commodities, 1);
    assert_eq!(summary.total_commodities_needed, 600);
    let most_needed = summary.most_needed.unwrap();
    assert_eq!(most_needed.name, "Steel");
    assert_eq!(most_needed.amount, 600);
}

#[tokio::test]
async fn empty_system_summary_has_no_most_needed() {
    let store = Arc::new(SiteStore::open_in_memory().unwrap());
    let agg = aggregator(store, None, true);
    let summary = agg.system_summary("Nowhere").await.unwrap();
    assert_eq!(summary.total_sites, 0);
    assert_eq!(summary.completion_percentage, 0.0);
    assert!(summary.most_needed.is_none());
}
