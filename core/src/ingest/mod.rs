//! Incremental journal ingestion.
//!
//! One worker owns the tracker, the per-file byte offsets and the only write
//! path into the site store. On first run (or after a schema reset) it bulk
//! replays every journal file in filename order; afterwards it consumes
//! directory change notifications one at a time. Both paths funnel through
//! the same per-event application logic, so replay and live tailing cannot
//! diverge.

pub mod watcher;


use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use hashbrown::HashMap;

use crate::journal::events::{ConstructionDepotEvent, DockedEvent};
use crate::journal::{JournalEvent, read_journal_file, read_new_lines};
use crate::model::{Commodity, ConstructionSite, DataSource, normalise_commodity_key};
use crate::notifier::UpdateNotifier;
use crate::store::{SiteStore, StoreError};
use crate::tracker::SystemTracker;

use watcher::{DirectoryEvent, DirectoryWatcher, is_journal_file};

const UNKNOWN_STATION: &str = "Unknown Station";
const UNKNOWN_SYSTEM: &str = "Unknown System";
const UNKNOWN_TYPE: &str = "Unknown";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read journal file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct IngestWorker {
    store: Arc<SiteStore>,
    notifier: Arc<UpdateNotifier>,
    tracker: SystemTracker,
    /// Byte offset of the first unprocessed line per file.
    offsets: HashMap<PathBuf, u64>,
}

impl IngestWorker {
    pub fn new(store: Arc<SiteStore>, notifier: Arc<UpdateNotifier>) -> Self {
        Self {
            store,
            notifier,
            tracker: SystemTracker::new(),
            offsets: HashMap::new(),
        }
    }

    pub fn tracker(&self) -> &SystemTracker {
        &self.tracker
    }

    /// Process every journal file in `dir` in filename order, synchronously.
    /// Unreadable files are logged and skipped. Returns the number of files
    /// processed.
    pub fn bulk_replay(&mut self, dir: &Path) -> usize {
        let mut files: Vec<PathBuf> = match std::fs::read_dir(dir) {
            Ok(entries) => entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| is_journal_file(p))
                .collect(),
            Err(e) => {
                tracing::warn!(directory = %dir.display(), error = %e, "cannot read journal directory");
                return 0;
            }
        };
        // Lexical order keeps the merge order deterministic; journal file
        // names embed their creation timestamp.
        files.sort();

        let mut processed = 0;
        for path in files {
            match self.replay_file(&path) {
                Ok(()) => processed += 1,
                Err(e) => {
                    tracing::warn!(file = %path.display(), error = %e, "skipping unreadable journal file");
                }
            }
        }
        tracing::info!(files = processed, "bulk replay complete");
        processed
    }

    /// Fully process one file from the beginning (bulk replay path).
    fn replay_file(&mut self, path: &Path) -> Result<(), IngestError> {
        let (events, end_pos) = read_journal_file(path)?;
        tracing::debug!(file = %path.display(), events = events.len(), "replayed journal file");
        let touched = self.apply_events(&events)?;
        self.offsets.insert(path.to_path_buf(), end_pos);
        self.notifier.notify(&touched);
        Ok(())
    }

    /// Process newly appended lines of one file (watch path).
    pub async fn process_file(&mut self, path: &Path) -> Result<(), IngestError> {
        let start = self.offsets.get(path).copied().unwrap_or(0);
        let (events, offset) = read_new_lines(path, start).await?;
        if events.is_empty() && offset == start {
            return Ok(());
        }
        let touched = self.apply_events(&events)?;
        self.offsets.insert(path.to_path_buf(), offset);
        self.notifier.notify(&touched);
        Ok(())
    }

    /// Apply parsed events in file order; returns the distinct system names
    /// whose sites changed.
    fn apply_events(&mut self, events: &[JournalEvent]) -> Result<BTreeSet<String>, IngestError> {
        let mut touched = BTreeSet::new();

        for event in events {
            match event {
                JournalEvent::Location(e) => self.tracker.update_from_location(e),
                JournalEvent::FsdJump(e) => self.tracker.update_from_jump(e),
                JournalEvent::Commander(e) => self.tracker.update_from_commander(e),
                JournalEvent::Docked(e) => {
                    self.tracker.update_from_docked(e);
                    if e.is_construction_site() {
                        self.apply_docked_at_site(e)?;
                        touched.insert(e.star_system.clone());
                    }
                }
                JournalEvent::ConstructionDepot(e) => {
                    let system_name = self.apply_depot_snapshot(e)?;
                    touched.insert(system_name);
                }
                JournalEvent::Contribution(e) => {
                    for entry in &e.entries {
                        if let Some(system_name) =
                            self.store
                                .apply_contribution(e.market_id, &entry.name, entry.amount)?
                        {
                            touched.insert(system_name);
                        }
                    }
                }
                // Fleet carrier events belong to a sibling feature.
                JournalEvent::CarrierLocation(_)
                | JournalEvent::CarrierStats(_)
                | JournalEvent::CarrierTradeOrder(_) => {}
            }
        }

        Ok(touched)
    }

    /// Merge a depot snapshot into the store.
    ///
    /// The game emits many snapshots while the construction screen is open,
    /// all for the same market id, sometimes with missing metadata and
    /// sometimes stale. The merge therefore (a) resolves metadata from the
    /// best available source, (b) never regresses commodity progress, and
    /// (c) keeps previously observed commodities that a partial snapshot
    /// omits.
    fn apply_depot_snapshot(&mut self, event: &ConstructionDepotEvent) -> Result<String, IngestError> {
        let existing = self.store.site_by_market_id(event.market_id)?;

        let station_name = pick_name(
            existing.as_ref().map(|s| s.station_name.as_str()),
            &event.station_name,
            self.tracker.current_station(),
            UNKNOWN_STATION,
        );
        let station_type = pick_name(
            existing.as_ref().map(|s| s.station_type.as_str()),
            &event.station_type,
            None,
            UNKNOWN_TYPE,
        );
        let system_name = pick_name(
            existing.as_ref().map(|s| s.system_name.as_str()),
            &event.system_name,
            self.tracker.current_system(),
            UNKNOWN_SYSTEM,
        );
        let system_address = existing
            .as_ref()
            .map(|s| s.system_address)
            .filter(|&a| a != 0)
            .unwrap_or(event.system_address);

        let mut commodities: Vec<Commodity> = Vec::with_capacity(event.commodities.len());
        let mut existing_by_key: HashMap<String, Commodity> = existing
            .as_ref()
            .map(|site| {
                site.commodities
                    .iter()
                    .map(|c| (normalise_commodity_key(&c.name), c.clone()))
                    .collect()
            })
            .unwrap_or_default();

        for snap in &event.commodities {
            let key = normalise_commodity_key(&snap.name);
            match existing_by_key.remove(&key) {
                Some(prev) => commodities.push(Commodity {
                    name: snap.name.clone(),
                    name_localised: if snap.name_localised.is_empty() {
                        prev.name_localised
                    } else {
                        snap.name_localised.clone()
                    },
                    required_amount: prev.required_amount.max(snap.required),
                    provided_amount: prev.provided_amount.max(snap.provided),
                    payment: if snap.payment != 0 { snap.payment } else { prev.payment },
                }),
                None => commodities.push(Commodity {
                    name: snap.name.clone(),
                    name_localised: snap.name_localised.clone(),
                    required_amount: snap.required,
                    provided_amount: snap.provided,
                    payment: snap.payment,
                }),
            }
        }
        // Keep commodities a partial snapshot no longer reports; dropping
        // them would silently lose observed progress.
        for (_, prev) in existing_by_key {
            commodities.push(prev);
        }

        let site = ConstructionSite {
            market_id: event.market_id,
            station_name,
            station_type,
            system_name: system_name.clone(),
            system_address,
            construction_progress: event.construction_progress,
            construction_complete: event.construction_complete,
            construction_failed: event.construction_failed,
            commodities,
            last_updated: event.timestamp,
            last_source: DataSource::Journal,
        };
        self.store.upsert_site(&site)?;

        tracing::info!(
            station = %site.station_name,
            system = %site.system_name,
            progress = site.construction_progress,
            "updated construction site"
        );
        Ok(system_name)
    }

    /// A docking at a construction site either refreshes an existing site's
    /// metadata (docking events are authoritative, which also handles
    /// renames) or creates a placeholder site the next depot snapshot will
    /// fill in.
    fn apply_docked_at_site(&mut self, event: &DockedEvent) -> Result<(), IngestError> {
        if let Some(mut site) = self.store.site_by_market_id(event.market_id)? {
            let mut updated = false;
            if !event.station_name.is_empty() && event.station_name != site.station_name {
                site.station_name = event.station_name.clone();
                updated = true;
            }
            if !event.station_type.is_empty() && event.station_type != site.station_type {
                site.station_type = event.station_type.clone();
                updated = true;
            }
            if !event.star_system.is_empty() && event.star_system != site.system_name {
                site.system_name = event.star_system.clone();
                updated = true;
            }
            if event.system_address != 0 && event.system_address != site.system_address {
                site.system_address = event.system_address;
                updated = true;
            }
            if updated {
                site.last_updated = event.timestamp;
                self.store.upsert_site(&site)?;
                tracing::info!(
                    station = %site.station_name,
                    system = %site.system_name,
                    "refreshed site metadata from docking"
                );
            }
            return Ok(());
        }

        let site = ConstructionSite {
            market_id: event.market_id,
            station_name: event.station_name.clone(),
            station_type: event.station_type.clone(),
            system_name: event.star_system.clone(),
            system_address: event.system_address,
            construction_progress: 0.0,
            construction_complete: false,
            construction_failed: false,
            commodities: Vec::new(),
            last_updated: event.timestamp,
            last_source: DataSource::Journal,
        };
        self.store.upsert_site(&site)?;
        tracing::info!(
            station = %site.station_name,
            system = %site.system_name,
            "discovered construction site from docking"
        );
        Ok(())
    }
}

/// Drive the worker from directory notifications until the watcher closes.
/// Errors on individual files are logged and never end the loop.
pub async fn run_watch_loop(mut worker: IngestWorker, mut watcher: DirectoryWatcher) {
    while let Some(event) = watcher.next_event().await {
        match event {
            DirectoryEvent::FileChanged(path) => {
                if let Err(e) = worker.process_file(&path).await {
                    tracing::warn!(file = %path.display(), error = %e, "failed to process journal file");
                }
            }
            DirectoryEvent::Error(message) => {
                tracing::warn!(error = %message, "directory watcher reported an error");
            }
        }
    }
    tracing::info!("watch loop stopped");
}

/// First non-placeholder, non-empty candidate wins: existing site metadata,
/// then the event's own field, then tracker context, then the placeholder.
fn pick_name(
    existing: Option<&str>,
    from_event: &str,
    from_tracker: Option<&str>,
    placeholder: &str,
) -> String {
    for candidate in [existing.unwrap_or(""), from_event, from_tracker.unwrap_or("")] {
        if !candidate.is_empty()
            && candidate != UNKNOWN_STATION
            && candidate != UNKNOWN_SYSTEM
            && candidate != UNKNOWN_TYPE
        {
            return candidate.to_string();
        }
    }
    placeholder.to_string()
}
