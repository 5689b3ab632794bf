//! Durable site store.
//!
//! One SQLite row per construction site keyed by market id, with the
//! commodity list serialized as a JSON blob, plus a small metadata table
//! holding the on-disk schema version. An incompatible schema version is
//! self-healing: the store wipes itself once, re-stamps, and the next bulk
//! replay repopulates it from the journals.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::model::{Commodity, ConstructionSite, DataSource, normalise_commodity_key};

/// Bump when the persisted site/commodity shape changes incompatibly.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA_VERSION_KEY: &str = "db_schema_version";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt commodities blob: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Counts over the whole store, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub system_count: usize,
    pub site_count: usize,
    pub in_progress_count: usize,
    pub completed_count: usize,
}

/// Thread-safe persistent store for construction sites.
///
/// All public operations take the one coarse lock exactly once and do their
/// whole read-modify-write under it; internal helpers operate on the locked
/// connection and never lock again.
pub struct SiteStore {
    conn: Mutex<Connection>,
}

impl SiteStore {
    /// Open (or create) the store at `path`, applying the schema-version
    /// reset rule.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialise()?;
        Ok(store)
    }

    /// In-memory store, for tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.initialise()?;
        Ok(store)
    }

    fn initialise(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        create_tables(&conn)?;

        match read_schema_version(&conn)? {
            None => {
                // Fresh store: stamp and go.
                write_schema_version(&conn, SCHEMA_VERSION)?;
            }
            Some(version) if version == SCHEMA_VERSION => {}
            Some(version) => {
                tracing::info!(
                    found = version,
                    expected = SCHEMA_VERSION,
                    "incompatible site store schema, resetting"
                );
                conn.execute("DELETE FROM construction_sites", [])?;
                conn.execute("DELETE FROM metadata", [])?;
                write_schema_version(&conn, SCHEMA_VERSION)?;
            }
        }
        Ok(())
    }

    /// Insert or replace a site row.
    pub fn upsert_site(&self, site: &ConstructionSite) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        upsert_locked(&conn, site)
    }

    pub fn site_by_market_id(&self, market_id: i64) -> Result<Option<ConstructionSite>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        site_by_market_id_locked(&conn, market_id)
    }

    pub fn sites_in_system(&self, system_name: &str) -> Result<Vec<ConstructionSite>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT market_id, station_name, station_type, system_name, system_address,
                    construction_progress, construction_complete, construction_failed,
                    commodities, last_updated, last_source
             FROM construction_sites WHERE system_name = ?1 ORDER BY station_name",
        )?;
        let rows = stmt.query_map(params![system_name], row_to_site)?;
        collect_sites(rows)
    }

    pub fn all_systems(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT DISTINCT system_name FROM construction_sites ORDER BY system_name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut systems = Vec::new();
        for row in rows {
            systems.push(row?);
        }
        Ok(systems)
    }

    pub fn all_sites(&self) -> Result<Vec<ConstructionSite>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT market_id, station_name, station_type, system_name, system_address,
                    construction_progress, construction_complete, construction_failed,
                    commodities, last_updated, last_source
             FROM construction_sites ORDER BY system_name, station_name",
        )?;
        let rows = stmt.query_map([], row_to_site)?;
        collect_sites(rows)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let sites = self.all_sites()?;
        let site_count = sites.len();
        let completed_count = sites.iter().filter(|s| s.construction_complete).count();
        let mut systems: Vec<&str> = sites.iter().map(|s| s.system_name.as_str()).collect();
        systems.sort_unstable();
        systems.dedup();
        Ok(StoreStats {
            system_count: systems.len(),
            site_count,
            in_progress_count: site_count - completed_count,
            completed_count,
        })
    }

    /// Record a delivery observation for one commodity of one site.
    ///
    /// The effective provided amount is `max(existing, amount)`, which makes
    /// the operation idempotent under duplicate and out-of-order replays of
    /// the same journal region. The commodity is matched on its normalised
    /// key because event kinds disagree on casing and `$..._Name;` wrappers.
    ///
    /// Returns the site's system name when a commodity line was updated.
    pub fn apply_contribution(
        &self,
        market_id: i64,
        commodity_name: &str,
        amount: u64,
    ) -> Result<Option<String>> {
        let target_key = normalise_commodity_key(commodity_name);
        if target_key.is_empty() {
            tracing::warn!(market_id, "empty commodity name in contribution, ignoring");
            return Ok(None);
        }

        // Single lock for the whole read-modify-write; the helpers below do
        // not lock again.
        let conn = self.conn.lock().expect("store lock poisoned");
        let Some(mut site) = site_by_market_id_locked(&conn, market_id)? else {
            tracing::warn!(market_id, "contribution for unknown site, ignoring");
            return Ok(None);
        };

        let Some(commodity) = site
            .commodities
            .iter_mut()
            .find(|c| normalise_commodity_key(&c.name) == target_key)
        else {
            tracing::warn!(
                market_id,
                commodity = commodity_name,
                "contribution for unknown commodity, ignoring"
            );
            return Ok(None);
        };

        commodity.provided_amount = commodity.provided_amount.max(amount);
        let system_name = site.system_name.clone();
        upsert_locked(&conn, &site)?;
        Ok(Some(system_name))
    }

    /// Delete every site row. The schema version stamp is left in place.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute("DELETE FROM construction_sites", [])?;
        tracing::info!("cleared all colonisation data");
        Ok(())
    }
}

// ── Locked helpers (callers hold the connection lock) ────────────────────────

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS construction_sites (
            market_id INTEGER PRIMARY KEY,
            station_name TEXT NOT NULL,
            station_type TEXT,
            system_name TEXT NOT NULL,
            system_address INTEGER,
            construction_progress REAL,
            construction_complete INTEGER,
            construction_failed INTEGER,
            commodities TEXT,
            last_updated TEXT,
            last_source TEXT
         );
         CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
         );",
    )?;
    Ok(())
}

fn read_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            params![SCHEMA_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()))
}

fn write_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![SCHEMA_VERSION_KEY, version.to_string()],
    )?;
    Ok(())
}

fn upsert_locked(conn: &Connection, site: &ConstructionSite) -> Result<()> {
    let commodities_json = serde_json::to_string(&site.commodities)?;
    let last_source = match site.last_source {
        DataSource::Journal => "journal",
        DataSource::Enrichment => "enrichment",
    };
    conn.execute(
        "INSERT OR REPLACE INTO construction_sites
         (market_id, station_name, station_type, system_name, system_address,
          construction_progress, construction_complete, construction_failed,
          commodities, last_updated, last_source)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            site.market_id,
            site.station_name,
            site.station_type,
            site.system_name,
            site.system_address,
            site.construction_progress,
            site.construction_complete,
            site.construction_failed,
            commodities_json,
            site.last_updated.to_rfc3339(),
            last_source,
        ],
    )?;
    Ok(())
}

fn site_by_market_id_locked(
    conn: &Connection,
    market_id: i64,
) -> Result<Option<ConstructionSite>> {
    let row = conn
        .query_row(
            "SELECT market_id, station_name, station_type, system_name, system_address,
                    construction_progress, construction_complete, construction_failed,
                    commodities, last_updated, last_source
             FROM construction_sites WHERE market_id = ?1",
            params![market_id],
            row_to_site,
        )
        .optional()?;

    match row {
        Some(raw) => Ok(Some(raw.into_site()?)),
        None => Ok(None),
    }
}

fn collect_sites(
    rows: impl Iterator<Item = rusqlite::Result<RawSiteRow>>,
) -> Result<Vec<ConstructionSite>> {
    let mut sites = Vec::new();
    for row in rows {
        sites.push(row?.into_site()?);
    }
    Ok(sites)
}

/// Column values before the JSON blob and timestamp are decoded; kept separate
/// so rusqlite's row mapping stays infallible-typed.
struct RawSiteRow {
    market_id: i64,
    station_name: String,
    station_type: String,
    system_name: String,
    system_address: i64,
    construction_progress: f64,
    construction_complete: bool,
    construction_failed: bool,
    commodities: String,
    last_updated: String,
    last_source: String,
}

impl RawSiteRow {
    fn into_site(self) -> Result<ConstructionSite> {
        let commodities: Vec<Commodity> = serde_json::from_str(&self.commodities)?;
        let last_updated = DateTime::parse_from_rfc3339(&self.last_updated)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let last_source = match self.last_source.as_str() {
            "enrichment" => DataSource::Enrichment,
            _ => DataSource::Journal,
        };
        Ok(ConstructionSite {
            market_id: self.market_id,
            station_name: self.station_name,
            station_type: self.station_type,
            system_name: self.system_name,
            system_address: self.system_address,
            construction_progress: self.construction_progress,
            construction_complete: self.construction_complete,
            construction_failed: self.construction_failed,
            commodities,
            last_updated,
            last_source,
        })
    }
}

fn row_to_site(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSiteRow> {
    Ok(RawSiteRow {
        market_id: row.get(0)?,
        station_name: row.get(1)?,
        station_type: row.get(2)?,
        system_name: row.get(3)?,
        system_address: row.get(4)?,
        construction_progress: row.get(5)?,
        construction_complete: row.get(6)?,
        construction_failed: row.get(7)?,
        commodities: row.get(8)?,
        last_updated: row.get(9)?,
        last_source: row.get(10)?,
    })
}
