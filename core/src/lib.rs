pub mod aggregate;
pub mod config;
pub mod enrichment;
pub mod ingest;
pub mod journal;
pub mod model;
pub mod notifier;
pub mod store;
pub mod tracker;

// Re-exports for convenience
pub use journal::{JournalEvent, parse_line};
pub use model::{Commodity, CommodityStatus, ConstructionSite, DataSource};
pub use notifier::{UpdateListener, UpdateNotifier};
pub use store::SiteStore;
pub use tracker::SystemTracker;
