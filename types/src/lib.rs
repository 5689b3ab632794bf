//! Shared configuration types for EDCO.
//!
//! These are plain serde structs so that both the core library and any
//! frontend can agree on the settings schema without pulling in the
//! core's heavier dependencies.

pub mod settings;

pub use settings::{AppConfig, EnrichmentConfig, JournalConfig};
