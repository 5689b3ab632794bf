//! Tracks where the observer currently is.
//!
//! Pure last-writer-wins storage fed by location, jump, docking and
//! commander events; ingestion consults it when a depot snapshot arrives
//! with missing system/station fields.

use crate::journal::events::{CommanderEvent, DockedEvent, FsdJumpEvent, LocationEvent};

#[derive(Debug, Clone, Default)]
pub struct SystemTracker {
    current_system: Option<String>,
    current_station: Option<String>,
    docked: bool,
    commander: Option<String>,
}

impl SystemTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_system(&self) -> Option<&str> {
        self.current_system.as_deref()
    }

    /// Station name, only while docked.
    pub fn current_station(&self) -> Option<&str> {
        if self.docked {
            self.current_station.as_deref()
        } else {
            None
        }
    }

    pub fn is_docked(&self) -> bool {
        self.docked
    }

    pub fn commander(&self) -> Option<&str> {
        self.commander.as_deref()
    }

    pub fn update_from_location(&mut self, event: &LocationEvent) {
        let old_system = self.current_system.take();
        self.current_system = Some(event.star_system.clone());
        self.docked = event.docked;
        self.current_station = if event.docked {
            event.station_name.clone()
        } else {
            None
        };

        if old_system.as_deref() != Some(&event.star_system) {
            tracing::info!(
                from = old_system.as_deref().unwrap_or("?"),
                to = %event.star_system,
                "system changed"
            );
        }
    }

    pub fn update_from_jump(&mut self, event: &FsdJumpEvent) {
        tracing::info!(to = %event.star_system, dist_ly = event.jump_dist, "jumped");
        self.current_system = Some(event.star_system.clone());
        self.docked = false;
        self.current_station = None;
    }

    pub fn update_from_docked(&mut self, event: &DockedEvent) {
        tracing::info!(station = %event.station_name, system = %event.star_system, "docked");
        self.current_system = Some(event.star_system.clone());
        self.current_station = Some(event.station_name.clone());
        self.docked = true;
    }

    pub fn update_from_commander(&mut self, event: &CommanderEvent) {
        self.commander = Some(event.name.clone());
    }
}
