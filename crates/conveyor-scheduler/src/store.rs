//! Durable event list, one JSON array per (profile, project) pair.

use std::path::{Path, PathBuf};

use conveyor_core::{ConveyorError, Result};

use crate::events::ScheduledEvent;

/// Full-file rewrite on every mutation, same as the other profile stores.
pub struct EventStore {
    path: PathBuf,
    events: Vec<ScheduledEvent>,
}

impl EventStore {
    pub fn open(dir: &Path, profile: &str, project: &str) -> Self {
        std::fs::create_dir_all(dir).ok();
        let path = dir.join(format!("events-{profile}-{project}.json"));
        let events = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", path.display());
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        Self { path, events }
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.events)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn events(&self) -> &[ScheduledEvent] {
        &self.events
    }

    pub fn get(&self, id: &str) -> Option<&ScheduledEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    /// Insert or replace an event by id.
    pub fn upsert(&mut self, event: ScheduledEvent) -> Result<()> {
        self.events.retain(|e| e.id != event.id);
        self.events.push(event);
        self.save()
    }

    pub fn remove(&mut self, id: &str) -> Result<()> {
        let before = self.events.len();
        self.events.retain(|e| e.id != id);
        if self.events.len() == before {
            return Err(ConveyorError::Scheduling(format!("no event with id {id}")));
        }
        self.save()
    }

    /// Apply a mutation to one event and persist the whole list.
    pub fn update<F>(&mut self, id: &str, f: F) -> Result<ScheduledEvent>
    where
        F: FnOnce(&mut ScheduledEvent),
    {
        let event = self
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| ConveyorError::Scheduling(format!("no event with id {id}")))?;
        f(event);
        let updated = event.clone();
        self.save()?;
        Ok(updated)
    }
}
