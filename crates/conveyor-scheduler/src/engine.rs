//! The scheduler proper: timers, catch-up, and execution bookkeeping.
//!
//! Per event the lifecycle is pending → armed → executing → completed or
//! failed, with recurring events cycling back to armed for their next
//! occurrence. All state lives behind one async mutex; timer tasks take
//! the lock only when they fire, so an in-flight execution serializes
//! against edits to the event list.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use conveyor_core::{DiagnosticSink, MessageSender, Result};
use conveyor_objects::InstanceStore;

use crate::events::ScheduledEvent;
use crate::rrule::{next_after, next_due, RecurrenceRule};
use crate::store::EventStore;

struct SchedulerInner {
    store: EventStore,
    sender: Arc<dyn MessageSender>,
    instances: Arc<Mutex<InstanceStore>>,
    diag: Arc<dyn DiagnosticSink>,
    timers: HashMap<String, JoinHandle<()>>,
}

impl SchedulerInner {
    fn cancel_timer(&mut self, event_id: &str) {
        if let Some(handle) = self.timers.remove(event_id) {
            handle.abort();
        }
    }

    fn cancel_all(&mut self) {
        for (_, handle) in self.timers.drain() {
            handle.abort();
        }
    }
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Mutex<SchedulerInner>>,
}

impl Scheduler {
    pub fn new(
        store: EventStore,
        sender: Arc<dyn MessageSender>,
        instances: Arc<Mutex<InstanceStore>>,
        diag: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedulerInner {
                store,
                sender,
                instances,
                diag,
                timers: HashMap::new(),
            })),
        }
    }

    /// Load (or reload) the persisted events: cancel every live timer,
    /// execute whatever catch-up is due, then arm timers for the future.
    /// Called at startup and whenever the active profile or project
    /// changes.
    pub async fn load(&self) -> Result<()> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        inner.cancel_all();

        let events: Vec<ScheduledEvent> = inner.store.events().to_vec();
        info!("📅 scheduler loading {} events", events.len());
        for event in events {
            self.schedule_one(&mut inner, &event, now).await;
        }
        Ok(())
    }

    /// Insert or replace an event. Any existing timer is cancelled before
    /// the new schedule is computed, so a stale timer can never fire
    /// against superseded data.
    pub async fn upsert_event(&self, event: ScheduledEvent) -> Result<()> {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        inner.cancel_timer(&event.id);
        inner.store.upsert(event.clone())?;
        self.schedule_one(&mut inner, &event, now).await;
        Ok(())
    }

    pub async fn remove_event(&self, event_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.cancel_timer(event_id);
        inner.store.remove(event_id)
    }

    pub async fn events(&self) -> Vec<ScheduledEvent> {
        self.inner.lock().await.store.events().to_vec()
    }

    /// Number of events with a live timer.
    pub async fn active_timers(&self) -> usize {
        self.inner.lock().await.timers.len()
    }

    pub async fn shutdown(&self) {
        self.inner.lock().await.cancel_all();
    }

    async fn schedule_one(
        &self,
        inner: &mut SchedulerInner,
        event: &ScheduledEvent,
        now: DateTime<Utc>,
    ) {
        let Some(start) = event.start_time() else {
            warn!("⚠️ event {} has unparseable start '{}'", event.id, event.start);
            inner
                .diag
                .emit(&format!("event '{}' has an invalid start time", event.title));
            return;
        };

        match event.rrule.as_deref().filter(|r| !r.trim().is_empty()) {
            Some(raw) => {
                let rule: RecurrenceRule = match raw.parse() {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("⚠️ event {}: {e}", event.id);
                        inner
                            .diag
                            .emit(&format!("event '{}' has an invalid recurrence rule", event.title));
                        return;
                    }
                };
                // Catch up the most recent missed occurrence, if any.
                if let Some(due) = next_due(&rule, start, &event.props.completed_occurrences, now) {
                    info!("📅 catching up {} occurrence {}", event.id, due);
                    Self::execute(inner, &event.id, due).await;
                }
                if let Some(next) = next_after(&rule, start, now) {
                    self.arm(inner, event.id.clone(), next, now);
                }
            }
            None => {
                if event.is_completed() {
                    return;
                }
                if start <= now {
                    info!("📅 executing overdue event {}", event.id);
                    Self::execute(inner, &event.id, start).await;
                } else {
                    self.arm(inner, event.id.clone(), start, now);
                }
            }
        }
    }

    /// Arm a timer for one occurrence. The spawned task re-enters the
    /// scheduler when it fires and keeps looping for recurring events, so
    /// a single task per event covers the whole series.
    fn arm(
        &self,
        inner: &mut SchedulerInner,
        event_id: String,
        at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        inner.cancel_timer(&event_id);
        let delay = (at - now).to_std().unwrap_or_default();
        info!("📅 arming {} for {} (in {:?})", event_id, at, delay);

        let scheduler = self.clone();
        let id = event_id.clone();
        let handle = tokio::spawn(async move {
            let mut at = at;
            let mut delay = delay;
            loop {
                tokio::time::sleep(delay).await;
                match scheduler.fire(&id, at).await {
                    Some(next) => {
                        let now = Utc::now();
                        delay = (next - now).to_std().unwrap_or_default();
                        at = next;
                    }
                    None => break,
                }
            }
        });
        inner.timers.insert(event_id, handle);
    }

    /// Execute a fired occurrence and hand back the next one to wait for,
    /// recomputed from "now" so drift never accumulates and occurrences
    /// skipped while executing are not replayed.
    async fn fire(&self, event_id: &str, occurrence: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut inner = self.inner.lock().await;
        // Guard against deletion racing the timer.
        if inner.store.get(event_id).is_some() {
            Self::execute(&mut inner, event_id, occurrence).await;
        }

        let next = Self::next_occurrence(&inner, event_id);
        if next.is_none() {
            // The series is over; drop the finished task's handle so the
            // timer map does not grow over a long-running process.
            inner.timers.remove(event_id);
        }
        next
    }

    fn next_occurrence(inner: &SchedulerInner, event_id: &str) -> Option<DateTime<Utc>> {
        let event = inner.store.get(event_id)?;
        let rule: RecurrenceRule = event.rrule.as_deref()?.parse().ok()?;
        let start = event.start_time()?;
        next_after(&rule, start, Utc::now())
    }

    /// One execution attempt. The updated event list is persisted whether
    /// the send succeeds or fails.
    async fn execute(inner: &mut SchedulerInner, event_id: &str, occurrence: DateTime<Utc>) {
        let Some(event) = inner.store.get(event_id).cloned() else {
            return;
        };
        let payload = match Self::render_payload(inner, &event).await {
            Ok(p) => p,
            Err(e) => {
                warn!("⚠️ event {} payload error: {e}", event.id);
                inner.diag.emit(&format!("event '{}' failed: {e}", event.title));
                if let Err(e) = inner
                    .store
                    .update(event_id, |e2| e2.mark_failed(&e.to_string(), Utc::now()))
                {
                    warn!("⚠️ failed to persist event {}: {e}", event.id);
                }
                return;
            }
        };

        let outcome = inner
            .sender
            .send(&event.props.assistant_id, &payload, None)
            .await;
        let now = Utc::now();
        let update = match outcome {
            Ok(_) => {
                info!("📅 event {} occurrence {} completed", event.id, occurrence);
                inner
                    .store
                    .update(event_id, |e| e.mark_completed(occurrence, now))
            }
            Err(e) => {
                warn!("⚠️ event {} failed: {e}", event.id);
                inner.diag.emit(&format!("event '{}' failed: {e}", event.title));
                inner
                    .store
                    .update(event_id, |e2| e2.mark_failed(&e.to_string(), now))
            }
        };
        if let Err(e) = update {
            warn!("⚠️ failed to persist event {}: {e}", event.id);
        }
    }

    async fn render_payload(inner: &SchedulerInner, event: &ScheduledEvent) -> Result<String> {
        use crate::events::EventPayload;
        match &event.props.payload {
            EventPayload::Message { message } => Ok(message.clone()),
            EventPayload::Object { object_id } => {
                let instances = inner.instances.lock().await;
                let instance = instances.get(object_id).ok_or_else(|| {
                    conveyor_core::ConveyorError::Scheduling(format!(
                        "object {object_id} not found"
                    ))
                })?;
                Ok(serde_json::to_string(instance)?)
            }
        }
    }
}
