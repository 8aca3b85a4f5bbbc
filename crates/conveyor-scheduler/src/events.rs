//! Scheduled event records.
//!
//! The on-disk shape mirrors the calendar UI's event objects: the
//! scheduling fields live at the top level, everything the executor needs
//! rides in `extendedProps`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What firing the event dispatches to the assistant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum EventPayload {
    /// A plain text message.
    Message { message: String },
    /// A stored object instance, serialized as the message body.
    Object { object_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EventProps {
    pub assistant_id: String,
    #[serde(flatten)]
    pub payload: EventPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Start timestamps of already-executed occurrences, recurring
    /// events only. Grows monotonically, never holds duplicates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub completed_occurrences: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledEvent {
    pub id: String,
    pub title: String,
    /// ISO timestamp of the (first) start.
    pub start: String,
    /// iCalendar RRULE text, present for recurring events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrule: Option<String>,
    #[serde(rename = "extendedProps")]
    pub props: EventProps,
}

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

impl ScheduledEvent {
    pub fn is_recurring(&self) -> bool {
        self.rrule.as_deref().map(str::trim).is_some_and(|r| !r.is_empty())
    }

    pub fn is_completed(&self) -> bool {
        self.props.status.as_deref() == Some(STATUS_COMPLETED)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.start)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    /// Record a successful occurrence. Non-recurring events get a terminal
    /// status; recurring events append the occurrence timestamp once.
    pub fn mark_completed(&mut self, occurrence: DateTime<Utc>, now: DateTime<Utc>) {
        self.props.last_run = Some(now.to_rfc3339());
        self.props.error = None;
        if self.is_recurring() {
            let stamp = occurrence.to_rfc3339();
            if !self.props.completed_occurrences.contains(&stamp) {
                self.props.completed_occurrences.push(stamp);
            }
        } else {
            self.props.status = Some(STATUS_COMPLETED.to_string());
        }
    }

    /// Record a failed occurrence. Recurring events keep no terminal
    /// status so the next occurrence remains eligible.
    pub fn mark_failed(&mut self, error: &str, now: DateTime<Utc>) {
        self.props.last_run = Some(now.to_rfc3339());
        self.props.error = Some(error.to_string());
        if !self.is_recurring() {
            self.props.status = Some(STATUS_FAILED.to_string());
        }
    }

    pub fn occurrence_completed(&self, occurrence: DateTime<Utc>) -> bool {
        let stamp = occurrence.to_rfc3339();
        self.props.completed_occurrences.contains(&stamp)
    }
}
