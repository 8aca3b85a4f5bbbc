//! # Conveyor Scheduler
//!
//! Durable one-shot and recurring events. Recurrence rules use the
//! iCalendar RRULE text form so event files stay editable by hand. On
//! load the scheduler catches up the most recent missed occurrence of
//! each recurring event, then arms a timer for the next future one; each
//! occurrence executes at most once across restarts.

pub mod engine;
pub mod events;
pub mod rrule;
pub mod store;

pub use engine::Scheduler;
pub use events::{EventPayload, EventProps, ScheduledEvent};
pub use rrule::{next_after, next_due, previous_before, Frequency, RecurrenceRule};
pub use store::EventStore;
