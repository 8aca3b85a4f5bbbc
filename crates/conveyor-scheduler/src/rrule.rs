//! iCalendar RRULE parsing and occurrence arithmetic.
//!
//! Only the subset the calendar UI emits is supported: `FREQ` of DAILY,
//! WEEKLY or MONTHLY, an optional `INTERVAL`, and an optional `UNTIL`.
//! Occurrence computation is pure so catch-up decisions can be tested
//! without real timers.

use std::str::FromStr;

use chrono::{DateTime, Duration, Months, NaiveDateTime, Utc};

use conveyor_core::{ConveyorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    pub interval: u32,
    pub until: Option<DateTime<Utc>>,
}

impl FromStr for RecurrenceRule {
    type Err = ConveyorError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("RRULE:").unwrap_or(s);

        let mut freq = None;
        let mut interval = 1u32;
        let mut until = None;

        for part in s.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                ConveyorError::Scheduling(format!("malformed rrule component '{part}'"))
            })?;
            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => {
                    freq = Some(match value.trim().to_ascii_uppercase().as_str() {
                        "DAILY" => Frequency::Daily,
                        "WEEKLY" => Frequency::Weekly,
                        "MONTHLY" => Frequency::Monthly,
                        other => {
                            return Err(ConveyorError::Scheduling(format!(
                                "unsupported FREQ '{other}'"
                            )))
                        }
                    });
                }
                "INTERVAL" => {
                    interval = value.trim().parse().map_err(|_| {
                        ConveyorError::Scheduling(format!("bad INTERVAL '{value}'"))
                    })?;
                    if interval == 0 {
                        return Err(ConveyorError::Scheduling("INTERVAL must be >= 1".into()));
                    }
                }
                "UNTIL" => until = Some(parse_until(value.trim())?),
                // BYDAY etc. are not emitted by the UI; ignore rather
                // than reject so hand-edited files still load.
                _ => {}
            }
        }

        let freq = freq
            .ok_or_else(|| ConveyorError::Scheduling(format!("rrule '{s}' is missing FREQ")))?;
        Ok(RecurrenceRule {
            freq,
            interval,
            until,
        })
    }
}

// UNTIL arrives as the compact iCalendar form (19971224T000000Z) or, from
// hand-edited files, RFC 3339.
fn parse_until(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Ok(t.with_timezone(&Utc));
    }
    let compact = value.strip_suffix('Z').unwrap_or(value);
    NaiveDateTime::parse_from_str(compact, "%Y%m%dT%H%M%S")
        .map(|t| t.and_utc())
        .map_err(|_| ConveyorError::Scheduling(format!("bad UNTIL '{value}'")))
}

impl RecurrenceRule {
    /// The n-th occurrence (0 = the series start). None when the date
    /// arithmetic overflows or the occurrence falls past UNTIL.
    pub fn occurrence(&self, start: DateTime<Utc>, n: u32) -> Option<DateTime<Utc>> {
        let step = n.checked_mul(self.interval)?;
        let at = match self.freq {
            Frequency::Daily => start.checked_add_signed(Duration::days(i64::from(step)))?,
            Frequency::Weekly => start.checked_add_signed(Duration::weeks(i64::from(step)))?,
            Frequency::Monthly => start.checked_add_months(Months::new(step))?,
        };
        match self.until {
            Some(until) if at > until => None,
            _ => Some(at),
        }
    }
}

/// First occurrence strictly after `after`.
pub fn next_after(
    rule: &RecurrenceRule,
    start: DateTime<Utc>,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut n = 0;
    while let Some(at) = rule.occurrence(start, n) {
        if at > after {
            return Some(at);
        }
        n += 1;
    }
    None
}

/// Most recent occurrence at or before `before`.
pub fn previous_before(
    rule: &RecurrenceRule,
    start: DateTime<Utc>,
    before: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut last = None;
    let mut n = 0;
    while let Some(at) = rule.occurrence(start, n) {
        if at > before {
            break;
        }
        last = Some(at);
        n += 1;
    }
    last
}

/// Catch-up decision: the most recent occurrence at or before `now` that
/// has not already completed. Earlier missed occurrences are deliberately
/// dropped so a long-offline restart fires once, not once per miss.
pub fn next_due(
    rule: &RecurrenceRule,
    start: DateTime<Utc>,
    completed: &[String],
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let due = previous_before(rule, start, now)?;
    if completed.contains(&due.to_rfc3339()) {
        None
    } else {
        Some(due)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_weekly_with_until() {
        let rule: RecurrenceRule = "FREQ=WEEKLY;UNTIL=20260301T090000Z".parse().unwrap();
        assert_eq!(rule.freq, Frequency::Weekly);
        assert_eq!(rule.interval, 1);
        assert_eq!(rule.until, Some(at(2026, 3, 1, 9)));
    }

    #[test]
    fn test_parse_with_prefix_and_interval() {
        let rule: RecurrenceRule = "RRULE:FREQ=DAILY;INTERVAL=3".parse().unwrap();
        assert_eq!(rule.freq, Frequency::Daily);
        assert_eq!(rule.interval, 3);
        assert!(rule.until.is_none());
    }

    #[test]
    fn test_parse_rejects_missing_freq_and_bad_interval() {
        assert!("INTERVAL=2".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=WEEKLY;INTERVAL=0".parse::<RecurrenceRule>().is_err());
        assert!("FREQ=HOURLY".parse::<RecurrenceRule>().is_err());
    }

    #[test]
    fn test_unknown_components_ignored() {
        let rule: RecurrenceRule = "FREQ=WEEKLY;BYDAY=MO".parse().unwrap();
        assert_eq!(rule.freq, Frequency::Weekly);
    }

    #[test]
    fn test_monthly_occurrences_keep_day_of_month() {
        let rule: RecurrenceRule = "FREQ=MONTHLY".parse().unwrap();
        let start = at(2026, 1, 31, 9);
        assert_eq!(rule.occurrence(start, 0), Some(at(2026, 1, 31, 9)));
        // February clamps to its last day.
        assert_eq!(rule.occurrence(start, 1), Some(at(2026, 2, 28, 9)));
        assert_eq!(rule.occurrence(start, 2), Some(at(2026, 3, 31, 9)));
    }

    #[test]
    fn test_next_after_and_previous_before() {
        let rule: RecurrenceRule = "FREQ=WEEKLY".parse().unwrap();
        let start = at(2026, 1, 5, 9);
        let now = at(2026, 1, 20, 12);

        assert_eq!(next_after(&rule, start, now), Some(at(2026, 1, 26, 9)));
        assert_eq!(previous_before(&rule, start, now), Some(at(2026, 1, 19, 9)));
        // Before the series begins there is no prior occurrence.
        assert!(previous_before(&rule, start, at(2026, 1, 1, 0)).is_none());
    }

    #[test]
    fn test_until_caps_the_series() {
        let rule: RecurrenceRule = "FREQ=WEEKLY;UNTIL=20260119T090000Z".parse().unwrap();
        let start = at(2026, 1, 5, 9);
        assert_eq!(
            next_after(&rule, start, at(2026, 1, 12, 10)),
            Some(at(2026, 1, 19, 9))
        );
        assert!(next_after(&rule, start, at(2026, 1, 19, 9)).is_none());
    }

    #[test]
    fn test_next_due_skips_earlier_missed_occurrences() {
        let rule: RecurrenceRule = "FREQ=WEEKLY".parse().unwrap();
        let start = at(2026, 1, 5, 9);
        let now = at(2026, 1, 20, 12);

        // Two occurrences were missed (Jan 5, 12, 19 all past; none done).
        // Only the most recent one is due.
        assert_eq!(next_due(&rule, start, &[], now), Some(at(2026, 1, 19, 9)));

        // Once that one is recorded, nothing is due.
        let done = vec![at(2026, 1, 19, 9).to_rfc3339()];
        assert!(next_due(&rule, start, &done, now).is_none());
    }
}
