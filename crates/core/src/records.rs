use crate::events::ActivityEvent;
use chrono::{DateTime, Local, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column width of `logs.template`.
pub const TEMPLATE_MAX_CHARS: usize = 255;
/// Wall-clock layout of `logs.log_time`, in the agent's local timezone.
pub const LOG_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stable numeric identity of a subject in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub i64);

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A log row that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLogRecord {
    pub template: String,
    pub log: String,
    pub log_time: NaiveDateTime,
    pub subject_id: SubjectId,
}

impl NewLogRecord {
    pub fn from_event(event: &ActivityEvent, subject_id: SubjectId) -> Self {
        Self {
            template: truncate_chars(&event.template, TEMPLATE_MAX_CHARS),
            log: event.activity.clone(),
            log_time: local_wall_clock(event.timestamp),
            subject_id,
        }
    }

    pub fn log_time_text(&self) -> String {
        self.log_time.format(LOG_TIME_FORMAT).to_string()
    }
}

/// A persisted log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub template: String,
    pub log: String,
    pub log_time: String,
    pub subject_id: SubjectId,
}

fn local_wall_clock(ts: DateTime<Utc>) -> NaiveDateTime {
    let local = ts.with_timezone(&Local).naive_local();
    // Second precision, matching the stored text.
    local.with_nanosecond(0).unwrap_or(local)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
