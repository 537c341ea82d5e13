use anyhow::Result;

use deskwatch_core::records::{NewLogRecord, SubjectId};

/// The relational store the agent writes into.
///
/// Implementations own their connection. A single call may block for as long
/// as the underlying connection allows; callers do not impose their own
/// timeout.
pub trait ActivityStore: Send {
    /// Looks up the stable identity of a subject by name.
    fn find_subject_id(&mut self, name: &str) -> Result<Option<SubjectId>>;

    /// Writes one record in its own transaction and returns the new row id.
    fn insert_log(&mut self, record: &NewLogRecord) -> Result<i64>;
}

pub mod sqlite3;
