use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process name recorded when the owning process cannot be identified.
pub const UNKNOWN_PROCESS: &str = "Unknown";

/// One observed change of the focused window.
///
/// Built by the sampler, handed across the event queue and consumed by the
/// persistence worker. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub timestamp: DateTime<Utc>,
    /// Window title of the newly focused window.
    pub activity: String,
    /// Name of the process owning that window.
    pub template: String,
    pub subject: String,
}

impl ActivityEvent {
    pub fn new(
        timestamp: DateTime<Utc>,
        activity: impl Into<String>,
        template: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            activity: activity.into(),
            template: template.into(),
            subject: subject.into(),
        }
    }
}
