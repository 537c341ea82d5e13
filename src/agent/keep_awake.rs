use crate::agent::capture::SleepInhibitor;
use crate::agent::error::MonitorError;
use crate::util::cancel::CancelToken;
use crate::util::logging::{debug, info, warn};
use std::time::Duration;

/// Re-asserts the keep-awake request on a fixed cadence and releases it once
/// on the way out.
pub struct KeepAwakeGuard {
    inhibitor: Box<dyn SleepInhibitor>,
    interval: Duration,
    cancel: CancelToken,
}

impl KeepAwakeGuard {
    pub fn new(inhibitor: Box<dyn SleepInhibitor>, interval: Duration, cancel: CancelToken) -> Self {
        Self {
            inhibitor,
            interval,
            cancel,
        }
    }

    pub fn run(mut self) {
        info!("Keep-awake guard started (interval {:?})", self.interval);
        loop {
            if let Err(e) = self.inhibitor.hold().map_err(MonitorError::OsCapture) {
                debug!("Keep-awake request failed, retrying next tick: {}", e);
            }
            if self.cancel.wait_timeout(self.interval) {
                break;
            }
        }
        if let Err(e) = self.inhibitor.release() {
            warn!("Failed to release keep-awake state: {:#}", e);
        }
        info!("Keep-awake guard stopped");
    }
}
