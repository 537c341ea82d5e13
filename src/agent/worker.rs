use crate::agent::error::MonitorError;
use crate::agent::identity::{IdentityResolver, Resolution};
use crate::agent::queue::{EventQueue, Pop};
use crate::util::logging::{debug, error, info};
use deskwatch_core::events::ActivityEvent;
use deskwatch_core::records::NewLogRecord;
use deskwatch_storage::ActivityStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    /// Producer finished; emptying the queue before stopping.
    Draining,
    Stopped,
}

/// Counters shared between the worker thread and whoever supervises it.
#[derive(Debug, Default)]
pub struct WorkerStats {
    persisted: AtomicU64,
    unresolved: AtomicU64,
    failed: AtomicU64,
}

impl WorkerStats {
    pub fn persisted(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    /// Events dropped because their subject had no identity.
    pub fn unresolved(&self) -> u64 {
        self.unresolved.load(Ordering::Relaxed)
    }

    /// Events dropped because a store query or write failed.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Single consumer of the event queue. Owns the store connection and the
/// identity cache.
pub struct PersistenceWorker {
    store: Box<dyn ActivityStore>,
    identities: IdentityResolver,
    queue: EventQueue,
    pop_timeout: Duration,
    stats: Arc<WorkerStats>,
    state: WorkerState,
}

impl PersistenceWorker {
    pub fn new(store: Box<dyn ActivityStore>, queue: EventQueue, pop_timeout: Duration) -> Self {
        Self {
            store,
            identities: IdentityResolver::new(),
            queue,
            pop_timeout,
            stats: Arc::new(WorkerStats::default()),
            state: WorkerState::Running,
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn identities(&self) -> &IdentityResolver {
        &self.identities
    }

    /// Drains the queue until it has been closed and emptied.
    pub fn run(&mut self) {
        info!("Persistence worker started");
        while self.state != WorkerState::Stopped {
            self.step();
        }
        info!(
            "Persistence worker stopped (persisted={}, unresolved={}, failed={})",
            self.stats.persisted(),
            self.stats.unresolved(),
            self.stats.failed()
        );
    }

    /// One pop-and-handle iteration. Returns the state after it.
    pub fn step(&mut self) -> WorkerState {
        if self.state == WorkerState::Running && self.queue.is_closed() {
            debug!(
                "Persistence worker draining {} queued events",
                self.queue.len()
            );
            self.state = WorkerState::Draining;
        }

        match self.queue.pop(self.pop_timeout) {
            Pop::Event(event) => self.handle(event),
            Pop::Idle => {
                if self.queue.is_exhausted() {
                    self.state = WorkerState::Stopped;
                }
            }
        }
        self.state
    }

    fn handle(&mut self, event: ActivityEvent) {
        match self.persist(&event) {
            Ok(id) => {
                self.stats.persisted.fetch_add(1, Ordering::Relaxed);
                debug!("Stored log {} for '{}': {}", id, event.subject, event.activity);
            }
            Err(MonitorError::IdentityUnresolved(subject)) => {
                self.stats.unresolved.fetch_add(1, Ordering::Relaxed);
                debug!("Dropping event for unresolved subject '{}'", subject);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                error!("Dropping event '{}': {}", event.activity, e);
            }
        }
    }

    fn persist(&mut self, event: &ActivityEvent) -> Result<i64, MonitorError> {
        let subject_id = match self.identities.resolve(self.store.as_mut(), &event.subject) {
            Resolution::Known(id) => id,
            Resolution::Unknown => {
                return Err(MonitorError::IdentityUnresolved(event.subject.clone()));
            }
            Resolution::Failed(e) => return Err(MonitorError::TransientStore(e)),
        };
        let record = NewLogRecord::from_event(event, subject_id);
        self.store
            .insert_log(&record)
            .map_err(MonitorError::TransientStore)
    }
}
