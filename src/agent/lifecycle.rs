use crate::agent::capture::{ProcessNamer, SleepInhibitor, WindowInspector};
use crate::agent::keep_awake::KeepAwakeGuard;
use crate::agent::queue::EventQueue;
use crate::agent::sampler::WindowSampler;
use crate::agent::worker::PersistenceWorker;
use crate::util::cancel::CancelToken;
use crate::util::config::AppConfig;
use crate::util::logging::{error, info, warn};
use crate::util::threading::{ThreadHandle, ThreadRegistry, ThreadStatus};
use anyhow::Result;
use crossbeam_channel::RecvTimeoutError;
use deskwatch_storage::ActivityStore;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WORKER_THREAD: &str = "persistence-worker";
const KEEP_AWAKE_THREAD: &str = "keep-awake";

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub sample_interval: Duration,
    /// `None` disables the keep-awake guard.
    pub keep_awake_interval: Option<Duration>,
    /// Zero means unbounded.
    pub queue_capacity: usize,
    pub pop_timeout: Duration,
    pub drain_grace: Duration,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            sample_interval: config.sample_interval(),
            keep_awake_interval: config
                .keep_awake_enabled
                .then(|| config.keep_awake_interval()),
            queue_capacity: config.queue_capacity,
            pop_timeout: config.queue_poll(),
            drain_grace: config.drain_grace(),
        }
    }
}

/// The platform and store collaborators, chosen at composition time.
pub struct AgentParts {
    pub inspector: Box<dyn WindowInspector>,
    pub namer: Box<dyn ProcessNamer>,
    pub inhibitor: Box<dyn SleepInhibitor>,
    pub store: Box<dyn ActivityStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AgentState {
    Init,
    Running,
    Stopping,
    Stopped,
}

/// Read-only view of the agent's state, usable from other threads.
#[derive(Debug, Clone)]
pub struct AgentStatus(Arc<Mutex<AgentState>>);

impl AgentStatus {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(AgentState::Init)))
    }

    pub fn get(&self) -> AgentState {
        *self.0.lock().expect("agent status mutex poisoned")
    }

    // States only move forward.
    fn advance(&self, next: AgentState) {
        let mut state = self.0.lock().expect("agent status mutex poisoned");
        if next > *state {
            info!("Agent state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub persisted: u64,
    pub unresolved: u64,
    pub failed: u64,
    /// Rejected by the queue while it was full.
    pub overflowed: u64,
    /// Still queued when the grace period ran out.
    pub discarded: usize,
    /// Whether the worker finished within the grace period.
    pub drained: bool,
}

/// Supervises the sampler, persistence worker and keep-awake guard.
pub struct Agent {
    settings: AgentSettings,
    subject: String,
    parts: AgentParts,
    queue: EventQueue,
    cancel: CancelToken,
    threads: ThreadRegistry,
    status: AgentStatus,
}

impl Agent {
    pub fn new(settings: AgentSettings, subject: impl Into<String>, parts: AgentParts) -> Self {
        let queue = EventQueue::new(settings.queue_capacity);
        Self {
            settings,
            subject: subject.into(),
            parts,
            queue,
            cancel: CancelToken::new(),
            threads: ThreadRegistry::with_slots([WORKER_THREAD, KEEP_AWAKE_THREAD]),
            status: AgentStatus::new(),
        }
    }

    /// Shares a caller-owned token instead of the agent's own.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancelling this token is the explicit stop request.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn queue(&self) -> EventQueue {
        self.queue.clone()
    }

    pub fn status(&self) -> AgentStatus {
        self.status.clone()
    }

    /// Runs the sampler on the calling thread until the cancel token fires,
    /// then shuts everything down within the grace period.
    ///
    /// Errors only for failures while starting the background loops.
    pub fn run(self) -> Result<ShutdownReport> {
        let Agent {
            settings,
            subject,
            parts,
            queue,
            cancel,
            threads,
            status,
        } = self;
        let AgentParts {
            inspector,
            namer,
            inhibitor,
            store,
        } = parts;

        let mut worker = PersistenceWorker::new(store, queue.clone(), settings.pop_timeout);
        let stats = worker.stats();
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let worker_handle = threads.spawn(WORKER_THREAD, move || {
            worker.run();
            let _ = done_tx.send(());
        })?;

        let guard_handle = match settings.keep_awake_interval {
            Some(interval) => {
                let guard = KeepAwakeGuard::new(inhibitor, interval, cancel.clone());
                match threads.spawn(KEEP_AWAKE_THREAD, move || guard.run()) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        cancel.cancel();
                        queue.close();
                        return Err(e);
                    }
                }
            }
            None => {
                info!("Keep-awake guard disabled");
                None
            }
        };

        status.advance(AgentState::Running);
        let mut sampler = WindowSampler::new(inspector, namer, queue.clone(), subject);
        sampler.run(&cancel, settings.sample_interval);

        // The sampler only returns once the token has fired; make that explicit
        // for the other loops regardless. Its last push has happened by now.
        cancel.cancel();
        queue.close();
        status.advance(AgentState::Stopping);

        let (drained, discarded) =
            Self::await_worker(worker_handle, &done_rx, &queue, settings.drain_grace);

        if let Some(handle) = guard_handle {
            if let Err(e) = handle.join() {
                error!("Keep-awake guard panicked: {:?}", e);
            }
        }

        let detached: Vec<_> = threads
            .snapshot()
            .into_iter()
            .filter(|t| t.status == ThreadStatus::Detached)
            .map(|t| t.name)
            .collect();
        if !detached.is_empty() {
            warn!("Leaving threads behind at exit: {:?}", detached);
        }

        status.advance(AgentState::Stopped);
        let report = ShutdownReport {
            persisted: stats.persisted(),
            unresolved: stats.unresolved(),
            failed: stats.failed(),
            overflowed: queue.overflowed(),
            discarded,
            drained,
        };
        info!("Agent stopped: {:?}", report);
        Ok(report)
    }

    fn await_worker(
        handle: ThreadHandle,
        done_rx: &crossbeam_channel::Receiver<()>,
        queue: &EventQueue,
        grace: Duration,
    ) -> (bool, usize) {
        let deadline = Instant::now() + grace;
        info!(
            "Waiting up to {:?} for {} queued events to drain",
            grace,
            queue.len()
        );
        match done_rx.recv_deadline(deadline) {
            Ok(()) => {
                if let Err(e) = handle.join() {
                    error!("Persistence worker panicked: {:?}", e);
                }
                // Only reachable if something pushed after the queue was closed.
                let leftover = Self::discard(queue);
                (leftover == 0, leftover)
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The worker ended without reporting back, i.e. it panicked.
                if let Err(e) = handle.join() {
                    error!("Persistence worker panicked: {:?}", e);
                }
                (false, Self::discard(queue))
            }
            Err(RecvTimeoutError::Timeout) => {
                let discarded = Self::discard(queue);
                // Detach: an in-flight write may still complete on its own.
                drop(handle);
                (false, discarded)
            }
        }
    }

    fn discard(queue: &EventQueue) -> usize {
        let discarded = queue.discard_pending();
        if discarded > 0 {
            warn!(
                "Grace period expired; discarding {} undelivered events",
                discarded
            );
        }
        discarded
    }
}
