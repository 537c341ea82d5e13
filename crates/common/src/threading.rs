use anyhow::{Result, anyhow};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Slot declared up front, thread not spawned yet.
    Reserved,
    Running,
    Joined,
    /// Handle dropped without a join; the thread may still be finishing work.
    Detached,
    Panicked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSnapshot {
    pub name: String,
    pub status: ThreadStatus,
}

#[derive(Default)]
struct ThreadRegistryInner {
    slots: Mutex<Vec<ThreadSnapshot>>,
}

impl ThreadRegistryInner {
    fn slots(&self) -> MutexGuard<'_, Vec<ThreadSnapshot>> {
        self.slots.lock().expect("thread registry mutex poisoned")
    }

    fn set_status(&self, id: usize, status: ThreadStatus) {
        if let Some(slot) = self.slots().get_mut(id) {
            slot.status = status;
        }
    }
}

/// Names and tracks the agent's background loops so shutdown can report
/// which of them are still alive.
#[derive(Clone, Default)]
pub struct ThreadRegistry {
    inner: Arc<ThreadRegistryInner>,
}

impl ThreadRegistry {
    /// Declares the loops up front so a snapshot lists them before they start.
    /// Duplicate names share one slot.
    pub fn with_slots<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::default();
        {
            let mut slots = registry.inner.slots();
            for name in names {
                let name = name.into();
                if slots.iter().any(|s| s.name == name) {
                    continue;
                }
                slots.push(ThreadSnapshot {
                    name,
                    status: ThreadStatus::Reserved,
                });
            }
        }
        registry
    }

    pub fn spawn<F>(&self, name: impl Into<String>, f: F) -> Result<ThreadHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let builder = thread::Builder::new().name(name.clone());
        let join_handle = builder
            .spawn(f)
            .map_err(|e| anyhow!("failed to spawn thread '{name}': {e}"))?;

        let id = {
            let mut slots = self.inner.slots();
            match slots
                .iter()
                .position(|s| s.name == name && s.status == ThreadStatus::Reserved)
            {
                Some(id) => {
                    slots[id].status = ThreadStatus::Running;
                    id
                }
                None => {
                    slots.push(ThreadSnapshot {
                        name: name.clone(),
                        status: ThreadStatus::Running,
                    });
                    slots.len() - 1
                }
            }
        };

        Ok(ThreadHandle {
            id,
            handle: Some(join_handle),
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn snapshot(&self) -> Vec<ThreadSnapshot> {
        self.inner.slots().clone()
    }
}

pub struct ThreadHandle {
    id: usize,
    handle: Option<JoinHandle<()>>,
    inner: Arc<ThreadRegistryInner>,
}

impl ThreadHandle {
    pub fn join(mut self) -> std::thread::Result<()> {
        let result = match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        };
        let status = if result.is_ok() {
            ThreadStatus::Joined
        } else {
            ThreadStatus::Panicked
        };
        self.inner.set_status(self.id, status);
        result
    }
}

impl Drop for ThreadHandle {
    fn drop(&mut self) {
        // Dropping the JoinHandle detaches the thread; never block here.
        if self.handle.take().is_some() {
            self.inner.set_status(self.id, ThreadStatus::Detached);
        }
    }
}
