//! Seams between the agent and the operating system.
//!
//! The sampler and keep-awake guard only see these traits; `desktop` holds the
//! real implementations and tests substitute their own.

use anyhow::Result;

pub mod desktop;

pub use desktop::{ActiveWindowInspector, PlatformSleepInhibitor, SysinfoProcessNamer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundWindow {
    pub title: String,
    pub process_id: u32,
}

pub trait WindowInspector {
    /// The currently focused top-level window, or `None` if nothing has focus.
    fn foreground_window(&mut self) -> Result<Option<ForegroundWindow>>;
}

pub trait ProcessNamer {
    fn process_name(&mut self, process_id: u32) -> Result<String>;
}

/// Keeps the machine from suspending while held.
pub trait SleepInhibitor: Send {
    fn hold(&mut self) -> Result<()>;
    fn release(&mut self) -> Result<()>;
}
