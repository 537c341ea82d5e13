use super::{ForegroundWindow, ProcessNamer, SleepInhibitor, WindowInspector};
use crate::util::logging::debug;
use active_win_pos_rs::get_active_window;
use anyhow::{Result, anyhow};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Foreground window lookup through `active-win-pos-rs`.
#[derive(Debug, Default)]
pub struct ActiveWindowInspector;

impl ActiveWindowInspector {
    pub fn new() -> Self {
        Self
    }
}

impl WindowInspector for ActiveWindowInspector {
    fn foreground_window(&mut self) -> Result<Option<ForegroundWindow>> {
        // The crate reports "no active window" and "lookup failed" the same way.
        match get_active_window() {
            Ok(window) => {
                let process_id = u32::try_from(window.process_id)
                    .map_err(|_| anyhow!("process id {} out of range", window.process_id))?;
                Ok(Some(ForegroundWindow {
                    title: window.title,
                    process_id,
                }))
            }
            Err(()) => Ok(None),
        }
    }
}

/// Process names through `sysinfo`, refreshing only the requested pid.
pub struct SysinfoProcessNamer {
    system: System,
}

impl Default for SysinfoProcessNamer {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProcessNamer {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl ProcessNamer for SysinfoProcessNamer {
    fn process_name(&mut self, process_id: u32) -> Result<String> {
        let pid = Pid::from_u32(process_id);
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
        self.system
            .process(pid)
            .map(|p| p.name().to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("no process with pid {process_id}"))
    }
}

/// Idle-sleep prevention for the current platform.
#[derive(Default)]
pub struct PlatformSleepInhibitor {
    #[cfg(target_os = "macos")]
    child: Option<std::process::Child>,
}

impl PlatformSleepInhibitor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(windows)]
impl SleepInhibitor for PlatformSleepInhibitor {
    fn hold(&mut self) -> Result<()> {
        use winapi::um::winbase::SetThreadExecutionState;
        use winapi::um::winnt::{ES_CONTINUOUS, ES_DISPLAY_REQUIRED, ES_SYSTEM_REQUIRED};

        let previous = unsafe {
            SetThreadExecutionState(ES_CONTINUOUS | ES_SYSTEM_REQUIRED | ES_DISPLAY_REQUIRED)
        };
        if previous == 0 {
            return Err(anyhow!("SetThreadExecutionState rejected the request"));
        }
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        use winapi::um::winbase::SetThreadExecutionState;
        use winapi::um::winnt::ES_CONTINUOUS;

        if unsafe { SetThreadExecutionState(ES_CONTINUOUS) } == 0 {
            return Err(anyhow!("SetThreadExecutionState rejected the release"));
        }
        Ok(())
    }
}

#[cfg(target_os = "macos")]
impl SleepInhibitor for PlatformSleepInhibitor {
    fn hold(&mut self) -> Result<()> {
        if let Some(child) = self.child.as_mut() {
            if child.try_wait()?.is_none() {
                return Ok(());
            }
            debug!("caffeinate exited; restarting it");
        }
        // -w ties the assertion to our pid so it never outlives the agent.
        let child = std::process::Command::new("caffeinate")
            .args(["-dis", "-w", &std::process::id().to_string()])
            .spawn()?;
        self.child = Some(child);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            child.kill()?;
            child.wait()?;
        }
        Ok(())
    }
}

#[cfg(not(any(windows, target_os = "macos")))]
impl SleepInhibitor for PlatformSleepInhibitor {
    fn hold(&mut self) -> Result<()> {
        debug!("Sleep inhibition is not supported on this platform; skipping");
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}
