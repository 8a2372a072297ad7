use crate::Result;
use crate::error::SupervisorError;
use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use std::fmt::Display;
use std::sync::Mutex;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate};
#[cfg(unix)]
use sysinfo::Signal;

/// Snapshot of an OS process, resolved fresh on every query.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Local>,
}

impl ProcessInfo {
    pub fn uptime(&self) -> Duration {
        (Local::now() - self.created_at)
            .to_std()
            .unwrap_or_default()
    }
}

impl Display for ProcessInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let uptime = Duration::from_secs(self.uptime().as_secs());
        write!(
            f,
            "{} (PID {}, created {}, up {})",
            self.status,
            self.pid,
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            humantime::format_duration(uptime)
        )
    }
}

pub struct Procs {
    system: Mutex<sysinfo::System>,
}

pub static PROCS: Lazy<Procs> = Lazy::new(Procs::new);

impl Default for Procs {
    fn default() -> Self {
        Self::new()
    }
}

impl Procs {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(sysinfo::System::new()),
        }
    }

    fn lock_system(&self) -> std::sync::MutexGuard<'_, sysinfo::System> {
        self.system.lock().unwrap_or_else(|poisoned| {
            warn!("System mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Fails with `NoSuchProcess` if the pid is not a live process.
    pub fn status(&self, pid: u32) -> Result<ProcessInfo> {
        self.refresh_pid(pid);
        let system = self.lock_system();
        let process = system
            .process(Pid::from_u32(pid))
            .ok_or(SupervisorError::NoSuchProcess { pid })?;
        let created_at = DateTime::from_timestamp(process.start_time() as i64, 0)
            .map(|t| t.with_timezone(&Local))
            .unwrap_or_else(Local::now);
        Ok(ProcessInfo {
            pid,
            name: process.name().to_string_lossy().to_string(),
            status: process.status().to_string().to_lowercase(),
            created_at,
        })
    }

    /// Asks the process to exit (SIGTERM on unix). Does not wait for it.
    pub fn terminate(&self, pid: u32) -> Result<u32> {
        self.refresh_pid(pid);
        let system = self.lock_system();
        let process = system
            .process(Pid::from_u32(pid))
            .ok_or(SupervisorError::NoSuchProcess { pid })?;
        debug!("terminating process {pid}");
        #[cfg(unix)]
        let sent = process.kill_with(Signal::Term).unwrap_or(false);
        #[cfg(not(unix))]
        let sent = process.kill();
        if !sent {
            warn!("could not deliver termination signal to pid {pid}");
        }
        Ok(pid)
    }

    fn refresh_pid(&self, pid: u32) {
        self.lock_system()
            .refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]), true);
    }
}
