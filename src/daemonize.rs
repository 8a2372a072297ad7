//! Detaching the service from the launching terminal.
//!
//! On unix the process forks: the parent learns the child's pid and is
//! expected to record it and exit, while the child starts a new session and
//! drops its terminal file descriptors. Elsewhere the current executable is
//! relaunched with `--detached`, which gives the caller the same two roles.
//!
//! Must be called before any thread is spawned, which in practice means
//! before the tokio runtime is built.

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Daemonized {
    Parent { child: u32 },
    Child,
}

#[cfg(unix)]
pub fn daemonize(_relaunch_args: &[String]) -> Result<Daemonized> {
    use crate::error::SupervisorError;
    use nix::unistd::{ForkResult, fork, setsid};

    // SAFETY: no other threads exist yet, so the child cannot inherit a lock
    // held by a thread that vanished in the fork
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => Ok(Daemonized::Parent {
            child: child.as_raw() as u32,
        }),
        Ok(ForkResult::Child) => {
            if let Err(e) = setsid() {
                warn!("setsid failed: {e}");
            }
            detach_stdio()?;
            Ok(Daemonized::Child)
        }
        Err(errno) => Err(SupervisorError::ForkFailed {
            errno: errno.to_string(),
            code: errno as i32,
        }
        .into()),
    }
}

#[cfg(unix)]
fn detach_stdio() -> Result<()> {
    use miette::IntoDiagnostic;
    use std::os::fd::AsRawFd;

    let dev_null = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")
        .into_diagnostic()?;
    for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are open for the duration of the call
        if unsafe { libc::dup2(dev_null.as_raw_fd(), fd) } < 0 {
            return Err(std::io::Error::last_os_error()).into_diagnostic();
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn daemonize(relaunch_args: &[String]) -> Result<Daemonized> {
    use crate::env;
    use crate::error::SupervisorError;

    let mut args = relaunch_args.to_vec();
    args.push("--detached".to_string());
    let handle = duct::cmd(&*env::EMU_BIN, args)
        .stdin_null()
        .stdout_null()
        .stderr_null()
        .start()
        .map_err(|e| SupervisorError::ForkFailed {
            code: e.raw_os_error().unwrap_or(-1),
            errno: e.to_string(),
        })?;
    let child = handle.pids().first().copied().unwrap_or_default();
    Ok(Daemonized::Parent { child })
}
