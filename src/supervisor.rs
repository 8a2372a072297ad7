//! Lifecycle of the service: `start`, `stop` and `status`.
//!
//! `start` walks through checking the PID file, building the engine, then
//! either forking (daemon) or staying in the foreground, and finally running
//! the server alongside the configuration watchdog until a termination
//! signal arrives. Only daemonized runs are recorded in the PID file.

use crate::config::ConfigSet;
use crate::daemonize::{Daemonized, daemonize};
use crate::engine::EngineFactory;
use crate::error::SupervisorError;
use crate::pid_file::PidFile;
use crate::procs::{PROCS, ProcessInfo};
use crate::server::{self, Prepared, ServerOptions};
use crate::watchdog::Watchdog;
use crate::{Result, env, logger};
use miette::IntoDiagnostic;
use std::process::exit;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicBool};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// How long the server gets to wind down after the watchdog has stopped.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct StartOptions {
    pub config_set: ConfigSet,
    pub bind_host: Option<String>,
    pub daemon: bool,
    /// Set in a process relaunched by a non-forking `daemonize`; its parent
    /// owns the PID file.
    pub detached: bool,
    /// Arguments that reproduce this `start` for a relaunched child.
    pub relaunch_args: Vec<String>,
}

/// What `start` did in the calling process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Started {
    /// The daemon is running in `child`; the caller should exit.
    Background { child: u32 },
    /// The service ran in this process and has shut down.
    Stopped,
}

pub struct Supervisor {
    pid_file: PidFile,
    factory: Arc<dyn EngineFactory>,
}

impl Supervisor {
    pub fn new(pid_file: PidFile, factory: Arc<dyn EngineFactory>) -> Self {
        Self { pid_file, factory }
    }

    pub fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    /// Must be called before any thread has been spawned.
    pub fn start(&self, opts: StartOptions) -> Result<Started> {
        if !opts.detached && self.pid_file.exists() {
            let pid = self
                .pid_file
                .read()
                .map(|p| p.to_string())
                .unwrap_or_default();
            return Err(SupervisorError::AlreadyRunning {
                path: self.pid_file.path().to_path_buf(),
                pid,
            }
            .into());
        }

        let server_opts = ServerOptions {
            bind_host: opts.bind_host.clone(),
            debug: !opts.daemon && !opts.detached,
        };
        let prepared = Prepared::new(self.factory.as_ref(), &opts.config_set, &server_opts)?;
        info!("starting emu service on {}", prepared.config.server_url());

        if opts.daemon && !opts.detached {
            match daemonize(&opts.relaunch_args)? {
                Daemonized::Parent { child } => {
                    self.record_daemon(child)?;
                    return Ok(Started::Background { child });
                }
                Daemonized::Child => {}
            }
        }
        if opts.daemon || opts.detached {
            logger::attach_file(&env::EMU_LOG_FILE)?;
        }

        let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
        rt.block_on(self.run(opts.config_set, server_opts, prepared))?;
        // the server may still be draining; it is not waited for
        rt.shutdown_background();
        Ok(Started::Stopped)
    }

    /// Writes `child` to the PID file, terminating it if that fails: a
    /// daemon missing from the PID file could never be stopped.
    fn record_daemon(&self, child: u32) -> Result<()> {
        if let Err(e) = self.pid_file.write(child) {
            if let Err(kill_err) = PROCS.terminate(child) {
                error!("could not terminate unrecorded daemon {child}: {kill_err}");
            }
            return Err(e);
        }
        Ok(())
    }

    async fn run(
        &self,
        config_set: ConfigSet,
        server_opts: ServerOptions,
        prepared: Prepared,
    ) -> Result<()> {
        info!("emu running with pid {}", std::process::id());
        let shutdown = CancellationToken::new();
        signals(shutdown.clone());

        let (reload_tx, reload_rx) = watch::channel(0u64);
        let watchdog = Watchdog::new(&config_set);
        let server = tokio::spawn({
            let shutdown = shutdown.clone();
            let factory = self.factory.clone();
            async move {
                let res = server::run(
                    factory,
                    config_set,
                    server_opts,
                    prepared,
                    reload_rx,
                    shutdown.clone(),
                )
                .await;
                // a dead server takes the watchdog down with it
                shutdown.cancel();
                res
            }
        });

        watchdog.run(reload_tx, shutdown).await?;

        match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
            Ok(joined) => joined.into_diagnostic()??,
            Err(_) => warn!("server did not stop within {SHUTDOWN_GRACE:?}, abandoning it"),
        }
        info!("emu stopped");
        Ok(())
    }

    /// Sends the recorded process a termination request and removes the PID
    /// file. A PID file naming a process that is already gone is removed too,
    /// but reported as `NoSuchProcess`.
    pub fn stop(&self) -> Result<u32> {
        let pid = self.pid_file.read()?;
        match PROCS.terminate(pid) {
            Ok(pid) => {
                self.pid_file.remove()?;
                info!("sent termination request to pid {pid}");
                Ok(pid)
            }
            Err(e) => {
                if matches!(
                    e.downcast_ref::<SupervisorError>(),
                    Some(SupervisorError::NoSuchProcess { .. })
                ) {
                    warn!("removing stale PID file {}", self.pid_file.path().display());
                    self.pid_file.remove()?;
                }
                Err(e)
            }
        }
    }

    pub fn status(&self) -> Result<ProcessInfo> {
        let pid = self.pid_file.read()?;
        PROCS.status(pid)
    }
}

#[cfg(unix)]
fn signals(shutdown: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    static RECEIVED_SIGNAL: AtomicBool = AtomicBool::new(false);
    let kinds = [
        SignalKind::terminate(),
        SignalKind::interrupt(),
        SignalKind::quit(),
    ];
    for kind in kinds {
        let mut stream = match signal(kind) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to register signal handler for {kind:?}: {e}");
                continue;
            }
        };
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                stream.recv().await;
                if RECEIVED_SIGNAL.swap(true, atomic::Ordering::SeqCst) {
                    exit(1);
                }
                info!("received signal, stopping");
                shutdown.cancel();
            }
        });
    }
}

#[cfg(windows)]
fn signals(shutdown: CancellationToken) {
    tokio::spawn(async move {
        static RECEIVED_SIGNAL: AtomicBool = AtomicBool::new(false);
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to wait for ctrl-c: {}", e);
                return;
            }
            if RECEIVED_SIGNAL.swap(true, atomic::Ordering::SeqCst) {
                exit(1);
            }
            info!("received signal, stopping");
            shutdown.cancel();
        }
    });
}
