use crate::error::{FileError, SupervisorError};
use crate::{Result, env};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// The marker file recording the pid of a daemonized `emu start`.
///
/// Only created, read and removed; never rewritten in place. Creation is
/// exclusive, so of two racing `start` invocations only one can record its
/// child.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Self {
        Self::new(env::EMU_PID_FILE.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Fails with `AlreadyRunning` if a marker is already present; the
    /// existing file is left untouched.
    pub fn write(&self, pid: u32) -> Result<()> {
        self.create_with(|file| {
            write!(file, "{pid}")?;
            // must be durable before the parent exits
            file.sync_all()
        })?;
        debug!("wrote pid {pid} to {}", self.path.display());
        Ok(())
    }

    /// Exclusively creates the marker and fills it. A marker that could not
    /// be filled is removed again, so no empty marker blocks later starts.
    fn create_with(&self, fill: impl FnOnce(&mut File) -> io::Result<()>) -> Result<()> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SupervisorError::AlreadyRunning {
                    path: self.path.clone(),
                    pid: self.read_raw().unwrap_or_default().trim().to_string(),
                }
                .into());
            }
            Err(source) => {
                return Err(FileError::WriteError {
                    path: self.path.clone(),
                    source,
                }
                .into());
            }
        };
        if let Err(source) = fill(&mut file) {
            drop(file);
            if let Err(e) = fs::remove_file(&self.path) {
                warn!("could not remove partial PID file {}: {e}", self.path.display());
            }
            return Err(FileError::WriteError {
                path: self.path.clone(),
                source,
            }
            .into());
        }
        Ok(())
    }

    pub fn read(&self) -> Result<u32> {
        let raw = match self.read_raw() {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SupervisorError::NotRunning {
                    path: self.path.clone(),
                }
                .into());
            }
            Err(source) => {
                return Err(FileError::ReadError {
                    path: self.path.clone(),
                    source,
                }
                .into());
            }
        };
        let pid = raw.trim().parse::<u32>().map_err(|_| SupervisorError::InvalidPidFile {
            path: self.path.clone(),
            content: raw.clone(),
        })?;
        Ok(pid)
    }

    /// Removing a marker that is already gone is not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("removed {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(FileError::RemoveError {
                path: self.path.clone(),
                source,
            }
            .into()),
        }
    }

    fn read_raw(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }
}
