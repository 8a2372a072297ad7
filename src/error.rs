//! Diagnostic error types for operator-facing reporting via miette.
//!
//! Every failure the supervisor can hit during `start`, `stop` or `status`
//! maps to one variant here, so `main` can render it as a single diagnostic
//! instead of a panic.

// False positive: fields are used in #[error] format strings and miette derive macros
#![allow(unused_assignments)]

use miette::{Diagnostic, NamedSource, SourceSpan};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the supervisor's lifecycle commands.
#[derive(Debug, Error, Diagnostic)]
pub enum SupervisorError {
    #[error("PID file {} already exists (pid {pid}), is emu already running?", path.display())]
    #[diagnostic(
        code(emu::already_running),
        help("run `emu stop`, or remove the PID file if the process is gone")
    )]
    AlreadyRunning { path: PathBuf, pid: String },

    #[error("no PID file at {}, emu is not running", path.display())]
    #[diagnostic(
        code(emu::not_running),
        help("start the service in the background with `emu start --daemon`")
    )]
    NotRunning { path: PathBuf },

    #[error("no process with pid {pid}")]
    #[diagnostic(
        code(emu::no_such_process),
        help("the service exited without removing its PID file; `emu stop` clears it")
    )]
    NoSuchProcess { pid: u32 },

    #[error("PID file {} does not contain a valid pid: {content:?}", path.display())]
    #[diagnostic(
        code(emu::invalid_pid_file),
        help("remove the PID file manually")
    )]
    InvalidPidFile { path: PathBuf, content: String },

    #[error("could not resolve service configuration: {reason}")]
    #[diagnostic(code(emu::config::resolution))]
    ConfigurationResolution { reason: String },

    #[error("failed to fork daemon process (errno {code}): {errno}")]
    #[diagnostic(code(emu::fork_failed))]
    ForkFailed { errno: String, code: i32 },
}

/// Error for TOML configuration parse failures with source code highlighting.
#[derive(Debug, Error, Diagnostic)]
#[error("failed to parse configuration")]
#[diagnostic(code(emu::config::parse_error))]
pub struct ConfigParseError {
    /// The source file contents for display
    #[source_code]
    pub src: NamedSource<String>,

    /// The location of the error in the source
    #[label("{message}")]
    pub span: SourceSpan,

    /// The error message from the TOML parser
    pub message: String,

    #[help]
    pub help: Option<String>,
}

impl ConfigParseError {
    pub fn from_toml_error(name: &str, contents: String, err: toml::de::Error) -> Self {
        let message = err.message().to_string();

        let span = err
            .span()
            .map(|r| SourceSpan::from(r.start..r.end))
            .unwrap_or_else(|| SourceSpan::from(0..0));

        Self {
            src: NamedSource::new(name, contents),
            span,
            message,
            help: Some("check TOML syntax at https://toml.io".to_string()),
        }
    }
}

/// Errors related to file operations (config and PID files).
#[derive(Debug, Error, Diagnostic)]
pub enum FileError {
    #[error("failed to read file: {}", path.display())]
    #[diagnostic(code(emu::file::read_error))]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file: {}", path.display())]
    #[diagnostic(code(emu::file::write_error))]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove file: {}", path.display())]
    #[diagnostic(code(emu::file::remove_error))]
    RemoveError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
