#[macro_use]
extern crate log;

pub mod cli;
pub mod config;
pub mod daemonize;
pub mod engine;
pub mod env;
pub mod error;
pub mod logger;
pub mod pid_file;
pub mod procs;
pub mod server;
pub mod supervisor;
pub mod watch_files;
pub mod watchdog;

pub use miette::Result;
