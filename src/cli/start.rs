use crate::Result;
use crate::config::ConfigSet;
use crate::supervisor::{StartOptions, Started};
use std::path::PathBuf;

/// Loopback only unless asked otherwise, whatever host `server.url` names.
const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// Starts the emu service
#[derive(Debug, clap::Args)]
#[clap(
    verbatim_doc_comment,
    long_about = "\
Starts the emu service

The service is available at the url configured as `url` in the [server]
section, by default http://localhost:5000/wps. Files in the configured
output directory are served under /outputs.

Examples:
  emu start                     Run in the foreground on 127.0.0.1
  emu start -c emu.toml         Layer emu.toml over the built-in defaults
  emu start -c a.toml -c b.toml b.toml wins over a.toml
  emu start -b 0.0.0.0 -d       Listen on all interfaces, in the background"
)]
pub struct Start {
    /// Path to a configuration file; repeat to layer several, later files win
    #[clap(short, long, value_name = "PATH")]
    config: Vec<PathBuf>,
    /// IP address used to bind the service
    #[clap(short, long, value_name = "IP-ADDRESS", default_value = DEFAULT_BIND_HOST)]
    bind_host: String,
    /// Run in the background and record its pid in the PID file
    #[clap(short, long)]
    daemon: bool,
    #[clap(long, hide = true)]
    detached: bool,
}

impl Start {
    pub fn run(&self) -> Result<()> {
        let started = super::supervisor().start(StartOptions {
            config_set: ConfigSet::new(&self.config),
            bind_host: Some(self.bind_host.clone()),
            daemon: self.daemon,
            detached: self.detached,
            relaunch_args: self.relaunch_args(),
        })?;
        if let Started::Background { child } = started {
            println!("started emu in background (PID {child})");
        }
        Ok(())
    }

    pub(super) fn relaunch_args(&self) -> Vec<String> {
        let mut args = vec!["start".to_string()];
        for path in &self.config {
            args.push("--config".to_string());
            args.push(path.to_string_lossy().to_string());
        }
        args.push("--bind-host".to_string());
        args.push(self.bind_host.clone());
        args
    }
}
