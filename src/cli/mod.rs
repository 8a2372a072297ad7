use crate::Result;
use crate::engine::DemoEngine;
use crate::pid_file::PidFile;
use crate::supervisor::Supervisor;
use clap::Parser;
use std::sync::Arc;

mod start;
mod status;
mod stop;

/// Command line to start, stop and query the emu demo service.
///
/// Do not use this service in a production environment. It is intended to
/// run in a test environment only.
#[derive(Debug, clap::Parser)]
#[clap(name = "emu", version, verbatim_doc_comment)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    Start(start::Start),
    Status(status::Status),
    Stop(stop::Stop),
}

/// Runs the command line. No thread may be spawned before this, since
/// `start --daemon` forks.
pub fn run() -> Result<()> {
    let args = Cli::parse();
    match args.command {
        Commands::Start(start) => start.run(),
        Commands::Status(status) => status.run(),
        Commands::Stop(stop) => stop.run(),
    }
}

fn supervisor() -> Supervisor {
    Supervisor::new(PidFile::default_location(), Arc::new(DemoEngine))
}
