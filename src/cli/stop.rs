use crate::Result;

/// Stops the emu service running in the background
#[derive(Debug, clap::Args)]
#[clap(
    verbatim_doc_comment,
    long_about = "\
Stops the emu service running in the background

Sends SIGTERM to the process recorded in the PID file and removes the
file. Use 'emu status' to check the service afterwards."
)]
pub struct Stop {}

impl Stop {
    pub fn run(&self) -> Result<()> {
        let pid = super::supervisor().stop()?;
        println!("stopped emu (PID {pid})");
        Ok(())
    }
}
