use crate::Result;

/// Shows the status of the emu service running in the background
#[derive(Debug, clap::Args)]
#[clap(
    visible_alias = "stat",
    verbatim_doc_comment,
    long_about = "\
Shows the status of the emu service running in the background

Example:
  emu status

Output:
  emu is sleeping (PID 12345, created 2024-01-01 12:00:00, up 5m 3s)"
)]
pub struct Status {}

impl Status {
    pub fn run(&self) -> Result<()> {
        let info = super::supervisor().status()?;
        println!("emu is {info}");
        Ok(())
    }
}
