use emu::Result;

// Plain, not #[tokio::main]: `start --daemon` forks, which must happen
// before the runtime starts its worker threads.
fn main() -> Result<()> {
    emu::logger::init();
    emu::cli::run()
}
