use crate::{Result, env};
use log::{Level, LevelFilter, Metadata, Record};
use miette::IntoDiagnostic;
use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions, create_dir_all};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug)]
struct Logger {
    level: LevelFilter,
    log_file: Mutex<Option<File>>,
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut log_file = self.log_file.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(file) = log_file.as_mut() {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let line = format!("{now} {} {}", record.level(), record.args());
            let _ = writeln!(file, "{}", console::strip_ansi_codes(&line));
        } else {
            eprintln!("{}", render(record));
        }
    }

    fn flush(&self) {
        if let Some(file) = self
            .log_file
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_mut()
        {
            let _ = file.flush();
        }
    }
}

fn render(record: &Record) -> String {
    let level = match record.level() {
        Level::Error => console::style("ERROR").red().bold(),
        Level::Warn => console::style("WARN").yellow().bold(),
        Level::Info => console::style("INFO").cyan().bold(),
        Level::Debug => console::style("DEBUG").blue(),
        Level::Trace => console::style("TRACE").dim(),
    };
    format!("{} {level} {}", console::style("emu").dim(), record.args())
}

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger {
    level: *env::EMU_LOG,
    log_file: Mutex::new(None),
});

pub fn init() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        if let Err(err) = log::set_logger(&*LOGGER).map(|()| log::set_max_level(LOGGER.level)) {
            eprintln!("emu: could not initialize logger: {err}");
        }
    });
}

/// Sends all further log output to `path` instead of the terminal. Used once
/// the process has let go of its terminal.
pub fn attach_file(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent).into_diagnostic()?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .into_diagnostic()?;
    *LOGGER.log_file.lock().unwrap_or_else(|p| p.into_inner()) = Some(file);
    Ok(())
}
