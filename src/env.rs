use once_cell::sync::Lazy;
pub use std::env::*;
use std::path::PathBuf;
use std::time::Duration;

pub static EMU_BIN: Lazy<PathBuf> = Lazy::new(|| {
    current_exe()
        .and_then(|p| p.canonicalize())
        .unwrap_or_else(|e| {
            eprintln!("Warning: Could not determine emu binary path: {e}");
            args()
                .next()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("emu"))
        })
});
pub static CWD: Lazy<PathBuf> = Lazy::new(|| current_dir().unwrap_or_else(|_| PathBuf::from(".")));

pub static EMU_PID_FILE: Lazy<PathBuf> =
    Lazy::new(|| var_path("EMU_PID_FILE").unwrap_or(CWD.join("emu.pid")));
pub static EMU_LOG: Lazy<log::LevelFilter> =
    Lazy::new(|| var_log_level("EMU_LOG").unwrap_or(log::LevelFilter::Info));
pub static EMU_LOG_FILE: Lazy<PathBuf> =
    Lazy::new(|| var_path("EMU_LOG_FILE").unwrap_or(CWD.join("emu.log")));

// Debounce window for configuration file change events
pub static EMU_WATCH_DEBOUNCE: Lazy<Duration> = Lazy::new(|| {
    Duration::from_millis(var_u64("EMU_WATCH_DEBOUNCE_MS").unwrap_or(1000))
});

fn var_path(name: &str) -> Option<PathBuf> {
    var(name).map(PathBuf::from).ok()
}

fn var_u64(name: &str) -> Option<u64> {
    var(name).ok().and_then(|val| val.parse().ok())
}

fn var_log_level(name: &str) -> Option<log::LevelFilter> {
    var(name).ok().and_then(|level| level.parse().ok())
}
