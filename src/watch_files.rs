use crate::Result;
use itertools::Itertools;
use miette::IntoDiagnostic;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, FileIdMap, new_debouncer_opt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Debounced changes to a fixed set of files.
///
/// Directories are watched rather than the files, so that editors which
/// replace a file by renaming over it are still seen. Events for any other
/// entry of those directories (the PID and log files often live there) are
/// dropped on the watcher thread. At most one batch is queued: while one is
/// pending, another would only ask for the same reload again.
pub struct WatchFiles {
    pub rx: mpsc::Receiver<Vec<PathBuf>>,
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
}

impl WatchFiles {
    pub fn new(files: &[PathBuf], debounce: Duration) -> Result<Self> {
        let (tx, rx) = mpsc::channel(1);
        let targets = files.to_vec();
        let mut debouncer = new_debouncer_opt(
            debounce,
            None,
            move |res: DebounceEventResult| match res {
                Ok(events) => {
                    let changed = events
                        .iter()
                        .filter(|e| {
                            matches!(
                                e.kind,
                                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
                            )
                        })
                        .flat_map(|e| e.paths.iter())
                        .filter(|p| is_watched(p, &targets))
                        .unique()
                        .cloned()
                        .collect_vec();
                    if changed.is_empty() {
                        return;
                    }
                    match tx.try_send(changed) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => trace!("configuration reload already pending"),
                        Err(TrySendError::Closed(_)) => trace!("configuration watcher receiver gone"),
                    }
                }
                Err(errors) => {
                    for e in errors {
                        warn!("configuration watcher error: {e}");
                    }
                }
            },
            FileIdMap::new(),
            Config::default(),
        )
        .into_diagnostic()?;

        for dir in parent_dirs(files.iter().map(PathBuf::as_path)) {
            debug!("watching {} for configuration changes", dir.display());
            debouncer
                .watch(&dir, RecursiveMode::NonRecursive)
                .into_diagnostic()?;
        }

        Ok(Self {
            rx,
            _debouncer: debouncer,
        })
    }
}

/// Directories to watch so that edits, including editors that replace the
/// file by renaming over it, are seen for each of `files`.
pub fn parent_dirs<'a>(files: impl IntoIterator<Item = &'a Path>) -> HashSet<PathBuf> {
    files
        .into_iter()
        .filter_map(|f| f.parent())
        .filter(|p| p.is_dir())
        .map(Path::to_path_buf)
        .collect()
}

/// Check if a changed path is one of the watched files.
pub fn is_watched(changed_path: &Path, files: &[PathBuf]) -> bool {
    files.iter().any(|f| {
        f == changed_path
            || match (f.canonicalize(), changed_path.canonicalize()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
    })
}
