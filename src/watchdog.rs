use crate::config::ConfigSet;
use crate::watch_files::WatchFiles;
use crate::{Result, env};
use std::path::PathBuf;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Supervisory loop over the configuration files of a running service.
///
/// It never touches the server itself: a change only bumps the reload
/// generation, and the server rebuilds from the configuration set on its
/// own.
pub struct Watchdog {
    files: Vec<PathBuf>,
}

impl Watchdog {
    pub fn new(config_set: &ConfigSet) -> Self {
        Self {
            files: config_set.files().map(|p| p.to_path_buf()).collect(),
        }
    }

    /// Blocks until `shutdown` is cancelled.
    pub async fn run(&self, reload: watch::Sender<u64>, shutdown: CancellationToken) -> Result<()> {
        if self.files.is_empty() {
            debug!("no configuration files to watch");
            shutdown.cancelled().await;
            return Ok(());
        }

        let mut wf = WatchFiles::new(&self.files, *env::EMU_WATCH_DEBOUNCE)?;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changes = wf.rx.recv() => {
                    let Some(changes) = changes else {
                        warn!("configuration watcher closed");
                        shutdown.cancelled().await;
                        break;
                    };
                    for path in &changes {
                        info!("configuration changed: {}", path.display());
                    }
                    reload.send_modify(|generation| *generation += 1);
                }
            }
        }
        debug!("watchdog stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stops_on_cancel_without_files() {
        let watchdog = Watchdog::new(&ConfigSet::new(Vec::<PathBuf>::new()));
        let (tx, _rx) = watch::channel(0);
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        watchdog.run(tx, shutdown).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_change_bumps_generation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("emu.toml");
        std::fs::write(&path, "[server]\n").unwrap();

        let watchdog = Watchdog::new(&ConfigSet::new([&path]));
        let (tx, mut rx) = watch::channel(0u64);
        let shutdown = CancellationToken::new();
        let task = tokio::spawn({
            let shutdown = shutdown.clone();
            async move { watchdog.run(tx, shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        std::fs::write(&path, "[server]\nurl = \"http://localhost:5001/wps\"\n").unwrap();

        tokio::time::timeout(Duration::from_secs(10), rx.changed())
            .await
            .expect("no reload within 10s")
            .unwrap();
        assert!(*rx.borrow() >= 1);

        shutdown.cancel();
        task.await.unwrap().unwrap();
    }
}
