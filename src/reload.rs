use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use voxtalk_core::{AppConfig, ConfigDiff};

/// Watches the config file and reports what changed against the last good
/// configuration.
pub struct ConfigWatcher {
    path: PathBuf,
    current: AppConfig,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn start(path: &Path, current: AppConfig) -> notify::Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        // Editors often replace the file, so watch its directory.
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "watching config for changes");

        Ok(Self {
            path: path.to_path_buf(),
            current,
            events,
            _watcher: watcher,
        })
    }

    /// Next non-empty diff. Invalid edits are logged and skipped. Cancel safe.
    pub async fn next_diff(&mut self) -> Option<ConfigDiff> {
        while let Some(res) = self.events.recv().await {
            match res {
                Ok(event) if self.concerns_config(&event) => {}
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("config watch error: {e}");
                    continue;
                }
            }

            match AppConfig::load_from_file(&self.path) {
                Ok(new) => {
                    let diff = ConfigDiff::diff(&self.current, &new);
                    self.current = new;
                    if !diff.is_empty() {
                        return Some(diff);
                    }
                }
                Err(e) => tracing::warn!("ignoring config change: {e}"),
            }
        }
        None
    }

    fn concerns_config(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == self.path.file_name())
    }
}
