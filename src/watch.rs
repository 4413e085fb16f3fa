//! A polling file watcher that turns a rule-definition file into a stream of
//! text snapshots for [`DynamicRulesetProvider::subscribe`](crate::provider::DynamicRulesetProvider::subscribe).
//!
//! Every message is the complete file content, never a diff. A change is
//! noticed when either the modification time or the BLAKE3 digest of the
//! content moves.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::error::Result;
use crate::interface::Worker;

pub struct FileWatcher {
    path: PathBuf,
    worker: Worker,
}

impl FileWatcher {
    /// Starts polling `path` every `interval`. The current content is sent
    /// right away if the file exists; after that, whenever its modification
    /// time or its content changes. Polling ends when the watcher is dropped
    /// or the receiver goes away.
    pub fn spawn(path: impl AsRef<Path>, interval: Duration) -> Result<(FileWatcher, Receiver<String>)> {
        let path = path.as_ref().to_path_buf();
        let (tx, rx) = mpsc::channel();
        let watched = path.clone();
        let worker = Worker::spawn("rule-file-watcher", move |token| {
            // modification time and content digest of the last snapshot sent
            let mut last_seen: Option<(SystemTime, blake3::Hash)> = None;
            while !token.is_cancelled() {
                match fs::metadata(&watched).and_then(|m| m.modified()) {
                    Ok(modified) => match fs::read_to_string(&watched) {
                        Ok(text) => {
                            let digest = blake3::hash(text.as_bytes());
                            // a rewrite within one mtime tick still changes the digest
                            if last_seen != Some((modified, digest)) {
                                last_seen = Some((modified, digest));
                                debug!(path = %watched.display(), bytes = text.len(), "rule file changed");
                                if tx.send(text).is_err() {
                                    debug!("rule file receiver gone, stopping watcher");
                                    break;
                                }
                            }
                        }
                        Err(e) => warn!(path = %watched.display(), error = %e, "failed to read rule file"),
                    },
                    Err(e) => {
                        if last_seen.is_some() {
                            warn!(path = %watched.display(), error = %e, "rule file unavailable");
                            last_seen = None;
                        }
                    }
                }
                std::thread::sleep(interval);
            }
        })?;
        Ok((FileWatcher { path, worker }, rx))
    }
    pub fn path(&self) -> &Path {
        &self.path
    }
    pub fn is_running(&self) -> bool {
        self.worker.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sends_initial_and_changed_content() {
        let path = std::env::temp_dir().join(format!("storyline_watch_{}.json", std::process::id()));
        fs::write(&path, "[]").unwrap();
        let (watcher, rx) = FileWatcher::spawn(&path, Duration::from_millis(10)).unwrap();
        assert_eq!(watcher.path(), path.as_path());
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "[]");
        fs::write(&path, r#"[{"ruleType":"always"}]"#).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(3)).unwrap(),
            r#"[{"ruleType":"always"}]"#
        );
        drop(watcher);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn stops_when_the_receiver_is_dropped() {
        let path = std::env::temp_dir().join(format!("storyline_watch_drop_{}.json", std::process::id()));
        fs::write(&path, "[]").unwrap();
        let (watcher, rx) = FileWatcher::spawn(&path, Duration::from_millis(10)).unwrap();
        drop(rx);
        // the next change has nowhere to go
        fs::write(&path, "[ ]").unwrap();
        std::thread::sleep(Duration::from_millis(300));
        assert!(!watcher.is_running());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn rewrites_within_one_mtime_tick_are_delivered() {
        let path = std::env::temp_dir().join(format!("storyline_watch_tick_{}.json", std::process::id()));
        fs::write(&path, "[]").unwrap();
        let (_watcher, rx) = FileWatcher::spawn(&path, Duration::from_millis(10)).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "[]");
        fs::write(&path, r#"[{"ruleType":"always","handlerType":"trace"}]"#).unwrap();
        // same length, likely the same mtime
        fs::write(&path, r#"[{"ruleType":"always","handlerType":"trick"}]"#).unwrap();
        let mut last = String::new();
        while let Ok(text) = rx.recv_timeout(Duration::from_secs(2)) {
            last = text;
            if last.contains("trick") {
                break;
            }
        }
        assert_eq!(last, r#"[{"ruleType":"always","handlerType":"trick"}]"#);
        let _ = fs::remove_file(&path);
    }
}
