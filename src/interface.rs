//! Background threads with cooperative cancellation.
//!
//! Both the ruleset subscription and the file watcher run on a thread of their
//! own. A [`Worker`] owns such a thread together with the `Arc<AtomicBool>`
//! token it polls, and stopping the worker (or dropping it) cancels the token
//! and joins the thread, so nothing runs on its behalf afterwards.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::Result;

/// Cancellation token shared with the worker thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle to a named background thread.
#[derive(Debug)]
pub struct Worker {
    name: String,
    cancel: CancelToken,
    join: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns `body` on a new thread. The body receives the token and is
    /// expected to return soon after it is cancelled.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(token))?;
        debug!(worker = name, "worker started");
        Ok(Self {
            name: name.to_string(),
            cancel,
            join: Some(join),
        })
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }
    /// Cancels the worker and waits for its thread. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            if join.thread().id() == thread::current().id() {
                // stopping from inside the worker itself, the thread exits on its own
                return;
            }
            if join.join().is_err() {
                warn!(worker = %self.name, "worker thread panicked");
            } else {
                debug!(worker = %self.name, "worker stopped");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn stop_cancels_and_joins() {
        let (tx, rx) = mpsc::channel();
        let mut worker = Worker::spawn("test-worker", move |token| {
            while !token.is_cancelled() {
                std::thread::sleep(Duration::from_millis(5));
            }
            tx.send("done").unwrap();
        })
        .unwrap();
        assert_eq!(worker.name(), "test-worker");
        worker.stop();
        assert!(!worker.is_running());
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "done");
        worker.stop();
    }

    #[test]
    fn tokens_share_state() {
        let token = CancelToken::new();
        let copy = token.clone();
        assert!(!copy.is_cancelled());
        token.cancel();
        assert!(copy.is_cancelled());
    }
}
