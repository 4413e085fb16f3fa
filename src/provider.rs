//! Ruleset providers hand out the ruleset that is active right now.
//!
//! [`BasicRulesetProvider`] is fixed at construction. [`DynamicRulesetProvider`]
//! rebuilds its ruleset from definition text whenever a new snapshot arrives
//! and publishes it with an atomic swap, so readers never lock and never see
//! a ruleset that is only partly built.
//!
//! Snapshots are applied in the order they are received. If whatever produces
//! them delivers an older snapshot after a newer one, the older one wins.

use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{debug, error, info};

use crate::error::{Result, StorylineError};
use crate::interface::Worker;
use crate::registry::{SkippedRecord, TypeRegistry};
use crate::ruleset::Ruleset;

/// How often the subscription thread checks for cancellation while idle.
pub const SUBSCRIPTION_POLL: Duration = Duration::from_millis(50);

pub trait RulesetProvider: Send + Sync {
    /// The current ruleset. Never blocks.
    fn ruleset(&self) -> Arc<Ruleset>;
}

// ------------- Basic -------------
pub struct BasicRulesetProvider {
    ruleset: Arc<Ruleset>,
}

impl BasicRulesetProvider {
    pub fn new(ruleset: Ruleset) -> Self {
        Self {
            ruleset: Arc::new(ruleset),
        }
    }
}

impl From<Arc<Ruleset>> for BasicRulesetProvider {
    fn from(ruleset: Arc<Ruleset>) -> Self {
        Self { ruleset }
    }
}

impl RulesetProvider for BasicRulesetProvider {
    fn ruleset(&self) -> Arc<Ruleset> {
        Arc::clone(&self.ruleset)
    }
}

// ------------- Dynamic -------------
/// What a successful reconfiguration did.
#[derive(Debug)]
pub struct Reconfiguration {
    pub ruleset: Arc<Ruleset>,
    pub skipped: Vec<SkippedRecord>,
}

struct Shared {
    current: ArcSwap<Ruleset>,
    registry: Arc<TypeRegistry>,
    // writers serialize here, readers go straight to `current`
    write_lock: Mutex<()>,
    disposed: AtomicBool,
}

impl Shared {
    fn reconfigure(&self, text: &str) -> Result<Reconfiguration> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StorylineError::Disposed);
        }
        let parsed = match self.registry.parse(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(error = %e, "failed to parse rule definitions, keeping the current ruleset");
                return Err(e);
            }
        };
        let ruleset = Arc::new(parsed.ruleset);
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.disposed.load(Ordering::SeqCst) {
            return Err(StorylineError::Disposed);
        }
        self.current.store(Arc::clone(&ruleset));
        info!(
            rules = ruleset.len(),
            skipped = parsed.skipped.len(),
            revision = ruleset.revision().unwrap_or("-"),
            "ruleset reconfigured"
        );
        Ok(Reconfiguration {
            ruleset,
            skipped: parsed.skipped,
        })
    }
}

pub struct DynamicRulesetProvider {
    shared: Arc<Shared>,
    subscription: Mutex<Option<Worker>>,
}

impl DynamicRulesetProvider {
    /// A provider that only changes through [`reconfigure`](Self::reconfigure).
    pub fn new(registry: Arc<TypeRegistry>, initial: Ruleset) -> Self {
        Self {
            shared: Arc::new(Shared {
                current: ArcSwap::from_pointee(initial),
                registry,
                write_lock: Mutex::new(()),
                disposed: AtomicBool::new(false),
            }),
            subscription: Mutex::new(None),
        }
    }
    /// A provider that reconfigures itself from every text snapshot received
    /// on `source`. The subscription ends when the provider is disposed or
    /// when every sender of `source` is gone.
    pub fn subscribe(
        registry: Arc<TypeRegistry>,
        initial: Ruleset,
        source: Receiver<String>,
    ) -> Result<Self> {
        let provider = Self::new(registry, initial);
        let shared = Arc::clone(&provider.shared);
        let worker = Worker::spawn("ruleset-subscription", move |token| loop {
            match source.recv_timeout(SUBSCRIPTION_POLL) {
                Ok(text) => {
                    if token.is_cancelled() {
                        break;
                    }
                    // failures are logged by reconfigure and leave the ruleset as it was
                    let _ = shared.reconfigure(&text);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if token.is_cancelled() {
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("rule definition source closed, ending subscription");
                    break;
                }
            }
        })?;
        *provider.subscription.lock().unwrap_or_else(PoisonError::into_inner) = Some(worker);
        Ok(provider)
    }
    /// Parses `text` and, if the document as a whole parses, makes the result
    /// the current ruleset. Unresolvable records are left out and reported.
    /// On failure the current ruleset stays exactly as it was.
    pub fn reconfigure(&self, text: &str) -> Result<Reconfiguration> {
        self.shared.reconfigure(text)
    }
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.shared.registry
    }
    pub fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(Worker::is_running)
    }
    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }
    /// Ends the subscription and blocks further reconfiguration. The last
    /// ruleset stays readable. Safe to call more than once.
    pub fn dispose(&self) {
        {
            let _guard = self.shared.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.shared.disposed.store(true, Ordering::SeqCst);
        }
        let worker = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut worker) = worker {
            worker.stop();
        }
    }
}

impl RulesetProvider for DynamicRulesetProvider {
    fn ruleset(&self) -> Arc<Ruleset> {
        self.shared.current.load_full()
    }
}

impl Drop for DynamicRulesetProvider {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Instant;

    fn wait_for(condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn basic_provider_returns_the_same_instance() {
        let provider = BasicRulesetProvider::new(Ruleset::empty());
        assert!(Arc::ptr_eq(&provider.ruleset(), &provider.ruleset()));
    }

    #[test]
    fn failed_parse_keeps_the_previous_instance() {
        let provider = DynamicRulesetProvider::new(TypeRegistry::global(), Ruleset::empty());
        provider
            .reconfigure(r#"[{"ruleType":"always","handlerType":"trace"}]"#)
            .unwrap();
        let before = provider.ruleset();
        let err = provider.reconfigure("{ not json").err().unwrap();
        assert!(matches!(err, StorylineError::Reconfiguration(_)));
        assert!(Arc::ptr_eq(&before, &provider.ruleset()));
    }

    #[test]
    fn subscription_applies_snapshots() {
        let (tx, rx) = mpsc::channel();
        let provider = DynamicRulesetProvider::subscribe(TypeRegistry::global(), Ruleset::empty(), rx).unwrap();
        assert!(provider.is_subscribed());
        tx.send(r#"[{"ruleType":"always","handlerType":"trace"}]"#.to_string()).unwrap();
        assert!(wait_for(|| provider.ruleset().len() == 1));
        drop(tx);
        assert!(wait_for(|| !provider.is_subscribed()));
    }

    #[test]
    fn disposed_provider_ignores_snapshots() {
        let (tx, rx) = mpsc::channel();
        let provider = DynamicRulesetProvider::subscribe(TypeRegistry::global(), Ruleset::empty(), rx).unwrap();
        provider.dispose();
        assert!(provider.is_disposed());
        assert!(!provider.is_subscribed());
        let _ = tx.send(r#"[{"ruleType":"always","handlerType":"trace"}]"#.to_string());
        std::thread::sleep(SUBSCRIPTION_POLL * 2);
        assert!(provider.ruleset().is_empty());
        assert!(matches!(
            provider.reconfigure("[]").err().unwrap(),
            StorylineError::Disposed
        ));
        provider.dispose();
    }
}
