//! Stories: tracked units of work with a log, data, timing and a parent link.
//!
//! A [`Story`] is created against a [`RulesetProvider`]. Starting and stopping
//! it consults whatever ruleset the provider holds at that moment, so a story
//! started under one configuration may be stopped under the next one.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, StorylineError};
use crate::handler::Handler;
use crate::provider::RulesetProvider;

// ------------- Severity -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum LogSeverity {
    #[default]
    #[serde(alias = "debug")]
    Debug,
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "warning")]
    Warning,
    #[serde(alias = "error")]
    Error,
    #[serde(alias = "fatal")]
    Fatal,
}

impl LogSeverity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warning" | "warn" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "fatal" => Some(Self::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            LogSeverity::Debug => "Debug",
            LogSeverity::Info => "Info",
            LogSeverity::Warning => "Warning",
            LogSeverity::Error => "Error",
            LogSeverity::Fatal => "Fatal",
        };
        f.pad(s)
    }
}

// ------------- LogEntry -------------
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    severity: LogSeverity,
    message: String,
    timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(severity: LogSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
    pub fn severity(&self) -> LogSeverity {
        self.severity
    }
    pub fn message(&self) -> &str {
        &self.message
    }
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {:<7} {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            self.severity,
            self.message
        )
    }
}

// ------------- StoryLog -------------
/// Append-only log. Entries are never edited or removed once appended.
#[derive(Debug, Default)]
pub struct StoryLog {
    entries: RwLock<Vec<LogEntry>>,
}

impl StoryLog {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn append(&self, entry: LogEntry) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
    pub fn log(&self, severity: LogSeverity, message: impl Into<String>) {
        self.append(LogEntry::new(severity, message));
    }
    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogSeverity::Debug, message);
    }
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogSeverity::Info, message);
    }
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogSeverity::Warning, message);
    }
    pub fn error(&self, message: impl Into<String>) {
        self.log(LogSeverity::Error, message);
    }
    pub fn fatal(&self, message: impl Into<String>) {
        self.log(LogSeverity::Fatal, message);
    }
    /// Returns true if at least one entry satisfies the predicate.
    pub fn any<P: Fn(&LogEntry) -> bool>(&self, predicate: P) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(predicate)
    }
    /// Snapshot of the entries in append order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
    pub fn max_severity(&self) -> Option<LogSeverity> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(LogEntry::severity)
            .max()
    }
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ------------- StoryData -------------
#[derive(Debug, Default)]
pub struct StoryData {
    entries: RwLock<HashMap<String, Value>>,
}

impl StoryData {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        ensure_not_empty(key, "key")?;
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
    // last write wins
    fn insert(&self, key: &str, value: Value) -> Result<()> {
        ensure_not_empty(key, "key")?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value);
        Ok(())
    }
    /// Snapshot of all pairs, sorted by key so output is stable.
    pub fn entries(&self) -> Vec<(String, Value)> {
        let mut pairs: Vec<(String, Value)> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        pairs
    }
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn ensure_not_empty(value: &str, name: &'static str) -> Result<()> {
    if value.is_empty() {
        return Err(StorylineError::argument(name, "must not be empty"));
    }
    Ok(())
}

// ------------- InstanceId -------------
static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Process-unique story identity. Never reused within one process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    fn generate() -> Self {
        Self(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed))
    }
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

// ------------- Completion -------------
/// Opaque token describing how the unit of work wrapped by a story ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Succeeded,
    Faulted(String),
    Cancelled,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Completion::Succeeded => write!(f, "succeeded"),
            Completion::Faulted(reason) => write!(f, "faulted: {}", reason),
            Completion::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ------------- Story -------------
#[derive(Debug, Default)]
struct Timing {
    started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    elapsed: Option<Duration>,
}

pub struct Story {
    name: String,
    instance_id: InstanceId,
    parent: Option<Weak<Story>>, // never owns the parent
    provider: Arc<dyn RulesetProvider>,
    data: StoryData,
    log: StoryLog,
    timing: Mutex<Timing>,
}

impl Story {
    pub fn new(name: impl Into<String>, provider: Arc<dyn RulesetProvider>) -> Result<Arc<Story>> {
        Self::create(name.into(), provider, None)
    }
    /// Creates a story whose parent is `parent`, dispatching through the same provider.
    pub fn child(parent: &Arc<Story>, name: impl Into<String>) -> Result<Arc<Story>> {
        Self::create(
            name.into(),
            Arc::clone(&parent.provider),
            Some(Arc::downgrade(parent)),
        )
    }
    fn create(
        name: String,
        provider: Arc<dyn RulesetProvider>,
        parent: Option<Weak<Story>>,
    ) -> Result<Arc<Story>> {
        ensure_not_empty(&name, "name")?;
        Ok(Arc::new(Self {
            name,
            instance_id: InstanceId::generate(),
            parent,
            provider,
            data: StoryData::new(),
            log: StoryLog::new(),
            timing: Mutex::new(Timing::default()),
        }))
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }
    /// The parent story, or `None` for a root story or once the parent is gone.
    pub fn parent(&self) -> Option<Arc<Story>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }
    pub fn provider(&self) -> &Arc<dyn RulesetProvider> {
        &self.provider
    }
    pub fn data(&self) -> &StoryData {
        &self.data
    }
    pub fn log(&self) -> &StoryLog {
        &self.log
    }
    pub fn set_data(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.data.insert(key, value.into())?;
        self.log.debug(format!("Added key '{}' to data.", key));
        Ok(())
    }
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.timing.lock().unwrap_or_else(PoisonError::into_inner).started_at
    }
    /// Only known once the story has stopped.
    pub fn elapsed(&self) -> Option<Duration> {
        self.timing.lock().unwrap_or_else(PoisonError::into_inner).elapsed
    }
    /// Starts the story and hands it to the handler the current ruleset selects.
    pub fn start(&self) -> Result<Option<Arc<dyn Handler>>> {
        {
            let mut timing = self.timing.lock().unwrap_or_else(PoisonError::into_inner);
            timing.started_at = Some(Utc::now());
            timing.started = Some(Instant::now());
            timing.elapsed = None;
        }
        let handler = self.provider.ruleset().evaluate(self)?;
        match &handler {
            Some(handler) => handler.on_start(self)?,
            None => debug!(story = %self.name, id = %self.instance_id, "no start handler matched"),
        }
        Ok(handler)
    }
    /// Stops the story and hands it to the handler the current ruleset selects.
    pub fn stop(&self, completion: &Completion) -> Result<Option<Arc<dyn Handler>>> {
        {
            let mut timing = self.timing.lock().unwrap_or_else(PoisonError::into_inner);
            timing.elapsed = Some(timing.started.map(|s| s.elapsed()).unwrap_or_default());
        }
        let handler = self.provider.ruleset().evaluate(self)?;
        match &handler {
            Some(handler) => handler.on_stop(self, completion)?,
            None => debug!(story = %self.name, id = %self.instance_id, "no stop handler matched"),
        }
        Ok(handler)
    }
}

impl fmt::Debug for Story {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Story")
            .field("name", &self.name)
            .field("instance_id", &self.instance_id)
            .field("parent", &self.parent().map(|p| p.instance_id))
            .field("log", &self.log.len())
            .field("data", &self.data.len())
            .finish()
    }
}
