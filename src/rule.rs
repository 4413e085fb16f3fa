//! Rules map a predicate over a [`Story`] to the handler that should process it.
//!
//! [`PredicateRule`] is the reusable building block: a condition plus a handler
//! factory. The other rule kinds are predicate rules with a particular
//! condition, and each has a serde definition struct so it can be named in a
//! rule-definition document through the [`TypeRegistry`](crate::registry::TypeRegistry).

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, StorylineError};
use crate::handler::Handler;
use crate::registry::RuleDefinition;
use crate::story::{LogSeverity, Story};

/// Builds the handler for a story that matched a rule.
pub type HandlerFactory = Arc<dyn Fn(&Story) -> Result<Arc<dyn Handler>> + Send + Sync>;

/// A rule is immutable once built and may be evaluated from many threads at once.
pub trait Rule: Send + Sync {
    fn when(&self, story: &Story) -> bool;
    fn then(&self, story: &Story) -> Result<Arc<dyn Handler>>;
}

/// A factory that always hands out the same handler instance.
pub fn shared_handler(handler: Arc<dyn Handler>) -> HandlerFactory {
    Arc::new(move |_story: &Story| Ok(Arc::clone(&handler)))
}

// ------------- PredicateRule -------------
pub struct PredicateRule {
    predicate: Box<dyn Fn(&Story) -> bool + Send + Sync>,
    factory: HandlerFactory,
}

impl PredicateRule {
    pub fn new<P, F>(predicate: P, factory: F) -> Self
    where
        P: Fn(&Story) -> bool + Send + Sync + 'static,
        F: Fn(&Story) -> Result<Arc<dyn Handler>> + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            factory: Arc::new(factory),
        }
    }
    pub fn with_factory<P>(predicate: P, factory: HandlerFactory) -> Self
    where
        P: Fn(&Story) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            factory,
        }
    }
}

impl Rule for PredicateRule {
    fn when(&self, story: &Story) -> bool {
        (self.predicate)(story)
    }
    fn then(&self, story: &Story) -> Result<Arc<dyn Handler>> {
        (self.factory)(story)
    }
}

impl fmt::Debug for PredicateRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("PredicateRule")
    }
}

// ------------- MinimumSeverityRule -------------
/// Matches when *any* entry of the story log is at or above the threshold.
/// Position in the log does not matter and an empty log never matches.
pub struct MinimumSeverityRule {
    threshold: LogSeverity,
    inner: PredicateRule,
}

impl MinimumSeverityRule {
    pub fn new<F>(threshold: LogSeverity, factory: F) -> Self
    where
        F: Fn(&Story) -> Result<Arc<dyn Handler>> + Send + Sync + 'static,
    {
        Self::with_factory(threshold, Arc::new(factory))
    }
    pub fn with_factory(threshold: LogSeverity, factory: HandlerFactory) -> Self {
        Self {
            threshold,
            inner: PredicateRule::with_factory(
                move |story: &Story| story.log().any(|entry| entry.severity() >= threshold),
                factory,
            ),
        }
    }
    pub fn threshold(&self) -> LogSeverity {
        self.threshold
    }
}

impl Rule for MinimumSeverityRule {
    fn when(&self, story: &Story) -> bool {
        self.inner.when(story)
    }
    fn then(&self, story: &Story) -> Result<Arc<dyn Handler>> {
        self.inner.then(story)
    }
}

impl fmt::Debug for MinimumSeverityRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MinimumSeverityRule")
            .field("threshold", &self.threshold)
            .finish()
    }
}

// ------------- Definitions -------------
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MinimumSeverityDefinition {
    pub minimum_severity: LogSeverity,
}

impl RuleDefinition for MinimumSeverityDefinition {
    const RULE_TYPE: &'static str = "minimumSeverity";
    fn into_rule(self, handler: HandlerFactory) -> Result<Arc<dyn Rule>> {
        Ok(Arc::new(MinimumSeverityRule::with_factory(
            self.minimum_severity,
            handler,
        )))
    }
}

/// Catch-all; belongs at the end of a ruleset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlwaysDefinition {}

impl RuleDefinition for AlwaysDefinition {
    const RULE_TYPE: &'static str = "always";
    fn into_rule(self, handler: HandlerFactory) -> Result<Arc<dyn Rule>> {
        Ok(Arc::new(PredicateRule::with_factory(|_: &Story| true, handler)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NamePatternDefinition {
    pub pattern: String,
}

impl RuleDefinition for NamePatternDefinition {
    const RULE_TYPE: &'static str = "namePattern";
    fn into_rule(self, handler: HandlerFactory) -> Result<Arc<dyn Rule>> {
        let regex = Regex::new(&self.pattern).map_err(|e| {
            StorylineError::argument("pattern", e.to_string())
        })?;
        Ok(Arc::new(PredicateRule::with_factory(
            move |story: &Story| regex.is_match(story.name()),
            handler,
        )))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DataDefinition {
    pub key: String,
    pub value: Option<Value>,
}

impl RuleDefinition for DataDefinition {
    const RULE_TYPE: &'static str = "data";
    fn into_rule(self, handler: HandlerFactory) -> Result<Arc<dyn Rule>> {
        let DataDefinition { key, value } = self;
        Ok(Arc::new(PredicateRule::with_factory(
            move |story: &Story| {
                if key.is_empty() {
                    return false;
                }
                match (&value, story.data().get(&key)) {
                    (_, Err(_)) | (_, Ok(None)) => false,
                    (None, Ok(Some(_))) => true,
                    (Some(expected), Ok(Some(actual))) => *expected == actual,
                }
            },
            handler,
        )))
    }
}
