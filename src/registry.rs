//! Name-keyed factories for rules and handlers, and the parser that uses them.
//!
//! A rule-definition document is a JSON array of records:
//!
//! ```json
//! [
//!   {"ruleType": "minimumSeverity", "minimumSeverity": "Error", "handlerType": "console"},
//!   {"ruleType": "always", "handler": {"handlerType": "file", "path": "stories.log"}}
//! ]
//! ```
//!
//! `ruleType` selects a rule factory and `handlerType` a handler factory. The
//! handler fields sit either next to the rule fields or in a nested `handler`
//! object. Each factory deserializes its own fields out of the same record, so
//! unknown fields are ignored and missing ones keep their default value.
//!
//! A record naming an unregistered type, or carrying fields that do not
//! deserialize, is skipped. Only a document that is not a JSON array fails
//! as a whole.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, StorylineError, TypeKind};
use crate::handler::{ConsoleHandler, FileHandler, Handler, TraceHandler};
use crate::rule::{
    shared_handler, AlwaysDefinition, DataDefinition, HandlerFactory, MinimumSeverityDefinition,
    NamePatternDefinition, Rule,
};
use crate::ruleset::Ruleset;
use crate::OtherHasher;

pub const RULE_TYPE_FIELD: &str = "ruleType";
pub const HANDLER_TYPE_FIELD: &str = "handlerType";
pub const NESTED_HANDLER_FIELD: &str = "handler";

/// A rule kind that can be named in a definition document.
///
/// The implementing type holds the rule's fields; serde fills them in from the
/// record, then `into_rule` binds the result to the record's handler.
pub trait RuleDefinition: DeserializeOwned {
    const RULE_TYPE: &'static str;
    fn into_rule(self, handler: HandlerFactory) -> Result<Arc<dyn Rule>>;
}

/// A handler kind that can be named in a definition document.
pub trait HandlerDefinition: DeserializeOwned {
    const HANDLER_TYPE: &'static str;
    fn into_handler(self) -> Result<Arc<dyn Handler>>;
}

pub type RuleFactory = Arc<dyn Fn(&Value, HandlerFactory) -> Result<Arc<dyn Rule>> + Send + Sync>;
pub type HandlerBuilder = Arc<dyn Fn(&Value) -> Result<Arc<dyn Handler>> + Send + Sync>;

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<TypeRegistry> = Arc::new(TypeRegistry::with_builtins());
}

/// A record that could not be turned into a rule.
#[derive(Debug)]
pub struct SkippedRecord {
    pub index: usize,
    pub error: StorylineError,
}

/// The outcome of parsing one definition document.
#[derive(Debug)]
pub struct Parsed {
    pub ruleset: Ruleset,
    pub skipped: Vec<SkippedRecord>,
}

#[derive(Default)]
pub struct TypeRegistry {
    rule_factories: HashMap<String, RuleFactory, OtherHasher>,
    handler_factories: HashMap<String, HandlerBuilder, OtherHasher>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    /// A registry holding every rule and handler kind shipped with the crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register_rule::<MinimumSeverityDefinition>()
            .register_rule::<AlwaysDefinition>()
            .register_rule::<NamePatternDefinition>()
            .register_rule::<DataDefinition>()
            .register_handler::<ConsoleHandler>()
            .register_handler::<FileHandler>()
            .register_handler::<TraceHandler>();
        registry
    }
    /// The process-wide registry of built-in kinds. Built on first use, never mutated.
    pub fn global() -> Arc<TypeRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }
    pub fn register_rule<D: RuleDefinition + 'static>(&mut self) -> &mut Self {
        let factory: RuleFactory = Arc::new(|value: &Value, handler: HandlerFactory| {
            let definition: D = Deserialize::deserialize(value)?;
            definition.into_rule(handler)
        });
        self.insert_rule(D::RULE_TYPE.to_string(), factory);
        self
    }
    pub fn register_handler<D: HandlerDefinition + 'static>(&mut self) -> &mut Self {
        let builder: HandlerBuilder = Arc::new(|value: &Value| {
            let definition: D = Deserialize::deserialize(value)?;
            definition.into_handler()
        });
        self.insert_handler(D::HANDLER_TYPE.to_string(), builder);
        self
    }
    pub fn register_rule_factory(&mut self, name: &str, factory: RuleFactory) -> Result<&mut Self> {
        if name.is_empty() {
            return Err(StorylineError::argument("name", "rule type name must not be empty"));
        }
        self.insert_rule(name.to_string(), factory);
        Ok(self)
    }
    pub fn register_handler_factory(&mut self, name: &str, builder: HandlerBuilder) -> Result<&mut Self> {
        if name.is_empty() {
            return Err(StorylineError::argument("name", "handler type name must not be empty"));
        }
        self.insert_handler(name.to_string(), builder);
        Ok(self)
    }
    fn insert_rule(&mut self, name: String, factory: RuleFactory) {
        debug!(rule_type = %name, "registering rule type");
        if self.rule_factories.insert(name.clone(), factory).is_some() {
            warn!(rule_type = %name, "rule type registered twice, keeping the later factory");
        }
    }
    fn insert_handler(&mut self, name: String, builder: HandlerBuilder) {
        debug!(handler_type = %name, "registering handler type");
        if self.handler_factories.insert(name.clone(), builder).is_some() {
            warn!(handler_type = %name, "handler type registered twice, keeping the later factory");
        }
    }
    pub fn rule_factory(&self, name: &str) -> Option<&RuleFactory> {
        self.rule_factories.get(name)
    }
    pub fn handler_factory(&self, name: &str) -> Option<&HandlerBuilder> {
        self.handler_factories.get(name)
    }
    /// Registered rule type names, sorted.
    pub fn rule_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.rule_factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
    /// Registered handler type names, sorted.
    pub fn handler_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handler_factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
    /// Builds the rule described by a single record.
    pub fn resolve(&self, record: &Value) -> Result<Arc<dyn Rule>> {
        let rule_type = discriminator(record, RULE_TYPE_FIELD);
        let rule_factory = self
            .rule_factory(rule_type)
            .ok_or_else(|| unresolved(TypeKind::Rule, rule_type))?;
        let handler_record = match record.get(NESTED_HANDLER_FIELD) {
            Some(nested) if nested.is_object() => nested,
            _ => record,
        };
        let handler_type = discriminator(handler_record, HANDLER_TYPE_FIELD);
        let handler_builder = self
            .handler_factory(handler_type)
            .ok_or_else(|| unresolved(TypeKind::Handler, handler_type))?;
        let handler = handler_builder(handler_record)?;
        rule_factory(record, shared_handler(handler))
    }
    /// Parses a whole definition document into a ruleset, in document order.
    pub fn parse(&self, text: &str) -> Result<Parsed> {
        let records: Vec<Value> = serde_json::from_str(text)
            .map_err(|e| StorylineError::Reconfiguration(e.to_string()))?;
        let mut rules = Vec::with_capacity(records.len());
        let mut skipped = Vec::new();
        for (index, record) in records.iter().enumerate() {
            match self.resolve(record) {
                Ok(rule) => rules.push(rule),
                Err(error) => {
                    let error = match error {
                        StorylineError::UnresolvedType { .. } => error,
                        other => StorylineError::Definition {
                            index,
                            message: other.to_string(),
                        },
                    };
                    warn!(index, %error, "skipping rule definition");
                    skipped.push(SkippedRecord { index, error });
                }
            }
        }
        let revision = blake3::hash(text.as_bytes()).to_hex().to_string();
        Ok(Parsed {
            ruleset: Ruleset::new(rules).with_revision(revision),
            skipped,
        })
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("rule_types", &self.rule_types())
            .field("handler_types", &self.handler_types())
            .finish()
    }
}

// A missing or non-string discriminator resolves to "", which is never registered.
fn discriminator<'a>(record: &'a Value, field: &str) -> &'a str {
    record.get(field).and_then(Value::as_str).unwrap_or_default()
}

fn unresolved(kind: TypeKind, name: &str) -> StorylineError {
    StorylineError::UnresolvedType {
        kind,
        name: name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins_are_registered() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(registry.rule_types(), vec!["always", "data", "minimumSeverity", "namePattern"]);
        assert_eq!(registry.handler_types(), vec!["console", "file", "trace"]);
        assert!(registry.rule_factory("predicate").is_none());
    }

    #[test]
    fn global_registry_is_shared() {
        assert!(Arc::ptr_eq(&TypeRegistry::global(), &TypeRegistry::global()));
    }

    #[test]
    fn resolve_reports_the_missing_kind() {
        let registry = TypeRegistry::with_builtins();
        let err = registry.resolve(&json!({"ruleType": "nope", "handlerType": "console"})).err().unwrap();
        assert!(matches!(err, StorylineError::UnresolvedType { kind: TypeKind::Rule, .. }));
        let err = registry.resolve(&json!({"ruleType": "always", "handlerType": "nope"})).err().unwrap();
        assert!(matches!(err, StorylineError::UnresolvedType { kind: TypeKind::Handler, .. }));
        let err = registry.resolve(&json!({"ruleType": "always"})).err().unwrap();
        assert!(matches!(err, StorylineError::UnresolvedType { kind: TypeKind::Handler, ref name } if name.is_empty()));
    }

    #[test]
    fn field_errors_skip_only_their_record() {
        let registry = TypeRegistry::with_builtins();
        let parsed = registry
            .parse(r#"[
                {"ruleType": "minimumSeverity", "minimumSeverity": "Loud", "handlerType": "console"},
                {"ruleType": "always", "handlerType": "trace"}
            ]"#)
            .unwrap();
        assert_eq!(parsed.ruleset.len(), 1);
        assert_eq!(parsed.skipped.len(), 1);
        assert!(matches!(parsed.skipped[0].error, StorylineError::Definition { index: 0, .. }));
        assert!(parsed.skipped[0].error.is_soft());
    }

    #[test]
    fn revision_follows_the_text() {
        let registry = TypeRegistry::with_builtins();
        let a = registry.parse("[]").unwrap().ruleset;
        let b = registry.parse("[]").unwrap().ruleset;
        let c = registry.parse("[ ]").unwrap().ruleset;
        assert_eq!(a.revision(), b.revision());
        assert_ne!(a.revision(), c.revision());
    }

    #[test]
    fn empty_names_cannot_be_registered() {
        let mut registry = TypeRegistry::new();
        let factory: HandlerBuilder = Arc::new(|_: &Value| -> Result<Arc<dyn Handler>> { Ok(Arc::new(TraceHandler::default())) });
        assert!(registry.register_handler_factory("", factory).is_err());
    }
}
