//! Storyline – rule-based dispatch of tracked units of work.
//!
//! A *story* is a unit of work with a name, an identity, timing, a parent, a
//! structured log and key/value data. When a story starts or stops, the
//! ruleset that is active at that moment decides which handler receives it:
//! rules are tried in order and the first one whose condition holds supplies
//! the handler.
//!
//! ## Modules
//! * [`story`] – [`story::Story`], its log, its data and the completion token.
//! * [`rule`] – The [`rule::Rule`] trait, [`rule::PredicateRule`],
//!   [`rule::MinimumSeverityRule`] and the declarative rule definitions.
//! * [`ruleset`] – First-match-wins evaluation over an ordered rule list.
//! * [`provider`] – Static and hot-reloadable sources of the current ruleset.
//! * [`registry`] – Name-keyed rule and handler factories and the definition parser.
//! * [`handler`] – The [`handler::Handler`] trait and the built-in handlers.
//! * [`watch`] – A polling file watcher producing definition snapshots.
//! * [`settings`] – Settings for the binary, read through the `config` crate.
//!
//! ## Rule definitions
//! Rulesets can be written as JSON and resolved through a [`registry::TypeRegistry`]:
//! `ruleType` picks the rule kind, `handlerType` the handler kind, and every
//! other field is filled into the selected type. New kinds are added by
//! registering them, without touching the dispatch engine.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use storyline::provider::{DynamicRulesetProvider, RulesetProvider};
//! use storyline::registry::TypeRegistry;
//! use storyline::ruleset::Ruleset;
//! use storyline::story::{Completion, Story};
//!
//! let provider = Arc::new(DynamicRulesetProvider::new(TypeRegistry::global(), Ruleset::empty()));
//! provider.reconfigure(r#"[
//!     {"ruleType": "minimumSeverity", "minimumSeverity": "Error", "handlerType": "trace"}
//! ]"#).unwrap();
//! let story = Story::new("checkout", provider.clone()).unwrap();
//! story.start().unwrap();
//! story.log().error("payment declined");
//! let handler = story.stop(&Completion::Succeeded).unwrap();
//! assert_eq!(handler.unwrap().name(), "trace");
//! ```

pub mod error;
pub mod handler;
pub mod interface;
pub mod provider;
pub mod registry;
pub mod rule;
pub mod ruleset;
pub mod settings;
pub mod story;
pub mod watch;

use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

pub use error::{Result, StorylineError};

/// Hasher for the name-keyed maps.
pub type OtherHasher = BuildHasherDefault<SeaHasher>;
