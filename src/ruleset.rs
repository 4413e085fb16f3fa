use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::handler::Handler;
use crate::rule::Rule;
use crate::story::Story;

/// An ordered, immutable collection of rules.
///
/// Evaluation is first-match-wins: rules are tried in sequence order and the
/// handler of the first rule whose condition holds is returned, without looking
/// at the rules after it. The order is therefore part of the meaning of a
/// ruleset. Specific rules go first and a catch-all goes last; swapping two
/// rules that can match the same story changes which handler that story gets.
#[derive(Clone, Default)]
pub struct Ruleset {
    rules: Vec<Arc<dyn Rule>>,
    revision: Option<String>,
}

impl Ruleset {
    pub fn new(rules: Vec<Arc<dyn Rule>>) -> Self {
        Self { rules, revision: None }
    }
    pub fn empty() -> Self {
        Self::default()
    }
    pub(crate) fn with_revision(mut self, revision: String) -> Self {
        self.revision = Some(revision);
        self
    }
    /// BLAKE3 digest of the definition text this ruleset was parsed from, if any.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }
    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }
    pub fn len(&self) -> usize {
        self.rules.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
    /// Selects at most one handler for the story.
    ///
    /// `Ok(None)` means no rule matched. An error raised while the matched
    /// rule builds its handler is returned as is; no later rule is tried.
    pub fn evaluate(&self, story: &Story) -> Result<Option<Arc<dyn Handler>>> {
        for rule in &self.rules {
            if rule.when(story) {
                return rule.then(story).map(Some);
            }
        }
        Ok(None)
    }
}

impl FromIterator<Arc<dyn Rule>> for Ruleset {
    fn from_iter<I: IntoIterator<Item = Arc<dyn Rule>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Debug for Ruleset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Ruleset")
            .field("rules", &self.rules.len())
            .field("revision", &self.revision)
            .finish()
    }
}
