//! Handlers receive a story when it starts and when it stops.
//!
//! Three kinds ship with the crate and are registered under their
//! `HANDLER_TYPE` names: `console`, `file` and `trace`.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, StorylineError};
use crate::registry::HandlerDefinition;
use crate::story::{Completion, LogSeverity, Story};

pub trait Handler: Send + Sync {
    /// Name used when logging which handler a story went to.
    fn name(&self) -> &str;
    fn on_start(&self, story: &Story) -> Result<()>;
    fn on_stop(&self, story: &Story, completion: &Completion) -> Result<()>;
}

/// Renders a story as plain text, leaving out log entries below `minimum`.
pub fn format_story(story: &Story, completion: &Completion, minimum: LogSeverity) -> String {
    let mut s = String::new();
    let elapsed = story.elapsed().unwrap_or_default();
    let _ = write!(
        s,
        "{} [{}] {:.3}ms {}",
        story.name(),
        story.instance_id(),
        elapsed.as_secs_f64() * 1000.0,
        completion
    );
    if let Some(parent) = story.parent() {
        let _ = write!(s, " (parent {} [{}])", parent.name(), parent.instance_id());
    }
    s.push('\n');
    for (key, value) in story.data().entries() {
        let _ = writeln!(s, "  {} = {}", key, value);
    }
    for entry in story.log().entries() {
        if entry.severity() >= minimum {
            let _ = writeln!(s, "  {}", entry);
        }
    }
    s
}

// ------------- Console -------------
/// `outputSeverity` filters what is printed. It is independent of a
/// `minimumSeverity` rule sitting in the same record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsoleHandler {
    output_severity: LogSeverity,
}

impl ConsoleHandler {
    pub fn new(output_severity: LogSeverity) -> Self {
        Self { output_severity }
    }
}

impl Handler for ConsoleHandler {
    fn name(&self) -> &str {
        Self::HANDLER_TYPE
    }
    fn on_start(&self, _story: &Story) -> Result<()> {
        Ok(())
    }
    fn on_stop(&self, story: &Story, completion: &Completion) -> Result<()> {
        print!("{}", format_story(story, completion, self.output_severity));
        Ok(())
    }
}

impl HandlerDefinition for ConsoleHandler {
    const HANDLER_TYPE: &'static str = "console";
    fn into_handler(self) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(self))
    }
}

// ------------- File -------------
/// Appends each stopped story to `path`. The path is checked when a story
/// arrives, so a definition with a missing path still resolves.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileHandler {
    path: String,
    output_severity: LogSeverity,
}

impl FileHandler {
    pub fn new(path: impl Into<String>, output_severity: LogSeverity) -> Self {
        Self {
            path: path.into(),
            output_severity,
        }
    }
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Handler for FileHandler {
    fn name(&self) -> &str {
        Self::HANDLER_TYPE
    }
    fn on_start(&self, _story: &Story) -> Result<()> {
        Ok(())
    }
    fn on_stop(&self, story: &Story, completion: &Completion) -> Result<()> {
        if self.path.is_empty() {
            return Err(StorylineError::argument("path", "file handler has no path"));
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(format_story(story, completion, self.output_severity).as_bytes())?;
        debug!(path = %self.path, story = %story.name(), "story appended to file");
        Ok(())
    }
}

impl HandlerDefinition for FileHandler {
    const HANDLER_TYPE: &'static str = "file";
    fn into_handler(self) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(self))
    }
}

// ------------- Trace -------------
/// Forwards stories to the `tracing` subscriber instead of writing them itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TraceHandler {}

impl Handler for TraceHandler {
    fn name(&self) -> &str {
        Self::HANDLER_TYPE
    }
    fn on_start(&self, story: &Story) -> Result<()> {
        debug!(story = %story.name(), id = %story.instance_id(), "story started");
        Ok(())
    }
    fn on_stop(&self, story: &Story, completion: &Completion) -> Result<()> {
        let elapsed_ms = story.elapsed().unwrap_or_default().as_secs_f64() * 1000.0;
        let severity = story.log().max_severity().map(|s| s.to_string());
        info!(
            story = %story.name(),
            id = %story.instance_id(),
            ms = elapsed_ms,
            entries = story.log().len(),
            max_severity = severity.as_deref().unwrap_or("-"),
            %completion,
            "story stopped"
        );
        Ok(())
    }
}

impl HandlerDefinition for TraceHandler {
    const HANDLER_TYPE: &'static str = "trace";
    fn into_handler(self) -> Result<Arc<dyn Handler>> {
        Ok(Arc::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{BasicRulesetProvider, RulesetProvider};
    use crate::ruleset::Ruleset;

    fn story(name: &str) -> Arc<Story> {
        let provider: Arc<dyn RulesetProvider> = Arc::new(BasicRulesetProvider::new(Ruleset::empty()));
        Story::new(name, provider).unwrap()
    }

    #[test]
    fn format_filters_by_severity() {
        let story = story("checkout");
        story.log().debug("cart loaded");
        story.log().error("payment declined");
        story.set_data("order", 42).unwrap();
        let text = format_story(&story, &Completion::Faulted("declined".into()), LogSeverity::Warning);
        assert!(text.starts_with("checkout ["));
        assert!(text.contains("faulted: declined"));
        assert!(text.contains("order = 42"));
        assert!(text.contains("payment declined"));
        assert!(!text.contains("cart loaded"));
    }

    #[test]
    fn file_handler_requires_a_path() {
        let story = story("nowhere");
        let err = FileHandler::default()
            .on_stop(&story, &Completion::Succeeded)
            .unwrap_err();
        assert!(matches!(err, StorylineError::Argument { name: "path", .. }));
    }

    #[test]
    fn file_handler_appends() {
        let path = std::env::temp_dir().join(format!("storyline_handler_{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let handler = FileHandler::new(path.to_string_lossy(), LogSeverity::Debug);
        let story = story("append");
        story.log().info("one");
        handler.on_stop(&story, &Completion::Succeeded).unwrap();
        handler.on_stop(&story, &Completion::Cancelled).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.matches("append [").count(), 2);
        assert!(written.contains("cancelled"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn rule_threshold_does_not_filter_output() {
        let file: FileHandler =
            serde_json::from_str(r#"{"ruleType":"minimumSeverity","minimumSeverity":"Error","path":"x.log"}"#).unwrap();
        assert_eq!(file.output_severity, LogSeverity::Debug);
    }

    #[test]
    fn handlers_deserialize_with_defaults() {
        let console: ConsoleHandler = serde_json::from_str(r#"{"handlerType":"console","extra":1}"#).unwrap();
        assert_eq!(console.output_severity, LogSeverity::Debug);
        let file: FileHandler = serde_json::from_str(r#"{"path":"x.log","outputSeverity":"Error"}"#).unwrap();
        assert_eq!(file.path(), "x.log");
        assert_eq!(file.output_severity, LogSeverity::Error);
    }
}
