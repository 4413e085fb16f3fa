//! Interactive driver: stories are typed on stdin and dispatched through the
//! ruleset read from the configured rule file.
//!
//! ```text
//! <severity> <message>   append a log entry to the current story
//! data <key> <json>      set a data value on the current story
//! name <name>            rename the next story
//! (blank line)           stop the current story and start the next one
//! ```

use std::io::{self, BufRead};
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use storyline::provider::{DynamicRulesetProvider, RulesetProvider};
use storyline::registry::TypeRegistry;
use storyline::ruleset::Ruleset;
use storyline::settings::{Settings, DEFAULT_SETTINGS_FILE};
use storyline::story::{Completion, LogSeverity, Story};
use storyline::watch::FileWatcher;

fn main() {
    let settings_file = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_SETTINGS_FILE.to_string());
    let settings = match Settings::load(&settings_file) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)),
        )
        .init();
    if let Err(e) = run(&settings) {
        error!(error = %e, "storyline stopped");
        std::process::exit(1);
    }
}

fn run(settings: &Settings) -> storyline::Result<()> {
    let registry = TypeRegistry::global();
    let initial = match &settings.default_rules {
        Some(text) => registry.parse(text)?.ruleset,
        None => Ruleset::empty(),
    };
    let (_watcher, provider) = match &settings.rules_path {
        Some(path) => {
            let (watcher, snapshots) = FileWatcher::spawn(path, settings.poll_interval())?;
            info!(path = %path, "watching rule definitions");
            let provider = DynamicRulesetProvider::subscribe(registry, initial, snapshots)?;
            (Some(watcher), provider)
        }
        None => (None, DynamicRulesetProvider::new(registry, initial)),
    };
    let provider: Arc<dyn RulesetProvider> = Arc::new(provider);

    let mut name = String::from("story");
    let mut story = begin(&name, &provider)?;
    for line in io::stdin().lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            finish(&story);
            story = begin(&name, &provider)?;
            continue;
        }
        let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
        match head {
            "name" if !rest.is_empty() => name = rest.trim().to_string(),
            "data" => {
                let (key, raw) = rest.split_once(' ').unwrap_or((rest, "null"));
                let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
                if let Err(e) = story.set_data(key, value) {
                    warn!(error = %e, "data not set");
                }
            }
            _ => match LogSeverity::parse(head) {
                Some(severity) => story.log().log(severity, rest),
                None => story.log().info(line),
            },
        }
    }
    finish(&story);
    Ok(())
}

// A handler failing on start is logged; the story still runs.
fn begin(name: &str, provider: &Arc<dyn RulesetProvider>) -> storyline::Result<Arc<Story>> {
    let story = Story::new(name, Arc::clone(provider))?;
    if let Err(e) = story.start() {
        warn!(story = %story.name(), error = %e, "start dispatch failed");
    }
    Ok(story)
}

/// Stops and dispatches the story. Returns whether dispatch went through;
/// a failure is logged and the session carries on with the next story.
fn finish(story: &Story) -> bool {
    match story.stop(&Completion::Succeeded) {
        Ok(Some(handler)) => {
            info!(story = %story.name(), handler = handler.name(), "story dispatched");
            true
        }
        Ok(None) => {
            info!(story = %story.name(), "no handler matched");
            true
        }
        Err(e) => {
            error!(story = %story.name(), error = %e, "stop dispatch failed");
            false
        }
    }
}
