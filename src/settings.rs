use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_SETTINGS_FILE: &str = "storyline.json";
pub const ENVIRONMENT_PREFIX: &str = "STORYLINE";

/// Settings for the `storyline` binary.
///
/// Layered lowest to highest: built-in defaults, the settings file (optional),
/// then `STORYLINE_*` environment variables, e.g. `STORYLINE_RULES_PATH`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Rule-definition file to watch. Without one the ruleset never changes.
    pub rules_path: Option<String>,
    pub poll_interval_ms: u64,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Definition text used until the rule file has been read.
    pub default_rules: Option<String>,
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .set_default("poll_interval_ms", 500)?
            .set_default("log_filter", "info")?
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENVIRONMENT_PREFIX))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}
