use std::env;

use serde::{Deserialize, Serialize};
use tracing::info;
use typed_builder::TypedBuilder;

use crate::error::ConfigError;

/// Board-wide behaviour switches.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Serialize, Deserialize)]
pub struct BoardConfig {
    /// Opt-in guard against tag-driven cycles. Counts executed steps per push
    /// run, and across a pull chain. `None` = unlimited.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub max_steps: Option<usize>,

    /// Prefer an eligible Trick over the plain overlap winner once at least
    /// one step has run.
    #[builder(default = true)]
    #[serde(default = "default_prefer_tricks")]
    pub prefer_tricks: bool,
}

fn default_prefer_tricks() -> bool {
    true
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BoardConfig {
    /// Load configuration from environment variables. Unset variables keep
    /// their defaults.
    ///
    /// - `RITUAL_MAX_STEPS`: positive integer
    /// - `RITUAL_PREFER_TRICKS`: `true`/`false`/`1`/`0`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = optional_env("RITUAL_MAX_STEPS") {
            let steps = raw.parse::<usize>().map_err(|e| ConfigError::Invalid {
                key: "RITUAL_MAX_STEPS",
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            if steps == 0 {
                return Err(ConfigError::Invalid {
                    key: "RITUAL_MAX_STEPS",
                    value: raw,
                    reason: "must be at least 1".into(),
                });
            }
            config.max_steps = Some(steps);
        }

        if let Some(raw) = optional_env("RITUAL_PREFER_TRICKS") {
            config.prefer_tricks = parse_flag(&raw).ok_or_else(|| ConfigError::Invalid {
                key: "RITUAL_PREFER_TRICKS",
                value: raw.clone(),
                reason: "expected true/false".into(),
            })?;
        }

        Ok(config)
    }

    /// Log the effective configuration.
    pub fn log_summary(&self) {
        info!(
            max_steps = ?self.max_steps,
            prefer_tricks = self.prefer_tricks,
            "Board configuration"
        );
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
