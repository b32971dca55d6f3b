//! Dispatcher configuration.
//!
//! Defaults, overridden by `COURIER_*` environment variables
//! (`COURIER_REPUBLISH_ON_ERROR`, `COURIER_LOG_EXCERPT_LEN`).

use ::config::{Config, ConfigError, Environment, Map};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "COURIER";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Republish a message whose handler failed (otherwise the loop stops).
    pub republish_on_error: bool,

    /// Max characters of the raw message written to the failure log.
    pub log_excerpt_len: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            republish_on_error: true,
            log_excerpt_len: 100,
        }
    }
}

impl DispatcherConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// `vars` replaces the process environment when given.
    fn load(vars: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).source(vars))
            .build()?;

        // 未設定のキーは #[serde(default)] で補う
        cfg.try_deserialize()
    }
}
