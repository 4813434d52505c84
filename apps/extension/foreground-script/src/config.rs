//! Page agent configuration.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::Level;

use crate::error::{AgentError, Result};

pub const DEFAULT_USERNAME_SELECTOR: &str = "input[name=\"email\"], input[name=\"username\"], \
     input[type=\"email\"], input[autocomplete=\"username\"], input[autocomplete=\"email\"]";

pub const DEFAULT_PASSWORD_SELECTOR: &str = "input[type=\"password\"], input[name=\"password\"], \
     input[autocomplete=\"current-password\"]";

pub const DEFAULT_MAX_LEVEL: &str = "info";

/// Settings for one page load. Every field has a default, so a partial
/// object from the loader is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    /// CSS selector for the username field, first match in document order
    pub username_selector: String,

    /// CSS selector for the password field, first match in document order
    pub password_selector: String,

    /// Maximum log level (`trace`, `debug`, `info`, `warn`, `error`)
    pub max_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            username_selector: DEFAULT_USERNAME_SELECTOR.to_string(),
            password_selector: DEFAULT_PASSWORD_SELECTOR.to_string(),
            max_level: DEFAULT_MAX_LEVEL.to_string(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.username_selector.trim().is_empty() {
            return Err(AgentError::Config("usernameSelector cannot be empty".to_string()));
        }
        if self.password_selector.trim().is_empty() {
            return Err(AgentError::Config("passwordSelector cannot be empty".to_string()));
        }
        self.level().map(|_| ())
    }

    pub fn level(&self) -> Result<Level> {
        Level::from_str(&self.max_level)
            .map_err(|_| AgentError::Config(format!("unknown log level: {}", self.max_level)))
    }
}
