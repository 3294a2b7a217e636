//! Session configuration.
//!
//! Configuration is read from TOML:
//!
//! ```toml
//! ruby_version = "3.3"
//! echo_output = false
//! ```
//!
//! Missing keys take their defaults, and the `RUBYEVAL_RUBY_VERSION` environment
//! variable overrides the version when [`Config::with_env`] is applied.

use std::{fmt, fs, path::Path, str::FromStr};

use serde::Deserialize;

use crate::version::RubyVersion;

/// Environment variable that overrides [`Config::ruby_version`].
pub const RUBY_VERSION_ENV: &str = "RUBYEVAL_RUBY_VERSION";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Interpreter release used for new sessions.
    pub ruby_version: RubyVersion,
    /// Whether captured `$stdout` output is also forwarded to the process stdout.
    pub echo_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ruby_version: RubyVersion::default(),
            echo_output: true,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Invalid(err.to_string()))
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Applies the `RUBYEVAL_RUBY_VERSION` override, if set.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_version_override(std::env::var(RUBY_VERSION_ENV).ok().as_deref())
    }

    /// Replaces the configured version with `tag` when one is given.
    pub fn with_version_override(mut self, tag: Option<&str>) -> Result<Self, ConfigError> {
        if let Some(tag) = tag {
            self.ruby_version =
                RubyVersion::from_str(tag.trim()).map_err(|_| ConfigError::UnknownVersion(tag.to_owned()))?;
        }
        Ok(self)
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The config file could not be read.
    Io(String),
    /// The config text is not valid TOML or has unexpected keys/values.
    Invalid(String),
    /// A version tag that no interpreter image exists for.
    UnknownVersion(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "cannot read config: {msg}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
            Self::UnknownVersion(tag) => write!(f, "unknown Ruby version {tag:?}, expected 3.2, 3.3 or 3.4"),
        }
    }
}

impl std::error::Error for ConfigError {}
