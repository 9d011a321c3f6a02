//! Configuration errors.
//!
//! Anything in here means the proxy was set up wrong: a target that does not
//! parse, a scheme we cannot forward to, a context pattern that does not
//! compile. These are raised when the rule table is built and, for targets
//! produced by a rewrite, when a request is resolved. They never go through
//! the per-rule error handlers.

use thiserror::Error;

use crate::config::validation::ValidationError;

/// Error type for configuration loading and rule resolution.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML or does not fit the schema.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Semantic validation failed. Carries every problem found, not just the first.
    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    /// A target (or rewritten destination) is not a URL.
    #[error("Invalid target '{target}': {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },

    /// The destination scheme is not one of http, https, ws, wss.
    #[error("Invalid protocol: {0}:")]
    InvalidProtocol(String),

    /// The destination URL has no host to connect to.
    #[error("Target '{0}' has no host")]
    MissingHost(String),

    /// A `^` context or a rewrite pattern failed to compile.
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl ConfigError {
    /// Creates an invalid target error.
    pub fn invalid_target(target: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidTarget {
            target: target.into(),
            source,
        }
    }

    /// Creates an invalid pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, source: regex::Error) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            source,
        }
    }
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias using ConfigError.
pub type Result<T> = std::result::Result<T, ConfigError>;
