//! Context matching logic.
//!
//! # Responsibilities
//! - Decide whether a request path (path + query) falls under a rule's context
//! - Literal contexts match by prefix (case-sensitive)
//! - Contexts starting with `^` are regular expressions
//!
//! # Design Decisions
//! - The variant is picked once, when the rule table is built
//! - Patterns are compiled once and reused for every request
//! - A pattern matches if it is found anywhere in the path; only the
//!   pattern's own anchors constrain it

use regex::Regex;

use crate::error::{ConfigError, Result};

/// Marker that turns a context into a regular expression.
pub const PATTERN_MARKER: char = '^';

/// Compiled form of a rule context.
#[derive(Debug, Clone)]
pub enum ContextMatcher {
    /// Path must start with this string.
    Prefix(String),
    /// Path must contain a match for this pattern.
    Pattern(Regex),
}

impl ContextMatcher {
    /// Compile a context string.
    pub fn new(context: &str) -> Result<Self> {
        if context.starts_with(PATTERN_MARKER) {
            let pattern =
                Regex::new(context).map_err(|e| ConfigError::invalid_pattern(context, e))?;
            Ok(Self::Pattern(pattern))
        } else {
            Ok(Self::Prefix(context.to_string()))
        }
    }

    /// Returns true if the path matches this context.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::Pattern(pattern) => pattern.is_match(path),
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::Pattern(_))
    }
}
