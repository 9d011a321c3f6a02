//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check every proxy target parses and uses a forwardable scheme
//! - Check every `^` context and rewrite pattern compiles
//! - Validate listener and hot-reload settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DevServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use regex::Regex;
use thiserror::Error;
use url::Url;

use crate::config::schema::{DevServerConfig, RuleEntry};
use crate::routing::resolver::Protocol;

/// A single semantic problem, tagged with where it was found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &DevServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("'{}' is not a socket address", config.server.bind_address),
        ));
    }

    if !config.server.hmr_path.starts_with('/') {
        errors.push(ValidationError::new(
            "server.hmr_path",
            "must start with '/'",
        ));
    }

    if config.server.hmr_protocol.trim().is_empty() {
        errors.push(ValidationError::new(
            "server.hmr_protocol",
            "must not be empty",
        ));
    }

    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "observability.metrics_address",
                format!("'{}' is not a socket address", addr),
            ));
        }
    }

    for (context, entry) in config.proxy.iter() {
        let field = format!("proxy.{}", context);

        if context.is_empty() {
            errors.push(ValidationError::new(&field, "context must not be empty"));
        }

        if context.starts_with('^') {
            if let Err(e) = Regex::new(context) {
                errors.push(ValidationError::new(&field, format!("invalid pattern: {}", e)));
            }
        }

        let target = match entry {
            RuleEntry::Target(target) => target,
            RuleEntry::Rule(rule) => {
                if let Some(rewrite) = &rule.rewrite {
                    if let Err(e) = Regex::new(&rewrite.pattern) {
                        errors.push(ValidationError::new(
                            format!("{}.rewrite", field),
                            format!("invalid pattern: {}", e),
                        ));
                    }
                }
                &rule.target
            }
        };

        if let Err(message) = check_target(target) {
            errors.push(ValidationError::new(format!("{}.target", field), message));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_target(target: &str) -> Result<(), String> {
    let url = Url::parse(target).map_err(|e| format!("'{}' is not a URL: {}", target, e))?;
    Protocol::from_scheme(url.scheme()).map_err(|e| e.to_string())?;
    if url.host_str().is_none() {
        return Err(format!("'{}' has no host", target));
    }
    Ok(())
}
