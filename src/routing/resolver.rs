//! Target resolution.
//!
//! # Responsibilities
//! - Apply the rule's rewrite to the original path, exactly once
//! - Resolve the effective path against the rule's target origin
//! - Derive protocol, host, port and path for the forwarding primitive
//!
//! # Design Decisions
//! - Recomputed for every request; a rewrite may depend on the path
//! - Standard URL resolution: an absolute effective path replaces the target
//! - ws/wss collapse onto http/https; anything else is a configuration error
//! - The fragment is never forwarded

use std::fmt;

use serde::Serialize;
use url::Url;

use crate::error::{ConfigError, Result};
use crate::routing::rule::Rule;

/// Wire protocol towards the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    /// Map a URL scheme to the protocol used to reach it.
    pub fn from_scheme(scheme: &str) -> Result<Self> {
        match scheme {
            "https" | "wss" => Ok(Self::Https),
            "http" | "ws" => Ok(Self::Http),
            other => Err(ConfigError::InvalidProtocol(other.to_string())),
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "http" => Some(Self::Http),
            "https" => Some(Self::Https),
            _ => None,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where one request is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Absolute destination URL.
    pub url: Url,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// Pathname plus query string.
    pub path: String,
}

impl ResolvedTarget {
    /// Derive connection parameters from an absolute destination URL.
    pub fn from_url(url: Url) -> Result<Self> {
        let protocol = Protocol::from_scheme(url.scheme())?;
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::MissingHost(url.to_string()))?
            .to_string();
        let port = url.port().unwrap_or_else(|| protocol.default_port());

        let mut path = url.path().to_string();
        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            url,
            protocol,
            host,
            port,
            path,
        })
    }
}

/// Resolve the destination of `original` (path + query) under `rule`.
pub fn resolve(rule: &Rule, original: &str) -> Result<ResolvedTarget> {
    let effective = match rule.rewrite() {
        Some(rewrite) => {
            let rewritten = rewrite.apply(original);
            tracing::debug!("rewrite: {} -> {}", original, rewritten);
            rewritten
        }
        None => original.to_string(),
    };

    let url = rule
        .target_url()
        .join(&effective)
        .map_err(|e| ConfigError::invalid_target(effective.as_str(), e))?;
    tracing::debug!("targetUrl: {}", url);

    ResolvedTarget::from_url(url)
}
