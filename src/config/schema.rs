//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dev server.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::path::PathBuf;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Root configuration for the dev server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DevServerConfig {
    /// Listener and host-server settings.
    pub server: ServerConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Proxy rules, keyed by context, in match-priority order.
    pub proxy: ProxyRules,
}

/// Host server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:5173").
    pub bind_address: String,

    /// Directory served to requests no proxy rule picks up.
    pub root: Option<PathBuf>,

    /// Path of the hot-reload WebSocket endpoint.
    pub hmr_path: String,

    /// Sub-protocol reserved for the hot-reload channel. Upgrades offering
    /// exactly this value are never proxied.
    pub hmr_protocol: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:5173".to_string(),
            root: None,
            hmr_path: "/__hmr".to_string(),
            hmr_protocol: crate::http::hmr::HMR_PROTOCOL.to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output.
    #[default]
    Pretty,
    /// Single-line output.
    Compact,
    /// One JSON object per event.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Prometheus scrape address. Metrics are only exported when set.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_address: None,
        }
    }
}

/// A single `[proxy]` entry: either a bare target or a full rule.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RuleEntry {
    /// `"/api" = "http://localhost:3000"`
    Target(String),
    /// `"/api" = { target = "...", ... }`
    Rule(RuleConfig),
}

/// Structured proxy rule.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RuleConfig {
    /// Upstream origin, e.g. "http://localhost:3000" or "ws://localhost:4000".
    pub target: String,

    /// Path rewrite applied before resolving against the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<RewriteConfig>,

    /// `false` disables upstream certificate verification unless
    /// `reject_unauthorized` is set explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,

    /// Treat this rule as a WebSocket rule regardless of the target scheme.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws: Option<bool>,

    /// Everything else: TLS material, buffering hints. Passed through untouched.
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

/// Declarative rewrite: regex replacement over the request path and query.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RewriteConfig {
    /// Pattern to search for.
    pub pattern: String,

    /// Replacement, `$1`-style group references allowed.
    #[serde(default)]
    pub replacement: String,
}

/// Ordered `[proxy]` table.
///
/// A plain map would lose declaration order, and declaration order is the
/// match priority.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyRules(Vec<(String, RuleEntry)>);

impl ProxyRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule. Later entries match only if earlier ones do not.
    pub fn push(&mut self, context: impl Into<String>, entry: RuleEntry) {
        self.0.push((context.into(), entry));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RuleEntry)> {
        self.0.iter().map(|(context, entry)| (context.as_str(), entry))
    }
}

impl IntoIterator for ProxyRules {
    type Item = (String, RuleEntry);
    type IntoIter = std::vec::IntoIter<(String, RuleEntry)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<(String, RuleEntry)> for ProxyRules {
    fn from_iter<I: IntoIterator<Item = (String, RuleEntry)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for ProxyRules {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct RulesVisitor;

        impl<'de> Visitor<'de> for RulesVisitor {
            type Value = ProxyRules;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of context = target or context = { target = ... }")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut rules = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((context, entry)) = map.next_entry::<String, RuleEntry>()? {
                    rules.push((context, entry));
                }
                Ok(ProxyRules(rules))
            }
        }

        deserializer.deserialize_map(RulesVisitor)
    }
}

impl Serialize for ProxyRules {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (context, entry) in &self.0 {
            map.serialize_entry(context, entry)?;
        }
        map.end()
    }
}
