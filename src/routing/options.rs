//! Option builder.
//!
//! Merges the resolved connection parameters with a rule's passthrough
//! options into the set handed to the forwarding primitive.
//!
//! # Design Decisions
//! - Later wins: resolved `{protocol, host, port, path}` first, passthrough
//!   second
//! - Routing-only keys never reach the forwarder
//! - Passthrough values are opaque here; an override of a resolved field is
//!   taken only when it has the right shape, everything else lands in
//!   `connection` untouched

use serde::Serialize;
use serde_json::{Map, Value};

use crate::routing::resolver::{Protocol, ResolvedTarget};

/// Keys that steer routing and are never forwarded.
pub const ROUTING_KEYS: [&str; 5] = ["target", "rewrite", "secure", "ws", "on_error"];

/// Flattened per-request option set for the forwarding primitive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProxyOptions {
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// Path plus query, as sent upstream.
    pub path: String,
    /// TLS material, buffering hints and anything else the rule passed through.
    #[serde(flatten)]
    pub connection: Map<String, Value>,
}

impl ProxyOptions {
    pub fn build(resolved: &ResolvedTarget, passthrough: &Map<String, Value>) -> Self {
        let mut options = Self {
            protocol: resolved.protocol,
            host: resolved.host.clone(),
            port: resolved.port,
            path: resolved.path.clone(),
            connection: Map::new(),
        };

        for (key, value) in passthrough {
            if ROUTING_KEYS.contains(&key.as_str()) {
                continue;
            }
            if !options.override_field(key, value) {
                options.connection.insert(key.clone(), value.clone());
            }
        }

        options
    }

    /// Apply a passthrough value onto a resolved field. Returns false when
    /// the key is not a resolved field or the value does not fit it.
    fn override_field(&mut self, key: &str, value: &Value) -> bool {
        match key {
            "protocol" => match value
                .as_str()
                .map(|s| s.trim_end_matches(':'))
                .and_then(Protocol::from_name)
            {
                Some(protocol) => {
                    self.protocol = protocol;
                    true
                }
                None => false,
            },
            "host" | "hostname" => match value.as_str() {
                Some(host) => {
                    self.host = host.to_string();
                    true
                }
                None => false,
            },
            "port" => match value.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => {
                    self.port = port;
                    true
                }
                None => false,
            },
            "path" => match value.as_str() {
                Some(path) => {
                    self.path = path.to_string();
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// `host:port`, bracketing IPv6 hosts as resolved.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.connection.get(key)
    }

    /// Whether the upstream certificate must verify. Defaults to true.
    pub fn reject_unauthorized(&self) -> bool {
        self.connection
            .get(crate::routing::rule::REJECT_UNAUTHORIZED)
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}
