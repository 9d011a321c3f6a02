//! Proxy rules and their normalization.
//!
//! [`RuleOptions`] is what a user writes: a target plus optional knobs, or
//! just a target string. [`Rule`] is what the table holds: context compiled,
//! target parsed, `secure` folded into the connection options and error
//! handlers chained. Nothing about a `Rule` changes after it is built.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

use crate::config::schema::{RuleConfig, RuleEntry};
use crate::error::{ConfigError, Result};
use crate::proxy::error::{ErrorChain, ErrorHandler};
use crate::routing::matcher::ContextMatcher;
use crate::routing::resolver::Protocol;

/// Connection option controlling upstream certificate verification.
pub const REJECT_UNAUTHORIZED: &str = "reject_unauthorized";

/// Path rewrite applied before the target is resolved.
#[derive(Clone)]
pub enum Rewrite {
    /// Replace the first match of `pattern`.
    Replace { pattern: Regex, replacement: String },
    /// Arbitrary function of the original path.
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl Rewrite {
    pub fn replace(pattern: &str, replacement: impl Into<String>) -> Result<Self> {
        let compiled = Regex::new(pattern).map_err(|e| ConfigError::invalid_pattern(pattern, e))?;
        Ok(Self::Replace {
            pattern: compiled,
            replacement: replacement.into(),
        })
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn apply(&self, path: &str) -> String {
        match self {
            Self::Replace {
                pattern,
                replacement,
            } => pattern.replace(path, replacement.as_str()).into_owned(),
            Self::Custom(f) => f(path),
        }
    }
}

impl fmt::Debug for Rewrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace {
                pattern,
                replacement,
            } => f
                .debug_struct("Replace")
                .field("pattern", &pattern.as_str())
                .field("replacement", replacement)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A rule as configured, before normalization.
#[derive(Clone)]
pub struct RuleOptions {
    pub target: String,
    pub rewrite: Option<Rewrite>,
    pub secure: Option<bool>,
    pub ws: Option<bool>,
    pub on_error: Option<Arc<dyn ErrorHandler>>,
    /// Passthrough connection options (TLS material, buffering hints).
    pub options: Map<String, Value>,
}

impl RuleOptions {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            rewrite: None,
            secure: None,
            ws: None,
            on_error: None,
            options: Map::new(),
        }
    }

    pub fn rewrite(mut self, rewrite: Rewrite) -> Self {
        self.rewrite = Some(rewrite);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn ws(mut self, ws: bool) -> Self {
        self.ws = Some(ws);
        self
    }

    pub fn on_error<H>(mut self, handler: H) -> Self
    where
        H: ErrorHandler + 'static,
    {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Set a passthrough connection option.
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for RuleOptions {
    fn from(target: &str) -> Self {
        Self::new(target)
    }
}

impl From<String> for RuleOptions {
    fn from(target: String) -> Self {
        Self::new(target)
    }
}

impl TryFrom<RuleConfig> for RuleOptions {
    type Error = ConfigError;

    fn try_from(config: RuleConfig) -> Result<Self> {
        let rewrite = config
            .rewrite
            .map(|r| Rewrite::replace(&r.pattern, r.replacement))
            .transpose()?;

        Ok(Self {
            target: config.target,
            rewrite,
            secure: config.secure,
            ws: config.ws,
            on_error: None,
            options: config.options,
        })
    }
}

impl TryFrom<RuleEntry> for RuleOptions {
    type Error = ConfigError;

    fn try_from(entry: RuleEntry) -> Result<Self> {
        match entry {
            RuleEntry::Target(target) => Ok(Self::new(target)),
            RuleEntry::Rule(config) => config.try_into(),
        }
    }
}

impl fmt::Debug for RuleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleOptions")
            .field("target", &self.target)
            .field("rewrite", &self.rewrite)
            .field("secure", &self.secure)
            .field("ws", &self.ws)
            .field("on_error", &self.on_error.is_some())
            .field("options", &self.options)
            .finish()
    }
}

/// A normalized rule, as held by the rule table.
#[derive(Debug, Clone)]
pub struct Rule {
    context: String,
    matcher: ContextMatcher,
    target: String,
    target_url: Url,
    rewrite: Option<Rewrite>,
    ws: bool,
    errors: ErrorChain,
    options: Map<String, Value>,
}

impl Rule {
    /// Normalize a configured rule.
    ///
    /// `secure = false` without an explicit `reject_unauthorized` turns
    /// certificate verification off. With a default handler, the rule's own
    /// handler runs first and the default only runs if it passes.
    pub fn normalize(
        context: impl Into<String>,
        raw: RuleOptions,
        default_handler: Option<&Arc<dyn ErrorHandler>>,
    ) -> Result<Self> {
        let context = context.into();
        let matcher = ContextMatcher::new(&context)?;

        let target_url =
            Url::parse(&raw.target).map_err(|e| ConfigError::invalid_target(raw.target.as_str(), e))?;
        Protocol::from_scheme(target_url.scheme())?;
        if target_url.host_str().is_none() {
            return Err(ConfigError::MissingHost(raw.target));
        }

        let mut options = raw.options;
        if raw.secure == Some(false) && !options.contains_key(REJECT_UNAUTHORIZED) {
            options.insert(REJECT_UNAUTHORIZED.to_string(), Value::Bool(false));
        }

        Ok(Self {
            context,
            matcher,
            target: raw.target,
            target_url,
            rewrite: raw.rewrite,
            ws: raw.ws.unwrap_or(false),
            errors: ErrorChain::new(raw.on_error, default_handler.cloned()),
            options,
        })
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }

    /// True when the context is a regular expression rather than a prefix.
    pub fn is_pattern(&self) -> bool {
        self.matcher.is_pattern()
    }

    /// Target as configured.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    pub fn rewrite(&self) -> Option<&Rewrite> {
        self.rewrite.as_ref()
    }

    /// True if the rule opts in explicitly, or its configured target is ws/wss.
    pub fn is_websocket(&self) -> bool {
        self.ws || self.target.starts_with("ws:") || self.target.starts_with("wss:")
    }

    pub fn error_chain(&self) -> &ErrorChain {
        &self.errors
    }

    /// Passthrough connection options after normalization.
    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::error::{Handling, ProxyError};

    #[test]
    fn test_shorthand_target() {
        let rule = Rule::normalize("/api", "http://localhost:3000".into(), None).unwrap();
        assert_eq!(rule.context(), "/api");
        assert_eq!(rule.target(), "http://localhost:3000");
        assert!(rule.rewrite().is_none());
        assert!(rule.options().is_empty());
        assert!(rule.error_chain().is_empty());
        assert!(!rule.is_websocket());
        assert!(!rule.is_pattern());
    }

    #[test]
    fn test_pattern_context() {
        let rule = Rule::normalize(r"^/v\d+/", "http://localhost:3000".into(), None).unwrap();
        assert!(rule.is_pattern());
        assert!(rule.matches("/v2/users"));
    }

    #[test]
    fn test_secure_false_disables_verification() {
        let rule = Rule::normalize(
            "/api",
            RuleOptions::new("https://localhost:8443").secure(false),
            None,
        )
        .unwrap();
        assert_eq!(rule.options().get(REJECT_UNAUTHORIZED), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_explicit_reject_unauthorized_wins() {
        let rule = Rule::normalize(
            "/api",
            RuleOptions::new("https://localhost:8443")
                .secure(false)
                .option(REJECT_UNAUTHORIZED, true),
            None,
        )
        .unwrap();
        assert_eq!(rule.options().get(REJECT_UNAUTHORIZED), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_secure_true_is_not_mapped() {
        let rule = Rule::normalize(
            "/api",
            RuleOptions::new("https://localhost:8443").secure(true),
            None,
        )
        .unwrap();
        assert!(!rule.options().contains_key(REJECT_UNAUTHORIZED));
    }

    #[test]
    fn test_websocket_classification() {
        let explicit = Rule::normalize("/", RuleOptions::new("http://example.com").ws(true), None)
            .unwrap();
        assert!(explicit.is_websocket());

        let ws = Rule::normalize("/", "ws://example.com".into(), None).unwrap();
        assert!(ws.is_websocket());

        let wss = Rule::normalize("/", "wss://example.com".into(), None).unwrap();
        assert!(wss.is_websocket());

        let http = Rule::normalize("/", "http://example.com".into(), None).unwrap();
        assert!(!http.is_websocket());
    }

    #[test]
    fn test_invalid_targets() {
        let err = Rule::normalize("/", "ftp://host".into(), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProtocol(_)));

        let err = Rule::normalize("/", "not a url".into(), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTarget { .. }));
    }

    #[test]
    fn test_default_handler_is_chained() {
        let default: Arc<dyn ErrorHandler> = Arc::new(|_: &mut ProxyError| Handling::Handled);

        let bare = Rule::normalize("/", "http://example.com".into(), Some(&default)).unwrap();
        assert_eq!(bare.error_chain().len(), 1);

        let with_own = Rule::normalize(
            "/",
            RuleOptions::new("http://example.com").on_error(|_: &mut ProxyError| Handling::Unhandled),
            Some(&default),
        )
        .unwrap();
        assert_eq!(with_own.error_chain().len(), 2);
    }

    #[test]
    fn test_from_config() {
        let entry: RuleEntry = toml::from_str(
            r#"
target = "http://localhost:3000"
secure = false
ws = true
rewrite = { pattern = "^/api", replacement = "/v1" }
ca = "-----BEGIN CERTIFICATE-----"
"#,
        )
        .unwrap();

        let options = RuleOptions::try_from(entry).unwrap();
        assert_eq!(options.ws, Some(true));
        assert_eq!(options.rewrite.unwrap().apply("/api/users"), "/v1/users");
        assert!(options.options.contains_key("ca"));
    }

    #[test]
    fn test_from_config_bad_rewrite() {
        let entry = RuleEntry::Rule(RuleConfig {
            target: "http://localhost:3000".to_string(),
            rewrite: Some(crate::config::schema::RewriteConfig {
                pattern: "(".to_string(),
                replacement: String::new(),
            }),
            secure: None,
            ws: None,
            options: Map::new(),
        });
        assert!(matches!(
            RuleOptions::try_from(entry),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }
}
