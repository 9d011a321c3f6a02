//! Rule lookup.
//!
//! # Responsibilities
//! - Hold the normalized rules in declaration order
//! - Return the first rule whose context matches and which passes the caller's filter
//! - Report every rule that was examined and skipped
//!
//! # Design Decisions
//! - Immutable after construction (shared without locks)
//! - O(n) scan; first match wins
//! - A duplicate context is a second entry, so only the first can ever win

use std::sync::Arc;

use crate::config::ProxyRules;
use crate::error::Result;
use crate::proxy::error::ErrorHandler;
use crate::routing::rule::{Rule, RuleOptions};

/// Ordered, immutable set of proxy rules.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    /// Normalize every entry. Fails on the first bad target or pattern.
    pub fn new<I, C, O>(entries: I, default_handler: Option<Arc<dyn ErrorHandler>>) -> Result<Self>
    where
        I: IntoIterator<Item = (C, O)>,
        C: Into<String>,
        O: Into<RuleOptions>,
    {
        let rules = entries
            .into_iter()
            .map(|(context, options)| {
                Rule::normalize(context, options.into(), default_handler.as_ref())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Build from the `[proxy]` section of the config file.
    pub fn from_config(
        rules: ProxyRules,
        default_handler: Option<Arc<dyn ErrorHandler>>,
    ) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|(context, entry)| {
                let options = RuleOptions::try_from(entry)?;
                Rule::normalize(context, options, default_handler.as_ref())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// First rule matching `path` for which `filter` holds.
    ///
    /// `on_miss` sees each rule examined before the winner, matching or not.
    pub fn find<F, M>(&self, path: &str, mut filter: F, mut on_miss: M) -> Option<&Rule>
    where
        F: FnMut(&Rule) -> bool,
        M: FnMut(&Rule),
    {
        for rule in &self.rules {
            if filter(rule) && rule.matches(path) {
                return Some(rule);
            }
            on_miss(rule);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }
}
