//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (path + query, upgrade headers)
//!     → table.rs (first matching rule, optionally websocket-only)
//!     → resolver.rs (rewrite, resolve against target)
//!     → options.rs (merge with passthrough options)
//!     → ProxyOptions for the forwarder
//!
//! Table construction (at startup):
//!     [proxy] entries / RuleOptions
//!     → rule.rs (normalize: parse target, compile context, map `secure`)
//!     → Freeze as immutable RuleTable
//! ```
//!
//! # Design Decisions
//! - Rules normalized at startup, immutable at runtime
//! - Declaration order is priority; first match wins
//! - Contexts starting with `^` are regular expressions, compiled once
//! - Resolution is recomputed per request

pub mod matcher;
pub mod options;
pub mod resolver;
pub mod rule;
pub mod table;

pub use matcher::ContextMatcher;
pub use options::ProxyOptions;
pub use resolver::{resolve, Protocol, ResolvedTarget};
pub use rule::{Rewrite, Rule, RuleOptions};
pub use table::RuleTable;
