//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DevServerConfig (validated, immutable)
//!     → [proxy] entries become the routing RuleTable
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - `[proxy]` keeps document order, since order is match priority
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config};
pub use schema::{
    DevServerConfig, LogFormat, ObservabilityConfig, ProxyRules, RewriteConfig, RuleConfig,
    RuleEntry, ServerConfig,
};
pub use validation::ValidationError;
