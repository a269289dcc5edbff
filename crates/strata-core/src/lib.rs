//! # strata-core
//!
//! Foundation shared by every strata crate: the error taxonomy, settings and
//! their loaders, and tracing setup. This crate has no database dependencies.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Database and logging configuration
//! - [`settings_loader`] - TOML / JSON / environment loading
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{StrataError, StrataResult};
pub use settings::{DatabaseSettings, ServerSettings, Settings, SqliteSettings};
