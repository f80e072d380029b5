//! # PwaKit Common
//!
//! Ambient pieces shared by the offline worker and the foreground shell.
//!
//! - Logging configuration and setup
//! - URL patterns used to classify requests (e.g. critical code bundles)

pub mod logging;
pub mod pattern;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use pattern::{PatternType, UrlPattern};
