//! Process bootstrap shared by the attendance binaries: layered configuration
//! and logging setup.

pub mod config;
pub mod logging;
pub mod paths;

pub use config::{
    default_logging_config, AppConfig, AppSection, CliArgs, DatabaseConfig, LoggingConfig,
    Section,
};
