//! Host-facing configuration, logging and path-resolution glue for the kernel
//! runtime. The crates under `libs/modkit*` implement the module system
//! itself; this crate wires it to a concrete process: layered config loading,
//! `tracing` subscriber setup, and the on-disk `home_dir` layout.

pub mod config;
pub mod logging;
pub mod paths;

pub use config::{
    default_logging_config, AppConfig, CliArgs, DatabaseConfig, LoggingConfig, Section,
    ServerConfig,
};
pub use logging::init_logging_from_config;
pub use paths::home_dir::resolve_home_dir;
