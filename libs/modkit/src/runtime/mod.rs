//! Runtime orchestration: the phase sequence that turns discovered modules
//! into a running (and eventually shut-down) process.

mod runner;
mod shutdown;

#[cfg(test)]
mod tests;

pub use runner::{boot, run, Booted, DbOptions, RunOptions, ShutdownOptions};
pub use shutdown::wait_for_shutdown;
