//! CLI command handlers, one file per command.

mod check;
mod config;
mod send;

pub use check::run_check;
pub use config::run_config;
pub use send::run_send;
