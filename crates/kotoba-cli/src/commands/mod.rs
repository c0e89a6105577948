//! Subcommand handlers.

pub(crate) mod analyze;
pub(crate) mod config;
