//! Command handlers for the `lumen` binary.

pub mod config;
pub mod process;
pub mod serve;
