//! Harness configuration: TOML file plus command line overrides.

pub mod cli_args;
pub mod harness_config;
