//! qjs-harness - on-device conformance test harness for QuickJS executables.
//!
//! The harness prepares a fixture tree, runs a fixed catalog of native test
//! executables one after another, and streams everything they print into a
//! single ordered log that observers can attach to at any time.

pub mod catalog;
pub mod config;
pub mod executable;
pub mod fixture;
pub mod log_broadcaster;
pub mod markdown_report;
pub mod orchestrator;
pub mod process_runner;
pub mod utils;
