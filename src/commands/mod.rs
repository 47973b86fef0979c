//! CLI command implementations for jacoco-coverage-exporter.
//!
//! This module provides implementations for all CLI subcommands:
//! - `check`: Configuration and artifact validation
//! - `config`: Configuration file generation
//! - `test`: One-off coverage collection
//! - `reset`: Coverage reset of configured providers
//! - `generate`: Test data generation

pub mod check;
pub mod config;
pub mod generate;
pub mod reset;

// Re-export command functions
pub use check::command_check;
pub use config::command_config;
pub use generate::command_generate_testdata;
pub use reset::command_reset;
pub use test::command_test;
