//! Command-line interface for finetune-forge.
//!
//! Runs engine operations against a SQLite workflow database and a directory
//! of dataset files.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
