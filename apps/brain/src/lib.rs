//! # brain
//!
//! Library half of the `brain` binary: command-line parsing, command
//! implementations and configuration loading. Kept separate from `main.rs`
//! so the commands can be driven from integration tests.

pub mod cli;
pub mod config;
