//! CLI subcommands.

pub mod common;
pub mod config;
pub mod patterns;
pub mod simulate;
