//! CLI command implementations.

pub mod common;
pub mod config;
pub mod manifest;
pub mod run;
pub mod simulate;
