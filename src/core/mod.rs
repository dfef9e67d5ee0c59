//! Core types: errors, configuration, path utilities.

pub mod config;
pub mod errors;
pub mod paths;
