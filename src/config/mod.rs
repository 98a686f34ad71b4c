// src/config/mod.rs
//! Configuration management for the Cuckatoo miner
//!
//! This module handles all configuration-related functionality including:
//! - Loading and parsing configuration files
//! - Layering command-line overrides on top of the file
//! - Validating settings before any connection is attempted
//! - Generating configuration templates
//!
//! The configuration uses TOML format with optional `[node]`, `[session]`
//! and `[stats]` tables.

/// Core configuration implementation
///
/// Contains the [`Config`] struct and related types that define
/// the miner's configuration structure and behavior.
pub mod config;

// Re-export key items for easy access
pub use config::{Config, StatsConfig};

/// Generates a commented configuration template
///
/// # Returns
/// String containing a ready-to-use TOML configuration template
pub fn generate_template() -> String {
    Config::generate_template()
}
