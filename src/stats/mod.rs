//! Statistics collection and reporting module
//!
//! This module provides functionality for tracking and reporting mining statistics,
//! including:
//! - Graph rate and solution counts
//! - Submission acceptance/rejection tracking
//! - Hardware monitoring (CPU, memory, temperature)
//!
//! The main component is [`StatsReporter`] which collects data and periodically
//! reports statistics to the log. The session feeds it through a [`StatsHandle`].

/// Submodule containing the statistics reporter implementation
///
/// The reporter handles:
/// - Atomic collection of mining statistics
/// - Hardware monitoring
/// - Periodic reporting of stats
/// - Thread-safe communication channels for receiving data
pub mod reporter;

// Re-export main components
pub use reporter::{HardwareStats, MiningStats, ShareResult, StatsHandle, StatsReporter};
