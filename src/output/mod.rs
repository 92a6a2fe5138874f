//! Output module for reporting on the archive
//!
//! This module handles loading and printing archive statistics.

pub mod stats;

pub use stats::{load_statistics, print_statistics, render_statistics, CrawlStatistics};
