//! Statistics generation from the archive database
//!
//! This module provides functionality for extracting and displaying
//! archive statistics from the storage layer.

use crate::storage::{Storage, StorageResult};
use std::fmt::Write;

/// Archive statistics summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// Number of URLs in the frontier
    pub total_urls: u64,

    /// URLs with at least one completed GET
    pub fetched_urls: u64,

    /// Distinct hosts across all URLs
    pub unique_hosts: u64,

    /// Distinct link edges
    pub total_links: u64,

    /// All fetch attempts
    pub total_snapshots: u64,

    /// Attempts that got no HTTP response
    pub failed_snapshots: u64,
}

impl CrawlStatistics {
    /// Share of fetch attempts that got a response, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total_snapshots == 0 {
            return 0.0;
        }
        let succeeded = self.total_snapshots.saturating_sub(self.failed_snapshots);
        (succeeded as f64 / self.total_snapshots as f64) * 100.0
    }
}

/// Loads statistics from storage
pub fn load_statistics<S: Storage + ?Sized>(storage: &S) -> StorageResult<CrawlStatistics> {
    Ok(CrawlStatistics {
        total_urls: storage.count_urls()?,
        fetched_urls: storage.count_fetched_urls()?,
        unique_hosts: storage.count_hosts()?,
        total_links: storage.count_links()?,
        total_snapshots: storage.count_snapshots()?,
        failed_snapshots: storage.count_failed_snapshots()?,
    })
}

/// Renders statistics as the text shown by `--stats`
pub fn render_statistics(stats: &CrawlStatistics) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "=== Archive Statistics ===\n");
    let _ = writeln!(out, "Frontier:");
    let _ = writeln!(out, "  Known URLs: {}", stats.total_urls);
    let _ = writeln!(out, "  Fetched URLs: {}", stats.fetched_urls);
    let _ = writeln!(out, "  Unique hosts: {}", stats.unique_hosts);
    let _ = writeln!(out, "  Links: {}", stats.total_links);
    let _ = writeln!(out);
    let _ = writeln!(out, "Snapshots:");
    let _ = writeln!(out, "  Total: {}", stats.total_snapshots);
    let _ = writeln!(out, "  Failed: {}", stats.failed_snapshots);
    let _ = writeln!(
        out,
        "\nSuccess Rate: {:.1}% ({} / {} attempts got a response)",
        stats.success_rate(),
        stats.total_snapshots.saturating_sub(stats.failed_snapshots),
        stats.total_snapshots
    );

    out
}

/// Prints statistics to stdout
pub fn print_statistics(stats: &CrawlStatistics) {
    print!("{}", render_statistics(stats));
}
