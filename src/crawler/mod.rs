//! Crawler module for fetching and archiving web content
//!
//! This module contains the core crawling logic, including:
//! - In-flight tracking so a URL is never fetched twice at once
//! - Staleness-based scheduling of HEAD and GET requests
//! - HTTP fetching with timing and failure classification
//! - Snapshot recording and link extraction
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod inflight;
mod parser;
mod recorder;
mod scheduler;

pub use coordinator::{lock_storage, Coordinator, CycleSummary};
pub use fetcher::{
    build_http_client, fetch, FetchFailure, FetchMethod, FetchOutcome, FetchedResponse,
};
pub use inflight::{ClaimGuard, InFlightTracker};
pub use parser::{extract_links, HtmlDocument, LinkEdge, ParsedHtml};
pub use recorder::{record_fetch, snapshot_for, updated_record};
pub use scheduler::{Dispatch, Scheduler};
