use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Tidemark
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub frontier: FrontierConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Size of the fetch worker pool
    #[serde(rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: u32,

    /// Per-fetch timeout (seconds)
    #[serde(rename = "fetch-timeout-secs")]
    pub fetch_timeout_secs: u64,

    /// Pause between two crawl cycles (seconds)
    #[serde(rename = "cycle-interval-secs", default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Stop after this many cycles; run forever when absent
    #[serde(rename = "max-cycles", default)]
    pub max_cycles: Option<u32>,
}

impl CrawlerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }
}

fn default_cycle_interval() -> u64 {
    60
}

/// Frontier scheduling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FrontierConfig {
    /// Age after which a fetched URL becomes due again (seconds)
    #[serde(rename = "stale-duration-secs")]
    pub stale_duration_secs: u64,

    /// Number of URL records read from storage per scheduling page
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: u32,

    /// URLs inserted into the frontier at startup if not yet known
    #[serde(default)]
    pub seeds: Vec<String>,
}

impl FrontierConfig {
    pub fn stale_duration(&self) -> Duration {
        Duration::from_secs(self.stale_duration_secs)
    }
}

fn default_batch_size() -> u32 {
    500
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory holding content-addressed blobs
    #[serde(rename = "blob-path")]
    pub blob_path: String,
}
