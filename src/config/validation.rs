use crate::config::types::{Config, CrawlerConfig, FrontierConfig, OutputConfig, UserAgentConfig};
use crate::url::normalize;
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_frontier_config(&config.frontier)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_fetches < 1 || config.max_concurrent_fetches > 100 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_fetches must be between 1 and 100, got {}",
            config.max_concurrent_fetches
        )));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_cycles == Some(0) {
        return Err(ConfigError::Validation(
            "max_cycles must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates frontier configuration, including every seed URL
fn validate_frontier_config(config: &FrontierConfig) -> Result<(), ConfigError> {
    if config.stale_duration_secs < 1 {
        return Err(ConfigError::Validation(
            "stale_duration_secs must be >= 1".to_string(),
        ));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(
            "batch_size must be >= 1".to_string(),
        ));
    }

    for seed in &config.seeds {
        normalize(seed, None)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.blob_path.is_empty() {
        return Err(ConfigError::Validation(
            "blob_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::Validation(format!("Invalid email format: '{}'", email));

    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(invalid());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            crawler: CrawlerConfig {
                max_concurrent_fetches: 4,
                fetch_timeout_secs: 30,
                cycle_interval_secs: 60,
                max_cycles: None,
            },
            frontier: FrontierConfig {
                stale_duration_secs: 3600,
                batch_size: 100,
                seeds: vec!["https://example.com/".to_string()],
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestCrawler".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            output: OutputConfig {
                database_path: "./archive.db".to_string(),
                blob_path: "./blobs".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&create_test_config()).is_ok());
    }

    #[test]
    fn test_worker_pool_bounds() {
        let mut config = create_test_config();
        config.crawler.max_concurrent_fetches = 0;
        assert!(validate(&config).is_err());

        config.crawler.max_concurrent_fetches = 101;
        assert!(validate(&config).is_err());

        config.crawler.max_concurrent_fetches = 100;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_stale_duration_rejected() {
        let mut config = create_test_config();
        config.frontier.stale_duration_secs = 0;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_zero_max_cycles_rejected() {
        let mut config = create_test_config();
        config.crawler.max_cycles = Some(0);
        assert!(validate(&config).is_err());

        config.crawler.max_cycles = Some(1);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_seed_rejected() {
        let mut config = create_test_config();
        config.frontier.seeds.push("ftp://example.com/file".to_string());
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_plain_http_seed_allowed() {
        let mut config = create_test_config();
        config.frontier.seeds = vec!["http://example.org/".to_string()];
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_blob_path_rejected() {
        let mut config = create_test_config();
        config.output.blob_path.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("admin@sub.example.com").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("invalid").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());
        assert!(validate_email("a@b@example.com").is_err());
    }
}
