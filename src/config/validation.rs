use crate::config::types::{
    BackoffConfig, BrowserConfig, Config, DriverKind, ExtractionConfig, HarvestConfig,
    MergeConfig, PacingConfig, RecoveryConfig, SiteConfig, TimeoutConfig,
};
use crate::record::Field;
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_site_config(&config.site)?;
    validate_timeouts(&config.timeouts)?;
    validate_backoff_config(&config.backoff)?;
    validate_recovery_config(&config.recovery)?;
    validate_pacing_config(&config.pacing)?;
    validate_browser_config(&config.browser)?;
    validate_extraction_config(&config.extraction)?;
    validate_merge_config(&config.merge)?;
    Ok(())
}

/// Validates a region code: short, alphanumeric, safe to embed in file names
pub fn validate_region(region: &str) -> Result<(), ConfigError> {
    if region.is_empty() || region.len() > 8 {
        return Err(ConfigError::Validation(format!(
            "region must be 1 to 8 characters, got '{}'",
            region
        )));
    }

    if !region.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::Validation(format!(
            "region must contain only ASCII letters and digits, got '{}'",
            region
        )));
    }

    Ok(())
}

fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    validate_region(&config.region)?;

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    if config.checkpoint_interval < 1 {
        return Err(ConfigError::Validation(format!(
            "checkpoint_interval must be >= 1, got {}",
            config.checkpoint_interval
        )));
    }

    if config.empty_page_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "empty_page_threshold must be >= 1, got {}",
            config.empty_page_threshold
        )));
    }

    Ok(())
}

fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.search_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid search_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "search_url must use HTTP or HTTPS, got '{}'",
            config.search_url
        )));
    }

    for (name, selector) in [
        ("region_select_selector", &config.region_select_selector),
        ("search_button_selector", &config.search_button_selector),
        ("results_selector", &config.results_selector),
        ("result_area_selector", &config.result_area_selector),
        ("pagination_selector", &config.pagination_selector),
    ] {
        if selector.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    if config.end_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "end_marker cannot be empty".to_string(),
        ));
    }

    if config.block_indicators.iter().any(|i| i.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "block_indicators cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

fn validate_timeouts(config: &TimeoutConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("navigation_ms", config.navigation_ms),
        ("search_results_ms", config.search_results_ms),
        ("page_refresh_ms", config.page_refresh_ms),
        ("reload_ms", config.reload_ms),
        ("poll_interval_ms", config.poll_interval_ms),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{} must be > 0", name)));
        }
    }
    Ok(())
}

fn validate_backoff_config(config: &BackoffConfig) -> Result<(), ConfigError> {
    if config.floor_ms == 0 {
        return Err(ConfigError::Validation(
            "backoff floor_ms must be > 0".to_string(),
        ));
    }

    if !(config.failure_factor >= 0.0) {
        return Err(ConfigError::Validation(format!(
            "failure_factor must be >= 0, got {}",
            config.failure_factor
        )));
    }

    if !(config.rest_multiplier >= 1.0) {
        return Err(ConfigError::Validation(format!(
            "rest_multiplier must be >= 1, got {}",
            config.rest_multiplier
        )));
    }

    if !(config.spread >= 1.0) {
        return Err(ConfigError::Validation(format!(
            "spread must be >= 1, got {}",
            config.spread
        )));
    }

    let mut previous: Option<f64> = None;
    for band in &config.bands {
        if !(band.multiplier >= 1.0) {
            return Err(ConfigError::Validation(format!(
                "backoff band after page {} must have a multiplier >= 1, got {}",
                band.after_page, band.multiplier
            )));
        }
        if let Some(prev) = previous {
            if band.multiplier < prev {
                return Err(ConfigError::Validation(format!(
                    "backoff band multipliers must not decrease (page {})",
                    band.after_page
                )));
            }
        }
        previous = Some(band.multiplier);
    }

    Ok(())
}

fn validate_recovery_config(config: &RecoveryConfig) -> Result<(), ConfigError> {
    if config.min_wait_ms > config.max_wait_ms {
        return Err(ConfigError::Validation(format!(
            "recovery min_wait_ms ({}) exceeds max_wait_ms ({})",
            config.min_wait_ms, config.max_wait_ms
        )));
    }

    if config.settle_min_ms > config.settle_max_ms {
        return Err(ConfigError::Validation(format!(
            "recovery settle_min_ms ({}) exceeds settle_max_ms ({})",
            config.settle_min_ms, config.settle_max_ms
        )));
    }

    Ok(())
}

fn validate_pacing_config(config: &PacingConfig) -> Result<(), ConfigError> {
    if config.hover_min_ms > config.hover_max_ms || config.think_min_ms > config.think_max_ms {
        return Err(ConfigError::Validation(
            "pacing minimums must not exceed their maximums".to_string(),
        ));
    }
    Ok(())
}

fn validate_browser_config(config: &BrowserConfig) -> Result<(), ConfigError> {
    match config.kind {
        DriverKind::Webdriver => {
            Url::parse(&config.webdriver_url)
                .map_err(|e| ConfigError::InvalidUrl(format!("Invalid webdriver_url: {}", e)))?;
        }
        DriverKind::Snapshot => {
            if config.snapshot_dir.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::Validation(
                    "snapshot_dir is required for the snapshot driver".to_string(),
                ));
            }
        }
    }
    Ok(())
}

fn validate_extraction_config(config: &ExtractionConfig) -> Result<(), ConfigError> {
    for (column, patterns) in &config.patterns {
        if Field::from_column(column).is_none() {
            return Err(ConfigError::InvalidPattern(format!(
                "unknown field '{}' in extraction patterns",
                column
            )));
        }

        if patterns.is_empty() {
            return Err(ConfigError::InvalidPattern(format!(
                "field '{}' needs at least one pattern",
                column
            )));
        }

        for pattern in patterns {
            validate_capture_pattern(column, pattern)?;
        }
    }
    Ok(())
}

/// Checks that an extraction pattern compiles and has a capture group
pub(crate) fn validate_capture_pattern(column: &str, pattern: &str) -> Result<(), ConfigError> {
    let regex = Regex::new(pattern).map_err(|e| {
        ConfigError::InvalidPattern(format!("field '{}': {}", column, e))
    })?;

    if regex.captures_len() < 2 {
        return Err(ConfigError::InvalidPattern(format!(
            "field '{}': pattern '{}' has no capture group",
            column, pattern
        )));
    }

    Ok(())
}

fn validate_merge_config(config: &MergeConfig) -> Result<(), ConfigError> {
    if config.output_path.is_empty() {
        return Err(ConfigError::Validation(
            "merge output_path cannot be empty".to_string(),
        ));
    }

    if config.too_many_columns < 1 {
        return Err(ConfigError::Validation(
            "merge too_many_columns must be >= 1".to_string(),
        ));
    }

    for rule in &config.canonical {
        Regex::new(&format!("^(?:{})$", rule.pattern)).map_err(|e| {
            ConfigError::InvalidPattern(format!("merge rule '{}': {}", rule.pattern, e))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::BackoffBand;

    fn base_config() -> Config {
        Config::new("RR", "https://portal.example.org/busca-medicos")
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_region() {
        assert!(validate_region("RR").is_ok());
        assert!(validate_region("SP1").is_ok());

        assert!(validate_region("").is_err());
        assert!(validate_region("R R").is_err());
        assert!(validate_region("../x").is_err());
        assert!(validate_region("TOOLONGREGION").is_err());
    }

    #[test]
    fn test_rejects_zero_max_pages() {
        let mut config = base_config();
        config.harvest.max_pages = Some(0);
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_rejects_invalid_search_url() {
        let mut config = base_config();
        config.site.search_url = "not a url".to_string();
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_rejects_decreasing_bands() {
        let mut config = base_config();
        config.backoff.bands = vec![
            BackoffBand {
                after_page: 10,
                multiplier: 3.0,
            },
            BackoffBand {
                after_page: 20,
                multiplier: 2.0,
            },
        ];
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_rejects_zero_floor() {
        let mut config = base_config();
        config.backoff.floor_ms = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_snapshot_driver_requires_dir() {
        let mut config = base_config();
        config.browser.kind = DriverKind::Snapshot;
        assert!(validate(&config).is_err());

        config.browser.snapshot_dir = Some("./pages".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_extraction_patterns() {
        assert!(validate_capture_pattern("name", r"Nome:\s*(.+)").is_ok());
        assert!(matches!(
            validate_capture_pattern("name", r"Nome:\s*.+"),
            Err(ConfigError::InvalidPattern(_))
        ));
        assert!(validate_capture_pattern("name", r"(unclosed").is_err());

        let mut config = base_config();
        config
            .extraction
            .patterns
            .insert("shoe_size".to_string(), vec![r"(\d+)".to_string()]);
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }
}
