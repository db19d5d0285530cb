use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use registry_harvester::config::load_config;
///
/// let config = load_config(Path::new("harvester.toml")).unwrap();
/// println!("Region: {}", config.harvest.region);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates configuration text
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Checkpoints record this hash so a resume under a changed configuration
/// can be reported.
///
/// # Returns
///
/// * `Ok(String)` - Hex-encoded SHA-256 hash of the file content
/// * `Err(ConfigError)` - Failed to read the file
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(hash_content(&content))
}

/// Hex-encoded SHA-256 of configuration text
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CheckpointBackend, DriverKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config() {
        let config_content = r#"
[harvest]
region = "RR"

[site]
search-url = "https://portal.example.org/busca-medicos"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.harvest.region, "RR");
        assert_eq!(config.harvest.checkpoint_interval, 10);
        assert_eq!(config.harvest.empty_page_threshold, 3);
        assert_eq!(config.site.end_marker, "Nenhum resultado a mostrar");
        assert_eq!(config.backoff.bands.len(), 4);
        assert_eq!(config.browser.kind, DriverKind::Webdriver);
        assert_eq!(config.output.checkpoint_backend, CheckpointBackend::File);
    }

    #[test]
    fn test_load_full_config() {
        let config_content = r#"
[harvest]
region = "SP"
max-pages = 40
checkpoint-interval = 5
max-recovery-attempts = 2

[site]
search-url = "https://portal.example.org/busca-medicos"
block-indicators = ["captcha", "forbidden"]

[timeouts]
page-refresh-ms = 15000

[backoff]
base-delay-ms = 500
bands = [{ after-page = 20, multiplier = 2.0 }]

[browser]
kind = "snapshot"
snapshot-dir = "./saved"

[output]
checkpoint-backend = "sqlite"
utf8-bom = false

[extraction.patterns]
name = ['^\s*([^\n]+?)\s+CRM:']
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.harvest.max_pages, Some(40));
        assert_eq!(config.harvest.max_recovery_attempts, 2);
        assert_eq!(config.site.block_indicators, vec!["captcha", "forbidden"]);
        assert_eq!(config.timeouts.page_refresh_ms, 15_000);
        assert_eq!(config.timeouts.navigation_ms, 60_000);
        assert_eq!(config.backoff.base_delay_ms, 500);
        assert_eq!(config.backoff.bands.len(), 1);
        assert_eq!(config.browser.kind, DriverKind::Snapshot);
        assert_eq!(config.output.checkpoint_backend, CheckpointBackend::Sqlite);
        assert!(!config.output.utf8_bom);
        assert_eq!(config.extraction.patterns["name"].len(), 1);
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvester.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_missing_region() {
        let config_content = r#"
[harvest]
max-pages = 3

[site]
search-url = "https://portal.example.org/busca-medicos"
"#;
        let file = create_temp_config(config_content);
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r#"
[harvest]
region = "R/R"

[site]
search-url = "https://portal.example.org/busca-medicos"
"#;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        assert_ne!(hash_content("content 1"), hash_content("content 2"));
    }
}
