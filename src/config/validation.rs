use crate::config::types::{Config, OutputConfig, PipelineConfig, SeedConfig, SiteConfig};
use crate::crawler::MAX_LEASE_SECS;
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Placeholder substituted with the surname in `site.search-url`
pub const SURNAME_PLACEHOLDER: &str = "{surname}";

/// Longest gap allowed between two worker starts (ten minutes)
pub const MAX_WORKER_STAGGER_MS: u64 = 10 * 60 * 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_pipeline_config(&config.pipeline).map_err(|e| in_table("pipeline", e))?;
    validate_seed_config(&config.seed).map_err(|e| in_table("seed", e))?;
    validate_site_config(&config.site).map_err(|e| in_table("site", e))?;
    validate_output_config(&config.output).map_err(|e| in_table("output", e))?;
    Ok(())
}

/// Prefixes a validation message with the TOML table it came from
fn in_table(table: &str, err: ConfigError) -> ConfigError {
    match err {
        ConfigError::Validation(message) => {
            ConfigError::Validation(format!("[{}] {}", table, message))
        }
        ConfigError::InvalidUrl(message) => {
            ConfigError::InvalidUrl(format!("[{}] {}", table, message))
        }
        other => other,
    }
}

/// Validates worker pool configuration
fn validate_pipeline_config(config: &PipelineConfig) -> ConfigResult<()> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    if config.worker_stagger_ms > MAX_WORKER_STAGGER_MS {
        return Err(ConfigError::Validation(format!(
            "worker_stagger_ms must be at most {}, got {}",
            MAX_WORKER_STAGGER_MS, config.worker_stagger_ms
        )));
    }

    if config.items_per_record < 1 {
        return Err(ConfigError::Validation(format!(
            "items_per_record must be >= 1, got {}",
            config.items_per_record
        )));
    }

    if let Some(lease) = config.lease_secs {
        if lease < 1 || lease > MAX_LEASE_SECS {
            return Err(ConfigError::Validation(format!(
                "lease_secs must be between 1 and {}, got {}",
                MAX_LEASE_SECS, lease
            )));
        }
    }

    Ok(())
}

fn validate_seed_config(config: &SeedConfig) -> ConfigResult<()> {
    if config.name_list.is_empty() {
        return Err(ConfigError::Validation(
            "name_list cannot be empty".to_string(),
        ));
    }

    if config.name_count < 1 {
        return Err(ConfigError::Validation(format!(
            "name_count must be >= 1, got {}",
            config.name_count
        )));
    }

    Ok(())
}

/// Validates target site configuration
fn validate_site_config(config: &SiteConfig) -> ConfigResult<()> {
    if !config.search_url.contains(SURNAME_PLACEHOLDER) {
        return Err(ConfigError::Validation(format!(
            "search_url must contain '{}', got '{}'",
            SURNAME_PLACEHOLDER, config.search_url
        )));
    }
    validate_http_url("search_url", &config.search_url.replace(SURNAME_PLACEHOLDER, "x"))?;
    validate_http_url("api_url", &config.api_url)?;

    for placeholder in ["{key}", "{variant}"] {
        if !config.photo_url.contains(placeholder) {
            return Err(ConfigError::Validation(format!(
                "photo_url must contain '{}', got '{}'",
                placeholder, config.photo_url
            )));
        }
    }
    validate_http_url(
        "photo_url",
        &config
            .photo_url
            .replace("{key}", "k")
            .replace("{variant}", "v")
            .replace("{ext}", "e"),
    )?;

    if config.variants.is_empty() {
        return Err(ConfigError::Validation(
            "variants must list at least one size".to_string(),
        ));
    }

    for variant in &config.variants {
        if !is_path_token(variant) {
            return Err(ConfigError::Validation(format!(
                "variant must contain only alphanumeric characters, '-' and '_', got '{}'",
                variant
            )));
        }
    }

    if !is_path_token(&config.extension) {
        return Err(ConfigError::Validation(format!(
            "extension must contain only alphanumeric characters, '-' and '_', got '{}'",
            config.extension
        )));
    }

    if config.page_size < 1 || config.page_size > 1000 {
        return Err(ConfigError::Validation(format!(
            "page_size must be between 1 and 1000, got {}",
            config.page_size
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> ConfigResult<()> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.assets_root.is_empty() {
        return Err(ConfigError::Validation(
            "assets_root cannot be empty".to_string(),
        ));
    }

    if matches!(&config.log_file, Some(path) if path.is_empty()) {
        return Err(ConfigError::Validation(
            "log_file cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_http_url(field: &str, value: &str) -> ConfigResult<()> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

fn is_path_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
