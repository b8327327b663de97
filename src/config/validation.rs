use crate::config::types::{
    Config, ControllerConfig, OutputConfig, PartitionConfig, PipelineConfig, ProxyConfig,
    RotationMode, SiteConfig, TorConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline_config(&config.pipeline)?;
    validate_proxy_config(&config.proxy)?;
    validate_tor_config(&config.tor)?;
    validate_controller_config(&config.controller)?;
    validate_output_config(&config.output)?;
    validate_site_config(&config.site)?;
    validate_partition_config(&config.partition, &config.site)?;
    Ok(())
}

/// Checks what a harvesting worker needs beyond a valid configuration
///
/// Without the local proxy every request and every address check leaves
/// through the real address, so no rotation could ever succeed.
pub fn validate_harvest_config(config: &Config) -> Result<(), ConfigError> {
    if config.proxy.http_proxy.is_none() {
        return Err(ConfigError::Validation(
            "[proxy] http-proxy is required to harvest".to_string(),
        ));
    }

    Ok(())
}

/// Validates pipeline configuration
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    if config.workers_count < 1 || config.workers_count > 500 {
        return Err(ConfigError::Validation(format!(
            "workers_count must be between 1 and 500, got {}",
            config.workers_count
        )));
    }

    if config.poll_interval_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "poll_interval_ms must be >= 10ms, got {}ms",
            config.poll_interval_ms
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.transaction_size == 0 {
        return Err(ConfigError::Validation(
            "transaction_size must be >= 1".to_string(),
        ));
    }

    if let Some(codes) = &config.retry_status_codes {
        if codes.is_empty() {
            return Err(ConfigError::Validation(
                "retry_status_codes cannot be empty; omit it to use retry_from_status".to_string(),
            ));
        }

        if let Some(code) = codes.iter().find(|c| !(100..=599).contains(*c)) {
            return Err(ConfigError::Validation(format!(
                "retry_status_codes contains invalid HTTP status {}",
                code
            )));
        }
    }

    if let Some(code) = config.rotate_status_codes.iter().find(|c| !(400..=599).contains(*c)) {
        return Err(ConfigError::Validation(format!(
            "rotate_status_codes contains non-error HTTP status {}",
            code
        )));
    }

    if config.rotation == RotationMode::OnDemand && config.rotate_status_codes.is_empty() {
        return Err(ConfigError::Validation(
            "rotation = \"on-demand\" needs rotate_status_codes, or the exit address never changes"
                .to_string(),
        ));
    }

    Ok(())
}

/// Validates proxy configuration
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if let Some(proxy) = &config.http_proxy {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid http_proxy: {}", e)))?;
    }

    if config.user_agents.is_empty() || config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user_agents must contain at least one non-empty entry".to_string(),
        ));
    }

    Ok(())
}

/// Validates Tor configuration
fn validate_tor_config(config: &TorConfig) -> Result<(), ConfigError> {
    if config.control_host.is_empty() {
        return Err(ConfigError::Validation(
            "control_host cannot be empty".to_string(),
        ));
    }

    if config.new_ip_max_attempts == 0 {
        return Err(ConfigError::Validation(
            "new_ip_max_attempts must be >= 1".to_string(),
        ));
    }

    if config.control_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "control_timeout_secs must be >= 1".to_string(),
        ));
    }

    Url::parse(&config.ip_check_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid ip_check_url: {}", e)))?;

    Ok(())
}

/// Validates controller configuration
fn validate_controller_config(config: &ControllerConfig) -> Result<(), ConfigError> {
    if config.bind.is_empty() {
        return Err(ConfigError::Validation("bind cannot be empty".to_string()));
    }

    if let Some(url) = &config.url {
        let parsed = Url::parse(url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid controller url: {}", e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl(format!(
                "Controller url '{}' must use http or https",
                url
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates site configuration
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    if config.kind.is_empty() {
        return Err(ConfigError::Validation("site kind cannot be empty".to_string()));
    }

    Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if config.list_url_template.is_empty() {
        return Err(ConfigError::Validation(
            "list_url_template cannot be empty".to_string(),
        ));
    }

    if config.lists_count == 0 {
        return Err(ConfigError::Validation(
            "lists_count must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates partition configuration against the size of the index space
fn validate_partition_config(
    config: &PartitionConfig,
    site: &SiteConfig,
) -> Result<(), ConfigError> {
    if config.scrapers_count < 1 {
        return Err(ConfigError::Validation(
            "scrapers_count must be >= 1".to_string(),
        ));
    }

    if config.scrapers_count > site.lists_count {
        return Err(ConfigError::Validation(format!(
            "scrapers_count ({}) cannot exceed lists_count ({})",
            config.scrapers_count, site.lists_count
        )));
    }

    if config.worker_id < 1 || config.worker_id > config.scrapers_count {
        return Err(ConfigError::Validation(format!(
            "worker_id must be between 1 and {}, got {}",
            config.scrapers_count, config.worker_id
        )));
    }

    Ok(())
}
