pub mod settings;

pub use settings::Config;

use crate::error::MonitorError;
use std::sync::Arc;

/// Loads and returns the application configuration as an `Arc<Config>`.
/// Centralizes the configuration loading process.
pub fn load_config() -> Result<Arc<Config>, MonitorError> {
    dotenv::dotenv().ok(); // Load .env file if present, ignore errors

    let config = Config::from_env();

    if config.local_base_url.is_empty() {
        return Err(MonitorError::ConfigError(
            "LOCAL_BASE_URL cannot be empty".to_string(),
        ));
    }
    if config.remote_snapshot_url.is_empty() {
        return Err(MonitorError::ConfigError(
            "REMOTE_SNAPSHOT_URL cannot be empty".to_string(),
        ));
    }
    // Fail fast on unparseable URLs instead of erroring on the first poll
    config.endpoint(&config.statistics_path)?;
    url::Url::parse(&config.remote_snapshot_url)?;

    config.validate_and_log();

    Ok(Arc::new(config))
}
