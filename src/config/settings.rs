use crate::error::{BackoffPolicy, MonitorError, RetryPolicy};
use crate::stats::StatsQuery;
use std::env;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub local_base_url: String,
    pub statistics_path: String,
    pub server_status_path: String,
    pub clear_statistics_path: String,
    pub update_comparison_path: String,
    pub remote_snapshot_url: String,
    pub remote_cache_ttl_secs: u64,
    pub http_max_retries: u32,
    pub http_retry_delay_ms: u64,
    pub http_max_backoff_ms: u64,
    pub http_backoff: BackoffPolicy,
    pub http_connect_timeout_secs: u64,
    pub reconcile_interval_secs: u64,
    pub dashboard_refresh_secs: u64,
    pub stats_page_size: usize,
    pub max_consecutive_failures: u32,
    pub recovery_delay_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            local_base_url: env::var("LOCAL_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            statistics_path: env::var("STATISTICS_PATH")
                .unwrap_or_else(|_| "/obtener-estadisticas".to_string()),
            server_status_path: env::var("SERVER_STATUS_PATH")
                .unwrap_or_else(|_| "/api/server-status".to_string()),
            clear_statistics_path: env::var("CLEAR_STATISTICS_PATH")
                .unwrap_or_else(|_| "/api/clear-statistics".to_string()),
            update_comparison_path: env::var("UPDATE_COMPARISON_PATH")
                .unwrap_or_else(|_| "/api/update-comparison".to_string()),
            remote_snapshot_url: env::var("REMOTE_SNAPSHOT_URL").unwrap_or_else(|_| {
                "https://raw.githubusercontent.com/HCoreBeat/Analytics-Montaque/main/data/estadistica.json"
                    .to_string()
            }),
            remote_cache_ttl_secs: env::var("REMOTE_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()
                .unwrap_or(300),
            http_max_retries: env::var("HTTP_MAX_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            http_retry_delay_ms: env::var("HTTP_RETRY_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            http_max_backoff_ms: env::var("HTTP_MAX_BACKOFF_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30000),
            http_backoff: env::var("HTTP_BACKOFF")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            http_connect_timeout_secs: env::var("HTTP_CONNECT_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            reconcile_interval_secs: env::var("RECONCILE_INTERVAL_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            dashboard_refresh_secs: env::var("DASHBOARD_REFRESH_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60),
            stats_page_size: env::var("STATS_PAGE_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            max_consecutive_failures: env::var("MAX_CONSECUTIVE_FAILURES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            recovery_delay_secs: env::var("RECOVERY_DELAY_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
        }
    }

    /// Resolve a backend endpoint path against the local base URL.
    pub fn endpoint(&self, path: &str) -> Result<String, MonitorError> {
        let base = Url::parse(&self.local_base_url)?;
        Ok(base.join(path)?.to_string())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.http_max_retries,
            Duration::from_millis(self.http_retry_delay_ms),
            Duration::from_millis(self.http_max_backoff_ms),
            self.http_backoff,
        )
    }

    pub fn remote_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.remote_cache_ttl_secs)
    }

    /// Baseline statistics query with the configured page size applied.
    pub fn stats_query(&self) -> StatsQuery {
        StatsQuery {
            per_page: self.stats_page_size,
            ..Default::default()
        }
    }

    pub fn validate_and_log(&self) {
        log::info!("Application Configuration Loaded: {:?}", self);
        if self.http_max_retries == 0 {
            log::warn!("HTTP_MAX_RETRIES is 0; every fetch will fail without a single attempt.");
        }
    }
}
