//! Typed client for the analytics backend endpoints consumed by the
//! dashboard: statistics, server status, and the admin mutations.

use crate::config::Config;
use crate::error::{MonitorError, Result};
use crate::fetch::{CachedFetcher, RequestConfig};
use crate::stats::StatisticRecord;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::info;
use serde::Deserialize;
use std::sync::Arc;

/// `/api/server-status` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerStatus {
    #[serde(rename = "startTime", default)]
    pub start_time: String,
    #[serde(default)]
    pub logs: Vec<String>,
}

impl ServerStatus {
    pub fn start_time_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.start_time)
            .map(|t| t.with_timezone(&Utc))
            .ok()
    }

    pub fn uptime(&self, now: DateTime<Utc>) -> Option<ChronoDuration> {
        self.start_time_utc().map(|start| now - start)
    }
}

/// Uptime rendered the way the dashboard shows it: `"3d 4h 5m 6s"`.
pub fn format_uptime(uptime: ChronoDuration) -> String {
    let secs = uptime.num_seconds().max(0);
    format!(
        "{}d {}h {}m {}s",
        secs / 86_400,
        (secs / 3_600) % 24,
        (secs / 60) % 60,
        secs % 60
    )
}

/// Body returned by the clear-statistics and update-comparison mutations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MutationOutcome {
    #[serde(default)]
    pub success: bool,
    #[serde(rename = "newOrders", default)]
    pub new_orders: Vec<StatisticRecord>,
    #[serde(default)]
    pub error: Option<String>,
}

pub struct DashboardApi {
    fetcher: Arc<CachedFetcher>,
    statistics_url: String,
    server_status_url: String,
    clear_statistics_url: String,
    update_comparison_url: String,
}

impl DashboardApi {
    pub fn from_config(fetcher: Arc<CachedFetcher>, config: &Config) -> Result<Self> {
        Ok(Self {
            fetcher,
            statistics_url: config.endpoint(&config.statistics_path)?,
            server_status_url: config.endpoint(&config.server_status_path)?,
            clear_statistics_url: config.endpoint(&config.clear_statistics_path)?,
            update_comparison_url: config.endpoint(&config.update_comparison_path)?,
        })
    }

    /// The local statistics endpoint; the reconciler fetches the same URL.
    pub fn statistics_url(&self) -> &str {
        &self.statistics_url
    }

    /// Fresh statistics array, never cached.
    pub async fn fetch_statistics(&self) -> Result<Vec<StatisticRecord>> {
        self.fetcher
            .fetch_json(&self.statistics_url, &RequestConfig::default())
            .await
    }

    pub async fn fetch_server_status(&self) -> Result<ServerStatus> {
        self.fetcher
            .fetch_json(&self.server_status_url, &RequestConfig::default())
            .await
    }

    /// Wipe the statistics store. Invalidates the local cache entry so the
    /// next read reflects the cleared state.
    pub async fn clear_statistics(&self) -> Result<MutationOutcome> {
        let outcome: MutationOutcome = self.fetcher.post_json(&self.clear_statistics_url).await?;
        if !outcome.success {
            return Err(MonitorError::BackendRejected(
                outcome
                    .error
                    .unwrap_or_else(|| "clear-statistics failed without detail".to_string()),
            ));
        }

        self.fetcher
            .invalidate(&self.statistics_url, &RequestConfig::default());
        info!("Statistics store cleared");
        Ok(outcome)
    }

    /// Ask the backend to recompute its local/remote comparison; returns
    /// the authoritative new-order list.
    pub async fn update_comparison(&self) -> Result<MutationOutcome> {
        let outcome: MutationOutcome = self.fetcher.post_json(&self.update_comparison_url).await?;
        if !outcome.success {
            return Err(MonitorError::BackendRejected(
                outcome
                    .error
                    .unwrap_or_else(|| "update-comparison failed without detail".to_string()),
            ));
        }
        Ok(outcome)
    }
}
