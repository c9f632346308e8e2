use log::{error, info, warn};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Debug, Clone, Error)]
pub enum MonitorError {
    /// Transport failure, possibly after exhausting the retry budget
    #[error("Network Error: {0}")]
    NetworkError(String),

    /// Non-success HTTP status from an endpoint
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Response body was not the JSON shape we expected
    #[error("Parse Error: {0}")]
    ParseError(String),

    /// Configuration errors
    #[error("Config Error: {0}")]
    ConfigError(String),

    /// Cache bookkeeping errors
    #[error("Cache Error: {0}")]
    CacheError(String),

    /// Timeout errors for network operations
    #[error("Timeout Error: {0}")]
    TimeoutError(String),

    /// The backend answered a mutation with success=false
    #[error("Backend Rejected: {0}")]
    BackendRejected(String),

    /// CSV export failures
    #[error("Export Error: {0}")]
    ExportError(String),

    /// Unknown/unclassified errors
    #[error("Unknown Error: {0}")]
    Unknown(String),
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MonitorError::TimeoutError(err.to_string())
        } else if err.is_decode() {
            MonitorError::ParseError(err.to_string())
        } else {
            MonitorError::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::ParseError(format!("JSON serialization/deserialization error: {}", err))
    }
}

impl From<url::ParseError> for MonitorError {
    fn from(err: url::ParseError) -> Self {
        MonitorError::ConfigError(format!("invalid URL: {}", err))
    }
}

impl From<csv::Error> for MonitorError {
    fn from(err: csv::Error) -> Self {
        MonitorError::ExportError(err.to_string())
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        MonitorError::ExportError(err.to_string())
    }
}

impl MonitorError {
    /// Determines if an error is recoverable through retry
    pub fn is_recoverable(&self) -> bool {
        match self {
            MonitorError::NetworkError(_) => true,
            // The retry path treats any non-success response as transient, 4xx included
            MonitorError::HttpStatus { .. } => true,
            MonitorError::ParseError(_) => false, // Data format issues aren't recoverable
            MonitorError::ConfigError(_) => false, // Config needs fixing
            MonitorError::CacheError(_) => true,
            MonitorError::TimeoutError(_) => true,
            MonitorError::BackendRejected(_) => false, // Deliberate answer, not a fault
            MonitorError::ExportError(_) => false,
            MonitorError::Unknown(_) => true,
        }
    }

    /// Determines if the operation should be retried immediately
    pub fn should_retry(&self) -> bool {
        self.is_recoverable()
            && match self {
                MonitorError::NetworkError(_) => true,
                MonitorError::HttpStatus { .. } => true,
                MonitorError::TimeoutError(_) => true,
                MonitorError::CacheError(_) => true,
                MonitorError::Unknown(_) => false, // Don't immediately retry unknown errors
                _ => false,
            }
    }
}

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffPolicy {
    /// Same delay before every retry (reference cadence: 1s)
    #[default]
    Fixed,
    Linear,
    Exponential,
}

impl FromStr for BackoffPolicy {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(BackoffPolicy::Fixed),
            "linear" => Ok(BackoffPolicy::Linear),
            "exponential" => Ok(BackoffPolicy::Exponential),
            other => Err(MonitorError::ConfigError(format!(
                "unknown backoff policy '{}' (expected fixed, linear or exponential)",
                other
            ))),
        }
    }
}

/// Retry policy with a configurable backoff curve.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: BackoffPolicy::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            backoff,
        }
    }

    /// Calculate the delay preceding a given attempt (attempt 0 runs immediately)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let factor: u128 = match self.backoff {
            BackoffPolicy::Fixed => 1,
            BackoffPolicy::Linear => attempt as u128,
            // Cap the shift so a large attempt budget cannot overflow
            BackoffPolicy::Exponential => 1u128 << (attempt - 1).min(16),
        };
        let delay_ms = self.base_delay.as_millis().saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis()) as u64)
    }

    /// Execute an operation, retrying retryable failures until the attempt
    /// budget is exhausted. Only the last failure is surfaced to the caller.
    pub async fn execute<F, T, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                sleep(self.delay_for_attempt(attempt)).await;
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!("Operation succeeded after {} retries", attempt);
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !e.should_retry() {
                        warn!("Non-retryable error on attempt {}: {}", attempt + 1, e);
                        return Err(e);
                    }
                    warn!(
                        "Attempt {}/{} failed: {} (retrying...)",
                        attempt + 1,
                        self.max_attempts,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        error!("All {} retry attempts failed", self.max_attempts);
        Err(last_error
            .unwrap_or_else(|| MonitorError::NetworkError("retry budget exhausted".to_string())))
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
