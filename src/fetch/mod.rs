//! Shared HTTP layer: retrying JSON fetches plus a TTL keyed cache.
//!
//! Every data-hungry component goes through [`CachedFetcher`]; retry and
//! backoff behavior come from the crate-wide [`RetryPolicy`]. Cache entries
//! are never evicted by size, only by staleness, and a failed refresh
//! propagates the error rather than serving a stale payload.

use crate::error::{MonitorError, Result, RetryPolicy};
use dashmap::DashMap;
use log::{debug, info};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Query parameters and headers for a request. Part of the cache identity:
/// the same URL with different configs caches separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

impl RequestConfig {
    pub fn with_query(query: Vec<(String, String)>) -> Self {
        Self {
            query,
            ..Default::default()
        }
    }
}

struct CacheEntry {
    payload: Value,
    fetched_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

pub struct CachedFetcher {
    client: Client,
    retry: RetryPolicy,
    cache: DashMap<String, CacheEntry>,
    // Single-flight guards: one fetch per cache key, late callers re-check
    // the cache after the winner populates it.
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl CachedFetcher {
    pub fn new(retry: RetryPolicy, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| MonitorError::NetworkError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry,
            cache: DashMap::new(),
            inflight: DashMap::new(),
        })
    }

    fn cache_key(url: &str, config: &RequestConfig) -> String {
        // Struct serialization is field-ordered, so the key is canonical
        let fragment = serde_json::to_string(config).unwrap_or_else(|_| "{}".to_string());
        format!("{}{}", url, fragment)
    }

    fn decode<T: DeserializeOwned>(url: &str, value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| {
            MonitorError::ParseError(format!("unexpected response shape from {}: {}", url, e))
        })
    }

    fn cached_value(&self, key: &str, ttl: Duration) -> Option<Value> {
        self.cache
            .get(key)
            .filter(|entry| entry.is_fresh(ttl))
            .map(|entry| entry.payload.clone())
    }

    async fn send_once(&self, method: Method, url: &str, config: &RequestConfig) -> Result<Value> {
        let mut request = self.client.request(method, url);
        for (key, value) in &config.query {
            request = request.query(&[(key.as_str(), value.as_str())]);
        }
        for (key, value) in &config.headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(MonitorError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // Body reads can fail mid-stream on transport errors; From keeps
        // those retryable and reserves ParseError for real decode failures.
        response.json::<Value>().await.map_err(MonitorError::from)
    }

    async fn fetch_value(&self, method: Method, url: &str, config: &RequestConfig) -> Result<Value> {
        self.retry
            .execute(|| self.send_once(method.clone(), url, config))
            .await
    }

    /// GET with bounded retries, never cached.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: &str,
        config: &RequestConfig,
    ) -> Result<T> {
        let value = self.fetch_value(Method::GET, url, config).await?;
        Self::decode(url, value)
    }

    /// GET through the TTL cache. A hit within `ttl` performs no network
    /// I/O; a miss or a stale entry refetches and overwrites the entry.
    pub async fn fetch_cached<T: DeserializeOwned>(
        &self,
        url: &str,
        config: &RequestConfig,
        ttl: Duration,
    ) -> Result<T> {
        let key = Self::cache_key(url, config);

        if let Some(value) = self.cached_value(&key, ttl) {
            debug!("Cache HIT for key: {}", key);
            return Self::decode(url, value);
        }

        let guard = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _held = guard.lock().await;

        // A concurrent caller may have refreshed the entry while we waited
        if let Some(value) = self.cached_value(&key, ttl) {
            debug!("Cache HIT after in-flight wait for key: {}", key);
            return Self::decode(url, value);
        }

        debug!("Cache MISS for key: {}", key);
        let result = self.fetch_value(Method::GET, url, config).await;
        self.inflight.remove(&key);

        match result {
            Ok(value) => {
                self.cache.insert(
                    key,
                    CacheEntry {
                        payload: value.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Self::decode(url, value)
            }
            Err(e) => Err(e),
        }
    }

    /// POST with the same retry envelope; used by the admin mutations.
    pub async fn post_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let value = self
            .fetch_value(Method::POST, url, &RequestConfig::default())
            .await?;
        Self::decode(url, value)
    }

    /// Drop the cache entry for one URL/config pair.
    pub fn invalidate(&self, url: &str, config: &RequestConfig) {
        let key = Self::cache_key(url, config);
        if self.cache.remove(&key).is_some() {
            info!("Cache invalidated for key: {}", key);
        }
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[cfg(test)]
    fn seed_cache(&self, url: &str, config: &RequestConfig, payload: Value) {
        self.cache.insert(
            Self::cache_key(url, config),
            CacheEntry {
                payload,
                fetched_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackoffPolicy;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn fast_fetcher(max_attempts: u32) -> CachedFetcher {
        CachedFetcher::new(
            RetryPolicy::new(
                max_attempts,
                Duration::from_millis(1),
                Duration::from_millis(50),
                BackoffPolicy::Fixed,
            ),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    /// Minimal HTTP stub: answers each connection with the next status in
    /// `plan` (200 carries `body`), counting requests.
    async fn spawn_stub(plan: Vec<u16>, body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            let mut plan = plan.into_iter();
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let status = plan.next().unwrap_or(200);

                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;

                let response = if status == 200 {
                    format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    )
                } else {
                    format!(
                        "HTTP/1.1 {} Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                        status
                    )
                };
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    /// Stub whose first response advertises a full body but closes the
    /// socket mid-stream; later connections serve `body` completely.
    async fn spawn_truncating_stub(body: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let hit = counter.fetch_add(1, Ordering::SeqCst);

                let mut buf = [0u8; 2048];
                let _ = socket.read(&mut buf).await;

                if hit == 0 {
                    let header = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    let _ = socket.write_all(header.as_bytes()).await;
                    let _ = socket.write_all(&body.as_bytes()[..2]).await;
                    // Dropping the socket cuts the body short
                } else {
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                }
            }
        });

        (format!("http://{}", addr), hits)
    }

    #[test]
    fn cache_key_separates_urls_and_configs() {
        let bare = RequestConfig::default();
        let with_query =
            RequestConfig::with_query(vec![("page".to_string(), "2".to_string())]);

        assert_eq!(
            CachedFetcher::cache_key("http://a/x", &bare),
            "http://a/x{}"
        );
        assert_ne!(
            CachedFetcher::cache_key("http://a/x", &bare),
            CachedFetcher::cache_key("http://a/y", &bare)
        );
        assert_ne!(
            CachedFetcher::cache_key("http://a/x", &bare),
            CachedFetcher::cache_key("http://a/x", &with_query)
        );
        // Same config serializes to the same key every time
        assert_eq!(
            CachedFetcher::cache_key("http://a/x", &with_query),
            CachedFetcher::cache_key("http://a/x", &with_query.clone())
        );
    }

    #[tokio::test]
    async fn fetch_json_returns_payload_on_success() {
        let (base, hits) = spawn_stub(vec![200], r#"[{"ip":"1.1.1.1"}]"#).await;
        let fetcher = fast_fetcher(3);

        let records: Vec<serde_json::Value> = fetcher
            .fetch_json(&base, &RequestConfig::default())
            .await
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_json_retries_until_budget_exhausted() {
        let (base, hits) = spawn_stub(vec![500, 500, 500, 500], "{}").await;
        let fetcher = fast_fetcher(3);

        let result: Result<Value> = fetcher.fetch_json(&base, &RequestConfig::default()).await;

        assert!(matches!(
            result,
            Err(MonitorError::HttpStatus { status: 500, .. })
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fetch_json_recovers_after_transient_failures() {
        let (base, hits) = spawn_stub(vec![500, 503, 200], r#"{"ok":true}"#).await;
        let fetcher = fast_fetcher(5);

        let value: Value = fetcher
            .fetch_json(&base, &RequestConfig::default())
            .await
            .unwrap();

        assert_eq!(value, json!({"ok": true}));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fetch_json_retries_a_truncated_body_read() {
        let (base, hits) = spawn_truncating_stub(r#"{"ok":true}"#).await;
        let fetcher = fast_fetcher(3);

        let value: Value = fetcher
            .fetch_json(&base, &RequestConfig::default())
            .await
            .unwrap();

        assert_eq!(value, json!({"ok": true}));
        // The mid-body connection loss is a transport failure, not a decode
        // failure, so attempt 2 recovers
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_json_does_not_retry_a_malformed_body() {
        let (base, hits) = spawn_stub(vec![200, 200], "not json at all").await;
        let fetcher = fast_fetcher(3);

        let result: Result<Value> = fetcher.fetch_json(&base, &RequestConfig::default()).await;

        assert!(matches!(result, Err(MonitorError::ParseError(_))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_cached_hits_within_ttl_without_network() {
        let (base, hits) = spawn_stub(vec![], r#"{"n":1}"#).await;
        let fetcher = fast_fetcher(3);
        let config = RequestConfig::default();
        let ttl = Duration::from_secs(60);

        let first: Value = fetcher.fetch_cached(&base, &config, ttl).await.unwrap();
        let second: Value = fetcher.fetch_cached(&base, &config, ttl).await.unwrap();

        assert_eq!(first, second);
        // Exactly one network call; the second read was served from cache
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fetch_cached_refetches_after_ttl_expires() {
        let (base, hits) = spawn_stub(vec![], r#"{"n":1}"#).await;
        let fetcher = fast_fetcher(3);
        let config = RequestConfig::default();
        let ttl = Duration::from_millis(30);

        let _: Value = fetcher.fetch_cached(&base, &config, ttl).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let _: Value = fetcher.fetch_cached(&base, &config, ttl).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_cached_miss_plus_failure_propagates() {
        // No stale-on-error: a failed refresh surfaces the error
        let (base, _hits) = spawn_stub(vec![500, 500, 500], "{}").await;
        let fetcher = fast_fetcher(3);

        let result: Result<Value> = fetcher
            .fetch_cached(&base, &RequestConfig::default(), Duration::from_secs(60))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn overlapping_cached_fetches_share_one_request() {
        let (base, hits) = spawn_stub(vec![], r#"{"n":1}"#).await;
        let fetcher = Arc::new(fast_fetcher(3));
        let ttl = Duration::from_secs(60);

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let fetcher = fetcher.clone();
                let base = base.clone();
                tokio::spawn(async move {
                    let value: Value = fetcher
                        .fetch_cached(&base, &RequestConfig::default(), ttl)
                        .await
                        .unwrap();
                    value
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), json!({"n": 1}));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let fetcher = fast_fetcher(3);
        let config = RequestConfig::default();
        fetcher.seed_cache("http://x/stats", &config, json!([1, 2]));

        let cached: Value = fetcher
            .fetch_cached("http://x/stats", &config, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cached, json!([1, 2]));

        fetcher.invalidate("http://x/stats", &config);
        // No server behind this URL, so the forced miss must now fail
        let result: Result<Value> = fetcher
            .fetch_cached("http://x/stats", &config, Duration::from_secs(60))
            .await;
        assert!(result.is_err());
    }
}
