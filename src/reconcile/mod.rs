//! New-order reconciliation: which locally observed purchase-bearing
//! records are not yet represented in the remote reference snapshot.

use crate::error::Result;
use crate::fetch::{CachedFetcher, RequestConfig};
use crate::stats::StatisticRecord;
use log::info;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrderReport {
    pub new_orders: Vec<StatisticRecord>,
    pub count: usize,
}

/// Set difference over `(ip, entry_time)`. A local record is new when it
/// carries purchases and no purchase-bearing remote record shares its key.
/// A remote record with the same key but an empty purchase list does NOT
/// suppress the local one.
pub fn diff_new_orders(
    local: &[StatisticRecord],
    remote: &[StatisticRecord],
) -> Vec<StatisticRecord> {
    let known: HashSet<(&str, &str)> = remote
        .iter()
        .filter(|r| r.has_purchases())
        .map(|r| r.order_key())
        .collect();

    local
        .iter()
        .filter(|r| r.has_purchases() && !known.contains(&r.order_key()))
        .cloned()
        .collect()
}

/// Owns the current new-order set and recomputes it on demand by comparing
/// the fresh local dataset against the cached remote snapshot.
pub struct OrderReconciler {
    fetcher: Arc<CachedFetcher>,
    local_url: String,
    remote_url: String,
    remote_ttl: Duration,
    current: RwLock<Vec<StatisticRecord>>,
}

impl OrderReconciler {
    pub fn new(
        fetcher: Arc<CachedFetcher>,
        local_url: String,
        remote_url: String,
        remote_ttl: Duration,
    ) -> Self {
        Self {
            fetcher,
            local_url,
            remote_url,
            remote_ttl,
            current: RwLock::new(Vec::new()),
        }
    }

    /// Run one reconciliation. The local dataset is always fetched fresh;
    /// the remote snapshot goes through the TTL cache. On failure the
    /// previously published set is left untouched.
    pub async fn find_new_orders(&self) -> Result<NewOrderReport> {
        let local: Vec<StatisticRecord> = self
            .fetcher
            .fetch_json(&self.local_url, &RequestConfig::default())
            .await?;

        let remote: Vec<StatisticRecord> = self
            .fetcher
            .fetch_cached(&self.remote_url, &RequestConfig::default(), self.remote_ttl)
            .await?;

        let new_orders = diff_new_orders(&local, &remote);
        info!(
            "Reconciliation: {} local records, {} remote records, {} new orders",
            local.len(),
            remote.len(),
            new_orders.len()
        );

        *self.current.write().await = new_orders.clone();
        Ok(NewOrderReport {
            count: new_orders.len(),
            new_orders,
        })
    }

    /// Replace the published set with a backend-computed one (the
    /// update-comparison mutation returns the authoritative list).
    pub async fn replace(&self, orders: Vec<StatisticRecord>) {
        *self.current.write().await = orders;
    }

    /// Forget all pending orders (after the statistics store is cleared).
    pub async fn reset(&self) {
        self.current.write().await.clear();
    }

    pub async fn current(&self) -> Vec<StatisticRecord> {
        self.current.read().await.clone()
    }

    pub async fn current_count(&self) -> usize {
        self.current.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::PurchaseItem;
    use pretty_assertions::assert_eq;

    fn record(ip: &str, entry: &str, purchase_count: usize) -> StatisticRecord {
        StatisticRecord {
            ip: ip.to_string(),
            entry_time: entry.to_string(),
            purchases: vec![PurchaseItem::default(); purchase_count],
            ..Default::default()
        }
    }

    #[test]
    fn empty_remote_keeps_all_purchase_bearing_records() {
        let local = vec![record("1.1.1.1", "T1", 1), record("2.2.2.2", "T2", 0)];

        let new_orders = diff_new_orders(&local, &[]);
        assert_eq!(new_orders.len(), 1);
        assert_eq!(new_orders[0].ip, "1.1.1.1");
    }

    #[test]
    fn exact_remote_match_suppresses_the_order() {
        let local = vec![record("1.1.1.1", "T1", 1)];
        let remote = vec![record("1.1.1.1", "T1", 1)];

        assert!(diff_new_orders(&local, &remote).is_empty());
    }

    #[test]
    fn remote_match_without_purchases_does_not_suppress() {
        let local = vec![record("1.1.1.1", "T1", 1)];
        let remote = vec![record("1.1.1.1", "T1", 0)];

        let new_orders = diff_new_orders(&local, &remote);
        assert_eq!(new_orders.len(), 1);
    }

    #[test]
    fn identity_requires_both_ip_and_timestamp() {
        let local = vec![record("1.1.1.1", "T1", 1)];
        let remote = vec![record("1.1.1.1", "T2", 1), record("9.9.9.9", "T1", 1)];

        assert_eq!(diff_new_orders(&local, &remote).len(), 1);
    }

    #[test]
    fn empty_local_yields_empty_result() {
        let remote = vec![record("1.1.1.1", "T1", 1)];
        assert!(diff_new_orders(&[], &remote).is_empty());
    }

    #[test]
    fn diff_is_idempotent_for_unchanged_datasets() {
        let local = vec![
            record("1.1.1.1", "T1", 1),
            record("2.2.2.2", "T2", 2),
            record("3.3.3.3", "T3", 0),
        ];
        let remote = vec![record("2.2.2.2", "T2", 1)];

        let first = diff_new_orders(&local, &remote);
        let second = diff_new_orders(&local, &remote);
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].ip, "1.1.1.1");
    }

    #[tokio::test]
    async fn published_state_is_replaceable_and_resettable() {
        let fetcher = Arc::new(
            CachedFetcher::new(crate::error::RetryPolicy::default(), Duration::from_secs(5))
                .unwrap(),
        );
        let reconciler = OrderReconciler::new(
            fetcher,
            "http://127.0.0.1:1/local".to_string(),
            "http://127.0.0.1:1/remote".to_string(),
            Duration::from_secs(300),
        );

        assert_eq!(reconciler.current_count().await, 0);

        reconciler.replace(vec![record("1.1.1.1", "T1", 1)]).await;
        assert_eq!(reconciler.current_count().await, 1);

        reconciler.reset().await;
        assert!(reconciler.current().await.is_empty());
    }
}
