//! Polling scheduler. Owns both cadences so their overlap is a deliberate
//! property of one component instead of an accident of two timers: the
//! reconcile loop and the dashboard loop touch disjoint state and may have
//! requests in flight at the same time.

use crate::dashboard::{DashboardApi, ServerStatus};
use crate::error::Result;
use crate::reconcile::OrderReconciler;
use crate::stats::DashboardSummary;
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

/// Last successful dashboard refresh. Replaced wholesale; readers never see
/// a summary from one poll paired with a status from another.
#[derive(Debug, Clone)]
pub struct DashboardSnapshot {
    pub summary: DashboardSummary,
    pub status: ServerStatus,
    pub refreshed_at: DateTime<Utc>,
}

pub type SnapshotHandle = Arc<RwLock<Option<DashboardSnapshot>>>;

pub struct MonitorService {
    api: Arc<DashboardApi>,
    reconciler: Arc<OrderReconciler>,
    reconcile_interval: Duration,
    dashboard_interval: Duration,
    max_consecutive_failures: u32,
    recovery_delay: Duration,
    snapshot: SnapshotHandle,
    shutdown_tx: watch::Sender<bool>,
}

impl MonitorService {
    pub fn new(
        api: Arc<DashboardApi>,
        reconciler: Arc<OrderReconciler>,
        config: &crate::config::Config,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            api,
            reconciler,
            reconcile_interval: Duration::from_secs(config.reconcile_interval_secs),
            dashboard_interval: Duration::from_secs(config.dashboard_refresh_secs),
            max_consecutive_failures: config.max_consecutive_failures,
            recovery_delay: Duration::from_secs(config.recovery_delay_secs),
            snapshot: Arc::new(RwLock::new(None)),
            shutdown_tx,
        }
    }

    pub fn snapshot_handle(&self) -> SnapshotHandle {
        self.snapshot.clone()
    }

    pub async fn snapshot(&self) -> Option<DashboardSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Spawn both poll loops. Returns their handles so the caller can await
    /// a clean stop after [`MonitorService::shutdown`].
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);

        let reconciler = self.reconciler.clone();
        handles.push(tokio::spawn(run_polling_loop(
            "reconciliation",
            self.reconcile_interval,
            self.shutdown_tx.subscribe(),
            self.max_consecutive_failures,
            self.recovery_delay,
            move || {
                let reconciler = reconciler.clone();
                async move {
                    let report = reconciler.find_new_orders().await?;
                    if report.count > 0 {
                        info!("{} new orders pending", report.count);
                    }
                    Ok(())
                }
            },
        )));

        let api = self.api.clone();
        let snapshot = self.snapshot.clone();
        handles.push(tokio::spawn(run_polling_loop(
            "dashboard refresh",
            self.dashboard_interval,
            self.shutdown_tx.subscribe(),
            self.max_consecutive_failures,
            self.recovery_delay,
            move || {
                let api = api.clone();
                let snapshot = snapshot.clone();
                async move {
                    let (status, records) =
                        tokio::try_join!(api.fetch_server_status(), api.fetch_statistics())?;
                    let summary = DashboardSummary::from_records(&records);
                    *snapshot.write().await = Some(DashboardSnapshot {
                        summary,
                        status,
                        refreshed_at: Utc::now(),
                    });
                    Ok(())
                }
            },
        )));

        handles
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Generic poll loop: tick, run, track consecutive failures. After
/// `max_consecutive_failures` the loop waits `recovery_delay` and issues one
/// immediate probe before returning to the normal cadence. Failures never
/// clear previously published state; callers keep their last good result.
async fn run_polling_loop<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    max_consecutive_failures: u32,
    recovery_delay: Duration,
    mut operation: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures = 0u32;

    info!("{} loop started (every {:?})", name, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("{} loop stopping", name);
                    break;
                }
                continue;
            }
        }

        match operation().await {
            Ok(()) => consecutive_failures = 0,
            Err(e) => {
                consecutive_failures += 1;
                error!(
                    "{} failed ({} consecutive): {}",
                    name, consecutive_failures, e
                );

                if consecutive_failures >= max_consecutive_failures {
                    warn!(
                        "{}: {} consecutive failures, probing again in {:?}",
                        name, consecutive_failures, recovery_delay
                    );
                    sleep(recovery_delay).await;
                    match operation().await {
                        Ok(()) => {
                            consecutive_failures = 0;
                            info!("{}: connection restored", name);
                        }
                        Err(e) => error!("{}: recovery probe failed: {}", name, e),
                    }
                }
            }
        }
    }
}
