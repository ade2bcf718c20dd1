use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::cycle::{run_cycle, CheckOutcome, CycleContext, SkipReason};
use crate::config::EngineSettings;
use crate::db::ItemStore;
use crate::error::{AppError, Result};
use crate::fetch::Fetcher;
use crate::models::MonitoredItem;
use crate::notify::ChangeNotifier;
use crate::schedule::{item_is_due, next_item_due_at};

/// Outcomes of one driver tick, one entry per enabled item.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<(i64, CheckOutcome)>,
}

impl TickReport {
    pub fn checked(&self) -> impl Iterator<Item = &(i64, CheckOutcome)> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !matches!(outcome, CheckOutcome::Skipped(SkipReason::NotDue)))
    }

    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, outcome)| outcome.is_failure()).count()
    }
}

/// Drives check cycles for all monitored items under a bounded worker pool.
///
/// Cloning is cheap; clones share the pool, the in-flight registry and the
/// collaborators.
#[derive(Clone)]
pub struct CheckOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn ItemStore>,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn ChangeNotifier>,
    settings: EngineSettings,
    workers: Semaphore,
    in_flight: Mutex<HashMap<i64, CancellationToken>>,
}

/// Marks an item as in flight until dropped.
struct InFlightGuard {
    inner: Arc<Inner>,
    item_id: i64,
    token: CancellationToken,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.inner.in_flight.lock() {
            in_flight.remove(&self.item_id);
        }
    }
}

impl CheckOrchestrator {
    pub fn new(
        store: Arc<dyn ItemStore>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn ChangeNotifier>,
        settings: EngineSettings,
    ) -> Self {
        let workers = Semaphore::new(settings.max_concurrent_workers.max(1));
        Self {
            inner: Arc::new(Inner {
                store,
                fetcher,
                notifier,
                settings,
                workers,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    /// Run every due enabled item once and wait for all of them.
    pub async fn tick<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Result<TickReport> {
        let started_at = Utc::now();
        let items = self.inner.store.load_all_enabled_items().await?;

        let mut outcomes = Vec::with_capacity(items.len());
        let mut claimed = Vec::new();
        for item in items {
            if !item_is_due(&item, &now) {
                outcomes.push((item.id, CheckOutcome::Skipped(SkipReason::NotDue)));
                continue;
            }
            match self.claim(item.id) {
                Some(guard) => claimed.push((item, guard)),
                None => {
                    tracing::debug!("Item {} still in flight, skipping", item.id);
                    outcomes.push((item.id, CheckOutcome::Skipped(SkipReason::Busy)));
                }
            }
        }

        tracing::debug!("Tick: {} due, {} total", claimed.len(), outcomes.len() + claimed.len());

        let this = self.clone();
        let checked: Vec<(i64, CheckOutcome)> = stream::iter(claimed)
            .map(move |(item, guard)| {
                let this = this.clone();
                async move {
                    let outcome = this.run_claimed(&item, &guard).await;
                    (item.id, outcome)
                }
            })
            .buffer_unordered(self.inner.settings.max_concurrent_workers.max(1))
            .collect()
            .await;
        outcomes.extend(checked);

        Ok(TickReport {
            started_at,
            outcomes,
        })
    }

    /// Check one item now, regardless of its schedules.
    pub async fn check_item(&self, id: i64) -> Result<CheckOutcome> {
        let item = self
            .inner
            .store
            .load_item(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("item {}", id)))?;

        let Some(guard) = self.claim(id) else {
            return Ok(CheckOutcome::Skipped(SkipReason::Busy));
        };
        Ok(self.run_claimed(&item, &guard).await)
    }

    pub async fn enable_item(&self, id: i64) -> Result<bool> {
        self.inner.store.set_enabled(id, true).await
    }

    /// Disable an item and cancel its in-flight cycle, if any.
    pub async fn disable_item(&self, id: i64) -> Result<bool> {
        self.cancel(id);
        self.inner.store.set_enabled(id, false).await
    }

    /// Delete an item and cancel its in-flight cycle, if any.
    pub async fn delete_item(&self, id: i64) -> Result<bool> {
        self.cancel(id);
        self.inner.store.delete_item(id).await
    }

    /// Earliest instant any enabled item becomes due, `None` if none ever will.
    pub async fn next_wakeup<Tz: TimeZone>(&self, now: DateTime<Tz>) -> Result<Option<DateTime<Tz>>> {
        let items = self.inner.store.load_all_enabled_items().await?;
        Ok(items
            .iter()
            .filter_map(|item| next_item_due_at(item, &now))
            .min())
    }

    /// Tick on the configured interval until `shutdown` fires. Each tick runs
    /// in its own task, so a slow tick never delays the next one.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(self.inner.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks = JoinSet::new();

        tracing::info!(
            "Monitoring started: tick every {:?}, {} workers",
            self.inner.settings.tick_interval,
            self.inner.settings.max_concurrent_workers
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let this = self.clone();
                    ticks.spawn(async move {
                        match this.tick(Local::now()).await {
                            Ok(report) => {
                                let failures = report.failures();
                                if failures > 0 {
                                    tracing::warn!("{} of {} checks failed", failures, report.checked().count());
                                }
                            }
                            Err(e) => tracing::error!("Tick failed: {}", e),
                        }
                    });
                }
                Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Tick task panicked: {}", e);
                    }
                }
            }
        }

        tracing::info!("Shutting down, cancelling in-flight checks");
        self.cancel_all();
        while ticks.join_next().await.is_some() {}
        Ok(())
    }

    fn claim(&self, item_id: i64) -> Option<InFlightGuard> {
        let mut in_flight = self.inner.in_flight.lock().ok()?;
        if in_flight.contains_key(&item_id) {
            return None;
        }
        let token = CancellationToken::new();
        in_flight.insert(item_id, token.clone());
        Some(InFlightGuard {
            inner: Arc::clone(&self.inner),
            item_id,
            token,
        })
    }

    fn cancel(&self, item_id: i64) {
        if let Ok(in_flight) = self.inner.in_flight.lock() {
            if let Some(token) = in_flight.get(&item_id) {
                tracing::debug!("Cancelling in-flight check of item {}", item_id);
                token.cancel();
            }
        }
    }

    fn cancel_all(&self) {
        if let Ok(in_flight) = self.inner.in_flight.lock() {
            for token in in_flight.values() {
                token.cancel();
            }
        }
    }

    async fn run_claimed(&self, item: &MonitoredItem, guard: &InFlightGuard) -> CheckOutcome {
        let Ok(_permit) = self.inner.workers.acquire().await else {
            return CheckOutcome::Cancelled;
        };
        let ctx = CycleContext {
            store: self.inner.store.as_ref(),
            fetcher: self.inner.fetcher.as_ref(),
            notifier: self.inner.notifier.as_ref(),
            settings: &self.inner.settings,
            cancel: &guard.token,
        };
        run_cycle(&ctx, item).await
    }
}
