//! One item's check cycle:
//! `IDLE → DUE_CHECK → FETCHING → NORMALIZING → COMPARING → DECIDING → {NOTIFY | SKIP} → IDLE`.

use std::fmt;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::EngineSettings;
use crate::content::{normalize, ChangeDetector};
use crate::db::ItemStore;
use crate::fetch::{FetchErrorKind, FetchResult, Fetcher};
use crate::models::{ChangeVerdict, CheckRecord, MonitoredItem, Snapshot};
use crate::notify::{ChangeEvent, ChangeNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Idle,
    DueCheck,
    Fetching,
    Normalizing,
    Comparing,
    Deciding,
    Notify,
    Skip,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckState::Idle => "IDLE",
            CheckState::DueCheck => "DUE_CHECK",
            CheckState::Fetching => "FETCHING",
            CheckState::Normalizing => "NORMALIZING",
            CheckState::Comparing => "COMPARING",
            CheckState::Deciding => "DECIDING",
            CheckState::Notify => "NOTIFY",
            CheckState::Skip => "SKIP",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A cycle for the same item is already in flight.
    Busy,
    NotDue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckFailure {
    Fetch {
        kind: FetchErrorKind,
        attempts: u32,
        message: String,
    },
    Store(String),
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckFailure::Fetch {
                attempts, message, ..
            } => write!(f, "fetch failed after {} attempt(s): {}", attempts, message),
            CheckFailure::Store(message) => write!(f, "store error: {}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// First snapshot for the item was stored.
    Baseline,
    Unchanged,
    BelowThreshold(ChangeVerdict),
    Changed(ChangeVerdict),
    /// Too little text to compare; nothing was stored.
    Inconclusive,
    Skipped(SkipReason),
    Cancelled,
    Failed(CheckFailure),
}

impl CheckOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckOutcome::Failed(_))
    }
}

impl fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckOutcome::Baseline => write!(f, "baseline stored"),
            CheckOutcome::Unchanged => write!(f, "unchanged"),
            CheckOutcome::BelowThreshold(verdict) => {
                write!(f, "below threshold: {}", verdict.description())
            }
            CheckOutcome::Changed(verdict) => write!(f, "changed: {}", verdict.description()),
            CheckOutcome::Inconclusive => write!(f, "inconclusive"),
            CheckOutcome::Skipped(SkipReason::Busy) => write!(f, "skipped (busy)"),
            CheckOutcome::Skipped(SkipReason::NotDue) => write!(f, "skipped (not due)"),
            CheckOutcome::Cancelled => write!(f, "cancelled"),
            CheckOutcome::Failed(failure) => write!(f, "failed: {}", failure),
        }
    }
}

/// Collaborators and settings borrowed by a single cycle.
pub(crate) struct CycleContext<'a> {
    pub store: &'a dyn ItemStore,
    pub fetcher: &'a dyn Fetcher,
    pub notifier: &'a dyn ChangeNotifier,
    pub settings: &'a EngineSettings,
    pub cancel: &'a CancellationToken,
}

enum FetchStep {
    Fetched(FetchResult),
    Failed { last: FetchResult, attempts: u32 },
    Cancelled,
}

fn enter(item_id: i64, state: CheckState) {
    tracing::debug!("Item {} -> {}", item_id, state);
}

pub(crate) async fn run_cycle(ctx: &CycleContext<'_>, item: &MonitoredItem) -> CheckOutcome {
    enter(item.id, CheckState::DueCheck);
    let outcome = match drive(ctx, item).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("Store error while checking item {}: {}", item.id, e);
            CheckOutcome::Failed(CheckFailure::Store(e.to_string()))
        }
    };

    match &outcome {
        CheckOutcome::Changed(_) => enter(item.id, CheckState::Notify),
        _ => enter(item.id, CheckState::Skip),
    }
    tracing::info!("Checked {} ({}): {}", item.name, item.id, outcome);
    enter(item.id, CheckState::Idle);
    outcome
}

async fn drive(ctx: &CycleContext<'_>, item: &MonitoredItem) -> crate::error::Result<CheckOutcome> {
    enter(item.id, CheckState::Fetching);
    let fetched = match fetch_with_retry(ctx, item).await {
        FetchStep::Fetched(result) => result,
        FetchStep::Cancelled => {
            tracing::warn!("Check of item {} cancelled", item.id);
            return Ok(CheckOutcome::Cancelled);
        }
        FetchStep::Failed { last, attempts } => {
            if cancelled(ctx, item).await? {
                return Ok(CheckOutcome::Cancelled);
            }
            let message = last.error_summary();
            let record = CheckRecord::failure(item.id, last.fetched_at, message.clone(), last.response_time_ms);
            ctx.store.record_check(&record).await?;
            return Ok(CheckOutcome::Failed(CheckFailure::Fetch {
                kind: last.error_kind.unwrap_or(FetchErrorKind::Network),
                attempts,
                message,
            }));
        }
    };

    // Checkpoint: a disable or delete during the fetch discards its result.
    if cancelled(ctx, item).await? {
        return Ok(CheckOutcome::Cancelled);
    }

    enter(item.id, CheckState::Normalizing);
    let normalized = normalize(&fetched.raw_content, &item.comparison);
    let success = |change_percent| {
        CheckRecord::success(item.id, fetched.fetched_at, change_percent, fetched.response_time_ms)
    };

    if normalized.inconclusive {
        if token_fired(ctx, item) {
            return Ok(CheckOutcome::Cancelled);
        }
        ctx.store.record_check(&success(0)).await?;
        return Ok(CheckOutcome::Inconclusive);
    }

    enter(item.id, CheckState::Comparing);
    let current = Snapshot::capture(normalized.content, fetched.fetched_at);
    let previous = ctx.store.load_latest_snapshot(item.id).await?;

    let Some(previous) = previous else {
        if token_fired(ctx, item) {
            return Ok(CheckOutcome::Cancelled);
        }
        ctx.store
            .save_snapshot(item.id, &current, ctx.settings.history_retention_count)
            .await?;
        ctx.store.record_check(&success(0)).await?;
        return Ok(CheckOutcome::Baseline);
    };

    let verdict = ChangeDetector::for_config(&item.comparison).compare(&previous, &current);

    enter(item.id, CheckState::Deciding);
    if token_fired(ctx, item) {
        return Ok(CheckOutcome::Cancelled);
    }

    if !verdict.has_changes() {
        ctx.store.record_check(&success(0)).await?;
        return Ok(CheckOutcome::Unchanged);
    }
    if !verdict.exceeds_threshold {
        ctx.store.record_check(&success(verdict.change_percent)).await?;
        return Ok(CheckOutcome::BelowThreshold(verdict));
    }

    ctx.store
        .save_snapshot(item.id, &current, ctx.settings.history_retention_count)
        .await?;
    ctx.store.record_check(&success(verdict.change_percent)).await?;

    let event = ChangeEvent {
        item_id: item.id,
        item_name: item.name.clone(),
        url: item.url.clone(),
        verdict: verdict.clone(),
        detected_at: Utc::now(),
    };
    if let Err(e) = ctx.notifier.on_change_detected(&event).await {
        tracing::warn!("Failed to deliver change notification for item {}: {}", item.id, e);
    }

    Ok(CheckOutcome::Changed(verdict))
}

/// Cancelled if the token fired, or the item was deleted or disabled since the
/// cycle started.
async fn cancelled(ctx: &CycleContext<'_>, item: &MonitoredItem) -> crate::error::Result<bool> {
    if token_fired(ctx, item) {
        return Ok(true);
    }
    let gone = match ctx.store.load_item(item.id).await? {
        None => true,
        Some(current) => item.enabled && !current.enabled,
    };
    if gone {
        tracing::warn!("Item {} was removed or disabled during its check", item.id);
    }
    Ok(gone)
}

/// Checked right before every write.
fn token_fired(ctx: &CycleContext<'_>, item: &MonitoredItem) -> bool {
    let fired = ctx.cancel.is_cancelled();
    if fired {
        tracing::warn!("Check of item {} cancelled", item.id);
    }
    fired
}

async fn fetch_with_retry(ctx: &CycleContext<'_>, item: &MonitoredItem) -> FetchStep {
    let retry_count = ctx.settings.retry_count.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        if ctx.cancel.is_cancelled() {
            return FetchStep::Cancelled;
        }

        let result = match tokio::time::timeout(ctx.settings.fetch_timeout, ctx.fetcher.fetch(item)).await {
            Ok(result) => result,
            Err(_) => FetchResult::failed(
                FetchErrorKind::Timeout,
                format!("no response within {:?}", ctx.settings.fetch_timeout),
                ctx.settings.fetch_timeout.as_millis() as u64,
            ),
        };

        if result.success {
            return FetchStep::Fetched(result);
        }

        tracing::warn!(
            "Fetch attempt {}/{} for item {} failed: {}",
            attempt,
            retry_count,
            item.id,
            result.error_summary()
        );

        let retryable = result.error_kind.map_or(true, |kind| kind.is_retryable());
        if !retryable || attempt >= retry_count {
            return FetchStep::Failed {
                last: result,
                attempts: attempt,
            };
        }

        let backoff = ctx.settings.retry_backoff * attempt;
        tokio::select! {
            _ = ctx.cancel.cancelled() => return FetchStep::Cancelled,
            _ = tokio::time::sleep(backoff) => {}
        }
    }
}
