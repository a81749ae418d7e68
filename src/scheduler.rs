use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{ DateTime, Utc };
use sea_orm::prelude::Decimal;
use serde::Serialize;
use tokio::sync::{ Mutex, RwLock };
use tokio::task::JoinHandle;
use tokio::time::{ interval, timeout, MissedTickBehavior };

use crate::config::Config;
use crate::db::{ AlertStore, PriceStore };
use crate::error::{ AppError, Result };
use crate::notifier::{ AlertEmail, Notifier };
use crate::providers::PriceSource;
use crate::tokens::TrackedToken;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub tokens: Vec<TrackedToken>,
    pub interval: Duration,
    /// Minimum relative change (fraction) that triggers notifications.
    pub change_threshold: Decimal,
    pub fetch_timeout: Duration,
    pub store_timeout: Duration,
    pub notify_timeout: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tokens: config.tracked_tokens.clone(),
            interval: config.poll_interval,
            change_threshold: config.alert_change_threshold,
            fetch_timeout: config.fetch_timeout,
            store_timeout: config.store_timeout,
            notify_timeout: config.notify_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Fetching,
    Persisting,
    Evaluating,
    Notifying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed,
    FetchFailed,
}

/// What one cycle did, kept for the status endpoint and the logs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: CycleOutcome,
    pub error: Option<String>,
    pub tokens_fetched: usize,
    pub readings_recorded: usize,
    pub store_failures: usize,
    pub tokens_alerted: Vec<String>,
    pub notifications_attempted: usize,
    pub notifications_failed: usize,
}

impl CycleReport {
    fn begin() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            outcome: CycleOutcome::Completed,
            error: None,
            tokens_fetched: 0,
            readings_recorded: 0,
            store_failures: 0,
            tokens_alerted: Vec::new(),
            notifications_attempted: 0,
            notifications_failed: 0,
        }
    }
}

#[derive(Debug)]
pub enum TickOutcome {
    Ran(CycleReport),
    /// A previous cycle was still in flight.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    pub phase: CyclePhase,
    pub interval_secs: u64,
    pub tracked_tokens: Vec<String>,
    pub cycles_completed: u64,
    pub skipped_ticks: u64,
    pub last_cycle: Option<CycleReport>,
}

/// Shared view of the scheduler's progress; read by the query API.
#[derive(Clone)]
pub struct StatusHandle {
    inner: Arc<RwLock<SchedulerStatus>>,
}

impl StatusHandle {
    pub fn new(settings: &SchedulerSettings) -> Self {
        Self {
            inner: Arc::new(
                RwLock::new(SchedulerStatus {
                    enabled: true,
                    disabled_reason: None,
                    phase: CyclePhase::Idle,
                    interval_secs: settings.interval.as_secs(),
                    tracked_tokens: settings.tokens
                        .iter()
                        .map(|t| t.symbol.clone())
                        .collect(),
                    cycles_completed: 0,
                    skipped_ticks: 0,
                    last_cycle: None,
                })
            ),
        }
    }

    /// Status for a process whose scheduler never started.
    pub fn disabled(settings: &SchedulerSettings, reason: impl Into<String>) -> Self {
        let handle = Self::new(settings);
        if let Ok(mut status) = handle.inner.try_write() {
            status.enabled = false;
            status.disabled_reason = Some(reason.into());
        }
        handle
    }

    pub async fn snapshot(&self) -> SchedulerStatus {
        self.inner.read().await.clone()
    }

    async fn set_phase(&self, phase: CyclePhase) {
        self.inner.write().await.phase = phase;
    }

    async fn record_skip(&self) {
        self.inner.write().await.skipped_ticks += 1;
    }

    async fn record_cycle(&self, report: CycleReport) {
        let mut status = self.inner.write().await;
        status.phase = CyclePhase::Idle;
        status.cycles_completed += 1;
        status.last_cycle = Some(report);
    }
}

/// A price move large enough to notify subscribers about.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceChange {
    pub token: String,
    pub previous: Decimal,
    pub current: Decimal,
    /// `None` when the previous price was zero and the ratio is unbounded.
    pub relative: Option<Decimal>,
}

/// Decide whether a new reading warrants alerts.
///
/// No prior reading never alerts, and neither does an unchanged price,
/// whatever the threshold.
pub fn evaluate_change(
    token: &str,
    previous: Option<Decimal>,
    current: Decimal,
    threshold: Decimal
) -> Option<PriceChange> {
    let previous = previous?;
    if current == previous {
        return None;
    }

    let relative = (current - previous).abs().checked_div(previous.abs());
    if let Some(relative) = relative {
        if relative < threshold {
            return None;
        }
    }

    Some(PriceChange {
        token: token.to_string(),
        previous,
        current,
        relative,
    })
}

/// Fetch → persist → evaluate → notify, on a fixed interval, one cycle at a time.
pub struct PriceScheduler {
    source: Arc<dyn PriceSource>,
    prices: Arc<dyn PriceStore>,
    alerts: Arc<dyn AlertStore>,
    notifier: Arc<dyn Notifier>,
    settings: SchedulerSettings,
    cycle_lock: Mutex<()>,
    status: StatusHandle,
}

impl PriceScheduler {
    pub fn new(
        source: Arc<dyn PriceSource>,
        prices: Arc<dyn PriceStore>,
        alerts: Arc<dyn AlertStore>,
        notifier: Arc<dyn Notifier>,
        settings: SchedulerSettings
    ) -> Self {
        let status = StatusHandle::new(&settings);
        Self {
            source,
            prices,
            alerts,
            notifier,
            settings,
            cycle_lock: Mutex::new(()),
            status,
        }
    }

    pub fn status(&self) -> StatusHandle {
        self.status.clone()
    }

    /// Run for the lifetime of the process on a background task.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.start())
    }

    pub async fn start(self: Arc<Self>) {
        tracing::info!(
            "Price scheduler started: every {}s for {:?}",
            self.settings.interval.as_secs(),
            self.settings.tokens
                .iter()
                .map(|t| t.symbol.as_str())
                .collect::<Vec<_>>()
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            // Cycles run detached so a slow one cannot delay the timer;
            // `tick` itself refuses to overlap.
            let scheduler = self.clone();
            tokio::spawn(async move {
                scheduler.tick().await;
            });
        }
    }

    /// Run one cycle unless another is still in flight.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            tracing::warn!("Previous price cycle still running, skipping tick");
            self.status.record_skip().await;
            return TickOutcome::Skipped;
        };

        let report = self.run_cycle().await;
        self.status.record_cycle(report.clone()).await;
        TickOutcome::Ran(report)
    }

    async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::begin();

        self.status.set_phase(CyclePhase::Fetching).await;
        let fetched = bounded(
            self.settings.fetch_timeout,
            self.source.fetch_prices(&self.settings.tokens),
            || AppError::Fetch("price request timed out".to_string())
        ).await;

        let prices = match fetched {
            Ok(prices) => prices,
            Err(e) => {
                tracing::error!("Price fetch failed, cycle aborted: {}", e);
                report.outcome = CycleOutcome::FetchFailed;
                report.error = Some(e.to_string());
                report.finished_at = Some(Utc::now());
                return report;
            }
        };
        report.tokens_fetched = prices.len();
        let observed_at = Utc::now();

        self.status.set_phase(CyclePhase::Persisting).await;
        let persisted = self.persist(&prices, observed_at, &mut report).await;

        self.status.set_phase(CyclePhase::Evaluating).await;
        let changes: Vec<PriceChange> = persisted
            .into_iter()
            .filter_map(|(token, previous, current)| {
                evaluate_change(&token, previous, current, self.settings.change_threshold)
            })
            .collect();

        self.status.set_phase(CyclePhase::Notifying).await;
        for change in &changes {
            report.tokens_alerted.push(change.token.clone());
            self.notify_subscribers(change, &mut report).await;
        }

        report.finished_at = Some(Utc::now());
        tracing::info!(
            "Price cycle finished: {} fetched, {} recorded, {} store failures, {} alerted, {}/{} notifications failed",
            report.tokens_fetched,
            report.readings_recorded,
            report.store_failures,
            report.tokens_alerted.len(),
            report.notifications_failed,
            report.notifications_attempted
        );
        report
    }

    /// Record each fetched price, returning (token, previous, current) for
    /// every reading that was written.
    async fn persist(
        &self,
        prices: &HashMap<String, Decimal>,
        observed_at: DateTime<Utc>,
        report: &mut CycleReport
    ) -> Vec<(String, Option<Decimal>, Decimal)> {
        let mut persisted = Vec::new();

        for token in &self.settings.tokens {
            let symbol = token.symbol.as_str();
            let Some(&price) = prices.get(symbol) else {
                tracing::warn!("No price returned for {}, skipping this cycle", symbol);
                continue;
            };

            // Must be read before the insert below, or it would be the new reading
            let previous = match
                bounded(self.settings.store_timeout, self.prices.latest(symbol), || {
                    AppError::Store(format!("reading latest {} timed out", symbol))
                }).await
            {
                Ok(latest) => latest.map(|r| r.price),
                Err(e) => {
                    tracing::warn!("Could not read previous {} price, alerts skipped: {}", symbol, e);
                    None
                }
            };

            let recorded = bounded(
                self.settings.store_timeout,
                self.prices.record(symbol, price, observed_at),
                || AppError::Store(format!("recording {} timed out", symbol))
            ).await;

            match recorded {
                Ok(()) => {
                    tracing::debug!("Recorded {} at ${}", symbol, price);
                    report.readings_recorded += 1;
                    persisted.push((symbol.to_string(), previous, price));
                }
                Err(e) => {
                    tracing::error!("Failed to record {} price: {}", symbol, e);
                    report.store_failures += 1;
                }
            }
        }

        persisted
    }

    async fn notify_subscribers(&self, change: &PriceChange, report: &mut CycleReport) {
        let subscriptions = match
            bounded(self.settings.store_timeout, self.alerts.list_for_token(&change.token), || {
                AppError::Store(format!("listing {} subscriptions timed out", change.token))
            }).await
        {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!("Failed to load {} subscriptions: {}", change.token, e);
                report.store_failures += 1;
                return;
            }
        };

        if subscriptions.is_empty() {
            tracing::debug!("{} changed but has no subscribers", change.token);
            return;
        }

        for subscription in &subscriptions {
            let email = AlertEmail::render(subscription, change.previous, change.current, change.relative);
            report.notifications_attempted += 1;

            let sent = bounded(
                self.settings.notify_timeout,
                self.notifier.send(&subscription.email, &email.subject, &email.body),
                || AppError::Notify("send timed out".to_string())
            ).await;

            match sent {
                Ok(()) => {
                    tracing::info!("Sent {} alert to {}", change.token, subscription.email);
                }
                Err(e) => {
                    report.notifications_failed += 1;
                    tracing::warn!("Failed to notify {} about {}: {}", subscription.email, change.token, e);
                }
            }
        }
    }
}

/// Run `step`, turning an elapsed `limit` into that step's own error.
async fn bounded<T, F>(limit: Duration, step: F, on_timeout: impl FnOnce() -> AppError) -> Result<T>
    where F: Future<Output = Result<T>>
{
    match timeout(limit, step).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd(value: &str) -> Decimal {
        value.parse().unwrap()
    }

    #[test]
    fn test_first_observation_never_alerts() {
        assert!(evaluate_change("ETH", None, usd("3000"), Decimal::ZERO).is_none());
    }

    #[test]
    fn test_unchanged_price_never_alerts() {
        assert!(evaluate_change("ETH", Some(usd("3100.00")), usd("3100"), Decimal::ZERO).is_none());
    }

    #[test]
    fn test_change_compared_against_threshold() {
        let one_percent = usd("0.01");

        let change = evaluate_change("ETH", Some(usd("3000.00")), usd("3100.00"), one_percent).unwrap();
        assert_eq!(change.relative.unwrap().round_dp(4), usd("0.0333"));

        assert!(evaluate_change("ETH", Some(usd("3000")), usd("3020"), one_percent).is_none());
        assert!(evaluate_change("ETH", Some(usd("3000")), usd("2970"), one_percent).is_some());
        assert!(evaluate_change("ETH", Some(usd("3000")), usd("3000.01"), Decimal::ZERO).is_some());
    }

    #[test]
    fn test_move_off_zero_always_alerts() {
        let change = evaluate_change("ETH", Some(Decimal::ZERO), usd("1"), usd("0.5")).unwrap();
        assert!(change.relative.is_none());
    }
}
