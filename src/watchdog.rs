/// Stall watchdog for a remote worker.
///
/// Elapsed time grows by a fixed step on every tick and drops to zero when
/// the worker checks in via `reset`. Once it reaches the threshold a push
/// notification goes out; while the stall persists, another one goes out
/// every further `threshold_secs` since the last attempt.
use crate::clock::Clock;
use crate::config::WatchdogConfig;
use crate::notify::{stall_message, Notifier};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still below the threshold.
    Counting,
    /// Threshold reached and a notification was attempted.
    Notified { delivered: bool },
    /// Past the threshold but the current window already had an attempt.
    Suppressed,
}

/// Snapshot returned by `/status`.
#[cfg_attr(not(feature = "serve"), allow(dead_code))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatchdogStatus {
    pub cumulative_time: u64,
    pub time_remaining: u64,
    pub notification_triggered: bool,
}

#[derive(Debug)]
struct WatchdogState {
    elapsed_secs: u64,
    notification_sent: bool,
    /// `None` until the first attempt after a reset.
    last_notification: Option<DateTime<Utc>>,
    /// Calendar time, only rendered into messages.
    last_reset: DateTime<Utc>,
}

pub struct Watchdog {
    threshold_secs: u64,
    tick_interval_secs: u64,
    job_name: String,
    state: Mutex<WatchdogState>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl Watchdog {
    pub fn new(config: &WatchdogConfig, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        let state = WatchdogState {
            elapsed_secs: 0,
            notification_sent: false,
            last_notification: None,
            last_reset: clock.wall_now(),
        };
        Self {
            threshold_secs: config.threshold_secs,
            tick_interval_secs: config.tick_interval_secs,
            job_name: config.job_name.clone(),
            state: Mutex::new(state),
            notifier,
            clock,
        }
    }

    /// Advance elapsed time by one step and notify if the stall window allows.
    ///
    /// The lock stays held across the send so that a concurrent reset cannot
    /// interleave with the check-fire-commit sequence.
    pub async fn tick(&self) -> TickOutcome {
        let mut state = self.state.lock().await;
        state.elapsed_secs = state.elapsed_secs.saturating_add(self.tick_interval_secs);
        tracing::debug!(elapsed_secs = state.elapsed_secs, "watchdog tick");

        if state.elapsed_secs < self.threshold_secs {
            return TickOutcome::Counting;
        }

        let now = self.clock.now();
        let window_open = match state.last_notification {
            None => true,
            Some(last) => u64::try_from((now - last).num_seconds())
                .map_or(false, |secs| secs >= self.threshold_secs),
        };
        if state.notification_sent && !window_open {
            return TickOutcome::Suppressed;
        }

        let message = stall_message(&self.job_name, self.threshold_secs, state.last_reset);
        tracing::info!(
            elapsed_secs = state.elapsed_secs,
            threshold_secs = self.threshold_secs,
            last_reset = %state.last_reset,
            "stall threshold reached, sending notification"
        );
        let delivered = match self.notifier.send(&message).await {
            Ok(()) => {
                tracing::info!("stall notification delivered");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "stall notification failed");
                false
            }
        };

        // An attempt counts against the window whether or not it was delivered.
        state.notification_sent = true;
        state.last_notification = Some(now);
        TickOutcome::Notified { delivered }
    }

    /// Worker checked in: clear elapsed time and the notification window.
    #[cfg_attr(not(feature = "serve"), allow(dead_code))]
    pub async fn reset(&self) -> DateTime<Utc> {
        let mut state = self.state.lock().await;
        let now = self.clock.wall_now();
        let previous = state.elapsed_secs;
        state.elapsed_secs = 0;
        state.notification_sent = false;
        state.last_notification = None;
        state.last_reset = now;
        tracing::info!(previous_elapsed_secs = previous, "watchdog reset");
        now
    }

    #[cfg_attr(not(feature = "serve"), allow(dead_code))]
    pub async fn status(&self) -> WatchdogStatus {
        let state = self.state.lock().await;
        WatchdogStatus {
            cumulative_time: state.elapsed_secs,
            time_remaining: self.threshold_secs.saturating_sub(state.elapsed_secs),
            notification_triggered: state.notification_sent,
        }
    }

    /// Tick forever, sleeping `tick_interval_secs` before each step.
    ///
    /// No catch-up: a late wakeup still advances by one fixed step.
    pub async fn run(self: Arc<Self>) {
        let interval = Duration::from_secs(self.tick_interval_secs);
        tracing::info!(
            threshold_secs = self.threshold_secs,
            tick_interval_secs = self.tick_interval_secs,
            "watchdog started"
        );
        loop {
            tokio::time::sleep(interval).await;
            self.tick().await;
        }
    }
}
