/// Time source for the watchdog.
///
/// Timestamps drive the re-arm window and the "last check-in" text in
/// notifications, so they come from an injectable clock rather than
/// `Utc::now()` directly.
use chrono::{DateTime, Utc};
use tokio::time::Instant;

pub trait Clock: Send + Sync {
    /// Time used for elapsed-time comparisons.
    fn now(&self) -> DateTime<Utc>;

    /// Calendar time for timestamps shown to people.
    fn wall_now(&self) -> DateTime<Utc> {
        self.now()
    }
}

/// Wall time captured at startup, advanced by the tokio monotonic timer.
///
/// `now` ignores wall-clock steps, so the re-arm window cannot jump, and
/// under `tokio::time::pause` it follows the paused timer. It also drifts
/// from calendar time across host suspend, so `wall_now` reads the system
/// clock for anything rendered into a message.
pub struct MonotonicClock {
    anchor_wall: DateTime<Utc>,
    anchor: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            anchor_wall: Utc::now(),
            anchor: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.anchor_wall + elapsed
    }

    fn wall_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Render a timestamp in local time, e.g. `2024-05-01 13:45:00`.
pub fn format_local(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Hand-driven clock for tests. Wall time is `now` plus an adjustable skew.
#[cfg(test)]
pub struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
    wall_skew: std::sync::Mutex<chrono::Duration>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(start),
            wall_skew: std::sync::Mutex::new(chrono::Duration::zero()),
        }
    }

    pub fn skew_wall_secs(&self, secs: i64) {
        *self.wall_skew.lock().unwrap() = chrono::Duration::seconds(secs);
    }

    pub fn advance_secs(&self, secs: u64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::seconds(secs as i64);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn wall_now(&self) -> DateTime<Utc> {
        self.now() + *self.wall_skew.lock().unwrap()
    }
}
