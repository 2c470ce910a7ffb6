//! Fixed-interval tick scheduler
//!
//! A 10 ms base tick drives a monotonically increasing counter; counter
//! multiples fire the 1s/30s/1min/5min/1hour callbacks. The timer is a
//! re-armed single-shot sleep, deliberately not a fixed-rate interval: under
//! load ticks slow down instead of piling up and overlapping.
//!
//! The on-the-hour callback is computed from wall-clock hour-of-day, not
//! from the tick counter, so it stays correct across scheduler drift.

use crate::registry::LinkRegistry;
use chrono::{DateTime, Local, Timelike};
use std::sync::Arc;
use std::time::Duration;

/// Base tick period
pub const BASE_TICK: Duration = Duration::from_millis(10);

const TICKS_1S: u64 = 100;
const TICKS_30S: u64 = 3_000;
const TICKS_1MIN: u64 = 6_000;
const TICKS_5MIN: u64 = 30_000;
const TICKS_1HOUR: u64 = 360_000;

/// Periodic maintenance callbacks
///
/// Implementations must not block: anything slow gets spawned onto its own
/// task so a stalled callback cannot delay subsequent ticks.
pub trait TickHandler: Send + Sync + 'static {
    fn on_1s(&self) {}
    fn on_30s(&self) {}
    fn on_1min(&self) {}
    fn on_5min(&self) {}
    fn on_1hour(&self) {}
    /// Fired once per wall-clock hour boundary
    fn on_hour_boundary(&self) {}
}

/// Unix timestamp of the start of `now`'s wall-clock hour
fn hour_start(now: DateTime<Local>) -> i64 {
    now.timestamp() - i64::from(now.second()) - 60 * i64::from(now.minute())
}

/// Tick loop driving a [`TickHandler`]
pub struct TickScheduler {
    handler: Arc<dyn TickHandler>,
    hour_mark: i64,
}

impl TickScheduler {
    #[must_use]
    pub fn new(handler: Arc<dyn TickHandler>) -> Self {
        Self {
            handler,
            hour_mark: hour_start(Local::now()),
        }
    }

    /// Run the tick loop. Never returns; spawn it.
    pub async fn run(mut self) {
        tracing::info!("Tick scheduler started");
        let mut count: u64 = 0;
        loop {
            tokio::time::sleep(BASE_TICK).await;
            count += 1;

            if count % TICKS_1S == 0 {
                self.handler.on_1s();
                self.check_hour_rollover();
            }
            if count % TICKS_30S == 0 {
                self.handler.on_30s();
            }
            if count % TICKS_1MIN == 0 {
                self.handler.on_1min();
            }
            if count % TICKS_5MIN == 0 {
                self.handler.on_5min();
            }
            if count % TICKS_1HOUR == 0 {
                self.handler.on_1hour();
            }
        }
    }

    fn check_hour_rollover(&mut self) {
        let now = Local::now();
        if now.timestamp() - self.hour_mark >= 3600 {
            self.handler.on_hour_boundary();
            self.hour_mark = hour_start(now);
        }
    }
}

/// Standard maintenance handler: the 1 s tick runs registry heartbeat and
/// timeout maintenance on its own task, so a slow send never stalls the
/// tick loop.
pub struct MaintenanceTicker {
    registry: Arc<LinkRegistry>,
}

impl MaintenanceTicker {
    #[must_use]
    pub fn new(registry: Arc<LinkRegistry>) -> Arc<Self> {
        Arc::new(Self { registry })
    }
}

impl TickHandler for MaintenanceTicker {
    fn on_1s(&self) {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            registry.tick_1s().await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        ticks_1s: AtomicUsize,
        ticks_30s: AtomicUsize,
        ticks_1min: AtomicUsize,
    }

    impl TickHandler for CountingHandler {
        fn on_1s(&self) {
            self.ticks_1s.fetch_add(1, Ordering::SeqCst);
        }
        fn on_30s(&self) {
            self.ticks_30s.fetch_add(1, Ordering::SeqCst);
        }
        fn on_1min(&self) {
            self.ticks_1min.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_hour_start() {
        let t = Local.with_ymd_and_hms(2024, 3, 1, 14, 37, 25).unwrap();
        let start = Local.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap();
        assert_eq!(hour_start(t), start.timestamp());
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_cadence() {
        let handler = Arc::new(CountingHandler::default());
        let scheduler = TickScheduler::new(handler.clone());
        let task = tokio::spawn(scheduler.run());

        // 61 virtual seconds: the 1 s callback fires 60-61 times, 30 s twice,
        // 1 min once. Exact boundary ordering against the test's own sleep
        // is not pinned down.
        tokio::time::sleep(Duration::from_millis(61_500)).await;
        task.abort();

        let ticks_1s = handler.ticks_1s.load(Ordering::SeqCst);
        assert!((60..=62).contains(&ticks_1s), "1s ticks: {ticks_1s}");
        assert_eq!(handler.ticks_30s.load(Ordering::SeqCst), 2);
        assert_eq!(handler.ticks_1min.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_ticker_does_not_block() {
        // on_1s only spawns the maintenance task; it must return at once.
        let registry = LinkRegistry::new();
        let ticker = MaintenanceTicker::new(registry);
        ticker.on_1s();
        tokio::task::yield_now().await;
    }
}
