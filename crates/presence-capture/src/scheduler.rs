//! Timer primitives the capture session schedules against.
//!
//! The session never touches a clock directly, so tests can drive it with a
//! paused tokio clock or with a scheduler of their own. Cancelling a timer is
//! dropping it.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};

/// A repeating timer.
#[allow(async_fn_in_trait)]
pub trait Ticker {
    /// Wait for the next period to elapse.
    async fn tick(&mut self);
}

pub trait Scheduler {
    type Ticker: Ticker;
    type Deadline: Future<Output = ()>;

    /// Repeating timer whose first tick is one `period` from now.
    fn repeating(&self, period: Duration) -> Self::Ticker;

    /// One-shot timer firing `delay` from now.
    fn once(&self, delay: Duration) -> Self::Deadline;
}

/// Scheduler backed by the tokio timer wheel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

pub struct TokioTicker(Interval);

impl Ticker for TokioTicker {
    async fn tick(&mut self) {
        self.0.tick().await;
    }
}

impl Scheduler for TokioScheduler {
    type Ticker = TokioTicker;
    type Deadline = Sleep;

    fn repeating(&self, period: Duration) -> TokioTicker {
        let mut interval = time::interval_at(Instant::now() + period, period);
        // A slow capture pushes the next tick back instead of bunching ticks up
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        TokioTicker(interval)
    }

    fn once(&self, delay: Duration) -> Sleep {
        time::sleep(delay)
    }
}
