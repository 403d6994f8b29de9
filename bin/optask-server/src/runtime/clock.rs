use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// The single polling cadence shared by the task runner's cancellation
/// checks and the progress publisher's event stream.
#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    period: Duration,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(MIN_PERIOD),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// A fresh interval.  Its first tick completes immediately.
    ///
    /// Slow consumers are not compensated with bursts: a late tick pushes the
    /// following ones back.
    pub fn start(&self) -> Interval {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}
