use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// Periodic check timer that can be paused, reconfigured, or switched off
/// for the rest of the process lifetime.
///
/// Every (re)start waits a full period before the first tick.
#[derive(Debug)]
pub(crate) struct RefreshTimer {
    period: Option<Duration>,
    interval: Option<Interval>,
    paused: bool,
    suppressed: bool,
}

impl RefreshTimer {
    pub(crate) fn new(period: Option<Duration>) -> Self {
        let mut timer = Self {
            period,
            interval: None,
            paused: false,
            suppressed: false,
        };
        timer.restart();
        timer
    }

    fn restart(&mut self) {
        self.interval = match self.period {
            Some(period) if !self.paused && !self.suppressed => {
                let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                Some(interval)
            }
            _ => None,
        };
    }

    pub(crate) fn set_period(&mut self, period: Option<Duration>) {
        if self.period != period {
            self.period = period;
            self.restart();
        }
    }

    pub(crate) fn pause(&mut self) {
        self.paused = true;
        self.interval = None;
    }

    pub(crate) fn resume(&mut self) {
        if self.paused {
            self.paused = false;
            self.restart();
        }
    }

    /// Stop for good; later `resume` and `set_period` calls have no effect.
    pub(crate) fn suppress(&mut self) {
        self.suppressed = true;
        self.interval = None;
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick. Pends forever while the timer is not running.
    pub(crate) async fn tick(&mut self) {
        match &mut self.interval {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
