//! Window-based admission control for transport calls
//!
//! Time is cut into one-second windows. A window opens at the first
//! admission after the previous one expired and admits at most `limit`
//! call units. Work that would overflow the window waits for it to close.
//! A full window's worth of calls may go out back to back at its start.

use std::time::Duration;

use smsgate_common::internal;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub(crate) struct Throttle {
    limit: usize,
    used: usize,
    window_started: Option<Instant>,
}

impl Throttle {
    pub(crate) fn new(calls_per_second: u32) -> Self {
        Self {
            limit: usize::try_from(calls_per_second).unwrap_or(usize::MAX),
            used: 0,
            window_started: None,
        }
    }

    /// Wait until `units` call units fit in the current window, then charge them.
    ///
    /// A request larger than the whole limit is admitted on its own into an
    /// empty window rather than waiting forever.
    pub(crate) async fn admit(&mut self, units: usize) {
        let now = Instant::now();
        let window_end = match self.window_started {
            Some(started) if now < started + WINDOW => started + WINDOW,
            _ => self.open_window(now),
        };

        if self.used > 0 && self.used.saturating_add(units) > self.limit {
            internal!(
                level = DEBUG,
                used = self.used,
                limit = self.limit,
                units,
                "Call budget for this second spent, waiting for the next window"
            );
            tokio::time::sleep_until(window_end).await;
            self.open_window(Instant::now());
        }

        self.used = self.used.saturating_add(units);
    }

    fn open_window(&mut self, now: Instant) -> Instant {
        self.window_started = Some(now);
        self.used = 0;
        now + WINDOW
    }

    #[cfg(test)]
    const fn used(&self) -> usize {
        self.used
    }
}
