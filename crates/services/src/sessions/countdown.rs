use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::TimerError;
use crate::ticks::TickSource;

/// Callback delivered by the countdown, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Tick { remaining: u32 },
    Finished,
}

/// Cancellable countdown running on its own task.
///
/// Events are consumed through [`CountdownTimer::next_event`] by a single
/// owner. Once `cancel` returns, `next_event` yields `None` forever, even for
/// events the task had already queued.
#[derive(Debug)]
pub struct CountdownTimer {
    total: u32,
    remaining: u32,
    events: mpsc::UnboundedReceiver<TimerEvent>,
    task: Option<JoinHandle<()>>,
    finished: bool,
    cancelled: bool,
}

impl CountdownTimer {
    /// Start counting down `total_seconds` of wall time, woken every `period`.
    ///
    /// # Errors
    ///
    /// Returns `TimerError::InvalidDuration` when `total_seconds` is zero and
    /// `TimerError::ZeroPeriod` for a zero `period`.
    pub fn start(
        total_seconds: u32,
        period: Duration,
        ticks: &dyn TickSource,
    ) -> Result<Self, TimerError> {
        if total_seconds == 0 {
            return Err(TimerError::InvalidDuration {
                seconds: total_seconds,
            });
        }
        if period.is_zero() {
            return Err(TimerError::ZeroPeriod);
        }

        let (tx, events) = mpsc::unbounded_channel();
        let mut ticker = ticks.ticker(period);
        let total = Duration::from_secs(u64::from(total_seconds));
        let task = tokio::spawn(async move {
            let mut elapsed = Duration::ZERO;
            let mut reported = total_seconds;
            while elapsed < total {
                ticker.tick().await;
                elapsed += period;
                let remaining = seconds_left(total, elapsed);
                // Sub-second periods only report whole-second changes.
                if remaining == reported {
                    continue;
                }
                reported = remaining;
                if tx.send(TimerEvent::Tick { remaining }).is_err() {
                    return;
                }
            }
            let _ = tx.send(TimerEvent::Finished);
        });

        debug!(total_seconds, period_ms = period.as_millis(), "countdown started");
        Ok(Self {
            total: total_seconds,
            remaining: total_seconds,
            events,
            task: Some(task),
            finished: false,
            cancelled: false,
        })
    }

    #[must_use]
    pub fn total_seconds(&self) -> u32 {
        self.total
    }

    /// Seconds left as of the last consumed tick.
    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.finished && !self.cancelled
    }

    /// Next tick or the final `Finished`; `None` after finish or cancel.
    pub async fn next_event(&mut self) -> Option<TimerEvent> {
        if !self.is_active() {
            return None;
        }
        let event = self.events.recv().await?;
        Some(self.observe(event))
    }

    /// An event that is already queued, without waiting for the next one.
    pub fn try_next_event(&mut self) -> Option<TimerEvent> {
        if !self.is_active() {
            return None;
        }
        let event = self.events.try_recv().ok()?;
        Some(self.observe(event))
    }

    fn observe(&mut self, event: TimerEvent) -> TimerEvent {
        match event {
            TimerEvent::Tick { remaining } => {
                self.remaining = remaining.min(self.remaining);
            }
            TimerEvent::Finished => {
                self.remaining = 0;
                self.finished = true;
            }
        }
        event
    }

    /// Stop the countdown and wait for its task to be gone. Idempotent.
    pub async fn cancel(&mut self) {
        self.cancelled = true;
        self.events.close();
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            debug!(remaining = self.remaining, "countdown cancelled");
        }
    }
}

/// Whole seconds left, rounded up so the last partial second still shows.
fn seconds_left(total: Duration, elapsed: Duration) -> u32 {
    let left = total.saturating_sub(elapsed);
    let whole = left.as_secs() + u64::from(left.subsec_nanos() > 0);
    u32::try_from(whole).unwrap_or(u32::MAX)
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
