//! Periodic tick sources for the countdown and playback progress loops.
//!
//! Both loops take their tickers from an injected [`TickSource`]. Production
//! code uses [`IntervalTickSource`]; tests drive time with [`ManualClock`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{Instant, Interval, MissedTickBehavior};

/// A stream of evenly spaced ticks.
#[async_trait]
pub trait Ticker: Send {
    /// Resolves at the next tick.
    async fn tick(&mut self);
}

/// Factory for tickers.
pub trait TickSource: Send + Sync {
    fn ticker(&self, period: Duration) -> Box<dyn Ticker>;
}

//
// ─── REAL TIME ─────────────────────────────────────────────────────────────────
//

/// Wall-clock ticks backed by `tokio::time::interval`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntervalTickSource;

impl TickSource for IntervalTickSource {
    fn ticker(&self, period: Duration) -> Box<dyn Ticker> {
        Box::new(IntervalTicker {
            first: Instant::now() + period,
            period,
            interval: None,
        })
    }
}

struct IntervalTicker {
    first: Instant,
    period: Duration,
    interval: Option<Interval>,
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval_at(self.first, self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
    }
}

//
// ─── MANUAL ────────────────────────────────────────────────────────────────────
//

const MANUAL_TICK_BUFFER: usize = 1024;

/// Deterministic fake clock.
///
/// `advance(n)` releases exactly `n` ticks to every ticker created from this
/// clock, whatever period the ticker asked for.
#[derive(Debug, Clone)]
pub struct ManualClock {
    ticks: broadcast::Sender<()>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        let (ticks, _) = broadcast::channel(MANUAL_TICK_BUFFER);
        Self { ticks }
    }

    pub fn advance(&self, ticks: u32) {
        for _ in 0..ticks {
            // No live tickers is fine: nobody is waiting on time.
            let _ = self.ticks.send(());
        }
    }

    /// Number of tickers still alive. Zero once every loop has been torn down.
    #[must_use]
    pub fn live_tickers(&self) -> usize {
        self.ticks.receiver_count()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for ManualClock {
    fn ticker(&self, _period: Duration) -> Box<dyn Ticker> {
        Box::new(ManualTicker {
            rx: self.ticks.subscribe(),
            owed: 0,
        })
    }
}

struct ManualTicker {
    rx: broadcast::Receiver<()>,
    owed: u64,
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        if self.owed > 0 {
            self.owed -= 1;
            return;
        }
        match self.rx.recv().await {
            Ok(()) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                self.owed = skipped.saturating_sub(1);
            }
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_ticks_reach_every_ticker() {
        let clock = ManualClock::new();
        let mut a = clock.ticker(Duration::from_secs(1));
        let mut b = clock.ticker(Duration::from_millis(250));
        assert_eq!(clock.live_tickers(), 2);

        clock.advance(2);
        a.tick().await;
        a.tick().await;
        b.tick().await;
        b.tick().await;
    }

    #[tokio::test]
    async fn dropped_tickers_are_not_counted() {
        let clock = ManualClock::new();
        let ticker = clock.ticker(Duration::from_secs(1));
        drop(ticker);
        assert_eq!(clock.live_tickers(), 0);
        clock.advance(3);
    }

    #[tokio::test]
    async fn ticks_before_subscription_are_not_seen() {
        let clock = ManualClock::new();
        clock.advance(1);
        let mut ticker = clock.ticker(Duration::from_secs(1));
        let pending = tokio::time::timeout(Duration::from_millis(20), ticker.tick()).await;
        assert!(pending.is_err());
    }
}
