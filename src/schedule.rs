//! Periodic callback scheduling
//!
//! The level monitor and the session clock never touch timers directly; they
//! ask a [`Scheduler`] for a [`Ticker`] and await it. Production code uses
//! [`TokioScheduler`]; tests drive time by hand with [`ManualScheduler`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// A stream of periodic wakeups
#[async_trait::async_trait]
pub trait Ticker: Send {
    /// Wait for the next period to elapse.
    ///
    /// Returns `false` once the scheduler has gone away and no more ticks
    /// will ever be delivered.
    async fn tick(&mut self) -> bool;
}

/// Source of periodic tickers
pub trait Scheduler: Send + Sync {
    /// Create a ticker that fires every `period`, first firing one period from now.
    ///
    /// `label` identifies the consumer (e.g. "countdown", "level") for logging
    /// and for manual drivers.
    fn every(&self, label: &'static str, period: Duration) -> Box<dyn Ticker>;
}

/// Scheduler backed by the tokio timer wheel
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TokioScheduler {
    pub fn shared() -> Arc<dyn Scheduler> {
        Arc::new(TokioScheduler)
    }
}

impl Scheduler for TokioScheduler {
    fn every(&self, label: &'static str, period: Duration) -> Box<dyn Ticker> {
        debug!("Scheduling '{}' every {:?}", label, period);

        let mut interval = time::interval_at(Instant::now() + period, period);
        // A stalled runtime must not replay a burst of countdown ticks
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Box::new(IntervalTicker { interval })
    }
}

struct IntervalTicker {
    interval: Interval,
}

#[async_trait::async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) -> bool {
        self.interval.tick().await;
        true
    }
}

/// Virtual scheduler: ticks happen only when [`ManualScheduler::fire`] is called
#[derive(Default)]
pub struct ManualScheduler {
    tickers: Mutex<Vec<(&'static str, mpsc::UnboundedSender<()>)>>,
}

impl ManualScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Deliver one tick to every live ticker registered under `label`.
    ///
    /// Returns how many tickers received it. Tickers whose consumer has gone
    /// away are pruned.
    pub fn fire(&self, label: &str) -> usize {
        let mut tickers = self.tickers.lock().unwrap_or_else(PoisonError::into_inner);
        tickers.retain(|(_, tx)| !tx.is_closed());

        tickers
            .iter()
            .filter(|(l, _)| *l == label)
            .filter(|(_, tx)| tx.send(()).is_ok())
            .count()
    }

    /// Number of live tickers registered under `label`.
    pub fn tickers(&self, label: &str) -> usize {
        let tickers = self.tickers.lock().unwrap_or_else(PoisonError::into_inner);
        tickers
            .iter()
            .filter(|(l, tx)| *l == label && !tx.is_closed())
            .count()
    }
}

impl Scheduler for ManualScheduler {
    fn every(&self, label: &'static str, _period: Duration) -> Box<dyn Ticker> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.tickers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((label, tx));

        Box::new(ManualTicker { rx })
    }
}

struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

#[async_trait::async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}
