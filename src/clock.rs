//! One-per-second countdown for a recording task

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::schedule::Scheduler;

/// Scheduler label used by countdown tickers
pub const COUNTDOWN_TICKER: &str = "countdown";

const SECOND: Duration = Duration::from_secs(1);

/// Event delivered by an armed clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClockEvent {
    /// One second elapsed
    Tick { remaining: u32 },
    /// Countdown reached zero; delivered exactly once, last
    Expired,
}

/// Countdown progress
///
/// `armed == false` means idle: never armed, or cancelled before expiry.
/// An expired countdown stays armed with `remaining_seconds == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CountdownState {
    pub remaining_seconds: u32,
    pub armed: bool,
}

impl CountdownState {
    pub fn is_expired(&self) -> bool {
        self.armed && self.remaining_seconds == 0
    }
}

struct Countdown {
    state: CountdownState,
    /// No further events once set
    cancelled: bool,
    /// `Expired` has been delivered
    expired: bool,
}

/// Countdown timer factory
pub struct SessionClock {
    scheduler: Arc<dyn Scheduler>,
}

impl SessionClock {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Start counting down from `duration_seconds`.
    ///
    /// `on_event` receives one `Tick` per second (remaining `n-1` down to `0`)
    /// followed by a single `Expired`. `arm(0)` delivers only `Expired`.
    /// Events are always delivered from the clock task, never from inside
    /// `arm` itself.
    pub fn arm<F>(&self, duration_seconds: u32, mut on_event: F) -> ClockHandle
    where
        F: FnMut(ClockEvent) + Send + 'static,
    {
        info!("Arming countdown: {}s", duration_seconds);

        let countdown = Arc::new(Mutex::new(Countdown {
            state: CountdownState {
                remaining_seconds: duration_seconds,
                armed: true,
            },
            cancelled: false,
            expired: false,
        }));
        let shared = Arc::clone(&countdown);

        let mut ticker = (duration_seconds > 0).then(|| self.scheduler.every(COUNTDOWN_TICKER, SECOND));

        let task = tokio::spawn(async move {
            if let Some(ticker) = ticker.as_mut() {
                loop {
                    if !ticker.tick().await {
                        debug!("Countdown scheduler went away");
                        return;
                    }

                    let remaining = {
                        let mut countdown = lock(&shared);
                        if countdown.cancelled {
                            return;
                        }
                        let state = &mut countdown.state;
                        state.remaining_seconds = state.remaining_seconds.saturating_sub(1);
                        state.remaining_seconds
                    };
                    on_event(ClockEvent::Tick { remaining });

                    if remaining == 0 {
                        break;
                    }
                }
            }

            {
                let mut countdown = lock(&shared);
                if countdown.cancelled || countdown.expired {
                    return;
                }
                countdown.expired = true;
            }
            info!("Countdown expired");
            on_event(ClockEvent::Expired);
        });

        ClockHandle {
            task: Some(task),
            countdown,
        }
    }

    /// Stop a countdown at whatever value it has reached. Idempotent.
    pub fn cancel(&self, handle: &mut ClockHandle) {
        handle.cancel();
    }
}

/// An armed countdown; cancels itself on drop
pub struct ClockHandle {
    task: Option<JoinHandle<()>>,
    countdown: Arc<Mutex<Countdown>>,
}

impl ClockHandle {
    pub fn state(&self) -> CountdownState {
        lock(&self.countdown).state
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.state().remaining_seconds
    }

    /// No-op after expiry or a previous cancel
    pub fn cancel(&mut self) {
        let stopped = {
            let mut countdown = lock(&self.countdown);
            let pending = !countdown.cancelled && !countdown.expired;
            countdown.cancelled = true;
            if !countdown.expired {
                countdown.state.armed = false;
            }
            pending
        };
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if stopped {
            debug!("Countdown cancelled");
        }
    }
}

impl Drop for ClockHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(countdown: &Mutex<Countdown>) -> MutexGuard<'_, Countdown> {
    countdown.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Render seconds as `m:ss`
pub fn format_remaining(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(0), "0:00");
        assert_eq!(format_remaining(9), "0:09");
        assert_eq!(format_remaining(60), "1:00");
        assert_eq!(format_remaining(125), "2:05");
    }
}
