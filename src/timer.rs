//! Per-room turn countdown (C4).
//!
//! Grounded in the pack's `lexi_wars::engine::run_game_loop`, which uses
//! exactly this `tokio::select! { sleep(1s) vs notified() }` shape for its
//! own countdown. Here the `Notify` is used purely as a cancel/reset signal
//! rather than "turn advanced"; the driver owns its own 1s cadence.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// A per-room countdown that ticks every second, calling back on every tick
/// and once on expiry. Safe to `stop()` more than once.
pub struct TurnTimer {
    inner: Arc<Inner>,
    driver: std::sync::Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    time_left: AtomicU64,
    /// Generation counter: bumped on every `start`/`reset`/`stop` so a
    /// stale driver from a prior `start` recognizes it's been superseded
    /// and exits without firing `on_expired`.
    generation: AtomicU64,
    stopped: AtomicBool,
    cancel: Notify,
}

impl Default for TurnTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnTimer {
    pub fn new() -> Self {
        TurnTimer {
            inner: Arc::new(Inner {
                time_left: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                stopped: AtomicBool::new(true),
                cancel: Notify::new(),
            }),
            driver: std::sync::Mutex::new(None),
        }
    }

    /// Starts a fresh countdown of `seconds`, spawning the driver task.
    /// Any previously running driver is invalidated (it will observe a
    /// generation mismatch and exit quietly).
    pub fn start<Tick, Expired>(&self, seconds: u64, on_tick: Tick, on_expired: Expired)
    where
        Tick: Fn(u64) + Send + Sync + 'static,
        Expired: FnOnce() + Send + 'static,
    {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.time_left.store(seconds, Ordering::SeqCst);
        self.inner.stopped.store(false, Ordering::SeqCst);

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            run_driver(inner, generation, seconds, on_tick, on_expired).await;
        });

        if let Some(old) = self.driver.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    /// Resets `time_left` to `timeLimit` without respawning the driver;
    /// implemented as restarting with the same callbacks would require
    /// storing them, so instead callers restart through [`Self::start`]
    /// with the full time limit. Rooms call this whenever a word is
    /// accepted, re-invoking `start` with the settings' time limit.
    pub fn reset<Tick, Expired>(&self, seconds: u64, on_tick: Tick, on_expired: Expired)
    where
        Tick: Fn(u64) + Send + Sync + 'static,
        Expired: FnOnce() + Send + 'static,
    {
        self.start(seconds, on_tick, on_expired);
    }

    /// Idempotent: cancels the driver if one is running. Safe to call any
    /// number of times, including when no timer was ever started.
    pub fn stop(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.cancel.notify_waiters();
        if let Some(handle) = self.driver.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// The current countdown value, observable without blocking.
    pub fn time_left(&self) -> u64 {
        self.inner.time_left.load(Ordering::SeqCst)
    }
}

async fn run_driver<Tick, Expired>(
    inner: Arc<Inner>,
    generation: u64,
    seconds: u64,
    on_tick: Tick,
    on_expired: Expired,
) where
    Tick: Fn(u64) + Send + Sync + 'static,
    Expired: FnOnce() + Send + 'static,
{
    let mut left = seconds;
    on_tick(left);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            _ = inner.cancel.notified() => return,
        }

        if inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        if inner.stopped.load(Ordering::SeqCst) {
            return;
        }

        left = left.saturating_sub(1);
        inner.time_left.store(left, Ordering::SeqCst);
        on_tick(left);

        if left == 0 {
            inner.stopped.store(true, Ordering::SeqCst);
            on_expired();
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration as StdDuration;

    #[tokio::test(start_paused = true)]
    async fn expires_after_time_limit_and_calls_expired_once() {
        let timer = Arc::new(TurnTimer::new());
        let ticks = Arc::new(AtomicU32::new(0));
        let expired = Arc::new(AtomicU32::new(0));

        let ticks2 = Arc::clone(&ticks);
        let expired2 = Arc::clone(&expired);
        timer.start(
            2,
            move |_left| {
                ticks2.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                expired2.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::advance(StdDuration::from_secs(3)).await;
        tokio::task::yield_now().await;

        assert_eq!(expired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn double_stop_is_safe() {
        let timer = TurnTimer::new();
        timer.start(5, |_| {}, || {});
        timer.stop();
        timer.stop();
    }

    #[tokio::test]
    async fn time_left_observable_immediately_after_start() {
        let timer = TurnTimer::new();
        timer.start(7, |_| {}, || {});
        assert_eq!(timer.time_left(), 7);
        timer.stop();
    }
}
