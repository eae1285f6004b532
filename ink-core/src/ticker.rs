use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Cancellable periodic task.
///
/// Each callback runs while holding the ticker's gate, and [`Ticker::cancel`]
/// takes the same gate. Once `cancel` returns, no callback is running and none
/// will run, even if a tick was already due. A callback that wants to stop its
/// own ticker returns `ControlFlow::Break` instead of calling `cancel`.
///
/// Dropping a ticker aborts the task without waiting for a callback that is
/// already running.
pub struct Ticker {
    gate: Arc<Mutex<bool>>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Spawns the task on the current tokio runtime. The first tick fires one
    /// full `period` after spawning.
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let gate = Arc::new(Mutex::new(false));
        let task_gate = gate.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let mut cancelled = lock_gate(&task_gate);
                if *cancelled {
                    break;
                }
                if on_tick().is_break() {
                    *cancelled = true;
                    break;
                }
            }
        });

        Self { gate, handle }
    }

    /// Stops the task. Blocks while a callback is running, so it must never be
    /// called from inside this ticker's own callback.
    pub fn cancel(&self) {
        *lock_gate(&self.gate) = true;
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        *lock_gate(&self.gate) || self.handle.is_finished()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        if let Ok(mut cancelled) = self.gate.try_lock() {
            *cancelled = true;
        }
        self.handle.abort();
    }
}

fn lock_gate(gate: &Mutex<bool>) -> MutexGuard<'_, bool> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_ticker(period: Duration) -> (Ticker, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let task_count = count.clone();
        let ticker = Ticker::spawn(period, move || {
            task_count.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });
        (ticker, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let (ticker, count) = counting_ticker(Duration::from_millis(100));

        time::sleep(Duration::from_millis(350)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        ticker.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_ticks_after_cancel() {
        let (ticker, count) = counting_ticker(Duration::from_millis(100));

        time::sleep(Duration::from_millis(250)).await;
        ticker.cancel();
        let seen = count.load(Ordering::SeqCst);

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
        assert!(ticker.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_first_tick() {
        let (ticker, count) = counting_ticker(Duration::from_millis(100));
        ticker.cancel();

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_stops_the_ticker() {
        let count = Arc::new(AtomicUsize::new(0));
        let task_count = count.clone();
        let ticker = Ticker::spawn(Duration::from_millis(10), move || {
            if task_count.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(ticker.is_cancelled());
    }
}
