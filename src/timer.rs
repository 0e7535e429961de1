//! Recurring callbacks for driving the scheduler
//!
//! A [`RecurringTimer`] calls a callback every `interval` until the
//! returned [`TimerHandle`] is cancelled or dropped. Implementations must
//! never run the same callback concurrently with itself.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error};

pub type TimerCallback = Box<dyn FnMut() + Send>;

pub trait RecurringTimer: Send + Sync {
    fn schedule_recurring(&self, interval: Duration, callback: TimerCallback) -> TimerHandle;
}

/// Cancels its recurring callback when cancelled or dropped
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    fn new() -> (Self, Arc<AtomicBool>) {
        let cancelled = Arc::new(AtomicBool::new(false));
        (
            Self {
                cancelled: Arc::clone(&cancelled),
            },
            cancelled,
        )
    }

    pub fn cancel(self) {
        // Drop does the work
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// One background thread per recurring callback, paced against deadlines
/// so sleep overshoot does not accumulate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadTimer;

impl RecurringTimer for ThreadTimer {
    fn schedule_recurring(&self, interval: Duration, mut callback: TimerCallback) -> TimerHandle {
        let (handle, cancelled) = TimerHandle::new();

        let spawned = thread::Builder::new()
            .name("drome-timer".into())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                loop {
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    }
                    if cancelled.load(Ordering::SeqCst) {
                        break;
                    }
                    if catch_unwind(AssertUnwindSafe(&mut callback)).is_err() {
                        error!("Timer callback panicked; still polling");
                    }
                    deadline += interval;
                }
                debug!("Timer thread exiting");
            });
        if let Err(e) = spawned {
            error!("Failed to spawn timer thread: {}", e);
        }

        handle
    }
}

struct ManualEntry {
    cancelled: Arc<AtomicBool>,
    callback: Arc<Mutex<TimerCallback>>,
}

/// Timer whose callbacks run only when [`ManualTimer::fire`] is called.
/// Clones share the same callback list.
#[derive(Clone, Default)]
pub struct ManualTimer {
    entries: Arc<Mutex<Vec<ManualEntry>>>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every live callback once, in registration order
    pub fn fire(&self) {
        let callbacks: Vec<_> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.retain(|e| !e.cancelled.load(Ordering::SeqCst));
            entries.iter().map(|e| Arc::clone(&e.callback)).collect()
        };

        for callback in callbacks {
            let mut callback = callback.lock().unwrap_or_else(PoisonError::into_inner);
            (*callback)();
        }
    }

    /// Number of callbacks not yet cancelled
    pub fn active(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| !e.cancelled.load(Ordering::SeqCst))
            .count()
    }
}

impl RecurringTimer for ManualTimer {
    fn schedule_recurring(&self, _interval: Duration, callback: TimerCallback) -> TimerHandle {
        let (handle, cancelled) = TimerHandle::new();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ManualEntry {
                cancelled,
                callback: Arc::new(Mutex::new(callback)),
            });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_manual_timer_fires_until_cancelled() {
        let timer = ManualTimer::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        let handle = timer.schedule_recurring(
            Duration::from_millis(100),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        timer.fire();
        timer.fire();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(timer.active(), 1);

        handle.cancel();
        timer.fire();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(timer.active(), 0);
    }

    #[test]
    fn test_thread_timer_runs_and_stops() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        let handle = ThreadTimer.schedule_recurring(
            Duration::from_millis(5),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        thread::sleep(Duration::from_millis(60));
        drop(handle);
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 1, "timer never fired");

        thread::sleep(Duration::from_millis(30));
        // At most one callback may have been past its cancel check
        assert!(count.load(Ordering::SeqCst) <= seen + 1);
    }

    #[test]
    fn test_thread_timer_survives_panicking_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        let handle = ThreadTimer.schedule_recurring(
            Duration::from_millis(5),
            Box::new(move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first poll failed");
                }
            }),
        );
        thread::sleep(Duration::from_millis(80));
        drop(handle);
        assert!(count.load(Ordering::SeqCst) >= 2, "polling stopped after the panic");
    }
}
