//! Per-key resettable timers
//!
//! [`Debouncer::arm`] schedules a callback `delay` after the call. Arming a
//! key that already has a pending timer pushes its deadline out to
//! `now + delay` and replaces the callback, so a burst of arms ending at
//! `tN` fires exactly once, no earlier than `tN + delay`.
//!
//! One tokio task per pending key sleeps until the deadline and re-checks
//! it on wake-up. Timing uses `tokio::time`, so tests can pause the clock.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

type Callback = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

struct Timer {
    deadline: Instant,
    generation: u64,
    on_fire: Callback,
}

#[derive(Default)]
struct Timers {
    pending: HashMap<String, Timer>,
    generation: u64,
}

/// Debounce scheduler keyed by string
#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    timers: Arc<Mutex<Timers>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            timers: Arc::new(Mutex::new(Timers::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm (or re-arm) the timer for `key`
    ///
    /// # Returns
    ///
    /// `true` if a new timer was started, `false` if a pending one was reset
    pub fn arm<F, Fut>(&self, key: &str, on_fire: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let deadline = Instant::now() + self.delay;
        let on_fire: Callback = Box::new(move || Box::pin(on_fire()));

        let mut timers = self.lock();
        if let Some(timer) = timers.pending.get_mut(key) {
            timer.deadline = deadline;
            timer.on_fire = on_fire;
            tracing::trace!("Debounce timer for {} reset", key);
            return false;
        }

        timers.generation += 1;
        let generation = timers.generation;
        timers.pending.insert(
            key.to_string(),
            Timer {
                deadline,
                generation,
                on_fire,
            },
        );
        drop(timers);

        tokio::spawn(self.clone().run(key.to_string(), generation, deadline));
        true
    }

    /// Drop a pending timer without firing it
    pub fn cancel(&self, key: &str) -> bool {
        self.lock().pending.remove(key).is_some()
    }

    pub fn is_armed(&self, key: &str) -> bool {
        self.lock().pending.contains_key(key)
    }

    /// Number of pending timers
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    async fn run(self, key: String, generation: u64, mut deadline: Instant) {
        loop {
            tokio::time::sleep_until(deadline).await;

            let fire = {
                let mut timers = self.lock();
                let state = timers.pending.get(&key).map(|t| (t.generation, t.deadline));
                match state {
                    // cancelled, or replaced by a newer timer
                    None => return,
                    Some((current, _)) if current != generation => return,
                    Some((_, pushed)) if pushed > Instant::now() => {
                        deadline = pushed;
                        None
                    }
                    Some(_) => timers.pending.remove(&key).map(|t| t.on_fire),
                }
            };

            if let Some(on_fire) = fire {
                tracing::debug!("Debounce timer for {} fired", key);
                on_fire().await;
                return;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timers> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_callback(count: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let count = Arc::clone(count);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_after_last_arm() {
        let debouncer = Debouncer::new(Duration::from_secs(10));
        let fired = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        assert!(debouncer.arm("z1", counter_callback(&fired)));
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_secs(3)).await;
            assert!(!debouncer.arm("z1", counter_callback(&fired)));
        }
        let last_arm = Instant::now();
        assert_eq!(last_arm - start, Duration::from_secs(12));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_armed("z1"));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let debouncer = Debouncer::new(Duration::from_secs(5));
        let fired = Arc::new(AtomicUsize::new(0));

        debouncer.arm("z1", counter_callback(&fired));
        debouncer.arm("z2", counter_callback(&fired));
        assert_eq!(debouncer.pending(), 2);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(debouncer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_then_rearm() {
        let debouncer = Debouncer::new(Duration::from_secs(5));
        let fired = Arc::new(AtomicUsize::new(0));

        debouncer.arm("z1", counter_callback(&fired));
        assert!(debouncer.cancel("z1"));
        tokio::time::sleep(Duration::from_secs(2)).await;
        debouncer.arm("z1", counter_callback(&fired));

        // the first timer's deadline passes without firing
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
