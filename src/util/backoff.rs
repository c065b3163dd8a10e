//! Backoff for the scheduler's polling loop.

use std::hint::spin_loop;
use std::thread;
use std::time::Duration;

/// Escalating wait used while every device is busy and nothing completed.
///
/// Spins first, since a batch that is about to finish is cheaper to catch
/// by spinning, then yields, then sleeps in growing steps up to
/// [`MAX_SLEEP`](Self::MAX_SLEEP).
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const SPIN_LIMIT: u32 = 6;
    const YIELD_LIMIT: u32 = 10;
    pub const MAX_SLEEP: Duration = Duration::from_micros(200);

    pub fn new() -> Self {
        Self::default()
    }

    /// Something progressed; start over at the cheapest wait.
    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Wait once, escalating with every call since the last reset.
    pub fn snooze(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                spin_loop();
            }
        } else if self.step <= Self::YIELD_LIMIT {
            thread::yield_now();
        } else {
            thread::sleep(self.sleep_duration());
        }

        self.step = self.step.saturating_add(1);
    }

    /// Whether the backoff has reached the sleeping phase.
    pub fn is_sleeping(&self) -> bool {
        self.step > Self::YIELD_LIMIT
    }

    fn sleep_duration(&self) -> Duration {
        let exp = self.step.saturating_sub(Self::YIELD_LIMIT).min(8);
        Duration::from_micros(1u64 << exp).min(Self::MAX_SLEEP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let mut backoff = Backoff::new();
        assert!(!backoff.is_sleeping());

        for _ in 0..12 {
            backoff.snooze();
        }
        assert!(backoff.is_sleeping());

        backoff.reset();
        assert!(!backoff.is_sleeping());
    }

    #[test]
    fn test_sleep_is_capped() {
        let mut backoff = Backoff::new();
        for _ in 0..30 {
            backoff.snooze();
        }
        assert_eq!(backoff.sleep_duration(), Backoff::MAX_SLEEP);
    }
}
