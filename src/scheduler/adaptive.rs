use crate::config::Config;
use std::time::Duration;

/// Cumulative work a device has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Throughput {
    pub batches: u64,
    pub pixels: u64,
    pub busy: Duration,
}

impl Throughput {
    pub fn record(&mut self, pixels: usize, elapsed: Duration) {
        self.batches += 1;
        self.pixels += pixels as u64;
        self.busy += elapsed;
    }

    /// Historical pixels per second, if anything was measured.
    pub fn pixels_per_second(&self) -> Option<f64> {
        let secs = self.busy.as_secs_f64();
        if self.batches == 0 || secs == 0.0 {
            return None;
        }
        Some(self.pixels as f64 / secs)
    }
}

/// Sizes each batch so it runs for roughly `target` on its device.
///
/// The first batch of a device has a fixed small size. After that the
/// fragment count follows the device's historical throughput, clamped to
/// `[1, max_fragments]`.
#[derive(Debug, Clone)]
pub struct BatchSizer {
    initial_fragments: usize,
    max_fragments: usize,
    fragment_pixels: usize,
    target: Duration,
}

impl BatchSizer {
    pub fn new(
        initial_fragments: usize,
        max_fragments: usize,
        fragment_pixels: usize,
        target: Duration,
    ) -> Self {
        Self {
            initial_fragments: initial_fragments.max(1),
            max_fragments: max_fragments.max(1),
            fragment_pixels: fragment_pixels.max(1),
            target,
        }
    }

    pub fn target(&self) -> Duration {
        self.target
    }

    pub fn next_fragment_count(&self, history: &Throughput) -> usize {
        if history.batches == 0 {
            return self.initial_fragments.min(self.max_fragments);
        }

        let rate = match history.pixels_per_second() {
            Some(rate) => rate,
            // finished work in no measurable time
            None => return self.max_fragments,
        };

        let wanted = rate * self.target.as_secs_f64() / self.fragment_pixels as f64;
        if !wanted.is_finite() {
            return self.max_fragments;
        }
        (wanted.round() as usize).clamp(1, self.max_fragments)
    }
}

impl From<&Config> for BatchSizer {
    fn from(config: &Config) -> Self {
        Self::new(
            config.initial_fragment_count,
            config.max_fragment_count,
            config.fragment_width * config.fragment_height,
            config.target_batch_duration,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizer() -> BatchSizer {
        BatchSizer::new(1, 1000, 100, Duration::from_millis(50))
    }

    /// Device processing a fixed number of pixels per second plus a fixed
    /// dispatch overhead.
    fn simulate(sizer: &BatchSizer, pixels_per_sec: f64, overhead: Duration, batches: usize) -> Vec<Duration> {
        let mut history = Throughput::default();
        (0..batches)
            .map(|_| {
                let pixels = sizer.next_fragment_count(&history) * sizer.fragment_pixels;
                let elapsed = overhead + Duration::from_secs_f64(pixels as f64 / pixels_per_sec);
                history.record(pixels, elapsed);
                elapsed
            })
            .collect()
    }

    #[test]
    fn test_first_batch_uses_initial_count() {
        assert_eq!(sizer().next_fragment_count(&Throughput::default()), 1);
    }

    #[test]
    fn test_sizing_follows_throughput() {
        let mut history = Throughput::default();
        // 100k pixels/s -> 5000 pixels per 50ms -> 50 fragments
        history.record(1000, Duration::from_millis(10));
        assert_eq!(sizer().next_fragment_count(&history), 50);
    }

    #[test]
    fn test_sizing_is_clamped() {
        let mut fast = Throughput::default();
        fast.record(1_000_000, Duration::from_micros(1));
        assert_eq!(sizer().next_fragment_count(&fast), 1000);

        let mut slow = Throughput::default();
        slow.record(1, Duration::from_secs(10));
        assert_eq!(sizer().next_fragment_count(&slow), 1);

        let mut instant = Throughput::default();
        instant.record(100, Duration::ZERO);
        assert_eq!(sizer().next_fragment_count(&instant), 1000);
    }

    #[test]
    fn test_constant_device_converges() {
        let sizer = sizer();
        let target = sizer.target().as_secs_f64();

        for rate in [20_000.0, 400_000.0, 1_500_000.0] {
            let durations = simulate(&sizer, rate, Duration::ZERO, 10);
            for d in &durations[5..] {
                let ratio = d.as_secs_f64() / target;
                assert!(
                    (0.8..=1.2).contains(&ratio),
                    "rate {}: batch took {:?}",
                    rate,
                    d
                );
            }
        }
    }

    #[test]
    fn test_overhead_does_not_oscillate() {
        let sizer = sizer();
        let durations = simulate(&sizer, 200_000.0, Duration::from_millis(2), 20);

        let tail: Vec<f64> = durations[8..].iter().map(|d| d.as_secs_f64()).collect();
        let spread = tail.iter().cloned().fold(f64::MIN, f64::max)
            - tail.iter().cloned().fold(f64::MAX, f64::min);
        assert!(spread < 0.2 * sizer.target().as_secs_f64());
    }
}
