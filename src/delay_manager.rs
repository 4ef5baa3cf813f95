use std::thread;
use std::time::Duration;

use log::info;
use rand::Rng;

/// Randomised pause between network-facing steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacer {
    min_secs: f64,
    max_secs: f64,
}

impl Pacer {
    /// Bounds are in seconds; reversed or negative bounds are clamped.
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        let min_secs = min_secs.max(0.0);
        let max_secs = max_secs.max(0.0);
        if min_secs <= max_secs {
            Pacer { min_secs, max_secs }
        } else {
            Pacer { min_secs: max_secs, max_secs: min_secs }
        }
    }

    pub fn from_wait_time((min, max): (f64, f64)) -> Self {
        Pacer::new(min, max)
    }

    pub fn next_delay(&self) -> Duration {
        let mut rng = rand::thread_rng();
        let secs = rng.gen_range(self.min_secs..=self.max_secs);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    pub fn pause(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        info!("Waiting for {:.2} seconds (pacing delay)...", delay.as_secs_f64());
        thread::sleep(delay);
    }
}
