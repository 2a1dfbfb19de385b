//! Wall-clock timing for animation and frame-rate reporting.

use std::time::{Duration, Instant};

/// Measures time since start-up and counts frames between reports.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    report_start: Instant,
    frames_since_report: u32,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            report_start: now,
            frames_since_report: 0,
        }
    }

    /// Seconds since the timer was created. Drives time-based animation.
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Mark the end of a frame and return the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.frames_since_report += 1;
        delta
    }

    /// Frames per second over the last `interval`, or `None` if the interval
    /// has not elapsed yet. Resets the counter when it reports.
    pub fn fps_report(&mut self, interval: Duration) -> Option<f32> {
        let window = self.last_tick.saturating_duration_since(self.report_start);
        if window < interval || window.is_zero() {
            return None;
        }
        let fps = self.frames_since_report as f32 / window.as_secs_f32();
        self.report_start = self.last_tick;
        self.frames_since_report = 0;
        Some(fps)
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_report_waits_for_interval() {
        let mut timer = Timer::new();
        timer.tick();
        assert!(timer.fps_report(Duration::from_secs(3600)).is_none());
    }

    #[test]
    fn test_fps_report_resets_counter() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(5));
        timer.tick();
        timer.tick();

        let fps = timer.fps_report(Duration::from_millis(1)).unwrap();
        assert!(fps > 0.0);
        assert_eq!(timer.frames_since_report, 0);
    }

    #[test]
    fn test_elapsed_is_monotonic() {
        let timer = Timer::new();
        let a = timer.elapsed_secs();
        let b = timer.elapsed_secs();
        assert!(b >= a);
    }
}
