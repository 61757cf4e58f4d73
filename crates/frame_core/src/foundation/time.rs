//! Time management utilities

use std::time::Instant;

/// High-precision timer for frame timing
pub struct Timer {
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Update the timer (should be called once per frame)
    pub fn update(&mut self) -> f32 {
        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
        self.delta_time
    }

    /// Forget time spent while rendering was paused
    pub fn resume(&mut self) {
        self.last_frame = Instant::now();
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total elapsed time since timer creation
    pub fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

/// Counts frames and reports once per accumulated second
#[derive(Debug, Default)]
pub struct FpsCounter {
    accumulated: f64,
    frames: u32,
}

impl FpsCounter {
    /// Record one frame that took `delta_seconds`.
    ///
    /// Returns the number of frames in the window that just closed, if any.
    pub fn tick(&mut self, delta_seconds: f64) -> Option<u32> {
        self.accumulated += delta_seconds;
        self.frames += 1;
        if self.accumulated >= 1.0 {
            let fps = self.frames;
            self.accumulated = 0.0;
            self.frames = 0;
            Some(fps)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_reports_once_per_second() {
        let mut fps = FpsCounter::default();
        for _ in 0..59 {
            assert_eq!(fps.tick(1.0 / 60.0), None);
        }
        assert_eq!(fps.tick(1.0 / 60.0 + 1e-9), Some(60));
        assert_eq!(fps.tick(0.5), None);
    }

    #[test]
    fn timer_counts_frames() {
        let mut timer = Timer::new();
        let dt = timer.update();
        assert!(dt >= 0.0);
        timer.update();
        assert_eq!(timer.frame_count(), 2);
        assert!(timer.total_time() >= timer.delta_time());
    }
}
