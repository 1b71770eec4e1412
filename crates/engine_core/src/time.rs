//! Frame timing.
//!
//! [`FrameClock`] measures frame starts against a monotonic clock and hands
//! out a [`FrameTime`] per frame. [`limiter_delay`] computes how long the
//! driving loop sleeps to honour a maximum loop frequency.

use std::time::{Duration, Instant};

/// Frame-global timing, valid for the duration of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    /// Zero-based index of the frame.
    pub frame: u64,
    /// Seconds elapsed since the previous frame started.
    pub delta_time: f32,
    /// Seconds elapsed since the clock was (re)started.
    pub elapsed: f32,
}

/// Monotonic clock driving [`FrameTime`].
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    frame_start: Duration,
    next_frame: u64,
}

impl FrameClock {
    /// Create a clock starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frame_start: Duration::ZERO,
            next_frame: 0,
        }
    }

    /// Restart the clock. The next frame has a delta close to zero.
    pub fn restart(&mut self) {
        self.start = Instant::now();
        self.frame_start = Duration::ZERO;
    }

    /// Mark the start of a new frame and return its timing.
    pub fn tick(&mut self) -> FrameTime {
        let now = self.start.elapsed();
        let delta = now.saturating_sub(self.frame_start);
        self.frame_start = now;

        let time = FrameTime {
            frame: self.next_frame,
            delta_time: delta.as_secs_f32(),
            elapsed: now.as_secs_f32(),
        };
        self.next_frame += 1;
        time
    }

    /// Time spent in the current frame so far.
    #[must_use]
    pub fn frame_elapsed(&self) -> Duration {
        self.start.elapsed().saturating_sub(self.frame_start)
    }

    /// Number of frames started since the clock was created.
    #[must_use]
    pub fn frames(&self) -> u64 {
        self.next_frame
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

/// How long to sleep after a frame that took `frame_elapsed`, given a cap of
/// `max_loops_per_second` frames per second.
///
/// Returns `None` when the cap is disabled (`0`, negative, or not finite) or
/// the frame already used its whole budget.
#[must_use]
pub fn limiter_delay(max_loops_per_second: f32, frame_elapsed: Duration) -> Option<Duration> {
    if !max_loops_per_second.is_finite() || max_loops_per_second <= 0.0 {
        return None;
    }
    let budget = Duration::from_secs_f64(1.0 / f64::from(max_loops_per_second));
    budget
        .checked_sub(frame_elapsed)
        .filter(|wait| !wait.is_zero())
}
