//! Frame timing.
//!
//! [`FrameClock`] turns wall-clock frame intervals into simulation deltas:
//! oversized gaps (a backgrounded tab, a debugger pause) are clamped, pause
//! freezes simulation time, and a time scale slows or speeds everything up.
//! Simulation time is the sum of the deltas handed out, so it never jumps.
//!
//! # Example
//!
//! ```
//! use backdrop::time::FrameClock;
//!
//! let mut clock = FrameClock::new();
//! clock.set_fixed_delta(Some(1.0 / 60.0));
//!
//! let (elapsed, delta) = clock.tick();
//! assert!((delta - 1.0 / 60.0).abs() < 1e-6);
//! assert_eq!(elapsed, delta);
//! assert_eq!(clock.frame(), 1);
//! ```

use std::time::{Duration, Instant};

use log::warn;

/// Largest delta handed out by default, in seconds.
pub const DEFAULT_MAX_DELTA: f32 = 0.1;

/// Frame timing for the simulation loop.
#[derive(Debug, Clone)]
pub struct FrameClock {
    /// When the last tick happened.
    last_frame: Instant,
    /// Simulation seconds since start.
    elapsed_secs: f32,
    /// Delta handed out by the last tick.
    delta_secs: f32,
    /// Ticks since start.
    frame_count: u64,
    /// Frames per second, refreshed every `fps_update_interval`.
    fps: f32,
    fps_frame_count: u64,
    fps_update_time: Instant,
    fps_update_interval: Duration,
    paused: bool,
    /// Replaces the measured interval when set.
    fixed_delta: Option<f32>,
    /// Multiplier applied after clamping.
    time_scale: f32,
    /// Upper bound on a single raw interval.
    max_delta: f32,
}

impl FrameClock {
    /// A clock starting now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            elapsed_secs: 0.0,
            delta_secs: 0.0,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fps_update_interval: Duration::from_millis(500),
            paused: false,
            fixed_delta: None,
            time_scale: 1.0,
            max_delta: DEFAULT_MAX_DELTA,
        }
    }

    /// Set the clamp applied to raw intervals.
    pub fn with_max_delta(mut self, max_delta: f32) -> Self {
        self.max_delta = max_delta.max(0.0);
        self
    }

    /// Measure the interval since the last tick and advance by it.
    ///
    /// Returns `(elapsed, delta)` in simulation seconds.
    pub fn tick(&mut self) -> (f32, f32) {
        let now = Instant::now();
        let raw = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed >= self.fps_update_interval {
            let frames_since = self.frame_count + 1 - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count + 1;
            self.fps_update_time = now;
        }

        self.advance(raw)
    }

    /// Advance by an explicit raw interval, ignoring the wall clock.
    ///
    /// Applies, in order: pause, fixed delta, clamp, time scale.
    /// Negative and NaN intervals count as zero.
    pub fn advance(&mut self, raw_delta: f32) -> (f32, f32) {
        self.frame_count += 1;

        if self.paused {
            self.delta_secs = 0.0;
            return (self.elapsed_secs, 0.0);
        }

        let mut raw = self.fixed_delta.unwrap_or(raw_delta);
        if raw.is_nan() || raw < 0.0 {
            raw = 0.0;
        }
        if raw > self.max_delta {
            warn!(
                "frame delta {:.3}s exceeds {:.3}s; clamping",
                raw, self.max_delta
            );
            raw = self.max_delta;
        }

        self.delta_secs = raw * self.time_scale;
        self.elapsed_secs += self.delta_secs;
        (self.elapsed_secs, self.delta_secs)
    }

    /// Simulation seconds since start.
    #[inline]
    pub fn elapsed(&self) -> f32 {
        self.elapsed_secs
    }

    /// Delta handed out by the last tick.
    #[inline]
    pub fn delta(&self) -> f32 {
        self.delta_secs
    }

    /// Ticks since start, paused ones included.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame_count
    }

    /// Measured frames per second.
    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    #[inline]
    pub fn time_scale(&self) -> f32 {
        self.time_scale
    }

    #[inline]
    pub fn max_delta(&self) -> f32 {
        self.max_delta
    }

    /// Freeze simulation time. Ticks keep counting frames with zero delta.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume after [`pause`](Self::pause). The paused interval is skipped.
    pub fn resume(&mut self) {
        if self.paused {
            self.last_frame = Instant::now();
            self.paused = false;
        }
    }

    pub fn toggle_pause(&mut self) {
        if self.paused {
            self.resume();
        } else {
            self.pause();
        }
    }

    /// Use a constant interval instead of the measured one. `None` restores
    /// real timing.
    pub fn set_fixed_delta(&mut self, delta: Option<f32>) {
        self.fixed_delta = delta;
    }

    /// Set the time scale multiplier (clamped to be non-negative).
    ///
    /// - `1.0` = normal speed
    /// - `0.5` = half speed
    /// - `2.0` = double speed
    pub fn set_time_scale(&mut self, scale: f32) {
        self.time_scale = scale.max(0.0);
    }

    /// Back to time zero, frame zero, unpaused. Fixed delta, scale and
    /// clamp settings are kept.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.last_frame = now;
        self.elapsed_secs = 0.0;
        self.delta_secs = 0.0;
        self.frame_count = 0;
        self.fps = 0.0;
        self.fps_frame_count = 0;
        self.fps_update_time = now;
        self.paused = false;
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
