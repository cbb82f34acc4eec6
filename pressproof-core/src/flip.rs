//! Timed transition between adjacent spreads.
//!
//! The animator is a clock-injected state machine: callers pass `Instant`s in
//! and the event loop acts as the timer, so completion is deterministic and
//! cancellation is an explicit state reset on every exit path. At most one
//! deadline is live at a time; a request while a flip is active is rejected,
//! not queued.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;

pub const DEFAULT_FLIP_DURATION: Duration = Duration::from_millis(500);

const EASING_STEPS: usize = 32;

// Cubic ease-in-out sampled once per process. Inert when no flip runs; there
// is no teardown.
static FLIP_EASING: Lazy<[f32; EASING_STEPS + 1]> = Lazy::new(|| {
    let mut table = [0.0f32; EASING_STEPS + 1];
    for (i, slot) in table.iter_mut().enumerate() {
        let t = i as f32 / EASING_STEPS as f32;
        *slot = if t < 0.5 {
            4.0 * t * t * t
        } else {
            1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
        };
    }
    table
});

/// Maps linear progress in `[0, 1]` onto the process-wide easing table.
pub fn eased_progress(linear: f32) -> f32 {
    let clamped = linear.clamp(0.0, 1.0);
    let scaled = clamped * EASING_STEPS as f32;
    let index = (scaled.floor() as usize).min(EASING_STEPS - 1);
    let fraction = scaled - index as f32;
    let table = &*FLIP_EASING;
    table[index] + (table[index + 1] - table[index]) * fraction
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipDirection {
    Next,
    Prev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipState {
    Idle,
    Flipping(FlipDirection),
}

#[derive(Debug)]
pub struct FlipAnimator {
    state: FlipState,
    started: Option<Instant>,
    duration: Duration,
}

impl FlipAnimator {
    pub fn new(duration: Duration) -> Self {
        Self {
            state: FlipState::Idle,
            started: None,
            duration,
        }
    }

    pub fn state(&self) -> FlipState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != FlipState::Idle
    }

    /// Starts a flip. Rejected while another flip is active.
    pub fn request(&mut self, direction: FlipDirection, now: Instant) -> bool {
        if self.is_active() {
            return false;
        }
        self.state = FlipState::Flipping(direction);
        self.started = Some(now);
        true
    }

    /// Completes the flip once its deadline has passed, returning the
    /// direction so the caller can advance the spread index.
    pub fn tick(&mut self, now: Instant) -> Option<FlipDirection> {
        let FlipState::Flipping(direction) = self.state else {
            return None;
        };
        let started = self.started?;
        if now.duration_since(started) < self.duration {
            return None;
        }
        self.cancel();
        Some(direction)
    }

    /// Eased animation progress in `[0, 1]` while a flip is running.
    pub fn progress(&self, now: Instant) -> Option<f32> {
        if !self.is_active() {
            return None;
        }
        let started = self.started?;
        let elapsed = now.duration_since(started).as_secs_f32();
        let total = self.duration.as_secs_f32().max(f32::EPSILON);
        Some(eased_progress(elapsed / total))
    }

    /// Drops the pending deadline without mutating anything else. Called on
    /// completion, document change and teardown.
    pub fn cancel(&mut self) {
        self.state = FlipState::Idle;
        self.started = None;
    }
}

impl Default for FlipAnimator {
    fn default() -> Self {
        Self::new(DEFAULT_FLIP_DURATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flip_completes_only_after_its_duration() {
        let mut animator = FlipAnimator::new(Duration::from_millis(500));
        let start = Instant::now();
        assert!(animator.request(FlipDirection::Next, start));

        assert_eq!(animator.tick(start + Duration::from_millis(200)), None);
        assert!(animator.is_active());
        assert_eq!(
            animator.tick(start + Duration::from_millis(500)),
            Some(FlipDirection::Next)
        );
        assert!(!animator.is_active());
    }

    #[test]
    fn second_request_while_active_is_rejected() {
        let mut animator = FlipAnimator::default();
        let start = Instant::now();
        assert!(animator.request(FlipDirection::Next, start));
        assert!(!animator.request(FlipDirection::Next, start + Duration::from_millis(10)));
        assert!(!animator.request(FlipDirection::Prev, start + Duration::from_millis(10)));
        assert_eq!(animator.state(), FlipState::Flipping(FlipDirection::Next));
    }

    #[test]
    fn cancel_clears_the_pending_deadline() {
        let mut animator = FlipAnimator::default();
        let start = Instant::now();
        animator.request(FlipDirection::Prev, start);
        animator.cancel();
        assert_eq!(animator.tick(start + Duration::from_secs(5)), None);
        assert!(animator.request(FlipDirection::Next, start));
    }

    #[test]
    fn progress_is_monotonic_and_bounded() {
        let mut animator = FlipAnimator::new(Duration::from_millis(400));
        let start = Instant::now();
        animator.request(FlipDirection::Next, start);

        let mut last = -1.0f32;
        for ms in [0u64, 100, 200, 300, 400] {
            let p = animator
                .progress(start + Duration::from_millis(ms))
                .expect("active flip has progress");
            assert!((0.0..=1.0).contains(&p));
            assert!(p >= last);
            last = p;
        }
    }

    #[test]
    fn easing_table_covers_both_endpoints() {
        assert!(eased_progress(0.0).abs() < 1e-4);
        assert!((eased_progress(1.0) - 1.0).abs() < 1e-4);
        assert!((eased_progress(0.5) - 0.5).abs() < 1e-2);
    }
}
