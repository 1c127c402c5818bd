//! Adaptive frame pacing for the capture loop

use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Lowest rate the controller backs off to
pub const FPS_FLOOR: u32 = 15;
/// Step applied on every adaptation
pub const FPS_STEP: u32 = 5;
/// Number of overrun durations averaged
pub const WINDOW_LEN: usize = 10;

/// Mean above this slows the loop down (30 fps)
const SLOW_DOWN_ABOVE: Duration = Duration::from_nanos(1_000_000_000 / 30);
/// Mean below this lets the loop speed back up (50 fps)
const SPEED_UP_BELOW: Duration = Duration::from_millis(1000 / 50);

/// Tracks the current frame rate against the configured target.
///
/// `floor ≤ current_fps ≤ target_fps` holds after every update, where
/// `floor = min(15, target_fps)`.
#[derive(Debug, Clone)]
pub struct FpsController {
    target_fps: u32,
    current_fps: u32,
    window: VecDeque<Duration>,
}

impl FpsController {
    pub fn new(target_fps: u32) -> Self {
        let target_fps = target_fps.max(1);
        Self {
            target_fps,
            current_fps: target_fps,
            window: VecDeque::with_capacity(WINDOW_LEN),
        }
    }

    pub fn target_fps(&self) -> u32 {
        self.target_fps
    }

    pub fn current_fps(&self) -> u32 {
        self.current_fps
    }

    fn floor(&self) -> u32 {
        FPS_FLOOR.min(self.target_fps)
    }

    /// Time one iteration may take at the current rate
    pub fn frame_budget(&self) -> Duration {
        Duration::from_secs(1) / self.current_fps
    }

    /// Account for one finished iteration.
    ///
    /// Returns how long to sleep to hold the cadence, or `None` after an
    /// overrun, in which case the overrun is recorded and the rate adapted.
    pub fn finish_frame(&mut self, elapsed: Duration) -> Option<Duration> {
        let budget = self.frame_budget();
        if elapsed < budget {
            return Some(budget - elapsed);
        }
        self.record_overrun(elapsed);
        None
    }

    /// Push an overrun duration and re-evaluate the rate from the window mean
    pub fn record_overrun(&mut self, elapsed: Duration) {
        if self.window.len() == WINDOW_LEN {
            self.window.pop_front();
        }
        self.window.push_back(elapsed);

        let mean = self.window.iter().sum::<Duration>() / self.window.len() as u32;
        let before = self.current_fps;
        if mean > SLOW_DOWN_ABOVE {
            self.current_fps = self.current_fps.saturating_sub(FPS_STEP).max(self.floor());
        } else if mean < SPEED_UP_BELOW && self.current_fps < self.target_fps {
            self.current_fps = (self.current_fps + FPS_STEP).min(self.target_fps);
        }

        if before != self.current_fps {
            debug!(
                "Adapted capture rate {} -> {} fps (mean frame {:.1} ms)",
                before,
                self.current_fps,
                mean.as_secs_f64() * 1000.0
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fast_frame_sleeps_remainder() {
        let mut fps = FpsController::new(50);
        let sleep = fps.finish_frame(Duration::from_millis(5)).unwrap();
        assert_eq!(sleep, Duration::from_millis(15));
        assert_eq!(fps.current_fps(), 50);
    }

    #[test]
    fn test_sustained_overload_steps_down_to_floor() {
        let mut fps = FpsController::new(60);
        assert!(fps.finish_frame(Duration::from_millis(80)).is_none());
        assert_eq!(fps.current_fps(), 55);

        // 80 ms overruns even the 15 fps budget
        for _ in 0..20 {
            assert!(fps.finish_frame(Duration::from_millis(80)).is_none());
        }
        assert_eq!(fps.current_fps(), 15);
    }

    #[test]
    fn test_forty_ms_frames_settle_at_twenty() {
        let mut fps = FpsController::new(60);
        assert!(fps.finish_frame(Duration::from_millis(40)).is_none());
        assert_eq!(fps.current_fps(), 55);

        for _ in 0..20 {
            fps.finish_frame(Duration::from_millis(40));
        }
        // 40 ms fits the 50 ms budget at 20 fps, so adaptation stops
        assert_eq!(fps.current_fps(), 20);
        assert_eq!(
            fps.finish_frame(Duration::from_millis(40)),
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn test_single_spike_is_damped_by_window() {
        let mut fps = FpsController::new(60);
        // Drop to 55 first so 18.5 ms counts as an overrun
        fps.finish_frame(Duration::from_millis(40));
        for _ in 0..9 {
            fps.record_overrun(Duration::from_micros(18_500));
        }
        // mean = (40 + 9*18.5)/10 = 20.65 ms: inside the hysteresis band
        assert_eq!(fps.current_fps(), 55);
    }

    #[test]
    fn test_headroom_recovers_to_target() {
        let mut fps = FpsController::new(60);
        fps.record_overrun(Duration::from_millis(40));
        assert_eq!(fps.current_fps(), 55);

        for _ in 0..20 {
            fps.record_overrun(Duration::from_millis(5));
        }
        assert_eq!(fps.current_fps(), 60);
    }

    #[test]
    fn test_low_target_never_exceeded() {
        let mut fps = FpsController::new(10);
        fps.record_overrun(Duration::from_millis(200));
        assert_eq!(fps.current_fps(), 10);
    }

    proptest! {
        #[test]
        fn prop_rate_stays_within_bounds(
            target in 1u32..240,
            durations in proptest::collection::vec(0u64..200_000, 0..200),
        ) {
            let mut fps = FpsController::new(target);
            let floor = FPS_FLOOR.min(target);
            for micros in durations {
                fps.finish_frame(Duration::from_micros(micros));
                prop_assert!(fps.current_fps() >= floor);
                prop_assert!(fps.current_fps() <= target);
            }
        }
    }
}
