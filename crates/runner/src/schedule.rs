//! Config polling and debounced magnifier restarts

use std::time::{Duration, Instant};

/// How often the config file's modification time is checked
pub const CONFIG_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Quiet period after the last config change before the child restarts
pub const RESTART_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub struct ReloadSchedule {
    next_poll: Instant,
    restart_at: Option<Instant>,
}

impl ReloadSchedule {
    pub fn new(now: Instant) -> Self {
        Self {
            next_poll: now + CONFIG_POLL_INTERVAL,
            restart_at: None,
        }
    }

    /// True once per interval
    pub fn poll_due(&mut self, now: Instant) -> bool {
        if now < self.next_poll {
            return false;
        }
        self.next_poll = now + CONFIG_POLL_INTERVAL;
        true
    }

    /// (Re)arm the restart; a later change pushes it back
    pub fn schedule_restart(&mut self, now: Instant) {
        self.restart_at = Some(now + RESTART_DEBOUNCE);
    }

    #[cfg(test)]
    pub fn restart_pending(&self) -> bool {
        self.restart_at.is_some()
    }

    /// True once when the debounce has elapsed
    pub fn restart_due(&mut self, now: Instant) -> bool {
        match self.restart_at {
            Some(at) if now >= at => {
                self.restart_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn next_deadline(&self) -> Instant {
        match self.restart_at {
            Some(at) => at.min(self.next_poll),
            None => self.next_poll,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_once_per_interval() {
        let start = Instant::now();
        let mut schedule = ReloadSchedule::new(start);

        assert!(!schedule.poll_due(start));
        assert!(schedule.poll_due(start + CONFIG_POLL_INTERVAL));
        assert!(!schedule.poll_due(start + CONFIG_POLL_INTERVAL));
        assert_eq!(schedule.next_deadline(), start + CONFIG_POLL_INTERVAL * 2);
    }

    #[test]
    fn test_restart_is_debounced() {
        let start = Instant::now();
        let mut schedule = ReloadSchedule::new(start);

        schedule.schedule_restart(start);
        // Second edit 300ms later pushes the restart back
        let second = start + Duration::from_millis(300);
        schedule.schedule_restart(second);

        assert!(!schedule.restart_due(start + RESTART_DEBOUNCE));
        assert!(schedule.restart_pending());
        assert!(schedule.restart_due(second + RESTART_DEBOUNCE));
        assert!(!schedule.restart_pending());
        assert!(!schedule.restart_due(second + RESTART_DEBOUNCE * 2));
    }

    #[test]
    fn test_deadline_is_earliest_timer() {
        let start = Instant::now();
        let mut schedule = ReloadSchedule::new(start);
        assert_eq!(schedule.next_deadline(), start + CONFIG_POLL_INTERVAL);

        let later = start + Duration::from_millis(400);
        schedule.schedule_restart(later);
        assert_eq!(schedule.next_deadline(), start + CONFIG_POLL_INTERVAL);

        assert!(schedule.poll_due(start + CONFIG_POLL_INTERVAL));
        assert_eq!(schedule.next_deadline(), later + RESTART_DEBOUNCE);
    }
}
