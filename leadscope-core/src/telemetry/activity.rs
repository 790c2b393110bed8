//! User activity and page visibility observation
//!
//! Classifies the user as active/idle and the tab as visible/hidden,
//! independent of any business logic. The accumulator consults these flags;
//! this module never touches telemetry state itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Platform input events that count as user activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    PointerMove,
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
}

/// Observes input and visibility signals and derives two read-only flags.
///
/// `is_user_active` is recomputed by a periodic idle sweep (every 10 s by
/// default): the user counts as idle once no input arrived within the idle
/// threshold. Visibility changes apply immediately, with no debounce.
pub struct ActivityMonitor {
    last_input: Mutex<Instant>,
    page_visible: AtomicBool,
    user_active: AtomicBool,
    idle_threshold: Duration,
}

impl ActivityMonitor {
    /// Create a monitor; the user starts active and the page visible.
    pub fn new(idle_threshold: Duration) -> Self {
        Self {
            last_input: Mutex::new(Instant::now()),
            page_visible: AtomicBool::new(true),
            user_active: AtomicBool::new(true),
            idle_threshold,
        }
    }

    /// Record an input event. Only the timestamp moves; the active flag is
    /// recomputed at the next idle sweep.
    pub fn record_input(&self, _event: InputEvent) {
        *self.last_input.lock().unwrap() = Instant::now();
    }

    /// Apply a platform visibility change directly.
    pub fn set_page_visible(&self, visible: bool) {
        let was = self.page_visible.swap(visible, Ordering::SeqCst);
        if was != visible {
            tracing::debug!(visible, "Page visibility changed");
        }
    }

    /// Run one idle sweep; returns the resulting active flag.
    pub fn check_idle(&self) -> bool {
        let elapsed = self.last_input.lock().unwrap().elapsed();
        let active = elapsed < self.idle_threshold;
        let was = self.user_active.swap(active, Ordering::SeqCst);
        if was != active {
            tracing::debug!(active, elapsed_secs = elapsed.as_secs(), "User activity changed");
        }
        active
    }

    pub fn is_page_visible(&self) -> bool {
        self.page_visible.load(Ordering::SeqCst)
    }

    pub fn is_user_active(&self) -> bool {
        self.user_active.load(Ordering::SeqCst)
    }

    /// Time only accrues while the tab is visible and the user is active.
    pub fn should_accrue(&self) -> bool {
        self.is_page_visible() && self.is_user_active()
    }

    #[cfg(test)]
    fn backdate_last_input(&self, by: Duration) {
        *self.last_input.lock().unwrap() = Instant::now() - by;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_visible_and_active() {
        let monitor = ActivityMonitor::new(Duration::from_secs(120));
        assert!(monitor.is_page_visible());
        assert!(monitor.is_user_active());
        assert!(monitor.should_accrue());
    }

    #[test]
    fn idle_sweep_flags_inactivity() {
        let monitor = ActivityMonitor::new(Duration::from_secs(120));
        monitor.backdate_last_input(Duration::from_secs(121));
        assert!(!monitor.check_idle());
        assert!(!monitor.is_user_active());
        assert!(!monitor.should_accrue());
    }

    #[test]
    fn input_restores_activity_at_next_sweep() {
        let monitor = ActivityMonitor::new(Duration::from_secs(120));
        monitor.backdate_last_input(Duration::from_secs(500));
        monitor.check_idle();
        assert!(!monitor.is_user_active());

        // The flag does not flip until the sweep runs again
        monitor.record_input(InputEvent::PointerMove);
        assert!(!monitor.is_user_active());
        assert!(monitor.check_idle());
        assert!(monitor.is_user_active());
    }

    #[test]
    fn visibility_applies_immediately() {
        let monitor = ActivityMonitor::new(Duration::from_secs(120));
        monitor.set_page_visible(false);
        assert!(!monitor.is_page_visible());
        assert!(!monitor.should_accrue());
        monitor.set_page_visible(true);
        assert!(monitor.should_accrue());
    }

    #[test]
    fn just_under_threshold_is_still_active() {
        let monitor = ActivityMonitor::new(Duration::from_secs(120));
        monitor.backdate_last_input(Duration::from_secs(119));
        assert!(monitor.check_idle());
    }
}
