//! Session telemetry accumulator
//!
//! Single source of truth for one browsing session's mutable engagement
//! state. The state lives behind one shared cell so every timer callback
//! and event handler operates on the current value, never on a copy
//! captured when the callback was created.

use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::types::{EngagementSession, EngagementSnapshot};

use super::activity::ActivityMonitor;

/// Receives a persistence request after every mutation.
///
/// Implemented by the scheduler; tests substitute a counter.
pub trait FlushSignal: Send + Sync {
    fn request_flush(&self);
}

/// Owns one session's engagement state and applies gated mutations.
///
/// Every operation returns the updated snapshot and signals the scheduler.
/// Side effects are local-memory only until a flush serializes the state.
pub struct TelemetryAccumulator {
    state: Arc<Mutex<EngagementSession>>,
    activity: Arc<ActivityMonitor>,
    flush: Arc<dyn FlushSignal>,
    significant_time_secs: i64,
}

impl TelemetryAccumulator {
    pub fn new(
        state: Arc<Mutex<EngagementSession>>,
        activity: Arc<ActivityMonitor>,
        flush: Arc<dyn FlushSignal>,
        significant_time_secs: i64,
    ) -> Self {
        Self {
            state,
            activity,
            flush,
            significant_time_secs,
        }
    }

    /// Shared handle to the session cell; the scheduler reads it at flush
    /// time.
    pub fn state(&self) -> Arc<Mutex<EngagementSession>> {
        Arc::clone(&self.state)
    }

    /// One-second accrual tick.
    ///
    /// Adds a second of viewing time only while the tab is visible and the
    /// user is active. Latches `viewed_fdd` on the first accrued second and
    /// `spent_significant_time` once the threshold is crossed; neither flag
    /// ever reverts. A gated-out tick mutates nothing and requests no
    /// flush.
    pub fn tick(&self) -> EngagementSnapshot {
        if !self.activity.should_accrue() {
            return self.state.lock().unwrap().snapshot();
        }

        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.time_spent_seconds += 1;
            state.milestones.viewed_fdd = true;
            if state.time_spent_seconds >= self.significant_time_secs {
                state.milestones.spent_significant_time = true;
            }
            state.last_activity = Utc::now();
            state.snapshot()
        };
        self.flush.request_flush();
        snapshot
    }

    /// Record that a disclosure item (e.g., "item7", "item19") was viewed.
    ///
    /// Idempotent: a key already in the set is a no-op.
    pub fn track_item_view(&self, item_key: &str) -> EngagementSnapshot {
        let (snapshot, changed) = {
            let mut state = self.state.lock().unwrap();
            let already = state
                .viewed_items
                .iter()
                .any(|k| k.eq_ignore_ascii_case(item_key));
            if already {
                (state.snapshot(), false)
            } else {
                state.viewed_items.push(item_key.to_string());
                if item_key.eq_ignore_ascii_case("item7") {
                    state.milestones.viewed_item7 = true;
                }
                if item_key.eq_ignore_ascii_case("item19") {
                    state.milestones.viewed_item19 = true;
                }
                state.last_activity = Utc::now();
                (state.snapshot(), true)
            }
        };
        if changed {
            self.flush.request_flush();
        }
        snapshot
    }

    /// Record that a named section was viewed.
    ///
    /// Sections are a set: repeated labels contribute one entry. Labels for
    /// Item 19 / Item 7 latch the corresponding milestones.
    pub fn track_section_viewed(&self, label: &str) -> EngagementSnapshot {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            if !state.sections_viewed.iter().any(|s| s == label) {
                state.sections_viewed.push(label.to_string());
            }
            if label_matches_item(label, 19) {
                state.milestones.viewed_item19 = true;
            }
            if label_matches_item(label, 7) {
                state.milestones.viewed_item7 = true;
            }
            state.last_activity = Utc::now();
            state.snapshot()
        };
        self.flush.request_flush();
        snapshot
    }

    /// Append a question to the session, in ask order.
    pub fn track_question_asked(&self, question: &str) -> EngagementSnapshot {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.questions_asked.push(question.to_string());
            state.milestones.asked_questions = true;
            state.last_activity = Utc::now();
            state.snapshot()
        };
        self.flush.request_flush();
        snapshot
    }

    /// Count a note created while reading.
    pub fn track_note_created(&self) -> EngagementSnapshot {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.notes_created += 1;
            state.milestones.created_notes = true;
            state.last_activity = Utc::now();
            state.snapshot()
        };
        self.flush.request_flush();
        snapshot
    }

    /// Record a document download.
    ///
    /// Always safe to call again; the timestamp is set at most once.
    pub fn track_download(&self) -> EngagementSnapshot {
        let snapshot = {
            let mut state = self.state.lock().unwrap();
            state.downloaded = true;
            if state.downloaded_at.is_none() {
                state.downloaded_at = Some(Utc::now());
            }
            state.last_activity = Utc::now();
            state.snapshot()
        };
        self.flush.request_flush();
        snapshot
    }
}

/// Match a free-text section label against a numbered disclosure item,
/// without letting "Item 7" match "Item 70".
fn label_matches_item(label: &str, item_number: u32) -> bool {
    let label = label.to_lowercase();
    let prefix = format!("item {}", item_number);
    match label.strip_prefix(&prefix) {
        Some(rest) => !rest.starts_with(|c: char| c.is_ascii_digit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSignal {
        count: AtomicUsize,
    }

    impl CountingSignal {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                count: AtomicUsize::new(0),
            })
        }

        fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    impl FlushSignal for CountingSignal {
        fn request_flush(&self) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn accumulator(
        significant_time_secs: i64,
    ) -> (TelemetryAccumulator, Arc<ActivityMonitor>, Arc<CountingSignal>) {
        let state = Arc::new(Mutex::new(EngagementSession::new(
            "s-1",
            "buyer-1",
            "fr-1",
            None,
            Utc::now(),
        )));
        let activity = Arc::new(ActivityMonitor::new(Duration::from_secs(120)));
        let signal = CountingSignal::new();
        let acc = TelemetryAccumulator::new(
            state,
            Arc::clone(&activity),
            signal.clone(),
            significant_time_secs,
        );
        (acc, activity, signal)
    }

    #[test]
    fn tick_accrues_only_when_visible_and_active() {
        let (acc, activity, signal) = accumulator(900);

        let snap = acc.tick();
        assert_eq!(snap.time_spent, 1);
        assert!(snap.viewed_fdd);
        assert_eq!(signal.count(), 1);

        activity.set_page_visible(false);
        let snap = acc.tick();
        assert_eq!(snap.time_spent, 1, "hidden tab must not accrue");
        assert_eq!(signal.count(), 1, "gated tick requests no flush");

        activity.set_page_visible(true);
        let snap = acc.tick();
        assert_eq!(snap.time_spent, 2);
    }

    #[test]
    fn significant_time_latches_at_threshold() {
        let (acc, _activity, _signal) = accumulator(3);

        assert!(!acc.tick().spent_significant_time);
        assert!(!acc.tick().spent_significant_time);
        assert!(acc.tick().spent_significant_time);
        // Latched for good
        assert!(acc.tick().spent_significant_time);
    }

    #[test]
    fn item_view_is_idempotent_and_latches_milestones() {
        let (acc, _activity, signal) = accumulator(900);

        let snap = acc.track_item_view("item19");
        assert_eq!(snap.viewed_items, vec!["item19"]);
        assert!(snap.viewed_item19);
        assert_eq!(signal.count(), 1);

        let snap = acc.track_item_view("item19");
        assert_eq!(snap.viewed_items.len(), 1);
        assert_eq!(signal.count(), 1, "duplicate item view requests no flush");

        let snap = acc.track_item_view("item7");
        assert!(snap.viewed_item7);
        assert_eq!(snap.viewed_items.len(), 2);
    }

    #[test]
    fn section_set_semantics() {
        let (acc, _activity, _signal) = accumulator(900);

        acc.track_section_viewed("Item 19");
        let snap = acc.track_section_viewed("Item 19");
        assert_eq!(snap.sections_viewed.len(), 1);
        assert!(snap.viewed_item19);
    }

    #[test]
    fn section_label_does_not_match_wider_item_numbers() {
        let (acc, _activity, _signal) = accumulator(900);
        let snap = acc.track_section_viewed("Item 17 - Renewal");
        assert!(!snap.viewed_item7, "Item 17 must not latch Item 7");
        assert!(!snap.viewed_item19);
    }

    #[test]
    fn milestones_never_revert() {
        let (acc, activity, _signal) = accumulator(900);

        acc.track_section_viewed("Item 19 - Financial Performance");
        assert!(acc.track_question_asked("what is the royalty?").viewed_item19);

        // A pile of later operations, including gated ticks
        activity.set_page_visible(false);
        acc.tick();
        acc.track_item_view("item12");
        acc.track_note_created();
        let snap = acc.track_download();

        assert!(snap.viewed_item19);
        assert!(snap.asked_questions);
        assert!(snap.created_notes);
    }

    #[test]
    fn download_timestamp_set_once() {
        let (acc, _activity, _signal) = accumulator(900);

        let first = acc.track_download();
        let first_at = first.downloaded_at.unwrap();
        let second = acc.track_download();
        assert!(second.downloaded);
        assert_eq!(second.downloaded_at.unwrap(), first_at);
    }

    #[test]
    fn questions_append_in_order() {
        let (acc, _activity, _signal) = accumulator(900);

        acc.track_question_asked("how much is the franchise fee?");
        let snap = acc.track_question_asked("is my territory protected?");
        assert_eq!(
            snap.questions_asked,
            vec![
                "how much is the franchise fee?".to_string(),
                "is my territory protected?".to_string()
            ]
        );
        assert!(snap.asked_questions);
    }
}
