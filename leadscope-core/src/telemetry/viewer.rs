//! Viewer telemetry lifecycle
//!
//! Wires the monitor, accumulator, scheduler, and transports together for
//! one viewer mount and drives the timers: the one-second accrual tick,
//! the ten-second idle sweep, and the periodic flush backstop. The timers
//! interleave freely; all of them read the shared session cell at fire
//! time, so none of them can observe or publish stale state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::{IngestConfig, TelemetryConfig};
use crate::error::Result;
use crate::types::{EngagementSession, EngagementSnapshot};

use super::accumulator::TelemetryAccumulator;
use super::activity::{ActivityMonitor, InputEvent};
use super::scheduler::PersistenceScheduler;
use super::transport::{spawn_forwarder, HttpBeacon, IngestClient};

/// Running telemetry for one viewer session.
///
/// One instance exclusively owns its session state; a reload that reuses
/// the persisted `session_id` resumes the same logical session because the
/// ingestion merge is cumulative.
pub struct ViewerTelemetry {
    session_id: String,
    accumulator: Arc<TelemetryAccumulator>,
    activity: Arc<ActivityMonitor>,
    scheduler: Arc<PersistenceScheduler>,
    tasks: Vec<JoinHandle<()>>,
}

impl ViewerTelemetry {
    /// Start telemetry for a viewer mount.
    ///
    /// Pass the stored `session_id` to resume a session across reloads, or
    /// `None` to mint a fresh one.
    pub fn start(
        telemetry: &TelemetryConfig,
        ingest: &IngestConfig,
        subject_id: &str,
        franchise_id: &str,
        franchise_slug: Option<String>,
        session_id: Option<String>,
    ) -> Result<Self> {
        let session_id =
            session_id.unwrap_or_else(|| format!("session-{}", Uuid::new_v4()));

        let state = Arc::new(Mutex::new(EngagementSession::new(
            session_id.clone(),
            subject_id,
            franchise_id,
            franchise_slug,
            Utc::now(),
        )));

        let activity = Arc::new(ActivityMonitor::new(Duration::from_secs(
            telemetry.idle_threshold_secs,
        )));

        let client = Arc::new(IngestClient::new(ingest)?);
        let beacon = Arc::new(HttpBeacon::new(ingest)?);

        let (scheduler, rx) = PersistenceScheduler::new(
            Arc::clone(&state),
            beacon,
            Duration::from_secs(telemetry.debounce_secs),
        );
        let scheduler = Arc::new(scheduler);

        let flush: Arc<dyn super::accumulator::FlushSignal> = scheduler.clone();
        let accumulator = Arc::new(TelemetryAccumulator::new(
            state,
            Arc::clone(&activity),
            flush,
            telemetry.significant_time_secs as i64,
        ));

        let mut tasks = Vec::new();
        tasks.push(spawn_forwarder(client, rx));
        tasks.push(Self::spawn_tick(
            Arc::clone(&accumulator),
            Duration::from_secs(telemetry.tick_secs),
        ));
        tasks.push(Self::spawn_idle_sweep(
            Arc::clone(&activity),
            Duration::from_secs(telemetry.idle_check_secs),
        ));
        tasks.push(
            scheduler.spawn_periodic(Duration::from_secs(telemetry.periodic_flush_secs)),
        );

        tracing::info!(session_id = %session_id, franchise_id, "Viewer telemetry started");

        Ok(Self {
            session_id,
            accumulator,
            activity,
            scheduler,
            tasks,
        })
    }

    fn spawn_tick(accumulator: Arc<TelemetryAccumulator>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                accumulator.tick();
            }
        })
    }

    fn spawn_idle_sweep(activity: Arc<ActivityMonitor>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                activity.check_idle();
            }
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Forward a platform input event to the activity monitor.
    pub fn on_input(&self, event: InputEvent) {
        self.activity.record_input(event);
    }

    /// Forward a platform visibility change; going hidden also flushes.
    pub fn on_visibility_changed(&self, visible: bool) {
        self.activity.set_page_visible(visible);
        if !visible {
            self.scheduler.on_visibility_hidden();
        }
    }

    pub fn track_item_view(&self, item_key: &str) -> EngagementSnapshot {
        self.accumulator.track_item_view(item_key)
    }

    pub fn track_section_viewed(&self, label: &str) -> EngagementSnapshot {
        self.accumulator.track_section_viewed(label)
    }

    pub fn track_question_asked(&self, question: &str) -> EngagementSnapshot {
        self.accumulator.track_question_asked(question)
    }

    pub fn track_note_created(&self) -> EngagementSnapshot {
        self.accumulator.track_note_created()
    }

    pub fn track_download(&self) -> EngagementSnapshot {
        self.accumulator.track_download()
    }

    /// Current cumulative state.
    pub fn snapshot(&self) -> EngagementSnapshot {
        self.accumulator.state().lock().unwrap().snapshot()
    }

    /// Page teardown: stop the timers and hand the final state to the
    /// beacon. Does not wait for delivery.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        self.scheduler.on_unload();
        tracing::info!(session_id = %self.session_id, "Viewer telemetry stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest_config() -> IngestConfig {
        IngestConfig {
            // Nothing listens here; flush failures are logged and dropped,
            // which is exactly the contract under test.
            server_url: Some("http://127.0.0.1:1".to_string()),
            api_key: None,
            timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn start_track_and_shutdown() {
        let telemetry = TelemetryConfig::default();
        let viewer = ViewerTelemetry::start(
            &telemetry,
            &ingest_config(),
            "buyer-1",
            "fr-1",
            Some("drybar".to_string()),
            None,
        )
        .unwrap();

        assert!(viewer.session_id().starts_with("session-"));

        viewer.track_section_viewed("Item 19 - Financial Performance");
        viewer.track_item_view("item19");
        viewer.track_question_asked("what does a unit gross?");

        let snap = viewer.snapshot();
        assert!(snap.viewed_item19);
        assert!(snap.asked_questions);
        assert_eq!(snap.sections_viewed.len(), 1);

        viewer.shutdown();
    }

    #[tokio::test]
    async fn session_id_is_reused_when_provided() {
        let telemetry = TelemetryConfig::default();
        let viewer = ViewerTelemetry::start(
            &telemetry,
            &ingest_config(),
            "buyer-1",
            "fr-1",
            None,
            Some("session-persisted".to_string()),
        )
        .unwrap();
        assert_eq!(viewer.session_id(), "session-persisted");
        viewer.shutdown();
    }
}
