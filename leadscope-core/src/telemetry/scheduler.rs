//! Persistence scheduling
//!
//! Decides when the current session state is serialized and handed to the
//! transports, balancing freshness against write volume:
//!
//! - every mutation (re)starts a short debounce timer; a burst of
//!   mutations collapses into one flush
//! - an independent periodic timer flushes unconditionally, as a backstop
//!   against a debounce that keeps being retriggered (the one-second
//!   accrual tick does exactly that while the user reads)
//! - the tab going hidden flushes immediately
//! - page unload hands the final state to the fire-and-forget beacon
//!
//! Every path serializes the state *at fire time* by locking the shared
//! session cell, so a flush scheduled before several more mutations still
//! carries all of them. Ordering across paths is not guaranteed at the
//! server, which is why ingestion merges commutatively instead of trusting
//! last-write-wins.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::MissedTickBehavior;

use crate::types::{EngagementSession, EngagementSnapshot};

use super::accumulator::FlushSignal;
use super::transport::FireAndForgetSink;

/// Which path produced a flush; carried for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Debounce,
    Periodic,
    Hidden,
    Unmount,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlushTrigger::Debounce => "debounce",
            FlushTrigger::Periodic => "periodic",
            FlushTrigger::Hidden => "hidden",
            FlushTrigger::Unmount => "unmount",
        };
        write!(f, "{}", s)
    }
}

/// A snapshot queued for delivery to the ingestion endpoint.
#[derive(Debug)]
pub struct FlushRequest {
    pub snapshot: EngagementSnapshot,
    pub trigger: FlushTrigger,
}

/// Schedules snapshot delivery for one viewer session.
pub struct PersistenceScheduler {
    state: Arc<Mutex<EngagementSession>>,
    tx: UnboundedSender<FlushRequest>,
    beacon: Arc<dyn FireAndForgetSink>,
    debounce: Duration,
    pending: Mutex<Option<AbortHandle>>,
}

impl PersistenceScheduler {
    /// Create a scheduler; the returned receiver feeds the transport
    /// forwarder.
    pub fn new(
        state: Arc<Mutex<EngagementSession>>,
        beacon: Arc<dyn FireAndForgetSink>,
        debounce: Duration,
    ) -> (Self, UnboundedReceiver<FlushRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state,
                tx,
                beacon,
                debounce,
                pending: Mutex::new(None),
            },
            rx,
        )
    }

    /// Queue a flush of the current state right now.
    pub fn flush_now(&self, trigger: FlushTrigger) {
        let snapshot = self.state.lock().unwrap().snapshot();
        if self.tx.send(FlushRequest { snapshot, trigger }).is_err() {
            tracing::warn!(%trigger, "Flush dropped: transport forwarder is gone");
        }
    }

    /// The tab became hidden: flush immediately, best-effort.
    pub fn on_visibility_hidden(&self) {
        self.flush_now(FlushTrigger::Hidden);
    }

    /// Page teardown: cancel the debounce and hand the final state to the
    /// beacon. Nothing awaits the outcome.
    pub fn on_unload(&self) {
        if let Some(handle) = self.pending.lock().unwrap().take() {
            handle.abort();
        }
        let snapshot = self.state.lock().unwrap().snapshot();
        match serde_json::to_vec(&snapshot) {
            Ok(body) => self.beacon.send(body),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize unload snapshot"),
        }
    }

    /// Start the periodic backstop flush.
    pub fn spawn_periodic(&self, period: Duration) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval yields immediately on the first tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let snapshot = state.lock().unwrap().snapshot();
                let request = FlushRequest {
                    snapshot,
                    trigger: FlushTrigger::Periodic,
                };
                if tx.send(request).is_err() {
                    break;
                }
            }
        })
    }

    /// Abort a pending debounce without flushing.
    pub fn cancel_pending(&self) {
        if let Some(handle) = self.pending.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl FlushSignal for PersistenceScheduler {
    /// (Re)start the debounce timer. A pending timer is cancelled, never
    /// raced; when the timer fires it serializes whatever the state is by
    /// then.
    fn request_flush(&self) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let state = Arc::clone(&self.state);
        let tx = self.tx.clone();
        let debounce = self.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let snapshot = state.lock().unwrap().snapshot();
            let request = FlushRequest {
                snapshot,
                trigger: FlushTrigger::Debounce,
            };
            if tx.send(request).is_err() {
                tracing::warn!("Debounced flush dropped: transport forwarder is gone");
            }
        });
        *pending = Some(task.abort_handle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct RecordingBeacon {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingBeacon {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    impl FireAndForgetSink for RecordingBeacon {
        fn send(&self, body: Vec<u8>) {
            self.sent.lock().unwrap().push(body);
        }
    }

    fn session_cell() -> Arc<Mutex<EngagementSession>> {
        Arc::new(Mutex::new(EngagementSession::new(
            "s-1",
            "buyer-1",
            "fr-1",
            None,
            Utc::now(),
        )))
    }

    fn drain(rx: &mut UnboundedReceiver<FlushRequest>) -> Vec<FlushRequest> {
        let mut out = Vec::new();
        while let Ok(req) = rx.try_recv() {
            out.push(req);
        }
        out
    }

    #[tokio::test]
    async fn debounce_collapses_bursts_and_reads_current_state() {
        let state = session_cell();
        let beacon = RecordingBeacon::new();
        let (scheduler, mut rx) =
            PersistenceScheduler::new(Arc::clone(&state), beacon, Duration::from_millis(50));

        scheduler.request_flush();
        scheduler.request_flush();
        scheduler.request_flush();

        // Mutate after scheduling; the flush must carry this, not the
        // state at schedule time.
        state.lock().unwrap().time_spent_seconds = 42;

        tokio::time::sleep(Duration::from_millis(150)).await;
        let requests = drain(&mut rx);
        assert_eq!(requests.len(), 1, "burst must collapse to one flush");
        assert_eq!(requests[0].trigger, FlushTrigger::Debounce);
        assert_eq!(requests[0].snapshot.time_spent, 42);
    }

    #[tokio::test]
    async fn new_mutation_restarts_the_timer() {
        let state = session_cell();
        let beacon = RecordingBeacon::new();
        let (scheduler, mut rx) =
            PersistenceScheduler::new(Arc::clone(&state), beacon, Duration::from_millis(80));

        scheduler.request_flush();
        tokio::time::sleep(Duration::from_millis(40)).await;
        scheduler.request_flush();
        tokio::time::sleep(Duration::from_millis(40)).await;

        // 80ms after the first request, but only 40ms after the second:
        // nothing has fired yet.
        assert!(drain(&mut rx).is_empty());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn hidden_flush_is_immediate() {
        let state = session_cell();
        let beacon = RecordingBeacon::new();
        let (scheduler, mut rx) =
            PersistenceScheduler::new(Arc::clone(&state), beacon, Duration::from_millis(50));

        scheduler.on_visibility_hidden();
        let requests = drain(&mut rx);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].trigger, FlushTrigger::Hidden);
    }

    #[tokio::test]
    async fn periodic_flush_keeps_firing() {
        let state = session_cell();
        let beacon = RecordingBeacon::new();
        let (scheduler, mut rx) =
            PersistenceScheduler::new(Arc::clone(&state), beacon, Duration::from_millis(30));

        let handle = scheduler.spawn_periodic(Duration::from_millis(30));
        tokio::time::sleep(Duration::from_millis(110)).await;
        handle.abort();

        let requests = drain(&mut rx);
        assert!(
            requests.len() >= 2,
            "expected repeated periodic flushes, got {}",
            requests.len()
        );
        assert!(requests
            .iter()
            .all(|r| r.trigger == FlushTrigger::Periodic));
    }

    #[tokio::test]
    async fn unload_goes_through_the_beacon() {
        let state = session_cell();
        state.lock().unwrap().time_spent_seconds = 7;
        let beacon = RecordingBeacon::new();
        let (scheduler, mut rx) = PersistenceScheduler::new(
            Arc::clone(&state),
            beacon.clone(),
            Duration::from_millis(50),
        );

        scheduler.request_flush();
        scheduler.on_unload();

        let sent = beacon.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let snapshot: EngagementSnapshot = serde_json::from_slice(&sent[0]).unwrap();
        assert_eq!(snapshot.time_spent, 7);
        assert_eq!(snapshot.session_id, "s-1");

        // The pending debounce was cancelled by unload
        drop(sent);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(drain(&mut rx).is_empty());
    }
}
