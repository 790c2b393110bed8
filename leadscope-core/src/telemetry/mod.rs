//! Viewer-side telemetry engine
//!
//! Measures how a lead engages with the FDD viewer and keeps the ingestion
//! endpoint up to date without ever getting in the viewer's way:
//!
//! - [`activity`] - classifies the user as active/idle and the tab as
//!   visible/hidden from platform events
//! - [`accumulator`] - owns one session's mutable engagement state; every
//!   mutation is gated by the activity flags
//! - [`scheduler`] - decides when to flush the current state (debounced,
//!   periodic, on-hide, on-unload)
//! - [`transport`] - the awaited ingestion client and the fire-and-forget
//!   beacon used during teardown
//! - [`viewer`] - wires the pieces together and drives the timers
//!
//! The timers are logically concurrent but never operate on stale data:
//! each handler locks the shared session cell at fire time, so a flush
//! always serializes the state as it is, not as it was when the flush was
//! scheduled.

pub mod activity;
pub mod accumulator;
pub mod scheduler;
pub mod transport;
pub mod viewer;

pub use activity::{ActivityMonitor, InputEvent};
pub use accumulator::{FlushSignal, TelemetryAccumulator};
pub use scheduler::{FlushTrigger, PersistenceScheduler};
pub use transport::{FireAndForgetSink, HttpBeacon, IngestAck, IngestClient};
pub use viewer::ViewerTelemetry;
