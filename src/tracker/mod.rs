//! Progress tracking for remote phase sessions.
//!
//! - [`Scheduler`]: produces [`TrackerEvent`]s for a tracked session. The
//!   default [`PollingScheduler`] polls the engine's progress endpoint with a
//!   fixed delay; [`ManualScheduler`] lets events be pushed from outside.
//! - [`ProgressTracker`]: owns the scheduler and one track per phase, orders
//!   and filters incoming events, and drives the [`ProgressObserver`].
//!
//! Events cross from the scheduler tasks to the orchestrator over an
//! unbounded channel; only the orchestrator applies them.

mod observer;
mod progress;
mod scheduler;

pub use observer::{NoopObserver, ProgressObserver, TrackingResult};
pub use progress::{ProgressTracker, TrackOutcome};
pub use scheduler::{
    ManualHandle, ManualScheduler, PollingScheduler, Scheduler, TrackEventKind, TrackTicket,
    TrackerEvent,
};
