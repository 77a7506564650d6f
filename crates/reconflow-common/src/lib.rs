//! Shared domain types for the reconflow orchestrator.
//!
//! Everything in this crate is plain data: the ordered pipeline phases, the
//! per-phase status, live sessions, normalized progress snapshots, artifacts
//! and reconstruction model statistics. No I/O happens here.

pub mod artifact;
pub mod model;
pub mod phase;
pub mod progress;

pub use artifact::{Artifact, ProbeResult};
pub use model::{QualityClass, ReconstructionModel};
pub use phase::{ParsePhaseError, Phase, PhaseStatus, Session};
pub use progress::ProgressSnapshot;
