//! Phase-dependency state machine.
//!
//! Holds the four per-phase statuses and the live sessions bound to them.
//! Every transition is synchronous and total, and performs no I/O.
//!
//! ## Chain invariant
//!
//! `DenseReconstruction.Completed ⇒ SparseReconstruction.Completed ⇒
//! FeatureExtraction.Completed ⇒ FrameExtraction.Completed`
//!
//! Transitions keep the chain intact: re-running or failing an earlier phase
//! demotes completed later phases (their inputs are being replaced), and
//! completing a later phase promotes earlier idle phases (their outputs are
//! evidently in place). A run that ends without a verdict hands the demoted
//! phases back. An earlier phase cannot restart while a later one is running.
//!
//! ## Example
//!
//! ```
//! use reconflow::workflow::WorkflowState;
//! use reconflow_common::{Phase, Session};
//!
//! let mut state = WorkflowState::new();
//! assert!(state.can_start(Phase::FrameExtraction).is_ok());
//! assert!(state.can_start(Phase::FeatureExtraction).is_err());
//!
//! state.mark_running(Phase::FrameExtraction, Session::new("s1", Phase::FrameExtraction));
//! state.mark_completed(Phase::FrameExtraction);
//! assert!(state.can_start(Phase::FeatureExtraction).is_ok());
//! ```

mod machine;

pub use machine::{LiveSession, WorkflowState};
