//! Client-restart-safe persistence of the active session.
//!
//! The orchestrator records `{activeSessionId, activePhase}` whenever it
//! starts tracking and clears the pair when tracking stops. On startup the
//! pair tells it which remote job to resume.

mod persistence;
mod store;

pub use persistence::{ACTIVE_PHASE_KEY, ACTIVE_SESSION_KEY, PersistedSession, SessionPersistence};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
