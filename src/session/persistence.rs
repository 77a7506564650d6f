use reconflow_common::Phase;

use super::store::SessionStore;
use crate::errors::OrchestratorError;

pub const ACTIVE_SESSION_KEY: &str = "activeSessionId";
pub const ACTIVE_PHASE_KEY: &str = "activePhase";

/// The session pair found in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub session_id: String,
    pub phase: Phase,
}

/// Records and clears the active session in a [`SessionStore`].
pub struct SessionPersistence {
    store: Box<dyn SessionStore>,
}

fn persistence_error(err: anyhow::Error) -> OrchestratorError {
    OrchestratorError::Persistence(format!("{:#}", err))
}

impl SessionPersistence {
    pub fn new(store: Box<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Persist `session_id` as the active session of `phase`.
    pub fn record(&self, session_id: &str, phase: Phase) -> Result<(), OrchestratorError> {
        self.store
            .set(ACTIVE_PHASE_KEY, phase.as_str())
            .and_then(|_| self.store.set(ACTIVE_SESSION_KEY, session_id))
            .map_err(persistence_error)?;
        tracing::debug!(%phase, session_id, "Persisted active session");
        Ok(())
    }

    /// Load the persisted session.
    ///
    /// A half-written pair or an unknown phase name is discarded with a
    /// warning and reported as no session.
    pub fn load(&self) -> Result<Option<PersistedSession>, OrchestratorError> {
        let session_id = self.store.get(ACTIVE_SESSION_KEY).map_err(persistence_error)?;
        let phase = self.store.get(ACTIVE_PHASE_KEY).map_err(persistence_error)?;

        match (session_id, phase) {
            (None, None) => Ok(None),
            (Some(session_id), Some(raw)) if !session_id.trim().is_empty() => {
                match raw.parse::<Phase>() {
                    Ok(phase) => Ok(Some(PersistedSession { session_id, phase })),
                    Err(e) => {
                        tracing::warn!(session_id, error = %e, "Discarding persisted session");
                        self.clear()?;
                        Ok(None)
                    }
                }
            }
            (session_id, phase) => {
                tracing::warn!(
                    session_id = session_id.as_deref().unwrap_or("-"),
                    phase = phase.as_deref().unwrap_or("-"),
                    "Discarding incomplete persisted session",
                );
                self.clear()?;
                Ok(None)
            }
        }
    }

    /// Clear the persisted pair, but only if it belongs to `session_id`.
    /// Returns whether anything was removed.
    pub fn clear_if(&self, session_id: &str) -> Result<bool, OrchestratorError> {
        let current = self.store.get(ACTIVE_SESSION_KEY).map_err(persistence_error)?;
        if current.as_deref() != Some(session_id) {
            return Ok(false);
        }
        self.clear()?;
        Ok(true)
    }

    /// Unconditionally clear the persisted pair.
    pub fn clear(&self) -> Result<(), OrchestratorError> {
        self.store
            .remove(ACTIVE_SESSION_KEY)
            .and_then(|_| self.store.remove(ACTIVE_PHASE_KEY))
            .map_err(persistence_error)
    }
}
