//! Normalized progress snapshots for a tracked session.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::Phase;

/// One normalized progress observation.
///
/// `complete == true` is terminal: nothing reported for the same session
/// after it is meaningful. `poll_seq` increases with every fetch issued for
/// a tracked session and is what ordering decisions are made on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub phase: Phase,
    pub current: u64,
    pub total: u64,
    /// Always within `[0, 100]`.
    pub percent: f64,
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub poll_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ProgressSnapshot {
    /// Terminal and carrying an error.
    pub fn is_failure(&self) -> bool {
        self.complete && self.error.is_some()
    }

    /// Terminal without an error.
    pub fn is_success(&self) -> bool {
        self.complete && self.error.is_none()
    }

    /// Time elapsed since the remote job started, if the start is known.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.started_at
            .map(|start| now.signed_duration_since(start))
            .filter(|d| *d >= Duration::zero())
    }

    /// Linear estimate of the remaining time, extrapolated from elapsed time
    /// and percent done. `None` until there is enough signal to extrapolate.
    pub fn eta(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.complete || self.percent <= 0.0 {
            return None;
        }
        let elapsed = self.elapsed(now)?;
        let elapsed_ms = elapsed.num_milliseconds() as f64;
        let remaining_ms = elapsed_ms * (100.0 - self.percent) / self.percent;
        Some(Duration::milliseconds(remaining_ms.round() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(percent: f64, complete: bool, error: Option<&str>) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: Phase::FeatureExtraction,
            current: 0,
            total: 0,
            percent,
            complete,
            error: error.map(String::from),
            poll_seq: 1,
            started_at: None,
        }
    }

    #[test]
    fn test_terminal_classification() {
        assert!(snapshot(100.0, true, None).is_success());
        assert!(snapshot(40.0, true, Some("matcher crashed")).is_failure());
        assert!(!snapshot(40.0, false, None).is_success());
    }

    #[test]
    fn test_eta_extrapolates_linearly() {
        let now = Utc::now();
        let mut s = snapshot(25.0, false, None);
        s.started_at = Some(now - Duration::seconds(60));
        let eta = s.eta(now).unwrap();
        assert_eq!(eta.num_seconds(), 180);
    }

    #[test]
    fn test_eta_unknown_without_signal() {
        let now = Utc::now();
        assert!(snapshot(50.0, false, None).eta(now).is_none());

        let mut s = snapshot(0.0, false, None);
        s.started_at = Some(now - Duration::seconds(10));
        assert!(s.eta(now).is_none());
    }

    #[test]
    fn test_elapsed_ignores_clock_skew() {
        let now = Utc::now();
        let mut s = snapshot(10.0, false, None);
        s.started_at = Some(now + Duration::seconds(30));
        assert!(s.elapsed(now).is_none());
    }
}
