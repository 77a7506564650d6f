use chrono::Utc;
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use reconflow_common::{Phase, PhaseStatus, ProgressSnapshot};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::errors::OrchestratorError;
use crate::tracker::{ProgressObserver, TrackingResult};
use crate::ui::icons::{CHECK, CLOCK, CROSS, PENDING, RUNNING, WARN};

/// Terminal progress display, one `indicatif` bar per tracked phase.
///
/// Bars are created on the first snapshot of a phase, so a single instance
/// can observe every phase, including sessions resumed at startup.
pub struct ProgressUI {
    multi: MultiProgress,
    bars: Mutex<HashMap<Phase, ProgressBar>>,
    verbose: bool,
}

impl ProgressUI {
    pub fn new(verbose: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the
    /// rich UI fails.
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    fn bar(&self, phase: Phase) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(|p| p.into_inner());
        bars.entry(phase)
            .or_insert_with(|| {
                let style = ProgressStyle::default_bar()
                    .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                    .expect("progress bar template is a valid static string")
                    .progress_chars("█▓▒░");
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(style);
                bar.set_prefix(format!("{:<24}", phase.label()));
                bar.enable_steady_tick(Duration::from_millis(250));
                bar
            })
            .clone()
    }

    fn take_bar(&self, phase: Phase) -> ProgressBar {
        let existing = self
            .bars
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .remove(&phase);
        existing.unwrap_or_else(|| {
            let bar = self.bar(phase);
            self.bars
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .remove(&phase);
            bar
        })
    }
}

impl ProgressObserver for ProgressUI {
    fn on_snapshot(&self, snapshot: &ProgressSnapshot) {
        let bar = self.bar(snapshot.phase);
        bar.set_position(snapshot.percent.round() as u64);

        let mut msg = String::new();
        if snapshot.total > 0 {
            msg.push_str(&format!("{}/{}", snapshot.current, snapshot.total));
        }
        if let Some(eta) = snapshot.eta(Utc::now()) {
            msg.push_str(&format!(
                " {}{}",
                CLOCK,
                style(format!("~{} left", format_duration(eta))).dim()
            ));
        }
        if self.verbose {
            msg.push_str(&format!(" {}", style(format!("(poll #{})", snapshot.poll_seq)).dim()));
        }
        bar.set_message(msg);
    }

    fn on_complete(&self, phase: Phase, outcome: &TrackingResult) {
        let bar = self.take_bar(phase);
        match outcome {
            Ok(snapshot) => {
                bar.set_position(100);
                let elapsed = snapshot
                    .elapsed(Utc::now())
                    .map(|d| format!(" in {}", format_duration(d)))
                    .unwrap_or_default();
                bar.finish_with_message(format!("{}{}", CHECK, style(format!("done{}", elapsed)).green()));
            }
            Err(OrchestratorError::JobFailure { message, .. }) => {
                bar.abandon_with_message(format!("{}{}", CROSS, style(message).red()));
            }
            Err(err) => {
                bar.abandon_with_message(format!("{}{}", WARN, style(err).yellow()));
            }
        }
    }
}

/// Compact `1h 02m`, `3m 05s`, `12s` rendering.
pub fn format_duration(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h {:02}m", h, m)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// One styled line for `reconflow status`.
pub fn status_line(phase: Phase, status: &PhaseStatus, session_id: Option<&str>) -> String {
    let (icon, text) = match status {
        PhaseStatus::NotStarted => (PENDING, style(status.to_string()).dim()),
        PhaseStatus::Running => (RUNNING, style(status.to_string()).cyan()),
        PhaseStatus::Completed => (CHECK, style(status.to_string()).green()),
        PhaseStatus::Failed { .. } => (CROSS, style(status.to_string()).red()),
    };
    let mut line = format!("{}{:<24} {}", icon, phase.label(), text);
    if let Some(id) = session_id {
        line.push_str(&format!(" {}", style(format!("(session {})", id)).dim()));
    }
    line
}
