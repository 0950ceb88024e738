//! Text summary builder for CLI output.
//!
//! This module computes settle-time metrics and formats human-readable lines for text mode.

use crate::metrics;
use crate::model::{BootstrapState, Resolution, SessionReport};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

const RESOLUTIONS: [Resolution; 5] = [
    Resolution::Resolved,
    Resolution::NotFound,
    Resolution::Superseded,
    Resolution::Failed,
    Resolution::TimedOut,
];

/// Build a text summary from a finished session.
pub(crate) fn build_text_summary(report: &SessionReport) -> TextSummary {
    let mut lines = Vec::new();

    match &report.bootstrap {
        BootstrapState::Ready => match &report.user {
            Some(user) => lines.push(format!("Global data: ready (signed in as {})", user.display_name)),
            None => lines.push("Global data: ready (anonymous)".to_string()),
        },
        BootstrapState::Pending => lines.push("Global data: still pending".to_string()),
        BootstrapState::Failed { message } => {
            lines.push(format!("Global data: failed ({message})"));
        }
    }

    let counts: Vec<String> = RESOLUTIONS
        .iter()
        .filter_map(|res| {
            let n = report
                .attempts
                .iter()
                .filter(|a| a.resolution == *res)
                .count();
            (n > 0).then(|| format!("{n} {}", res.as_str()))
        })
        .collect();
    if counts.is_empty() {
        lines.push("Attempts: none".to_string());
    } else {
        lines.push(format!(
            "Attempts: {} ({})",
            report.attempts.len(),
            counts.join(", ")
        ));
    }

    // Superseded attempts never settled on their own.
    let settle_ms: Vec<f64> = report
        .attempts
        .iter()
        .filter(|a| a.resolution != Resolution::Superseded)
        .map(|a| a.elapsed_ms as f64)
        .collect();
    if let Some((mean, median, p25, p75)) = metrics::compute_metrics(&settle_ms) {
        lines.push(format!(
            "Settle time: avg {:.1} med {:.1} p25 {:.1} p75 {:.1} ms",
            mean, median, p25, p75
        ));
    }

    if let Some(location) = report.location.as_ref() {
        lines.push(format!("Location: {location}"));
    }
    let theme = report.theme.map(|t| t.as_str()).unwrap_or("-");
    lines.push(format!("Screen: {} [{theme}]", report.screen.title()));
    if !report.scaffold.is_empty() {
        lines.push(format!("Mounted: {}", report.scaffold.join(", ")));
    }
    if report.interrupted {
        lines.push("Session interrupted before navigation settled".to_string());
    }

    TextSummary { lines }
}
