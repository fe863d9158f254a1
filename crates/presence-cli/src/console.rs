use std::fmt::Write as _;

use presence_capture::{SessionOutcome, SessionReport, Status, StatusSink};

/// Prints session progress to stderr, keeping stdout for the report.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn report(&self, status: Status) {
        tracing::debug!(?status, "status");
        if status != Status::Idle {
            eprintln!("{status}");
        }
    }
}

/// Human-readable summary of a finished session.
pub fn render_report(report: &SessionReport) -> String {
    let mut out = String::new();
    let outcome = match report.outcome {
        SessionOutcome::Succeeded => "succeeded",
        SessionOutcome::Failed => "failed",
        SessionOutcome::TimedOut => "timed out",
        SessionOutcome::Cancelled => "cancelled",
    };
    let _ = writeln!(
        out,
        "session {}: {outcome} ({} accepted in {} ticks)",
        report.id, report.accepted, report.ticks
    );

    if let Some(liveness) = &report.liveness {
        let verdict = if liveness.is_live { "live" } else { "not live" };
        let _ = write!(
            out,
            "liveness:   {verdict} (avg {:.2}, peak {:.2}, {} pairs)",
            liveness.avg_variation, liveness.max_variation, liveness.frame_pairs_analysed
        );
        if let Some(rejection) = &liveness.rejection {
            let _ = write!(out, ", {rejection:?}");
        }
        out.push('\n');
    }

    if let Some(location) = &report.location {
        let _ = writeln!(
            out,
            "location:   {:.6}, {:.6}",
            location.latitude, location.longitude
        );
    }

    if let Some(submission) = &report.submission {
        let status = if submission.success { "ok" } else { "error" };
        let _ = writeln!(out, "submission: {status}: {}", submission.message);
        if let Some(details) = &submission.details {
            if let Some(name) = &details.employee_name {
                let _ = writeln!(out, "  employee: {name}");
            }
            let _ = writeln!(
                out,
                "  {} at {}",
                details.action.as_deref().unwrap_or("attendance"),
                details.location.as_deref().unwrap_or("Location not available")
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_capture::{SubmissionDetails, SubmissionOutcome};
    use presence_core::{LivenessRejection, LivenessResult};

    fn report(outcome: SessionOutcome) -> SessionReport {
        SessionReport {
            id: Default::default(),
            outcome,
            ticks: 9,
            accepted: 8,
            liveness: None,
            representative_index: None,
            location: None,
            submission: None,
        }
    }

    #[test]
    fn test_render_success() {
        let mut r = report(SessionOutcome::Succeeded);
        r.liveness = Some(LivenessResult {
            is_live: true,
            avg_variation: 6.0,
            max_variation: 7.5,
            frame_pairs_analysed: 7,
            rejection: None,
        });
        r.submission = Some(SubmissionOutcome {
            success: true,
            message: "Checked In".to_string(),
            details: Some(SubmissionDetails {
                employee_name: Some("A. Worker".to_string()),
                location: None,
                action: Some("check_in".to_string()),
            }),
        });

        let text = render_report(&r);
        assert!(text.contains("succeeded (8 accepted in 9 ticks)"));
        assert!(text.contains("live (avg 6.00, peak 7.50, 7 pairs)"));
        assert!(text.contains("submission: ok: Checked In"));
        assert!(text.contains("check_in at Location not available"));
    }

    #[test]
    fn test_render_failed_liveness() {
        let mut r = report(SessionOutcome::Failed);
        r.liveness = Some(LivenessResult {
            is_live: false,
            avg_variation: 0.0,
            max_variation: 0.0,
            frame_pairs_analysed: 7,
            rejection: Some(LivenessRejection::Static),
        });
        let text = render_report(&r);
        assert!(text.contains("failed"));
        assert!(text.contains("not live"));
        assert!(text.contains("Static"));
        assert!(!text.contains("submission"));
    }
}
