//! Text summary builder for CLI output.

use crate::model::{RunReport, StepStatus};

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

fn status_word(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Succeeded => "ok",
        StepStatus::Skipped => "skipped",
        StepStatus::Failed => "FAILED",
    }
}

/// Build a text summary for a finished run.
pub fn build_text_summary(report: &RunReport) -> TextSummary {
    let mut lines = Vec::new();
    lines.push(format!(
        "Run {} ({} -> {}): {}",
        report.run_id, report.started_at, report.finished_at, report.outcome
    ));
    for s in &report.steps {
        lines.push(format!(
            "  {:<10} {:<8} {:>6} ms  {}",
            s.step.as_str(),
            status_word(s.status),
            s.duration_ms,
            s.message
        ));
    }

    if let Some(p) = report.players.as_ref() {
        lines.push(format!("Players: {}", p.count));
        if let (Some(mean), Some(median), Some(p25), Some(p75)) =
            (p.fantasy_mean, p.fantasy_median, p.fantasy_p25, p.fantasy_p75)
        {
            lines.push(format!(
                "Fantasy points/game: avg {:.1} med {:.1} p25 {:.1} p75 {:.1}",
                mean, median, p25, p75
            ));
        }
        if !p.top.is_empty() {
            lines.push(format!("Top {} by fantasy points:", p.top.len()));
            for (i, t) in p.top.iter().enumerate() {
                lines.push(format!(
                    "  {}. {} ({}): {:.1} FP/game",
                    i + 1,
                    t.name,
                    t.team,
                    t.fantasy_points
                ));
            }
        }
    }
    lines.push(format!("Log: {}", report.log_path.display()));

    TextSummary { lines }
}
