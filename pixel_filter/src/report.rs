//! Report Module
//!
//! End-of-run summary box for terminal front ends.

use crate::batch::{BatchStatus, BatchSummary};
use console::style;
use std::fmt::Write;
use std::time::Duration;

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60.0 {
        format!("{:.1}s", secs)
    } else {
        let whole = duration.as_secs();
        format!("{}m {:02}s", whole / 60, whole % 60)
    }
}

fn status_line(status: BatchStatus) -> String {
    match status {
        BatchStatus::Completed => style("✅ Completed").green().to_string(),
        BatchStatus::CompletedWithErrors => {
            style("⚠️  Completed with errors").yellow().to_string()
        }
        BatchStatus::Cancelled => style("⛔️ Cancelled").red().to_string(),
    }
}

/// Renders the summary box. Kept separate from printing for tests.
pub fn render_summary_report(summary: &BatchSummary) -> String {
    let mut out = String::new();
    let rule = "═".repeat(60);

    let _ = writeln!(out);
    let _ = writeln!(out, "╔{}╗", rule);
    let _ = writeln!(out, "  📊 {} Filter Summary Report", summary.filter);
    let _ = writeln!(out, "╠{}╣", rule);
    let _ = writeln!(out, "  Status:             {}", status_line(summary.status));
    let _ = writeln!(out, "  📁 Files:           {:>8}", summary.total());
    let _ = writeln!(out, "  ✅ Succeeded:       {:>8}", summary.succeeded());
    let _ = writeln!(out, "  ❌ Failed:          {:>8}", summary.failed());
    let _ = writeln!(out, "  ⛔️ Canceled:        {:>8}", summary.canceled());
    let _ = writeln!(out, "  📈 Success Rate:    {:>7.1}%", summary.success_rate());
    let _ = writeln!(out, "  ⏱️  Total Time:      {:>8}", format_duration(summary.elapsed));
    let _ = writeln!(out, "╚{}╝", rule);

    let mut errors = summary.errors().peekable();
    if errors.peek().is_some() {
        let _ = writeln!(out);
        let _ = writeln!(out, "❌ Errors encountered:");
        for (path, msg) in errors {
            let _ = writeln!(out, "   {} → {}", path.display(), msg);
        }
    }
    out
}

pub fn print_summary_report(summary: &BatchSummary) {
    print!("{}", render_summary_report(summary));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{ItemResult, Outcome, WorkItem};
    use crate::filter::FilterKind;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 05s");
    }

    #[test]
    fn test_report_lists_errors() {
        let summary = BatchSummary {
            status: BatchStatus::CompletedWithErrors,
            filter: FilterKind::Cold,
            results: vec![
                ItemResult {
                    item: WorkItem::new("ok.png", FilterKind::Cold),
                    outcome: Outcome::Done,
                },
                ItemResult {
                    item: WorkItem::new("bad.png", FilterKind::Cold),
                    outcome: Outcome::Failed("corrupt".into()),
                },
            ],
            elapsed: Duration::from_millis(10),
        };

        let text = render_summary_report(&summary);
        assert!(text.contains("Cold Filter Summary Report"));
        assert!(text.contains("50.0%"));
        assert!(text.contains("bad.png → corrupt"));
        assert!(!text.contains("ok.png →"));
    }
}
