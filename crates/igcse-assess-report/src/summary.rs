//! Markdown teacher summary.

use std::fmt::Write;
use std::path::Path;

use anyhow::{Context, Result};

use igcse_assess_core::report::ClassReport;

use crate::topic_columns;

fn percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.0}%", v * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn generate_summary(report: &ClassReport) -> String {
    let mut output = String::new();
    let topics = topic_columns(report);
    let papers = report.papers().count();

    let _ = writeln!(
        output,
        "# {} ({}) class summary",
        report.syllabus.subject, report.syllabus.code
    );
    let _ = writeln!(
        output,
        "Generated {} for {} students; topics below {:.0}% are weak.",
        report.created_at.format("%Y-%m-%d %H:%M UTC"),
        report.students.len(),
        report.settings.weak_threshold * 100.0
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Topics");
    let _ = writeln!(output);
    let _ = writeln!(output, "| Topic | Name | Mean | Weak | No evidence |");
    let _ = writeln!(output, "|-------|------|------|------|-------------|");
    for (id, name) in &topics {
        let Some(stats) = report.aggregate.per_topic.get(*id) else {
            continue;
        };
        let _ = writeln!(
            output,
            "| {} | {} | {} | {}/{} | {} |",
            id,
            name,
            percent(stats.mean_mastery),
            stats.weak_students,
            stats.known_students,
            stats.indeterminate_students
        );
    }

    let mut hardest: Vec<_> = report
        .aggregate
        .per_topic
        .values()
        .filter(|t| t.weak_students > 0)
        .collect();
    hardest.sort_by(|a, b| {
        b.weak_students
            .cmp(&a.weak_students)
            .then_with(|| a.topic_id.cmp(&b.topic_id))
    });
    if !hardest.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Most common weakness: {} {} ({} students).",
            hardest[0].topic_id, hardest[0].name, hardest[0].weak_students
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students needing attention");

    let mut flagged = 0;
    for outcome in &report.students {
        let weak = outcome.profile.weak_topics();
        if weak.is_empty() {
            continue;
        }
        flagged += 1;
        let listed: Vec<String> = weak
            .iter()
            .map(|t| format!("{t} ({})", outcome.profile.score(t)))
            .collect();
        let _ = writeln!(output, "- {}: {}", outcome.student_id, listed.join(", "));
    }
    if flagged == 0 {
        let _ = writeln!(output, "No student has a weak topic.");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Practice papers");

    if papers == 0 {
        let _ = writeln!(output, "No practice papers were issued.");
    }
    for outcome in &report.students {
        match (&outcome.paper, &outcome.error) {
            (Some(paper), _) => {
                let _ = writeln!(
                    output,
                    "- {}: {} questions ({} marks): {}",
                    paper.student_id,
                    paper.len(),
                    paper.total_marks(),
                    paper.question_ids().join(", ")
                );
                if !paper.uncovered.is_empty() {
                    let _ = writeln!(
                        output,
                        "  - no questions available for {}",
                        paper.uncovered.join(", ")
                    );
                }
                for (weak, substitute) in &paper.substitutions {
                    let _ = writeln!(output, "  - topic {weak} practised via topic {substitute}");
                }
            }
            (None, Some(err)) => {
                let _ = writeln!(output, "- {}: no paper ({err})", outcome.student_id);
            }
            (None, None) => {}
        }
    }

    if !report.data_issues.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Data issues");
        for issue in &report.data_issues {
            let _ = writeln!(output, "- {}", issue.message);
        }
    }

    output
}

pub fn write_summary(report: &ClassReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, generate_summary(report))
        .with_context(|| format!("failed to write summary to {}", path.display()))?;
    Ok(())
}
