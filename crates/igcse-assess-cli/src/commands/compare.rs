//! The `igcse-assess compare` command.

use std::path::PathBuf;

use anyhow::Result;

use igcse_assess_core::report::{ClassReport, MasteryChange};

fn print_changes(title: &str, changes: &[MasteryChange]) {
    if changes.is_empty() {
        return;
    }
    println!("\n{title}:");
    for c in changes {
        println!(
            "  {} topic {} {:.1}% -> {:.1}% ({:+.1}%)",
            c.student_id,
            c.topic_id,
            c.baseline_score * 100.0,
            c.current_score * 100.0,
            c.delta * 100.0
        );
    }
}

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    threshold: f64,
    fail_on_regression: bool,
    format: String,
) -> Result<()> {
    anyhow::ensure!(
        (0.0..=1.0).contains(&threshold),
        "threshold must be between 0.0 and 1.0"
    );
    let baseline = ClassReport::load_json(&baseline_path)?;
    let current = ClassReport::load_json(&current_path)?;

    let report = current.compare(&baseline, threshold);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", report.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            // text format
            println!(
                "Comparison: {} regressions, {} improvements, {} unchanged",
                report.regressions.len(),
                report.improvements.len(),
                report.unchanged
            );

            print_changes("Regressions", &report.regressions);
            print_changes("Improvements", &report.improvements);
            print_changes("Newly weak", &report.newly_weak);
            print_changes("Recovered", &report.recovered);

            if report.new_pairs > 0 {
                println!("\n{} new student/topic score(s)", report.new_pairs);
            }
            if report.removed_pairs > 0 {
                println!("{} student/topic score(s) no longer present", report.removed_pairs);
            }
        }
    }

    if fail_on_regression && report.has_regressions() {
        std::process::exit(1);
    }

    Ok(())
}
