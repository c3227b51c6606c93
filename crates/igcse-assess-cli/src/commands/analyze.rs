//! The `igcse-assess analyze` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use igcse_assess_core::assembler::ShortfallPolicy;
use igcse_assess_core::config::load_config_from;
use igcse_assess_core::engine::{AssessmentEngine, EngineConfig, ProgressReporter, ReferenceData};
use igcse_assess_core::history::UsageLedger;
use igcse_assess_core::report::{ClassReport, StudentOutcome};
use igcse_assess_core::roster::load_roster;
use igcse_assess_report::{write_html_report, write_mastery_csv, write_papers_csv, write_summary};

/// A report file kind selectable with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Csv,
    Markdown,
    Html,
}

const ALL_FORMATS: &[OutputFormat] = &[
    OutputFormat::Json,
    OutputFormat::Csv,
    OutputFormat::Markdown,
    OutputFormat::Html,
];

/// Command-line overrides for a run.
pub struct AnalyzeArgs {
    pub config: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: String,
    pub student: Option<String>,
    pub threshold: Option<f64>,
    pub max_questions: Option<usize>,
    pub seed: Option<u64>,
    pub policy: Option<String>,
    pub parallelism: Option<usize>,
    pub no_record: bool,
}

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_student_complete(&self, outcome: &StudentOutcome) {
        let paper = match &outcome.paper {
            Some(p) => format!("paper of {} question(s)", p.len()),
            None => "no paper".to_string(),
        };
        eprintln!(
            "  Done: {} ({} weak topic(s), {paper})",
            outcome.student_id,
            outcome.profile.weak_topics().len()
        );
    }

    fn on_student_error(&self, student_id: &str, error: &str) {
        eprintln!("  ERROR: {student_id}: {error}");
    }

    fn on_roster_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} students assessed, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

fn parse_formats(format: &str) -> Result<Vec<OutputFormat>> {
    let mut formats = Vec::new();
    for f in format.split(',').map(str::trim).filter(|f| !f.is_empty()) {
        let parsed = match f {
            "all" => return Ok(ALL_FORMATS.to_vec()),
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            "md" | "markdown" => OutputFormat::Markdown,
            "html" => OutputFormat::Html,
            other => anyhow::bail!(
                "unknown output format: '{other}' (expected json, csv, md, html or all)"
            ),
        };
        if !formats.contains(&parsed) {
            formats.push(parsed);
        }
    }
    anyhow::ensure!(!formats.is_empty(), "no output format given");
    Ok(formats)
}

pub async fn execute(args: AnalyzeArgs) -> Result<()> {
    let formats = parse_formats(&args.format)?;

    // Load config and apply command-line overrides
    let mut config = load_config_from(args.config.as_deref())?;
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if let Some(threshold) = args.threshold {
        config.analysis.weak_threshold = threshold;
    }
    if let Some(max) = args.max_questions {
        config.assembly.max_questions = max;
    }
    if let Some(seed) = args.seed {
        config.assembly.seed = Some(seed);
    }
    if let Some(policy) = &args.policy {
        config.assembly.shortfall_policy = policy.parse::<ShortfallPolicy>()?;
    }
    if let Some(parallelism) = args.parallelism {
        config.parallelism = parallelism;
    }
    config.validate()?;
    tracing::debug!(?config, "effective configuration");

    let reference = ReferenceData::load(&config.data)?;
    let ledger = UsageLedger::load_json(&config.data.usage_history)?;
    let mut roster = load_roster(&config.roster_sources())?;

    if let Some(filter) = &args.student {
        let ids: Vec<String> = filter
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for id in &ids {
            if roster.student(id).is_none() {
                eprintln!("Warning: student '{id}' not found in the MCQ results");
            }
        }
        roster.retain_students(&ids);
    }
    anyhow::ensure!(!roster.is_empty(), "no students to analyze");

    eprintln!(
        "igcse-assess v{}: assessing {} students against {} {} ({} topics)",
        env!("CARGO_PKG_VERSION"),
        roster.len(),
        reference.syllabus.subject,
        reference.syllabus.code,
        reference.syllabus.len()
    );
    eprintln!();

    let engine = AssessmentEngine::new(
        Arc::new(reference),
        Arc::new(ledger.clone()),
        EngineConfig::from(&config),
    )?;
    let report = engine.run(roster, &ConsoleReporter).await?;

    print_summary(&report);

    // Save outputs
    let output = &config.output_dir;
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create output directory {}", output.display()))?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");

    for fmt in &formats {
        match fmt {
            OutputFormat::Json => {
                let path = output.join(format!("class-report-{timestamp}.json"));
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            OutputFormat::Csv => {
                let mastery = output.join(format!("mastery-{timestamp}.csv"));
                write_mastery_csv(&report, &mastery)?;
                let papers = output.join(format!("papers-{timestamp}.csv"));
                write_papers_csv(&report, &papers)?;
                eprintln!("CSV tables: {}, {}", mastery.display(), papers.display());
            }
            OutputFormat::Markdown => {
                let path = output.join(format!("summary-{timestamp}.md"));
                write_summary(&report, &path)?;
                eprintln!("Teacher summary: {}", path.display());
            }
            OutputFormat::Html => {
                let path = output.join(format!("report-{timestamp}.html"));
                write_html_report(&report, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
        }
    }

    tracing::info!(
        output = %output.display(),
        formats = formats.len(),
        "reports written"
    );

    if args.no_record {
        tracing::info!("usage history left unchanged (--no-record)");
        return Ok(());
    }
    let mut ledger = ledger;
    let recorded: usize = report.papers().map(|p| ledger.record(p)).sum();
    ledger.save_json(&config.data.usage_history)?;
    tracing::info!(
        recorded,
        path = %config.data.usage_history.display(),
        "usage history updated"
    );
    eprintln!(
        "Recorded {recorded} newly issued question(s) in {}",
        config.data.usage_history.display()
    );

    Ok(())
}

fn print_summary(report: &ClassReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Student", "Mean", "Weak topics", "Paper", "Notes"]);

    for outcome in &report.students {
        let mean = outcome
            .profile
            .mean_mastery()
            .map(|m| format!("{:.0}%", m * 100.0))
            .unwrap_or_else(|| "n/a".to_string());
        let weak = outcome.profile.weak_topics();
        let paper = outcome
            .paper
            .as_ref()
            .map(|p| format!("{} q / {} marks", p.len(), p.total_marks()))
            .unwrap_or_else(|| "-".to_string());
        let notes = outcome.error.clone().unwrap_or_default();

        table.add_row(vec![
            Cell::new(&outcome.student_id),
            Cell::new(mean),
            Cell::new(if weak.is_empty() {
                "-".to_string()
            } else {
                weak.join(", ")
            }),
            Cell::new(paper),
            Cell::new(notes),
        ]);
    }

    eprintln!("\n{table}");

    if !report.data_issues.is_empty() {
        eprintln!("{} data issue(s):", report.data_issues.len());
        for issue in &report.data_issues {
            eprintln!("  - {}", issue.message);
        }
    }
}
