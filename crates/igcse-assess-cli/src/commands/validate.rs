//! The `igcse-assess validate` command.

use std::path::PathBuf;

use anyhow::Result;

use igcse_assess_core::config::load_config_from;
use igcse_assess_core::engine::ReferenceData;
use igcse_assess_core::parser::{validate_bank, validate_mcq_items, ValidationWarning};
use igcse_assess_core::roster::load_roster;

fn print_warnings(warnings: &[ValidationWarning]) {
    for w in warnings {
        let prefix = w
            .question_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }
}

pub fn execute(config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    config.validate()?;
    println!(
        "Config: weights mcq {} / assignment {} / participation {}, weak below {}",
        config.analysis.weights.mcq,
        config.analysis.weights.assignment,
        config.analysis.weights.participation,
        config.analysis.weak_threshold
    );

    let reference = ReferenceData::load(&config.data)?;
    let syllabus = &reference.syllabus;
    println!(
        "Syllabus: {} {} ({} topics)",
        syllabus.subject,
        syllabus.code,
        syllabus.len()
    );
    println!("Question tags: {} items", reference.topic_map.len());

    let mut total_warnings = 0;

    println!(
        "Question bank: {} ({} questions)",
        reference.bank.name,
        reference.bank.len()
    );
    let bank_warnings = validate_bank(&reference.bank, syllabus);
    print_warnings(&bank_warnings);
    total_warnings += bank_warnings.len();

    let roster = load_roster(&config.roster_sources())?;
    println!(
        "Students: {} ({} MCQ items)",
        roster.len(),
        roster.mcq_items.len()
    );
    let item_warnings = validate_mcq_items(&roster.mcq_items, &reference.topic_map);
    print_warnings(&item_warnings);
    total_warnings += item_warnings.len();

    for issue in &roster.issues {
        let prefix = issue
            .student_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", issue.message);
    }
    total_warnings += roster.issues.len();

    if total_warnings == 0 {
        println!("All data valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
