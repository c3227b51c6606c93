//! CSV tables: one row per (student, topic) mastery, one row per paper item.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use igcse_assess_core::report::ClassReport;

use crate::topic_columns;

#[derive(Debug, Serialize)]
struct MasteryRow<'a> {
    student_id: &'a str,
    topic_id: &'a str,
    topic_name: &'a str,
    state: &'static str,
    score: Option<f64>,
    weak: bool,
    mcq: Option<f64>,
    assignment: Option<f64>,
    participation: Option<f64>,
}

#[derive(Debug, Serialize)]
struct PaperRow<'a> {
    student_id: &'a str,
    position: usize,
    question_id: &'a str,
    covers: String,
    source: Option<&'a str>,
    marks: Option<u32>,
    reused: bool,
}

/// Write the mastery table to any writer.
pub fn mastery_csv<W: Write>(report: &ClassReport, writer: W) -> Result<()> {
    let topics = topic_columns(report);
    let mut csv = csv::Writer::from_writer(writer);

    for outcome in &report.students {
        for &(topic_id, topic_name) in &topics {
            let Some(mastery) = outcome.profile.topics.get(topic_id) else {
                continue;
            };
            csv.serialize(MasteryRow {
                student_id: &outcome.student_id,
                topic_id,
                topic_name,
                state: if mastery.score.is_known() {
                    "known"
                } else {
                    "indeterminate"
                },
                score: mastery.score.value().map(round3),
                weak: mastery.weak,
                mcq: mastery.components.mcq.map(round3),
                assignment: mastery.components.assignment.map(round3),
                participation: mastery.components.participation.map(round3),
            })?;
        }
    }

    csv.flush()?;
    Ok(())
}

/// Write the practice paper table to any writer.
pub fn papers_csv<W: Write>(report: &ClassReport, writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    for paper in report.papers() {
        for (i, item) in paper.items.iter().enumerate() {
            csv.serialize(PaperRow {
                student_id: &paper.student_id,
                position: i + 1,
                question_id: &item.question_id,
                covers: item.covers.join(";"),
                source: item.source.as_deref(),
                marks: item.marks,
                reused: item.reused,
            })?;
        }
    }

    csv.flush()?;
    Ok(())
}

pub fn write_mastery_csv(report: &ClassReport, path: &Path) -> Result<()> {
    let file = create(path)?;
    mastery_csv(report, file)
        .with_context(|| format!("failed to write mastery CSV to {}", path.display()))
}

pub fn write_papers_csv(report: &ClassReport, path: &Path) -> Result<()> {
    let file = create(path)?;
    papers_csv(report, file)
        .with_context(|| format!("failed to write papers CSV to {}", path.display()))
}

fn create(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
