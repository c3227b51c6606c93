//! Class report types with JSON persistence and progress comparison.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyzer::{MasteryProfile, Weights};
use crate::assembler::ShortfallPolicy;
use crate::model::PracticePaper;
use crate::roster::DataIssue;
use crate::statistics::ClassStats;

/// A complete class assessment report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Summary of the syllabus the class was assessed against.
    pub syllabus: SyllabusSummary,
    /// Settings the run used.
    pub settings: RunSettings,
    /// One outcome per student, sorted by student id.
    pub students: Vec<StudentOutcome>,
    /// Data problems found while loading or analyzing.
    #[serde(default)]
    pub data_issues: Vec<DataIssue>,
    /// Aggregate statistics.
    pub aggregate: ClassStats,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Summary of a syllabus (without the topic definitions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyllabusSummary {
    pub subject: String,
    pub code: String,
    pub topic_count: usize,
}

/// Snapshot of the settings a report was produced with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub weights: Weights,
    pub weak_threshold: f64,
    pub max_questions: usize,
    pub questions_per_topic: usize,
    pub shortfall_policy: ShortfallPolicy,
    #[serde(default)]
    pub seed: Option<u64>,
    pub parallelism: usize,
}

/// Everything produced for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentOutcome {
    pub student_id: String,
    pub profile: MasteryProfile,
    /// The issued paper; `None` when the student has no weak topics or
    /// assembly failed.
    #[serde(default)]
    pub paper: Option<PracticePaper>,
    /// Why no paper (or only a partial one) was issued.
    #[serde(default)]
    pub error: Option<String>,
}

impl ClassReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: ClassReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    pub fn student(&self, student_id: &str) -> Option<&StudentOutcome> {
        self.students.iter().find(|s| s.student_id == student_id)
    }

    /// Issued papers, in student order.
    pub fn papers(&self) -> impl Iterator<Item = &PracticePaper> {
        self.students.iter().filter_map(|s| s.paper.as_ref())
    }

    /// Compare this report against a baseline to track progress.
    ///
    /// Only (student, topic) pairs with a known score in both reports are
    /// compared; a change larger than `threshold` counts as movement.
    pub fn compare(&self, baseline: &ClassReport, threshold: f64) -> ProgressReport {
        let baseline_scores = known_scores(baseline);
        let current_scores = known_scores(self);

        let mut progress = ProgressReport::default();

        for (key, &(current, current_weak)) in &current_scores {
            let Some(&(baseline_val, baseline_weak)) = baseline_scores.get(key) else {
                progress.new_pairs += 1;
                continue;
            };
            let change = MasteryChange {
                student_id: key.0.clone(),
                topic_id: key.1.clone(),
                baseline_score: baseline_val,
                current_score: current,
                delta: current - baseline_val,
            };

            if current_weak && !baseline_weak {
                progress.newly_weak.push(change.clone());
            } else if baseline_weak && !current_weak {
                progress.recovered.push(change.clone());
            }

            if change.delta < -threshold {
                progress.regressions.push(change);
            } else if change.delta > threshold {
                progress.improvements.push(change);
            } else {
                progress.unchanged += 1;
            }
        }

        progress.removed_pairs = baseline_scores
            .keys()
            .filter(|k| !current_scores.contains_key(*k))
            .count();

        progress
    }
}

/// (student, topic) -> (known score, weak)
fn known_scores(report: &ClassReport) -> BTreeMap<(String, String), (f64, bool)> {
    let mut map = BTreeMap::new();
    for outcome in &report.students {
        for mastery in outcome.profile.topics.values() {
            if let Some(v) = mastery.score.value() {
                map.insert(
                    (outcome.student_id.clone(), mastery.topic_id.clone()),
                    (v, mastery.weak),
                );
            }
        }
    }
    map
}

/// Result of comparing two class reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressReport {
    /// Pairs whose mastery went down.
    pub regressions: Vec<MasteryChange>,
    /// Pairs whose mastery went up.
    pub improvements: Vec<MasteryChange>,
    /// Pairs that crossed below the weak threshold.
    pub newly_weak: Vec<MasteryChange>,
    /// Pairs that are no longer weak.
    pub recovered: Vec<MasteryChange>,
    /// Pairs with no significant change.
    pub unchanged: usize,
    /// Pairs known in current but not baseline.
    pub new_pairs: usize,
    /// Pairs known in baseline but not current.
    pub removed_pairs: usize,
}

/// Mastery movement for one student on one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryChange {
    pub student_id: String,
    pub topic_id: String,
    pub baseline_score: f64,
    pub current_score: f64,
    pub delta: f64,
}

impl ProgressReport {
    /// Format the progress report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Summary:** {} regressions, {} improvements, {} unchanged, {} newly weak, {} recovered\n\n",
            self.regressions.len(),
            self.improvements.len(),
            self.unchanged,
            self.newly_weak.len(),
            self.recovered.len()
        ));

        for (title, changes) in [
            ("Regressions", &self.regressions),
            ("Improvements", &self.improvements),
            ("Newly weak", &self.newly_weak),
            ("Recovered", &self.recovered),
        ] {
            if changes.is_empty() {
                continue;
            }
            md.push_str(&format!("### {title}\n\n"));
            md.push_str("| Student | Topic | Baseline | Current | Delta |\n");
            md.push_str("|---------|-------|----------|---------|-------|\n");
            for c in changes {
                md.push_str(&format!(
                    "| {} | {} | {:.1}% | {:.1}% | {:+.1}% |\n",
                    c.student_id,
                    c.topic_id,
                    c.baseline_score * 100.0,
                    c.current_score * 100.0,
                    c.delta * 100.0
                ));
            }
            md.push('\n');
        }

        md
    }

    /// Returns true if there are any regressions.
    pub fn has_regressions(&self) -> bool {
        !self.regressions.is_empty()
    }
}
