//! Question usage history across runs.
//!
//! The assembler only reads history; recording newly issued papers happens
//! after a run has finished.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::PracticePaper;

/// Answers whether a question has already been given to a student.
pub trait UsageHistory: Send + Sync {
    fn was_used(&self, student_id: &str, question_id: &str) -> bool;
}

/// History that has never seen any question.
pub struct NoHistory;

impl UsageHistory for NoHistory {
    fn was_used(&self, _: &str, _: &str) -> bool {
        false
    }
}

/// File-backed ledger of questions issued per student.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLedger {
    #[serde(default)]
    students: BTreeMap<String, BTreeSet<String>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a ledger; a missing file is an empty ledger.
    pub fn load_json(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no usage history at {}, starting empty", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read usage history from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse usage history {}", path.display()))
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize usage history")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write usage history to {}", path.display()))?;
        Ok(())
    }

    /// Mark every question on the paper as used by its student. Returns the
    /// number of questions not previously recorded.
    pub fn record(&mut self, paper: &PracticePaper) -> usize {
        let used = self.students.entry(paper.student_id.clone()).or_default();
        paper
            .items
            .iter()
            .filter(|item| used.insert(item.question_id.clone()))
            .count()
    }

    pub fn used_by(&self, student_id: &str) -> impl Iterator<Item = &str> {
        self.students
            .get(student_id)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    pub fn student_count(&self) -> usize {
        self.students.len()
    }
}

impl UsageHistory for UsageLedger {
    fn was_used(&self, student_id: &str, question_id: &str) -> bool {
        self.students
            .get(student_id)
            .is_some_and(|qs| qs.contains(question_id))
    }
}
