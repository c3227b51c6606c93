//! Practice paper assembly.
//!
//! Selection is deterministic: the same bank, history, weak-topic order and
//! seed always produce the same paper.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::AssessError;
use crate::history::UsageHistory;
use crate::model::{PaperItem, PracticePaper, QuestionBank};

/// Assembler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Representatives to aim for per weak topic.
    #[serde(default = "default_questions_per_topic")]
    pub questions_per_topic: usize,
    /// Seed for breaking ties between equally ranked questions. Without one,
    /// ties go to the question that comes first in the bank.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_questions_per_topic() -> usize {
    1
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            questions_per_topic: default_questions_per_topic(),
            seed: None,
        }
    }
}

/// What to do when the bank has nothing for one of a student's weak topics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortfallPolicy {
    /// Record the error for the student and issue no paper.
    Fail,
    /// Issue the partial paper and list the missing topics as uncovered.
    #[default]
    Partial,
    /// Substitute the nearest syllabus topic that the bank can serve.
    Adjacent,
}

impl fmt::Display for ShortfallPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShortfallPolicy::Fail => write!(f, "fail"),
            ShortfallPolicy::Partial => write!(f, "partial"),
            ShortfallPolicy::Adjacent => write!(f, "adjacent"),
        }
    }
}

impl FromStr for ShortfallPolicy {
    type Err = AssessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(ShortfallPolicy::Fail),
            "partial" => Ok(ShortfallPolicy::Partial),
            "adjacent" => Ok(ShortfallPolicy::Adjacent),
            other => Err(AssessError::InvalidConfig(format!(
                "unknown shortfall policy '{other}' (expected fail, partial or adjacent)"
            ))),
        }
    }
}

/// Builds practice papers from a shared question bank.
pub struct Assembler<'a> {
    bank: &'a QuestionBank,
    history: &'a dyn UsageHistory,
    config: AssemblerConfig,
}

impl<'a> Assembler<'a> {
    pub fn new(bank: &'a QuestionBank, history: &'a dyn UsageHistory, config: AssemblerConfig) -> Self {
        Self {
            bank,
            history,
            config,
        }
    }

    /// Assemble a paper covering `weak_topics`, visited in the given order
    /// (most severe first), with at most `max_questions` questions.
    ///
    /// Returns `InsufficientQuestions` carrying the partial paper when the
    /// bank has nothing tagged for some weak topic.
    pub fn assemble(
        &self,
        student_id: &str,
        weak_topics: &[String],
        max_questions: usize,
    ) -> Result<PracticePaper, AssessError> {
        let mut seen = BTreeSet::new();
        let topics: Vec<String> = weak_topics
            .iter()
            .filter(|t| seen.insert(t.as_str()))
            .cloned()
            .collect();

        let mut paper = PracticePaper::new(student_id, topics.clone());
        let shortfall: Vec<String> = topics
            .iter()
            .filter(|t| !self.bank.has_topic(t))
            .cloned()
            .collect();

        let rank = self.tiebreak_rank(student_id);
        // Question ids already on the paper; a merged bank may repeat an id.
        let mut issued: BTreeSet<&str> = BTreeSet::new();
        let mut reps: BTreeMap<String, usize> = topics.iter().map(|t| (t.clone(), 0)).collect();

        'rounds: for round in 1..=self.config.questions_per_topic.max(1) {
            for topic in &topics {
                if paper.items.len() >= max_questions {
                    break 'rounds;
                }
                if reps[topic] >= round {
                    continue;
                }

                let best = self
                    .bank
                    .tagged(topic)
                    .iter()
                    .copied()
                    .filter(|&idx| !issued.contains(self.bank.questions()[idx].id.as_str()))
                    .min_by_key(|&idx| {
                        let q = &self.bank.questions()[idx];
                        let used = self.history.was_used(student_id, &q.id);
                        let gain = q
                            .topics
                            .iter()
                            .filter(|t| reps.get(*t).is_some_and(|&n| n < round))
                            .count();
                        (used, Reverse(gain), rank[idx])
                    });

                let Some(idx) = best else {
                    continue;
                };
                let q = &self.bank.questions()[idx];
                issued.insert(q.id.as_str());
                let mut covers = Vec::new();
                for t in &topics {
                    if q.topics.contains(t) {
                        if let Some(n) = reps.get_mut(t) {
                            *n += 1;
                        }
                        covers.push(t.clone());
                    }
                }
                paper.items.push(PaperItem {
                    question_id: q.id.clone(),
                    covers,
                    source: q.source.clone(),
                    marks: q.marks,
                    reused: self.history.was_used(student_id, &q.id),
                });
            }
        }

        paper.uncovered = topics
            .iter()
            .filter(|t| reps.get(*t).copied().unwrap_or(0) == 0)
            .cloned()
            .collect();

        tracing::debug!(
            student = student_id,
            questions = paper.items.len(),
            uncovered = paper.uncovered.len(),
            "assembled paper"
        );

        if shortfall.is_empty() {
            Ok(paper)
        } else {
            Err(AssessError::InsufficientQuestions {
                student_id: student_id.to_string(),
                topics: shortfall,
                partial: Box::new(paper),
            })
        }
    }

    /// Tie-break rank per bank position: bank order, or a per-student
    /// seeded permutation of it.
    fn tiebreak_rank(&self, student_id: &str) -> Vec<usize> {
        let n = self.bank.len();
        let Some(seed) = self.config.seed else {
            return (0..n).collect();
        };
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ fnv1a(student_id.as_bytes()));
        order.shuffle(&mut rng);

        let mut rank = vec![0; n];
        for (position, idx) in order.into_iter().enumerate() {
            rank[idx] = position;
        }
        rank
    }
}

/// Stable 64-bit FNV-1a; std's hasher is not guaranteed stable across releases.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(PRIME))
}
