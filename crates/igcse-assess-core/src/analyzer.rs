//! Per-student, per-topic mastery scoring and weak-topic detection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::AssessError;
use crate::mapper::TopicMap;
use crate::model::{natural_cmp, MasteryScore, StudentRecord, Syllabus};

const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Relative weight of each evidence stream. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    #[serde(default = "default_mcq_weight")]
    pub mcq: f64,
    #[serde(default = "default_assignment_weight")]
    pub assignment: f64,
    #[serde(default = "default_participation_weight")]
    pub participation: f64,
}

fn default_mcq_weight() -> f64 {
    0.6
}
fn default_assignment_weight() -> f64 {
    0.3
}
fn default_participation_weight() -> f64 {
    0.1
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            mcq: default_mcq_weight(),
            assignment: default_assignment_weight(),
            participation: default_participation_weight(),
        }
    }
}

impl Weights {
    pub fn new(mcq: f64, assignment: f64, participation: f64) -> Self {
        Self {
            mcq,
            assignment,
            participation,
        }
    }

    pub fn validate(&self) -> Result<(), AssessError> {
        for (name, w) in [
            ("mcq", self.mcq),
            ("assignment", self.assignment),
            ("participation", self.participation),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(AssessError::InvalidWeightConfig(format!(
                    "{name} weight must be a non-negative number, got {w}"
                )));
            }
        }
        let sum = self.mcq + self.assignment + self.participation;
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(AssessError::InvalidWeightConfig(format!(
                "weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Analyzer settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default)]
    pub weights: Weights,
    /// Topics scoring strictly below this are weak.
    #[serde(default = "default_threshold")]
    pub weak_threshold: f64,
}

fn default_threshold() -> f64 {
    0.5
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            weights: Weights::default(),
            weak_threshold: default_threshold(),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<(), AssessError> {
        self.weights.validate()?;
        if !(0.0..=1.0).contains(&self.weak_threshold) {
            return Err(AssessError::InvalidConfig(format!(
                "weak_threshold must be between 0.0 and 1.0, got {}",
                self.weak_threshold
            )));
        }
        Ok(())
    }
}

/// Per-stream averages that went into a topic score. `None` means the
/// stream had nothing to say about the topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Components {
    pub mcq: Option<f64>,
    pub assignment: Option<f64>,
    pub participation: Option<f64>,
}

/// How much evidence backed a topic score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub mcq_items: usize,
    pub assignment_items: usize,
    pub participation_periods: usize,
}

/// A student's mastery of one syllabus topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMastery {
    pub topic_id: String,
    pub score: MasteryScore,
    pub weak: bool,
    pub components: Components,
    pub evidence: Evidence,
}

/// The analyzer's output for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryProfile {
    pub student_id: String,
    pub topics: BTreeMap<String, TopicMastery>,
    /// MCQ items that could not be mapped to a topic and were skipped.
    #[serde(default)]
    pub unmapped: Vec<String>,
}

impl MasteryProfile {
    pub fn score(&self, topic_id: &str) -> MasteryScore {
        self.topics
            .get(topic_id)
            .map(|t| t.score)
            .unwrap_or(MasteryScore::Indeterminate)
    }

    /// Weak topics, lowest mastery first; ties in natural topic order.
    pub fn weak_topics(&self) -> Vec<String> {
        let mut weak: Vec<(&str, f64)> = self
            .topics
            .values()
            .filter(|t| t.weak)
            .filter_map(|t| t.score.value().map(|v| (t.topic_id.as_str(), v)))
            .collect();
        weak.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| natural_cmp(a.0, b.0)));
        weak.into_iter().map(|(id, _)| id.to_string()).collect()
    }

    /// Mean of the known topic scores.
    pub fn mean_mastery(&self) -> Option<f64> {
        let known: Vec<f64> = self.topics.values().filter_map(|t| t.score.value()).collect();
        if known.is_empty() {
            None
        } else {
            Some(known.iter().sum::<f64>() / known.len() as f64)
        }
    }

    pub fn indeterminate_count(&self) -> usize {
        self.topics.values().filter(|t| !t.score.is_known()).count()
    }
}

/// Computes mastery profiles. Construction validates the configuration, so
/// an `Analyzer` always carries usable weights.
#[derive(Debug, Clone, Copy)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self, AssessError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Score every syllabus topic for one student.
    pub fn analyze(
        &self,
        record: &StudentRecord,
        topic_map: &TopicMap,
        syllabus: &Syllabus,
    ) -> MasteryProfile {
        let mut unmapped = Vec::new();
        let mut mcq_by_topic: BTreeMap<&str, Vec<f64>> = BTreeMap::new();

        if let Some(answers) = &record.mcq {
            for (question_id, &correct) in answers {
                match topic_map.map(question_id) {
                    Ok(topics) => {
                        for topic in topics {
                            mcq_by_topic.entry(topic.as_str()).or_default().push(correct);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(student = %record.student_id, "skipping item: {e}");
                        unmapped.push(question_id.clone());
                    }
                }
            }
        }

        let participation: Vec<f64> = record
            .participation
            .iter()
            .flatten()
            .map(|m| m.score)
            .collect();

        let topics = syllabus
            .topics()
            .iter()
            .map(|topic| {
                let id = topic.topic_id.as_str();
                let mcq = mcq_by_topic.get(id).map(Vec::as_slice).unwrap_or(&[]);
                let assignments: Vec<f64> = record
                    .assignments
                    .iter()
                    .flatten()
                    .filter(|m| match topic_map.get(&m.item_id) {
                        Some(tagged) => tagged.contains(id),
                        None => true,
                    })
                    .map(|m| m.score)
                    .collect();

                let components = Components {
                    mcq: mean(mcq),
                    assignment: mean(&assignments),
                    participation: mean(&participation),
                };
                let evidence = Evidence {
                    mcq_items: mcq.len(),
                    assignment_items: assignments.len(),
                    participation_periods: participation.len(),
                };
                let score = self.combine(&components);
                let mastery = TopicMastery {
                    topic_id: id.to_string(),
                    score,
                    weak: score.is_below(self.config.weak_threshold),
                    components,
                    evidence,
                };
                (id.to_string(), mastery)
            })
            .collect();

        let profile = MasteryProfile {
            student_id: record.student_id.clone(),
            topics,
            unmapped,
        };
        tracing::debug!(
            student = %profile.student_id,
            weak = profile.weak_topics().len(),
            "analyzed"
        );
        profile
    }

    /// Weighted mean of the present components. No MCQ evidence means no
    /// score at all; the other streams only refine an MCQ-backed score.
    fn combine(&self, c: &Components) -> MasteryScore {
        let Some(mcq) = c.mcq else {
            return MasteryScore::Indeterminate;
        };
        let w = &self.config.weights;
        let parts = [
            (w.mcq, Some(mcq)),
            (w.assignment, c.assignment),
            (w.participation, c.participation),
        ];
        let total: f64 = parts
            .iter()
            .filter(|(_, v)| v.is_some())
            .map(|(w, _)| w)
            .sum();
        if total <= 0.0 {
            // Only zero-weighted streams carry evidence; fall back to MCQ.
            return MasteryScore::Known(mcq.clamp(0.0, 1.0));
        }
        let score: f64 = parts
            .iter()
            .filter_map(|(w, v)| v.map(|v| (w / total) * v))
            .sum();
        MasteryScore::Known(score.clamp(0.0, 1.0))
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
