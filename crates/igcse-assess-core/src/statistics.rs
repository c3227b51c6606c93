//! Class-level aggregate statistics.
//!
//! Only `Known` scores contribute to means; indeterminate topics are
//! counted separately so missing evidence never drags an average down.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Syllabus;
use crate::report::StudentOutcome;

/// Aggregate statistics across all students.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    /// Per-topic statistics, keyed by topic id.
    pub per_topic: BTreeMap<String, TopicStats>,
    /// Per-student statistics, keyed by student id.
    pub per_student: BTreeMap<String, StudentStats>,
}

/// Statistics for a single topic across the class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicStats {
    pub topic_id: String,
    pub name: String,
    /// Mean known mastery; `None` when no student has a known score.
    pub mean_mastery: Option<f64>,
    /// Lowest known mastery.
    pub min_mastery: Option<f64>,
    pub known_students: usize,
    pub weak_students: usize,
    pub indeterminate_students: usize,
}

/// Statistics for a single student across the syllabus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentStats {
    pub student_id: String,
    pub mean_mastery: Option<f64>,
    pub weak_topics: usize,
    pub indeterminate_topics: usize,
    /// Questions on the issued paper (0 when none was issued).
    pub paper_length: usize,
}

impl TopicStats {
    /// Share of students with a known score who are weak on this topic.
    pub fn weak_rate(&self) -> f64 {
        if self.known_students == 0 {
            0.0
        } else {
            self.weak_students as f64 / self.known_students as f64
        }
    }
}

/// Compute class statistics from per-student outcomes.
pub fn compute_class_stats(outcomes: &[StudentOutcome], syllabus: &Syllabus) -> ClassStats {
    let mut per_topic = BTreeMap::new();
    for topic in syllabus.topics() {
        let id = topic.topic_id.as_str();
        let mut known = Vec::new();
        let mut weak_students = 0usize;
        let mut indeterminate_students = 0usize;

        for outcome in outcomes {
            match outcome.profile.topics.get(id) {
                Some(mastery) => match mastery.score.value() {
                    Some(v) => {
                        known.push(v);
                        if mastery.weak {
                            weak_students += 1;
                        }
                    }
                    None => indeterminate_students += 1,
                },
                None => indeterminate_students += 1,
            }
        }

        let mean_mastery = if known.is_empty() {
            None
        } else {
            Some(known.iter().sum::<f64>() / known.len() as f64)
        };
        let min_mastery = known.iter().copied().reduce(f64::min);

        per_topic.insert(
            topic.topic_id.clone(),
            TopicStats {
                topic_id: topic.topic_id.clone(),
                name: topic.name.clone(),
                mean_mastery,
                min_mastery,
                known_students: known.len(),
                weak_students,
                indeterminate_students,
            },
        );
    }

    let per_student = outcomes
        .iter()
        .map(|o| {
            let stats = StudentStats {
                student_id: o.student_id.clone(),
                mean_mastery: o.profile.mean_mastery(),
                weak_topics: o.profile.topics.values().filter(|t| t.weak).count(),
                indeterminate_topics: o.profile.indeterminate_count(),
                paper_length: o.paper.as_ref().map_or(0, |p| p.len()),
            };
            (o.student_id.clone(), stats)
        })
        .collect();

    ClassStats {
        per_topic,
        per_student,
    }
}
