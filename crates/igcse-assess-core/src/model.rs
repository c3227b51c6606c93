//! Core data model types for igcse-assess.
//!
//! Student records are built once by the roster loader and never change
//! during a run; syllabus and question bank are static reference data.
//! Mastery scores and practice papers are derived per run.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Student records
// ---------------------------------------------------------------------------

/// A single normalized mark from the assignment or participation stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    /// Column the mark came from (e.g. "assignment_2", "week_3").
    pub item_id: String,
    /// Mark normalized to [0, 1].
    pub score: f64,
}

impl Mark {
    pub fn new(item_id: impl Into<String>, score: f64) -> Self {
        Self {
            item_id: item_id.into(),
            score,
        }
    }
}

/// Everything known about one student for one analysis run.
///
/// A `None` stream means the student does not appear in that input file,
/// which is distinct from appearing with no marks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub student_id: String,
    /// MCQ correctness per question, in [0, 1].
    #[serde(default)]
    pub mcq: Option<BTreeMap<String, f64>>,
    /// Assignment marks in column order.
    #[serde(default)]
    pub assignments: Option<Vec<Mark>>,
    /// Participation marks per period, in column order.
    #[serde(default)]
    pub participation: Option<Vec<Mark>>,
}

impl StudentRecord {
    pub fn new(student_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            ..Default::default()
        }
    }

    pub fn with_mcq<I, K>(mut self, answers: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.mcq = Some(answers.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    pub fn with_assignments(mut self, marks: Vec<Mark>) -> Self {
        self.assignments = Some(marks);
        self
    }

    pub fn with_participation(mut self, marks: Vec<Mark>) -> Self {
        self.participation = Some(marks);
        self
    }
}

// ---------------------------------------------------------------------------
// Syllabus
// ---------------------------------------------------------------------------

/// A syllabus topic with its named subtopics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyllabusTopic {
    pub topic_id: String,
    pub name: String,
    #[serde(default)]
    pub subtopics: Vec<String>,
}

impl SyllabusTopic {
    pub fn has_subtopic(&self, subtopic: &str) -> bool {
        self.subtopics
            .iter()
            .any(|s| s.eq_ignore_ascii_case(subtopic.trim()))
    }
}

/// The static syllabus for one subject, topics in syllabus order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Syllabus {
    pub subject: String,
    pub code: String,
    topics: Vec<SyllabusTopic>,
}

impl Syllabus {
    /// Build a syllabus; topics are sorted into natural id order
    /// ("2" before "10", "1.2" before "1.10").
    pub fn new(
        subject: impl Into<String>,
        code: impl Into<String>,
        mut topics: Vec<SyllabusTopic>,
    ) -> Self {
        topics.sort_by(|a, b| natural_cmp(&a.topic_id, &b.topic_id));
        topics.dedup_by(|a, b| a.topic_id == b.topic_id);
        Self {
            subject: subject.into(),
            code: code.into(),
            topics,
        }
    }

    pub fn topics(&self) -> &[SyllabusTopic] {
        &self.topics
    }

    pub fn topic(&self, topic_id: &str) -> Option<&SyllabusTopic> {
        self.topics.iter().find(|t| t.topic_id == topic_id)
    }

    pub fn contains(&self, topic_id: &str) -> bool {
        self.topic(topic_id).is_some()
    }

    /// Position of a topic in syllabus order.
    pub fn position(&self, topic_id: &str) -> Option<usize> {
        self.topics.iter().position(|t| t.topic_id == topic_id)
    }

    /// Topics ordered by distance from `topic_id` in syllabus order,
    /// nearest first; the preceding topic wins at equal distance.
    pub fn neighbours(&self, topic_id: &str) -> Vec<&str> {
        let Some(pos) = self.position(topic_id) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(self.topics.len().saturating_sub(1));
        for distance in 1..self.topics.len() {
            if let Some(before) = pos.checked_sub(distance) {
                out.push(self.topics[before].topic_id.as_str());
            }
            if let Some(after) = self.topics.get(pos + distance) {
                out.push(after.topic_id.as_str());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

/// Compare dotted topic identifiers segment by segment, numerically where
/// both segments are numbers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (x.parse::<u64>(), y.parse::<u64>()) {
                    (Ok(nx), Ok(ny)) => nx.cmp(&ny),
                    (Ok(_), Err(_)) => Ordering::Less,
                    (Err(_), Ok(_)) => Ordering::Greater,
                    (Err(_), Err(_)) => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// The topics (and optionally subtopics) a question or assignment tests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionTag {
    pub question_id: String,
    pub topics: BTreeSet<String>,
    #[serde(default)]
    pub subtopics: BTreeSet<String>,
}

// ---------------------------------------------------------------------------
// Question bank
// ---------------------------------------------------------------------------

/// A tagged past-paper question available for practice papers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankQuestion {
    pub id: String,
    pub topics: BTreeSet<String>,
    #[serde(default)]
    pub subtopics: Vec<String>,
    /// Paper reference, e.g. "0580/12/M/J/23 Q4".
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub marks: Option<u32>,
}

/// An ordered collection of bank questions with a per-topic index.
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    pub id: String,
    pub name: String,
    questions: Vec<BankQuestion>,
    by_topic: BTreeMap<String, Vec<usize>>,
}

impl QuestionBank {
    pub fn new(id: impl Into<String>, name: impl Into<String>, questions: Vec<BankQuestion>) -> Self {
        let mut by_topic: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (idx, q) in questions.iter().enumerate() {
            for topic in &q.topics {
                by_topic.entry(topic.clone()).or_default().push(idx);
            }
        }
        Self {
            id: id.into(),
            name: name.into(),
            questions,
            by_topic,
        }
    }

    /// Merge several banks into one, keeping file order.
    pub fn merged(id: impl Into<String>, name: impl Into<String>, banks: Vec<QuestionBank>) -> Self {
        let questions = banks.into_iter().flat_map(|b| b.questions).collect();
        Self::new(id, name, questions)
    }

    pub fn questions(&self) -> &[BankQuestion] {
        &self.questions
    }

    /// Bank positions of the questions tagged with `topic_id`, in bank order.
    pub fn tagged(&self, topic_id: &str) -> &[usize] {
        self.by_topic.get(topic_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_topic(&self, topic_id: &str) -> bool {
        !self.tagged(topic_id).is_empty()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Derived results
// ---------------------------------------------------------------------------

/// A student's mastery of one topic.
///
/// `Indeterminate` means there was no evidence to judge by; it is never
/// the same thing as a score of zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "score", rename_all = "snake_case")]
pub enum MasteryScore {
    Known(f64),
    Indeterminate,
}

impl MasteryScore {
    pub fn value(&self) -> Option<f64> {
        match self {
            MasteryScore::Known(v) => Some(*v),
            MasteryScore::Indeterminate => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, MasteryScore::Known(_))
    }

    /// Weak means known and strictly below `threshold`.
    pub fn is_below(&self, threshold: f64) -> bool {
        matches!(self, MasteryScore::Known(v) if *v < threshold)
    }
}

impl fmt::Display for MasteryScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasteryScore::Known(v) => write!(f, "{:.0}%", v * 100.0),
            MasteryScore::Indeterminate => write!(f, "n/a"),
        }
    }
}

/// One question on a practice paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperItem {
    pub question_id: String,
    /// The student's weak topics this question targets.
    pub covers: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub marks: Option<u32>,
    /// Whether the student has been given this question in an earlier run.
    #[serde(default)]
    pub reused: bool,
}

/// A personalized practice paper for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticePaper {
    pub student_id: String,
    pub items: Vec<PaperItem>,
    /// Weak topics the paper targets, most severe first.
    pub target_topics: Vec<String>,
    /// Target topics left without a representative question.
    #[serde(default)]
    pub uncovered: Vec<String>,
    /// Weak topic -> adjacent topic used in its place.
    #[serde(default)]
    pub substitutions: BTreeMap<String, String>,
}

impl PracticePaper {
    pub fn new(student_id: impl Into<String>, target_topics: Vec<String>) -> Self {
        Self {
            student_id: student_id.into(),
            items: Vec::new(),
            target_topics,
            uncovered: Vec::new(),
            substitutions: BTreeMap::new(),
        }
    }

    pub fn question_ids(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.question_id.as_str()).collect()
    }

    pub fn total_marks(&self) -> u32 {
        self.items.iter().filter_map(|i| i.marks).sum()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
