//! Domain error types.
//!
//! Configuration errors abort a run before any student is analyzed; the
//! remaining variants describe per-item or per-student problems that the
//! engine isolates so one bad record does not sink the whole batch.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::PracticePaper;

/// The three input streams a student record is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Mcq,
    Assignments,
    Participation,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Mcq => write!(f, "mcq"),
            Stream::Assignments => write!(f, "assignments"),
            Stream::Participation => write!(f, "participation"),
        }
    }
}

/// Errors raised by the mapper, analyzer, assembler and loaders.
#[derive(Debug, Error)]
pub enum AssessError {
    /// A question has no syllabus topic tag.
    #[error("question {question_id} has no syllabus topic tag")]
    UnmappedQuestion { question_id: String },

    /// Analysis weights are malformed or do not sum to 1.0.
    #[error("invalid weight configuration: {0}")]
    InvalidWeightConfig(String),

    /// Any other out-of-range configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The question bank cannot supply a question for one or more weak topics.
    ///
    /// `partial` holds the paper assembled for the topics that could be served.
    #[error(
        "question bank has no questions for weak topic(s) {} of student {student_id}",
        topics.join(", ")
    )]
    InsufficientQuestions {
        student_id: String,
        topics: Vec<String>,
        partial: Box<PracticePaper>,
    },

    /// A student present in one stream is absent from another.
    #[error("student {student_id} is missing from the {stream} data")]
    MissingStudentData { student_id: String, stream: Stream },

    /// A tag or bank entry references a topic the syllabus does not define.
    #[error("{item} references unknown syllabus topic {topic_id}")]
    UnknownTopic { item: String, topic_id: String },

    /// A tag or bank entry references a subtopic its topic does not list.
    #[error("{item} references unknown subtopic '{subtopic}' of topic {topic_id}")]
    UnknownSubtopic {
        item: String,
        topic_id: String,
        subtopic: String,
    },
}

impl AssessError {
    /// Returns `true` if the error is scoped to a single item or student and
    /// the run can continue without it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AssessError::UnmappedQuestion { .. }
                | AssessError::InsufficientQuestions { .. }
                | AssessError::MissingStudentData { .. }
        )
    }

    /// The student this error concerns, if any.
    pub fn student_id(&self) -> Option<&str> {
        match self {
            AssessError::InsufficientQuestions { student_id, .. }
            | AssessError::MissingStudentData { student_id, .. } => Some(student_id),
            _ => None,
        }
    }
}
