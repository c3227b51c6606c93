//! Question-to-topic mapping.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::AssessError;
use crate::model::{QuestionTag, Syllabus};

/// Maps assessment items to the syllabus topics they test.
///
/// Built once from the tag table and validated against the syllabus; it is
/// read-only for the rest of the run.
#[derive(Debug, Clone, Default)]
pub struct TopicMap {
    tags: BTreeMap<String, QuestionTag>,
}

/// One row of the tag table: an item tagged with a topic, optionally
/// narrowed to a subtopic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    pub question_id: String,
    pub topic_id: String,
    pub subtopic: Option<String>,
}

impl TopicMap {
    /// Build a topic map, rejecting references to topics or subtopics the
    /// syllabus does not define.
    pub fn from_entries<I>(entries: I, syllabus: &Syllabus) -> Result<Self, AssessError>
    where
        I: IntoIterator<Item = TagEntry>,
    {
        let mut tags: BTreeMap<String, QuestionTag> = BTreeMap::new();

        for entry in entries {
            let Some(topic) = syllabus.topic(&entry.topic_id) else {
                return Err(AssessError::UnknownTopic {
                    item: format!("tag for {}", entry.question_id),
                    topic_id: entry.topic_id,
                });
            };
            if let Some(sub) = &entry.subtopic {
                if !topic.has_subtopic(sub) {
                    return Err(AssessError::UnknownSubtopic {
                        item: format!("tag for {}", entry.question_id),
                        topic_id: entry.topic_id,
                        subtopic: sub.clone(),
                    });
                }
            }

            let tag = tags
                .entry(entry.question_id.clone())
                .or_insert_with(|| QuestionTag {
                    question_id: entry.question_id.clone(),
                    ..Default::default()
                });
            tag.topics.insert(entry.topic_id);
            if let Some(sub) = entry.subtopic {
                tag.subtopics.insert(sub);
            }
        }

        Ok(Self { tags })
    }

    /// The topics a question tests.
    pub fn map(&self, question_id: &str) -> Result<&BTreeSet<String>, AssessError> {
        self.get(question_id)
            .ok_or_else(|| AssessError::UnmappedQuestion {
                question_id: question_id.to_string(),
            })
    }

    /// Non-failing lookup; `None` for untagged items.
    pub fn get(&self, question_id: &str) -> Option<&BTreeSet<String>> {
        self.tags
            .get(question_id)
            .map(|t| &t.topics)
            .filter(|topics| !topics.is_empty())
    }

    pub fn tag(&self, question_id: &str) -> Option<&QuestionTag> {
        self.tags.get(question_id)
    }

    /// Items from `question_ids` that have no topic tag.
    pub fn unmapped<'a, I>(&self, question_ids: I) -> Vec<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        question_ids
            .into_iter()
            .filter(|q| self.get(q).is_none())
            .collect()
    }

    /// Number of tagged items per topic.
    pub fn items_per_topic(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for tag in self.tags.values() {
            for topic in &tag.topics {
                *counts.entry(topic.as_str()).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
