//! Reference data loaders: syllabus (JSON), question tags (CSV) and the
//! question bank (TOML), plus validation of the bank against the syllabus.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::mapper::{TagEntry, TopicMap};
use crate::model::{BankQuestion, QuestionBank, Syllabus, SyllabusTopic};

// ---------------------------------------------------------------------------
// Syllabus
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct JsonSyllabus {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    code: String,
    topics: BTreeMap<String, JsonTopic>,
}

#[derive(Debug, Deserialize)]
struct JsonTopic {
    name: String,
    #[serde(default)]
    subtopics: Vec<String>,
}

/// Load a syllabus definition file.
pub fn load_syllabus(path: &Path) -> Result<Syllabus> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read syllabus: {}", path.display()))?;
    parse_syllabus_str(&content, path)
}

/// Parse syllabus JSON (useful for testing).
pub fn parse_syllabus_str(content: &str, source_path: &Path) -> Result<Syllabus> {
    let parsed: JsonSyllabus = serde_json::from_str(content)
        .with_context(|| format!("failed to parse syllabus JSON: {}", source_path.display()))?;
    anyhow::ensure!(
        !parsed.topics.is_empty(),
        "syllabus {} defines no topics",
        source_path.display()
    );

    let topics = parsed
        .topics
        .into_iter()
        .map(|(topic_id, t)| SyllabusTopic {
            topic_id,
            name: t.name,
            subtopics: t.subtopics,
        })
        .collect();

    Ok(Syllabus::new(parsed.subject, parsed.code, topics))
}

// ---------------------------------------------------------------------------
// Question tags
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CsvTagRow {
    question_id: String,
    topic_id: String,
    #[serde(default)]
    subtopic: Option<String>,
}

/// Load the question-to-topic tag table and validate it against the syllabus.
pub fn load_question_tags(path: &Path, syllabus: &Syllabus) -> Result<TopicMap> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open question tags: {}", path.display()))?;
    parse_question_tags(file, syllabus)
        .with_context(|| format!("invalid question tags: {}", path.display()))
}

/// Parse a tag table from any reader.
pub fn parse_question_tags<R: std::io::Read>(reader: R, syllabus: &Syllabus) -> Result<TopicMap> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut entries = Vec::new();
    for (line, row) in csv.deserialize::<CsvTagRow>().enumerate() {
        let row = row.with_context(|| format!("malformed tag row {}", line + 2))?;
        entries.push(TagEntry {
            question_id: row.question_id,
            topic_id: row.topic_id,
            subtopic: row.subtopic.filter(|s| !s.is_empty()),
        });
    }

    Ok(TopicMap::from_entries(entries, syllabus)?)
}

// ---------------------------------------------------------------------------
// Question bank
// ---------------------------------------------------------------------------

/// Intermediate TOML structure for question bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    question_bank: TomlBankHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    subtopics: Vec<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    marks: Option<u32>,
}

/// Parse a single TOML question bank file.
pub fn parse_question_bank(path: &Path) -> Result<QuestionBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question bank file: {}", path.display()))?;

    parse_question_bank_str(&content, path)
}

/// Parse a TOML string into a `QuestionBank` (useful for testing).
pub fn parse_question_bank_str(content: &str, source_path: &Path) -> Result<QuestionBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let questions = parsed
        .questions
        .into_iter()
        .map(|q| BankQuestion {
            id: q.id,
            topics: q.topics.into_iter().collect(),
            subtopics: q.subtopics,
            source: q.source,
            marks: q.marks,
        })
        .collect();

    Ok(QuestionBank::new(
        parsed.question_bank.id,
        parsed.question_bank.name,
        questions,
    ))
}

/// Recursively load all `.toml` question bank files from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<QuestionBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_question_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// Load a bank from a file, or merge every bank found under a directory.
pub fn load_question_bank(path: &Path) -> Result<QuestionBank> {
    if path.is_dir() {
        let banks = load_bank_directory(path)?;
        anyhow::ensure!(
            !banks.is_empty(),
            "no question bank files found in {}",
            path.display()
        );
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "question-bank".to_string());
        Ok(QuestionBank::merged(name.clone(), name, banks))
    } else {
        parse_question_bank(path)
    }
}

/// A warning from reference data validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a question bank against the syllabus.
pub fn validate_bank(bank: &QuestionBank, syllabus: &Syllabus) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    // Check for duplicate question IDs
    let mut seen_ids = HashSet::new();
    for q in bank.questions() {
        if !seen_ids.insert(&q.id) {
            warnings.push(ValidationWarning {
                question_id: Some(q.id.clone()),
                message: format!("duplicate question ID: {}", q.id),
            });
        }
    }

    for q in bank.questions() {
        if q.topics.is_empty() {
            warnings.push(ValidationWarning {
                question_id: Some(q.id.clone()),
                message: "question has no topic tags and can never be selected".into(),
            });
        }
        for topic_id in &q.topics {
            if !syllabus.contains(topic_id) {
                warnings.push(ValidationWarning {
                    question_id: Some(q.id.clone()),
                    message: format!("unknown syllabus topic: {topic_id}"),
                });
            }
        }
        for sub in &q.subtopics {
            let known = q
                .topics
                .iter()
                .filter_map(|t| syllabus.topic(t))
                .any(|t| t.has_subtopic(sub));
            if !known {
                warnings.push(ValidationWarning {
                    question_id: Some(q.id.clone()),
                    message: format!("subtopic '{sub}' is not listed under the question's topics"),
                });
            }
        }
    }

    // Topics a practice paper could never target
    let covered: BTreeSet<&str> = bank
        .questions()
        .iter()
        .flat_map(|q| q.topics.iter().map(String::as_str))
        .collect();
    for topic in syllabus.topics() {
        if !covered.contains(topic.topic_id.as_str()) {
            warnings.push(ValidationWarning {
                question_id: None,
                message: format!(
                    "no bank questions for topic {} ({})",
                    topic.topic_id, topic.name
                ),
            });
        }
    }

    warnings
}

/// Warn about MCQ columns that have no topic tag.
pub fn validate_mcq_items(items: &[String], topic_map: &TopicMap) -> Vec<ValidationWarning> {
    topic_map
        .unmapped(items.iter().map(String::as_str))
        .into_iter()
        .map(|q| ValidationWarning {
            question_id: Some(q.to_string()),
            message: "MCQ item has no topic tag and will be skipped".into(),
        })
        .collect()
}
