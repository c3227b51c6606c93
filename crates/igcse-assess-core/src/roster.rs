//! Loading the three per-student input streams and merging them into
//! student records.
//!
//! Streams are wide CSV tables keyed by `student_id`: one column per MCQ
//! question, assignment or participation period. Derived columns such as
//! `total` or `average` are ignored. Problems with individual cells or rows
//! are collected as [`DataIssue`]s rather than failing the load.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{AssessError, Stream};
use crate::model::{Mark, StudentRecord};

const DERIVED_COLUMNS: &[&str] = &["total", "total_score", "average", "mean"];

/// A non-fatal problem found while loading student data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataIssue {
    #[serde(default)]
    pub student_id: Option<String>,
    pub message: String,
}

impl DataIssue {
    pub fn new(student_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            student_id: student_id.map(str::to_string),
            message: message.into(),
        }
    }
}

impl From<&AssessError> for DataIssue {
    fn from(err: &AssessError) -> Self {
        Self::new(err.student_id(), err.to_string())
    }
}

/// Where to read each stream from. Assignment and participation streams
/// are optional; when not supplied no student is reported missing from them.
#[derive(Debug, Clone)]
pub struct RosterSources {
    pub mcq_results: PathBuf,
    pub assignments: Option<PathBuf>,
    pub participation: Option<PathBuf>,
    pub assignment_max_mark: f64,
    pub participation_max_mark: f64,
}

/// A parsed stream: column ids and one row of raw cells per student.
#[derive(Debug, Clone, Default)]
pub struct StreamTable {
    pub items: Vec<String>,
    pub rows: BTreeMap<String, Vec<Option<f64>>>,
}

/// All student records for one run, plus whatever went wrong loading them.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub students: Vec<StudentRecord>,
    pub issues: Vec<DataIssue>,
    /// MCQ question columns, in file order.
    pub mcq_items: Vec<String>,
}

impl Roster {
    pub fn student(&self, student_id: &str) -> Option<&StudentRecord> {
        self.students.iter().find(|s| s.student_id == student_id)
    }

    /// Keep only the listed students.
    pub fn retain_students(&mut self, ids: &[String]) {
        self.students.retain(|s| ids.contains(&s.student_id));
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}

/// Load and merge the configured streams.
pub fn load_roster(sources: &RosterSources) -> Result<Roster> {
    let mut issues = Vec::new();

    let mcq = read_stream_file(&sources.mcq_results, Stream::Mcq, 1.0, &mut issues)?;
    let assignments = sources
        .assignments
        .as_deref()
        .map(|p| {
            read_stream_file(
                p,
                Stream::Assignments,
                sources.assignment_max_mark,
                &mut issues,
            )
        })
        .transpose()?;
    let participation = sources
        .participation
        .as_deref()
        .map(|p| {
            read_stream_file(
                p,
                Stream::Participation,
                sources.participation_max_mark,
                &mut issues,
            )
        })
        .transpose()?;

    let roster = merge_streams(mcq, assignments, participation, issues);
    tracing::info!(
        students = roster.students.len(),
        issues = roster.issues.len(),
        "loaded roster"
    );
    Ok(roster)
}

fn read_stream_file(
    path: &Path,
    stream: Stream,
    max_mark: f64,
    issues: &mut Vec<DataIssue>,
) -> Result<StreamTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {stream} data: {}", path.display()))?;
    read_stream(file, stream, max_mark, issues)
        .with_context(|| format!("failed to read {stream} data: {}", path.display()))
}

/// Parse one wide CSV stream. MCQ cells accept `1`/`0`, `true`/`false`,
/// `yes`/`no` or a fraction in [0, 1]; mark cells are divided by `max_mark`
/// and must land in [0, 1].
pub fn read_stream<R: Read>(
    reader: R,
    stream: Stream,
    max_mark: f64,
    issues: &mut Vec<DataIssue>,
) -> Result<StreamTable> {
    anyhow::ensure!(
        max_mark.is_finite() && max_mark > 0.0,
        "maximum mark for {stream} must be positive, got {max_mark}"
    );

    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    let headers = csv.headers().context("missing header row")?.clone();

    let key_col = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("student_id"))
        .ok_or_else(|| anyhow::anyhow!("no student_id column in {stream} data"))?;

    let columns: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(i, h)| {
            *i != key_col
                && !h.is_empty()
                && !DERIVED_COLUMNS.iter().any(|d| h.eq_ignore_ascii_case(d))
        })
        .map(|(i, h)| (i, h.to_string()))
        .collect();

    let mut table = StreamTable {
        items: columns.iter().map(|(_, h)| h.clone()).collect(),
        rows: BTreeMap::new(),
    };

    // Byte records so one badly encoded cell costs only that cell.
    for (line, record) in csv.byte_records().enumerate() {
        let record = record.with_context(|| format!("malformed row {}", line + 2))?;
        let key = record.get(key_col).map(std::str::from_utf8);
        if let Some(Err(_)) = key {
            issues.push(DataIssue::new(
                None,
                format!("{stream} row {} has a student_id that is not UTF-8, skipped", line + 2),
            ));
            continue;
        }
        let Some(student_id) = key.and_then(Result::ok).filter(|s| !s.is_empty()) else {
            issues.push(DataIssue::new(
                None,
                format!("{stream} row {} has no student_id, skipped", line + 2),
            ));
            continue;
        };
        if table.rows.contains_key(student_id) {
            issues.push(DataIssue::new(
                Some(student_id),
                format!("duplicate {stream} row for {student_id}, later row ignored"),
            ));
            continue;
        }

        let cells = columns
            .iter()
            .map(|(i, item)| {
                let Ok(raw) = std::str::from_utf8(record.get(*i).unwrap_or(b"")) else {
                    issues.push(DataIssue::new(
                        Some(student_id),
                        format!("{stream} value for {item} is not UTF-8, skipped"),
                    ));
                    return None;
                };
                if raw.is_empty() {
                    return None;
                }
                let parsed = match stream {
                    Stream::Mcq => parse_correctness(raw),
                    Stream::Assignments | Stream::Participation => {
                        raw.parse::<f64>().ok().map(|v| v / max_mark)
                    }
                };
                match parsed {
                    Some(v) if (0.0..=1.0).contains(&v) => Some(v),
                    _ => {
                        issues.push(DataIssue::new(
                            Some(student_id),
                            format!("invalid {stream} value '{raw}' for {item}, skipped"),
                        ));
                        None
                    }
                }
            })
            .collect();
        table.rows.insert(student_id.to_string(), cells);
    }

    Ok(table)
}

fn parse_correctness(raw: &str) -> Option<f64> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "correct" => Some(1.0),
        "false" | "no" | "n" | "incorrect" => Some(0.0),
        other => other.parse::<f64>().ok(),
    }
}

/// Merge parsed streams into one record per student. Students missing from
/// a supplied stream are reported and carry `None` for it.
pub fn merge_streams(
    mcq: StreamTable,
    assignments: Option<StreamTable>,
    participation: Option<StreamTable>,
    mut issues: Vec<DataIssue>,
) -> Roster {
    let mut ids: Vec<&String> = mcq.rows.keys().collect();
    for table in assignments.iter().chain(participation.iter()) {
        ids.extend(table.rows.keys());
    }
    ids.sort();
    ids.dedup();

    let mut students = Vec::with_capacity(ids.len());
    for id in ids {
        let mut record = StudentRecord::new(id.as_str());

        match mcq.rows.get(id) {
            Some(cells) => {
                record.mcq = Some(
                    mcq.items
                        .iter()
                        .zip(cells)
                        .filter_map(|(item, v)| v.map(|v| (item.clone(), v)))
                        .collect(),
                );
            }
            None => issues.push(missing(id, Stream::Mcq)),
        }

        if let Some(table) = &assignments {
            match table.rows.get(id) {
                Some(cells) => record.assignments = Some(marks(&table.items, cells)),
                None => issues.push(missing(id, Stream::Assignments)),
            }
        }
        if let Some(table) = &participation {
            match table.rows.get(id) {
                Some(cells) => record.participation = Some(marks(&table.items, cells)),
                None => issues.push(missing(id, Stream::Participation)),
            }
        }

        students.push(record);
    }

    for issue in &issues {
        tracing::warn!("{}", issue.message);
    }

    Roster {
        students,
        issues,
        mcq_items: mcq.items,
    }
}

fn marks(items: &[String], cells: &[Option<f64>]) -> Vec<Mark> {
    items
        .iter()
        .zip(cells)
        .filter_map(|(item, v)| v.map(|v| Mark::new(item.clone(), v)))
        .collect()
}

fn missing(student_id: &str, stream: Stream) -> DataIssue {
    DataIssue::from(&AssessError::MissingStudentData {
        student_id: student_id.to_string(),
        stream,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MCQ: &str = "student_id,q1,q2,q3,total_score\nS001,1,0,1,2\nS002,true,0.5,,1.5\n";
    const ASSIGNMENTS: &str = "student_id,assignment_1,assignment_2,total\nS001,80,60,140\nS003,50,,50\n";

    fn parse(data: &str, stream: Stream, max: f64) -> (StreamTable, Vec<DataIssue>) {
        let mut issues = Vec::new();
        let table = read_stream(data.as_bytes(), stream, max, &mut issues).unwrap();
        (table, issues)
    }

    #[test]
    fn ignores_derived_columns() {
        let (table, issues) = parse(MCQ, Stream::Mcq, 1.0);
        assert_eq!(table.items, vec!["q1", "q2", "q3"]);
        assert!(issues.is_empty());
        assert_eq!(table.rows["S002"], vec![Some(1.0), Some(0.5), None]);
    }

    #[test]
    fn normalizes_marks() {
        let (table, _) = parse(ASSIGNMENTS, Stream::Assignments, 100.0);
        assert_eq!(table.rows["S001"], vec![Some(0.8), Some(0.6)]);
    }

    #[test]
    fn out_of_range_values_become_issues() {
        let data = "student_id,q1,q2\nS001,2,maybe\n";
        let (table, issues) = parse(data, Stream::Mcq, 1.0);
        assert_eq!(table.rows["S001"], vec![None, None]);
        assert_eq!(issues.len(), 2);
        assert!(issues[0].message.contains("'2'"));
        assert_eq!(issues[0].student_id.as_deref(), Some("S001"));
    }

    #[test]
    fn badly_encoded_row_does_not_drop_its_neighbours() {
        let mut data = b"student_id,q1\nS001,1\nS002,".to_vec();
        data.extend_from_slice(&[0xff, 0xfe]);
        data.extend_from_slice(b"\nS003,0\n");

        let mut issues = Vec::new();
        let table = read_stream(data.as_slice(), Stream::Mcq, 1.0, &mut issues).unwrap();

        assert_eq!(table.rows["S001"], vec![Some(1.0)]);
        assert_eq!(table.rows["S002"], vec![None]);
        assert_eq!(table.rows["S003"], vec![Some(0.0)]);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].student_id.as_deref(), Some("S002"));
        assert!(issues[0].message.contains("not UTF-8"));
    }

    #[test]
    fn duplicate_rows_keep_first() {
        let data = "student_id,q1\nS001,1\nS001,0\n";
        let (table, issues) = parse(data, Stream::Mcq, 1.0);
        assert_eq!(table.rows["S001"], vec![Some(1.0)]);
        assert!(issues[0].message.contains("duplicate"));
    }

    #[test]
    fn requires_student_id_column() {
        let mut issues = Vec::new();
        let result = read_stream("name,q1\nAvery,1\n".as_bytes(), Stream::Mcq, 1.0, &mut issues);
        assert!(result.is_err());
    }

    #[test]
    fn merge_reports_missing_students() {
        let (mcq, mut issues) = parse(MCQ, Stream::Mcq, 1.0);
        let (assignments, more) = parse(ASSIGNMENTS, Stream::Assignments, 100.0);
        issues.extend(more);

        let roster = merge_streams(mcq, Some(assignments), None, issues);
        let ids: Vec<&str> = roster.students.iter().map(|s| s.student_id.as_str()).collect();
        assert_eq!(ids, vec!["S001", "S002", "S003"]);

        let s2 = roster.student("S002").unwrap();
        assert!(s2.assignments.is_none());
        assert!(s2.participation.is_none());
        assert_eq!(s2.mcq.as_ref().unwrap().len(), 2);

        let s3 = roster.student("S003").unwrap();
        assert!(s3.mcq.is_none());
        assert_eq!(s3.assignments.as_ref().unwrap(), &vec![Mark::new("assignment_1", 0.5)]);

        let messages: Vec<&str> = roster.issues.iter().map(|i| i.message.as_str()).collect();
        assert!(messages.contains(&"student S002 is missing from the assignments data"));
        assert!(messages.contains(&"student S003 is missing from the mcq data"));
        assert_eq!(roster.issues.len(), 2, "participation was not supplied");
    }

    #[test]
    fn load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let mcq = dir.path().join("mcq.csv");
        std::fs::write(&mcq, MCQ).unwrap();

        let roster = load_roster(&RosterSources {
            mcq_results: mcq,
            assignments: None,
            participation: None,
            assignment_max_mark: 100.0,
            participation_max_mark: 10.0,
        })
        .unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.mcq_items, vec!["q1", "q2", "q3"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = load_roster(&RosterSources {
            mcq_results: PathBuf::from("does-not-exist.csv"),
            assignments: None,
            participation: None,
            assignment_max_mark: 100.0,
            participation_max_mark: 10.0,
        });
        assert!(result.is_err());
    }
}
