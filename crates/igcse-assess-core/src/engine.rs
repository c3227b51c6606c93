//! Class assessment orchestrator.
//!
//! Analyzes every student on the roster concurrently against shared,
//! read-only reference data and assembles their practice papers.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::analyzer::{Analyzer, AnalyzerConfig};
use crate::assembler::{Assembler, AssemblerConfig, ShortfallPolicy};
use crate::config::{AssessConfig, DataConfig};
use crate::error::AssessError;
use crate::history::UsageHistory;
use crate::mapper::TopicMap;
use crate::model::{natural_cmp, PracticePaper, QuestionBank, StudentRecord, Syllabus};
use crate::parser::{load_question_bank, load_question_tags, load_syllabus};
use crate::report::{ClassReport, RunSettings, StudentOutcome, SyllabusSummary};
use crate::roster::{DataIssue, Roster};
use crate::statistics::compute_class_stats;

/// Syllabus, topic map and question bank: loaded once, shared by every
/// student task.
#[derive(Debug, Clone)]
pub struct ReferenceData {
    pub syllabus: Syllabus,
    pub topic_map: TopicMap,
    pub bank: QuestionBank,
}

impl ReferenceData {
    /// Load all reference files named in the data configuration.
    pub fn load(data: &DataConfig) -> Result<Self> {
        let syllabus = load_syllabus(&data.syllabus)?;
        let topic_map = load_question_tags(&data.question_tags, &syllabus)?;
        let bank = load_question_bank(&data.question_bank)?;
        tracing::info!(
            subject = %syllabus.subject,
            topics = syllabus.len(),
            tagged_items = topic_map.len(),
            bank_questions = bank.len(),
            "loaded reference data"
        );
        Ok(Self {
            syllabus,
            topic_map,
            bank,
        })
    }
}

/// Configuration for the assessment engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum students processed concurrently.
    pub parallelism: usize,
    pub analyzer: AnalyzerConfig,
    pub assembler: AssemblerConfig,
    /// Paper length limit.
    pub max_questions: usize,
    pub shortfall_policy: ShortfallPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            analyzer: AnalyzerConfig::default(),
            assembler: AssemblerConfig::default(),
            max_questions: 10,
            shortfall_policy: ShortfallPolicy::default(),
        }
    }
}

impl From<&AssessConfig> for EngineConfig {
    fn from(config: &AssessConfig) -> Self {
        Self {
            parallelism: config.parallelism,
            analyzer: config.analyzer_config(),
            assembler: config.assembler_config(),
            max_questions: config.assembly.max_questions,
            shortfall_policy: config.assembly.shortfall_policy,
        }
    }
}

impl EngineConfig {
    fn settings(&self) -> RunSettings {
        RunSettings {
            weights: self.analyzer.weights,
            weak_threshold: self.analyzer.weak_threshold,
            max_questions: self.max_questions,
            questions_per_topic: self.assembler.questions_per_topic,
            shortfall_policy: self.shortfall_policy,
            seed: self.assembler.seed,
            parallelism: self.parallelism,
        }
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_student_complete(&self, outcome: &StudentOutcome);
    fn on_student_error(&self, student_id: &str, error: &str);
    fn on_roster_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_student_complete(&self, _: &StudentOutcome) {}
    fn on_student_error(&self, _: &str, _: &str) {}
    fn on_roster_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Analyze one student and assemble their paper, applying the shortfall
/// policy. Never fails: assembly problems end up in `StudentOutcome::error`.
pub fn assess_student(
    record: &StudentRecord,
    reference: &ReferenceData,
    history: &dyn UsageHistory,
    analyzer: &Analyzer,
    config: &EngineConfig,
) -> StudentOutcome {
    let profile = analyzer.analyze(record, &reference.topic_map, &reference.syllabus);
    let weak = profile.weak_topics();
    tracing::debug!(student = %record.student_id, weak = ?weak, "analyzed student");

    if weak.is_empty() {
        return StudentOutcome {
            student_id: record.student_id.clone(),
            profile,
            paper: None,
            error: None,
        };
    }

    let assembler = Assembler::new(&reference.bank, history, config.assembler);
    let (paper, error) = match assembler.assemble(&record.student_id, &weak, config.max_questions)
    {
        Ok(paper) => (Some(paper), None),
        Err(e) => {
            let message = e.to_string();
            tracing::warn!(student = %record.student_id, policy = %config.shortfall_policy, "{message}");
            match (e, config.shortfall_policy) {
                (AssessError::InsufficientQuestions { partial, .. }, ShortfallPolicy::Partial) => {
                    (Some(*partial), Some(message))
                }
                (AssessError::InsufficientQuestions { topics, .. }, ShortfallPolicy::Adjacent) => {
                    substitute_adjacent(&record.student_id, &weak, &topics, reference, &assembler, config)
                }
                _ => (None, Some(message)),
            }
        }
    };

    StudentOutcome {
        student_id: record.student_id.clone(),
        profile,
        paper,
        error,
    }
}

/// Replace each unservable weak topic with its nearest servable syllabus
/// neighbour that is not already targeted, then assemble again.
fn substitute_adjacent(
    student_id: &str,
    weak: &[String],
    missing: &[String],
    reference: &ReferenceData,
    assembler: &Assembler<'_>,
    config: &EngineConfig,
) -> (Option<PracticePaper>, Option<String>) {
    let mut targeted: BTreeSet<String> = weak.iter().cloned().collect();
    let mut substitutions = BTreeMap::new();
    let mut topics = Vec::with_capacity(weak.len());

    for topic in weak {
        if !missing.contains(topic) {
            topics.push(topic.clone());
            continue;
        }
        let substitute = reference
            .syllabus
            .neighbours(topic)
            .into_iter()
            .find(|n| reference.bank.has_topic(n) && !targeted.contains(*n));
        match substitute {
            Some(n) => {
                tracing::info!(student = student_id, "substituting topic {n} for {topic}");
                targeted.insert(n.to_string());
                substitutions.insert(topic.clone(), n.to_string());
                topics.push(n.to_string());
            }
            None => topics.push(topic.clone()),
        }
    }

    let (mut paper, error) = match assembler.assemble(student_id, &topics, config.max_questions) {
        Ok(paper) => (paper, None),
        Err(AssessError::InsufficientQuestions {
            student_id,
            topics,
            partial,
        }) => {
            let message = format!(
                "no question or adjacent substitute for weak topic(s) {} of student {student_id}",
                topics.join(", ")
            );
            (*partial, Some(message))
        }
        Err(e) => return (None, Some(e.to_string())),
    };
    paper.substitutions = substitutions;
    (Some(paper), error)
}

/// The class assessment engine.
pub struct AssessmentEngine {
    reference: Arc<ReferenceData>,
    history: Arc<dyn UsageHistory>,
    analyzer: Analyzer,
    config: EngineConfig,
}

impl AssessmentEngine {
    /// Create an engine. Fails on invalid weights, threshold or limits.
    pub fn new(
        reference: Arc<ReferenceData>,
        history: Arc<dyn UsageHistory>,
        config: EngineConfig,
    ) -> Result<Self, AssessError> {
        let analyzer = Analyzer::new(config.analyzer)?;
        if config.parallelism == 0 {
            return Err(AssessError::InvalidConfig(
                "parallelism must be at least 1".into(),
            ));
        }
        if config.max_questions == 0 {
            return Err(AssessError::InvalidConfig(
                "max_questions must be at least 1".into(),
            ));
        }
        Ok(Self {
            reference,
            history,
            analyzer,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Assess every student on the roster.
    pub async fn run(&self, roster: Roster, progress: &dyn ProgressReporter) -> Result<ClassReport> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism));
        let Roster {
            students,
            mut issues,
            ..
        } = roster;

        tracing::info!(
            run_id = %run_id,
            students = students.len(),
            parallelism = self.config.parallelism,
            "starting assessment run"
        );

        let mut futures = FuturesUnordered::new();

        for record in students {
            let reference = Arc::clone(&self.reference);
            let history = Arc::clone(&self.history);
            let semaphore = Arc::clone(&semaphore);
            let analyzer = self.analyzer;
            let config = self.config.clone();

            futures.push(async move {
                let student_id = record.student_id.clone();
                let inner = async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;

                    tokio::task::spawn_blocking(move || {
                        assess_student(&record, &reference, history.as_ref(), &analyzer, &config)
                    })
                    .await
                    .context("student task panicked")
                };
                (student_id, inner.await)
            });
        }

        let mut outcomes = Vec::new();
        let mut completed = 0usize;
        let mut failed = 0usize;
        let total = futures.len();

        while let Some((student_id, result)) = futures.next().await {
            match result {
                Ok(outcome) => {
                    progress.on_student_complete(&outcome);
                    outcomes.push(outcome);
                    completed += 1;
                }
                Err(e) => {
                    tracing::error!("assessment failed for {student_id}: {e:#}");
                    progress.on_student_error(&student_id, &e.to_string());
                    issues.push(DataIssue::new(
                        Some(&student_id),
                        format!("assessment failed: {e:#}"),
                    ));
                    failed += 1;
                }
            }
        }

        outcomes.sort_by(|a, b| natural_cmp(&a.student_id, &b.student_id));

        let elapsed = start.elapsed();
        progress.on_roster_complete(total, completed, failed, elapsed);

        let aggregate = compute_class_stats(&outcomes, &self.reference.syllabus);
        let syllabus = &self.reference.syllabus;

        tracing::info!(
            completed,
            failed,
            papers = outcomes.iter().filter(|o| o.paper.is_some()).count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "assessment run finished"
        );

        Ok(ClassReport {
            id: run_id,
            created_at: chrono::Utc::now(),
            syllabus: SyllabusSummary {
                subject: syllabus.subject.clone(),
                code: syllabus.code.clone(),
                topic_count: syllabus.len(),
            },
            settings: self.config.settings(),
            students: outcomes,
            data_issues: issues,
            aggregate,
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::history::{NoHistory, UsageLedger};
    use crate::mapper::TagEntry;
    use crate::model::{BankQuestion, SyllabusTopic};

    fn reference(bank_topics: &[(&str, &[&str])]) -> ReferenceData {
        let syllabus = Syllabus::new(
            "Mathematics",
            "0580",
            ["1", "2", "3", "4"]
                .iter()
                .map(|id| SyllabusTopic {
                    topic_id: id.to_string(),
                    name: format!("Topic {id}"),
                    subtopics: vec![],
                })
                .collect(),
        );
        let tags = [("q1", "1"), ("q2", "2"), ("q3", "3"), ("q4", "4")]
            .iter()
            .map(|(q, t)| TagEntry {
                question_id: q.to_string(),
                topic_id: t.to_string(),
                subtopic: None,
            });
        let topic_map = TopicMap::from_entries(tags, &syllabus).unwrap();
        let questions = bank_topics
            .iter()
            .map(|(id, topics)| BankQuestion {
                id: id.to_string(),
                topics: topics.iter().map(|t| t.to_string()).collect(),
                subtopics: vec![],
                source: None,
                marks: Some(2),
            })
            .collect();
        ReferenceData {
            syllabus,
            topic_map,
            bank: QuestionBank::new("bank", "Bank", questions),
        }
    }

    /// Student weak on every topic listed in `weak`, strong elsewhere.
    fn student(id: &str, weak: &[&str]) -> StudentRecord {
        StudentRecord::new(id).with_mcq(["q1", "q2", "q3", "q4"].iter().enumerate().map(
            |(i, q)| {
                let topic = (i + 1).to_string();
                (*q, if weak.contains(&topic.as_str()) { 0.0 } else { 1.0 })
            },
        ))
    }

    fn config(policy: ShortfallPolicy) -> EngineConfig {
        EngineConfig {
            shortfall_policy: policy,
            ..EngineConfig::default()
        }
    }

    fn assess(reference: &ReferenceData, record: &StudentRecord, policy: ShortfallPolicy) -> StudentOutcome {
        let config = config(policy);
        let analyzer = Analyzer::new(config.analyzer).unwrap();
        assess_student(record, reference, &NoHistory, &analyzer, &config)
    }

    #[test]
    fn strong_student_gets_no_paper() {
        let reference = reference(&[("b1", &["1"])]);
        let outcome = assess(&reference, &student("S1", &[]), ShortfallPolicy::Partial);
        assert!(outcome.paper.is_none());
        assert!(outcome.error.is_none());
    }

    #[test]
    fn weak_student_gets_targeted_paper() {
        let reference = reference(&[("b1", &["1"]), ("b2", &["2"])]);
        let outcome = assess(&reference, &student("S1", &["2"]), ShortfallPolicy::Partial);
        let paper = outcome.paper.unwrap();
        assert_eq!(paper.question_ids(), vec!["b2"]);
        assert_eq!(paper.target_topics, vec!["2".to_string()]);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn partial_policy_keeps_partial_paper() {
        let reference = reference(&[("b1", &["1"])]);
        let outcome = assess(&reference, &student("S1", &["1", "3"]), ShortfallPolicy::Partial);
        let paper = outcome.paper.unwrap();
        assert_eq!(paper.question_ids(), vec!["b1"]);
        assert_eq!(paper.uncovered, vec!["3".to_string()]);
        assert!(outcome.error.unwrap().contains("weak topic(s) 3"));
    }

    #[test]
    fn fail_policy_issues_no_paper() {
        let reference = reference(&[("b1", &["1"])]);
        let outcome = assess(&reference, &student("S1", &["1", "3"]), ShortfallPolicy::Fail);
        assert!(outcome.paper.is_none());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn adjacent_policy_substitutes_nearest_topic() {
        // Topic 3 has no questions; 2 precedes it and wins over 4.
        let reference = reference(&[("b2", &["2"]), ("b4", &["4"])]);
        let outcome = assess(&reference, &student("S1", &["3"]), ShortfallPolicy::Adjacent);
        let paper = outcome.paper.unwrap();
        assert_eq!(paper.question_ids(), vec!["b2"]);
        assert_eq!(paper.substitutions.get("3").map(String::as_str), Some("2"));
        assert!(paper.uncovered.is_empty());
        assert!(outcome.error.is_none());
    }

    #[test]
    fn adjacent_policy_skips_already_targeted_topics() {
        let reference = reference(&[("b2", &["2"]), ("b4", &["4"])]);
        let outcome = assess(&reference, &student("S1", &["2", "3"]), ShortfallPolicy::Adjacent);
        let paper = outcome.paper.unwrap();
        assert_eq!(paper.substitutions.get("3").map(String::as_str), Some("4"));
        assert_eq!(paper.question_ids(), vec!["b2", "b4"]);
    }

    #[test]
    fn adjacent_policy_without_substitute_leaves_topic_uncovered() {
        let reference = reference(&[("b1", &["1"])]);
        let outcome = assess(&reference, &student("S1", &["1", "3"]), ShortfallPolicy::Adjacent);
        let paper = outcome.paper.unwrap();
        assert_eq!(paper.uncovered, vec!["3".to_string()]);
        assert!(paper.substitutions.is_empty());
        assert!(outcome.error.unwrap().contains("adjacent substitute"));
    }

    #[test]
    fn engine_rejects_invalid_config() {
        let reference = Arc::new(reference(&[]));
        let mut config = EngineConfig::default();
        config.analyzer.weights.mcq = 2.0;
        assert!(AssessmentEngine::new(Arc::clone(&reference), Arc::new(NoHistory), config).is_err());

        let config = EngineConfig {
            parallelism: 0,
            ..EngineConfig::default()
        };
        assert!(AssessmentEngine::new(reference, Arc::new(NoHistory), config).is_err());
    }

    struct CountingReporter {
        completed: AtomicUsize,
        finished: AtomicUsize,
    }

    impl ProgressReporter for CountingReporter {
        fn on_student_complete(&self, _: &StudentOutcome) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }
        fn on_student_error(&self, _: &str, _: &str) {}
        fn on_roster_complete(&self, total: usize, completed: usize, failed: usize, _: Duration) {
            assert_eq!(total, completed + failed);
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn run_assesses_whole_roster_in_order() {
        let reference = Arc::new(reference(&[("b1", &["1"]), ("b2", &["2"])]));
        let engine = AssessmentEngine::new(
            reference,
            Arc::new(NoHistory),
            EngineConfig {
                parallelism: 2,
                ..EngineConfig::default()
            },
        )
        .unwrap();

        let roster = Roster {
            students: vec![
                student("S10", &["1"]),
                student("S2", &["3"]),
                student("S1", &[]),
            ],
            issues: vec![DataIssue::new(Some("S2"), "late submission")],
            mcq_items: vec!["q1".into(), "q2".into(), "q3".into(), "q4".into()],
        };
        let reporter = CountingReporter {
            completed: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        };

        let report = engine.run(roster, &reporter).await.unwrap();

        let ids: Vec<&str> = report.students.iter().map(|s| s.student_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2", "S10"]);
        assert_eq!(reporter.completed.load(Ordering::SeqCst), 3);
        assert_eq!(reporter.finished.load(Ordering::SeqCst), 1);

        // S2 is weak only on a topic the bank cannot serve: partial, empty paper.
        let s2 = report.student("S2").unwrap();
        assert!(s2.error.is_some());
        assert_eq!(s2.paper.as_ref().unwrap().uncovered, vec!["3".to_string()]);

        assert_eq!(report.data_issues.len(), 1);
        assert_eq!(report.syllabus.topic_count, 4);
        assert_eq!(report.aggregate.per_student["S10"].paper_length, 1);
        assert_eq!(report.settings.parallelism, 2);
    }

    #[tokio::test]
    async fn used_questions_are_avoided() {
        let reference = Arc::new(reference(&[("b1", &["1"]), ("b1x", &["1"])]));
        let mut ledger = UsageLedger::new();
        let mut issued = PracticePaper::new("S1", vec!["1".into()]);
        issued.items.push(crate::model::PaperItem {
            question_id: "b1".into(),
            covers: vec!["1".into()],
            source: None,
            marks: None,
            reused: false,
        });
        ledger.record(&issued);

        let engine =
            AssessmentEngine::new(reference, Arc::new(ledger), EngineConfig::default()).unwrap();
        let roster = Roster {
            students: vec![student("S1", &["1"])],
            ..Roster::default()
        };
        let report = engine.run(roster, &NoopReporter).await.unwrap();
        let paper = report.students[0].paper.as_ref().unwrap();
        assert_eq!(paper.question_ids(), vec!["b1x"]);
        assert!(!paper.items[0].reused);
    }
}
