//! End-to-end run over files on disk: config, reference data, roster,
//! engine and report.

use std::path::Path;
use std::sync::Arc;

use igcse_assess_core::assembler::ShortfallPolicy;
use igcse_assess_core::config::{load_config_from, AssessConfig};
use igcse_assess_core::engine::{AssessmentEngine, EngineConfig, NoopReporter, ReferenceData};
use igcse_assess_core::history::{NoHistory, UsageLedger};
use igcse_assess_core::model::MasteryScore;
use igcse_assess_core::report::ClassReport;
use igcse_assess_core::roster::load_roster;
use tempfile::TempDir;

const CONFIG: &str = r#"
parallelism = 2

[analysis]
weak_threshold = 0.5

[data]
syllabus = "data/syllabus.json"
question_tags = "data/tags.csv"
question_bank = "data/bank"
mcq_results = "data/mcq.csv"
assignments = ""
participation = ""
"#;

const SYLLABUS: &str = r#"{
    "subject": "Mathematics",
    "code": "0580",
    "topics": {
        "1": { "name": "Number", "subtopics": ["Fractions"] },
        "2": { "name": "Algebra", "subtopics": ["Quadratics"] },
        "3": { "name": "Geometry", "subtopics": ["Angles"] }
    }
}"#;

const TAGS: &str = "question_id,topic_id,subtopic\nq1,1,Fractions\nq2,1,\nq3,2,\nq4,3,Angles\n";

const NUMBER_BANK: &str = r#"
[question_bank]
id = "number"
name = "Number"

[[questions]]
id = "b1"
topics = ["1"]
marks = 2

[[questions]]
id = "b2"
topics = ["1"]
marks = 3
"#;

const ALGEBRA_BANK: &str = r#"
[question_bank]
id = "algebra"
name = "Algebra"

[[questions]]
id = "b3"
topics = ["2"]
marks = 4
"#;

// S003 has no answer for q4, S004 answered only q4.
const MCQ: &str = "student_id,q1,q2,q3,q4,total_score\n\
S001,0,0,1,1,2\n\
S002,1,1,1,1,4\n\
S003,1,0,0,,1\n\
S004,,,,0,0\n";

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn setup() -> (TempDir, AssessConfig) {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "assess.toml", CONFIG);
    write(dir.path(), "data/syllabus.json", SYLLABUS);
    write(dir.path(), "data/tags.csv", TAGS);
    write(dir.path(), "data/bank/number.toml", NUMBER_BANK);
    write(dir.path(), "data/bank/algebra.toml", ALGEBRA_BANK);
    write(dir.path(), "data/mcq.csv", MCQ);

    let config = load_config_from(Some(&dir.path().join("assess.toml"))).unwrap();
    (dir, config)
}

async fn run(config: &AssessConfig, engine_config: EngineConfig) -> ClassReport {
    let reference = ReferenceData::load(&config.data).unwrap();
    let roster = load_roster(&config.roster_sources()).unwrap();
    let engine =
        AssessmentEngine::new(Arc::new(reference), Arc::new(NoHistory), engine_config).unwrap();
    engine.run(roster, &NoopReporter).await.unwrap()
}

fn paper_ids(report: &ClassReport, student: &str) -> Vec<String> {
    report
        .student(student)
        .and_then(|s| s.paper.as_ref())
        .map(|p| p.question_ids().into_iter().map(String::from).collect())
        .unwrap_or_default()
}

#[tokio::test]
async fn partial_policy_run() {
    let (_dir, config) = setup();
    let report = run(&config, EngineConfig::from(&config)).await;

    let ids: Vec<&str> = report.students.iter().map(|s| s.student_id.as_str()).collect();
    assert_eq!(ids, vec!["S001", "S002", "S003", "S004"]);
    assert!(report.data_issues.is_empty());
    assert_eq!(report.syllabus.topic_count, 3);

    // Only MCQ evidence: weights renormalize onto it.
    let s001 = report.student("S001").unwrap();
    assert_eq!(s001.profile.score("1"), MasteryScore::Known(0.0));
    assert_eq!(s001.profile.weak_topics(), vec!["1"]);
    // Ties go to the first bank question without a seed.
    assert_eq!(paper_ids(&report, "S001"), vec!["b1"]);

    let s002 = report.student("S002").unwrap();
    assert!(s002.profile.weak_topics().is_empty());
    assert!(s002.paper.is_none());
    assert!(s002.error.is_none());

    // Exactly at the threshold is not weak; no evidence is indeterminate.
    let s003 = report.student("S003").unwrap();
    assert_eq!(s003.profile.score("1"), MasteryScore::Known(0.5));
    assert_eq!(s003.profile.score("3"), MasteryScore::Indeterminate);
    assert_eq!(s003.profile.weak_topics(), vec!["2"]);
    assert_eq!(paper_ids(&report, "S003"), vec!["b3"]);

    // Nothing in the bank covers topic 3.
    let s004 = report.student("S004").unwrap();
    assert_eq!(s004.profile.weak_topics(), vec!["3"]);
    let paper = s004.paper.as_ref().unwrap();
    assert!(paper.is_empty());
    assert_eq!(paper.uncovered, vec!["3"]);
    assert!(s004.error.is_some());

    let topic1 = &report.aggregate.per_topic["1"];
    assert_eq!(topic1.weak_students, 1);
    assert_eq!(topic1.known_students, 3);
}

#[tokio::test]
async fn adjacent_policy_substitutes_neighbour() {
    let (_dir, config) = setup();
    let engine_config = EngineConfig {
        shortfall_policy: ShortfallPolicy::Adjacent,
        ..EngineConfig::from(&config)
    };
    let report = run(&config, engine_config).await;

    let s004 = report.student("S004").unwrap();
    let paper = s004.paper.as_ref().unwrap();
    assert_eq!(paper.question_ids(), vec!["b3"]);
    assert_eq!(paper.substitutions.get("3").map(String::as_str), Some("2"));
    assert!(s004.error.is_none());
}

#[tokio::test]
async fn fail_policy_issues_no_paper() {
    let (_dir, config) = setup();
    let engine_config = EngineConfig {
        shortfall_policy: ShortfallPolicy::Fail,
        ..EngineConfig::from(&config)
    };
    let report = run(&config, engine_config).await;

    let s004 = report.student("S004").unwrap();
    assert!(s004.paper.is_none());
    assert!(s004.error.as_deref().unwrap().contains("3"));
    // Other students are unaffected.
    assert_eq!(paper_ids(&report, "S001"), vec!["b1"]);
}

#[tokio::test]
async fn recorded_questions_are_not_reissued() {
    let (dir, config) = setup();
    let reference = Arc::new(ReferenceData::load(&config.data).unwrap());

    let first = AssessmentEngine::new(
        Arc::clone(&reference),
        Arc::new(NoHistory),
        EngineConfig::from(&config),
    )
    .unwrap()
    .run(load_roster(&config.roster_sources()).unwrap(), &NoopReporter)
    .await
    .unwrap();

    let mut ledger = UsageLedger::default();
    for paper in first.papers() {
        ledger.record(paper);
    }
    let history_path = dir.path().join("history.json");
    ledger.save_json(&history_path).unwrap();
    let ledger = UsageLedger::load_json(&history_path).unwrap();

    let second = AssessmentEngine::new(reference, Arc::new(ledger), EngineConfig::from(&config))
        .unwrap()
        .run(load_roster(&config.roster_sources()).unwrap(), &NoopReporter)
        .await
        .unwrap();

    assert_eq!(paper_ids(&first, "S001"), vec!["b1"]);
    assert_eq!(paper_ids(&second, "S001"), vec!["b2"]);
    // Only one algebra question exists, so it is reused and marked.
    let s003 = second.student("S003").unwrap().paper.as_ref().unwrap();
    assert_eq!(s003.question_ids(), vec!["b3"]);
    assert!(s003.items[0].reused);
}
