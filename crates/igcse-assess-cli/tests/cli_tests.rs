//! CLI integration tests using assert_cmd.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn igcse_assess() -> Command {
    #[allow(deprecated)]
    Command::cargo_bin("igcse-assess").unwrap()
}

/// A temp dir populated by `igcse-assess init`.
fn initialized() -> TempDir {
    let dir = TempDir::new().unwrap();
    igcse_assess()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
    dir
}

fn find_output(dir: &Path, prefix: &str) -> PathBuf {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(prefix))
        })
        .unwrap_or_else(|| panic!("no {prefix}* file in {}", dir.display()))
}

fn paper_questions(report: &Path, student: &str) -> Vec<String> {
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report).unwrap()).unwrap();
    let outcome = json["students"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["student_id"] == student)
        .unwrap();
    outcome["paper"]["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["question_id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    igcse_assess()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created igcse-assess.toml"))
        .stdout(predicate::str::contains("Created data/question_bank.toml"));

    assert!(dir.path().join("igcse-assess.toml").exists());
    assert!(dir.path().join("data/syllabus_topics.json").exists());
    assert!(dir.path().join("data/sample_participation.csv").exists());
}

#[test]
fn init_skips_existing() {
    let dir = initialized();

    igcse_assess()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists, skipping"));
}

#[test]
fn validate_sample_data() {
    let dir = initialized();

    igcse_assess()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Syllabus: Mathematics 0580 (4 topics)"))
        .stdout(predicate::str::contains("Question bank: 0580 sample past-paper questions (7 questions)"))
        .stdout(predicate::str::contains("Students: 4 (5 MCQ items)"))
        .stdout(predicate::str::contains(
            "[S004] WARNING: student S004 is missing from the participation data",
        ))
        .stdout(predicate::str::contains("1 warning(s) found."));
}

#[test]
fn validate_reports_unmapped_items() {
    let dir = initialized();
    std::fs::write(
        dir.path().join("data/sample_mcq_results.csv"),
        "student_id,q1,q9\nS001,1,0\n",
    )
    .unwrap();

    igcse_assess()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("[q9] WARNING: MCQ item has no topic tag"));
}

#[test]
fn validate_rejects_bad_weights() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    std::fs::write(
        &config,
        "[analysis.weights]\nmcq = 0.7\nassignment = 0.3\nparticipation = 0.2\n",
    )
    .unwrap();

    igcse_assess()
        .arg("validate")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid weight configuration"));
}

#[test]
fn validate_missing_config() {
    igcse_assess()
        .arg("validate")
        .arg("--config")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: config file not found"));
}

#[test]
fn analyze_writes_all_outputs() {
    let dir = initialized();

    igcse_assess()
        .current_dir(dir.path())
        .env("RUST_LOG", "igcse_assess=info")
        .arg("analyze")
        .assert()
        .success()
        .stderr(predicate::str::contains("S001"))
        .stderr(predicate::str::contains("HTML report"))
        .stderr(predicate::str::contains("reports written"))
        .stderr(predicate::str::contains("usage history updated"));

    let output = dir.path().join("output");
    let report = find_output(&output, "class-report-");
    find_output(&output, "mastery-");
    find_output(&output, "papers-");
    find_output(&output, "summary-");
    find_output(&output, "report-");
    assert!(output.join("usage_history.json").exists());

    assert_eq!(paper_questions(&report, "S001"), vec!["s22-22-q11"]);
}

#[test]
fn analyze_avoids_previously_issued_questions() {
    let dir = initialized();

    igcse_assess()
        .current_dir(dir.path())
        .args(["analyze", "--format", "json", "--output", "first"])
        .assert()
        .success();
    igcse_assess()
        .current_dir(dir.path())
        .args(["analyze", "--format", "json", "--output", "second"])
        .assert()
        .success();

    let second = find_output(&dir.path().join("second"), "class-report-");
    assert_eq!(
        paper_questions(&second, "S001"),
        vec!["w23-41-q03", "s23-21-q07"]
    );
}

#[test]
fn analyze_no_record_leaves_history_untouched() {
    let dir = initialized();

    igcse_assess()
        .current_dir(dir.path())
        .env("RUST_LOG", "igcse_assess=info")
        .args(["analyze", "--format", "md", "--no-record"])
        .assert()
        .success()
        .stderr(predicate::str::contains("usage history left unchanged"));

    assert!(!dir.path().join("output/usage_history.json").exists());
    find_output(&dir.path().join("output"), "summary-");
}

#[test]
fn analyze_single_student() {
    let dir = initialized();

    igcse_assess()
        .current_dir(dir.path())
        .args(["analyze", "--student", "S003", "--format", "json", "--no-record"])
        .assert()
        .success();

    let report = find_output(&dir.path().join("output"), "class-report-");
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(report).unwrap()).unwrap();
    let students = json["students"].as_array().unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["student_id"], "S003");
}

#[test]
fn analyze_rejects_unknown_policy() {
    let dir = initialized();

    igcse_assess()
        .current_dir(dir.path())
        .args(["analyze", "--policy", "skip"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown shortfall policy"));
}

#[test]
fn analyze_rejects_unknown_format() {
    let dir = initialized();

    igcse_assess()
        .current_dir(dir.path())
        .args(["analyze", "--format", "pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown output format"));
}

#[test]
fn compare_identical_runs() {
    let dir = initialized();
    for out in ["a", "b"] {
        igcse_assess()
            .current_dir(dir.path())
            .args(["analyze", "--format", "json", "--no-record", "--output", out])
            .assert()
            .success();
    }
    let baseline = find_output(&dir.path().join("a"), "class-report-");
    let current = find_output(&dir.path().join("b"), "class-report-");

    igcse_assess()
        .arg("compare")
        .arg("--baseline")
        .arg(&baseline)
        .arg("--current")
        .arg(&current)
        .arg("--fail-on-regression")
        .assert()
        .success()
        .stdout(predicate::str::contains("Comparison: 0 regressions, 0 improvements"));
}

#[test]
fn compare_missing_report() {
    igcse_assess()
        .arg("compare")
        .arg("--baseline")
        .arg("missing-a.json")
        .arg("--current")
        .arg("missing-b.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn help_output() {
    igcse_assess()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("analyze"))
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn version_output() {
    igcse_assess()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("igcse-assess"));
}
