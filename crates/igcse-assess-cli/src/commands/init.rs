//! The `igcse-assess init` command.

use std::path::Path;

use anyhow::{Context, Result};

use igcse_assess_core::config::CONFIG_FILE_NAME;

const SAMPLE_FILES: &[(&str, &str)] = &[
    (CONFIG_FILE_NAME, SAMPLE_CONFIG),
    ("data/syllabus_topics.json", SAMPLE_SYLLABUS),
    ("data/question_tags.csv", SAMPLE_TAGS),
    ("data/question_bank.toml", SAMPLE_BANK),
    ("data/sample_mcq_results.csv", SAMPLE_MCQ),
    ("data/sample_assignments.csv", SAMPLE_ASSIGNMENTS),
    ("data/sample_participation.csv", SAMPLE_PARTICIPATION),
];

pub fn execute() -> Result<()> {
    std::fs::create_dir_all("data").context("failed to create data directory")?;

    for (path, content) in SAMPLE_FILES {
        if Path::new(path).exists() {
            println!("{path} already exists, skipping.");
        } else {
            std::fs::write(path, content).with_context(|| format!("failed to write {path}"))?;
            println!("Created {path}");
        }
    }

    println!("\nNext steps:");
    println!("  1. Replace the sample CSVs in data/ with your class results");
    println!("  2. Run: igcse-assess validate");
    println!("  3. Run: igcse-assess analyze");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# igcse-assess configuration
# Relative paths are resolved against this file's directory.

parallelism = 4
output_dir = "output"

[analysis]
weak_threshold = 0.5

[analysis.weights]
mcq = 0.6
assignment = 0.3
participation = 0.1

[assembly]
max_questions = 10
questions_per_topic = 1
shortfall_policy = "partial"   # fail | partial | adjacent
# seed = 42

[data]
syllabus = "data/syllabus_topics.json"
question_tags = "data/question_tags.csv"
question_bank = "data/question_bank.toml"
mcq_results = "data/sample_mcq_results.csv"
assignments = "data/sample_assignments.csv"
participation = "data/sample_participation.csv"
usage_history = "output/usage_history.json"
assignment_max_mark = 100.0
participation_max_mark = 10.0
"#;

const SAMPLE_SYLLABUS: &str = r#"{
    "subject": "Mathematics",
    "code": "0580",
    "topics": {
        "1": {
            "name": "Number",
            "subtopics": ["Integers", "Fractions", "Decimals", "Percentages"]
        },
        "2": {
            "name": "Algebra & Graphs",
            "subtopics": ["Linear equations", "Quadratics", "Inequalities", "Graphs"]
        },
        "3": {
            "name": "Coordinate Geometry",
            "subtopics": ["Distance", "Midpoint", "Gradient", "Equations of lines"]
        },
        "4": {
            "name": "Geometry",
            "subtopics": ["Angles", "Triangles", "Quadrilaterals", "Circles"]
        }
    }
}
"#;

const SAMPLE_TAGS: &str = "question_id,topic_id,subtopic
q1,1,Integers
q2,1,Fractions
q3,2,Quadratics
q4,3,Gradient
q5,4,Angles
assignment_1,1,
assignment_2,2,
assignment_3,3,
assignment_3,4,
";

const SAMPLE_BANK: &str = r#"[question_bank]
id = "0580-sample"
name = "0580 sample past-paper questions"

[[questions]]
id = "s23-11-q02"
topics = ["1"]
subtopics = ["Fractions"]
source = "0580/11/M/J/23 Q2"
marks = 2

[[questions]]
id = "w22-12-q05"
topics = ["1"]
subtopics = ["Percentages"]
source = "0580/12/O/N/22 Q5"
marks = 3

[[questions]]
id = "s23-21-q07"
topics = ["2"]
subtopics = ["Quadratics"]
source = "0580/21/M/J/23 Q7"
marks = 4

[[questions]]
id = "s22-22-q11"
topics = ["2", "3"]
subtopics = ["Linear equations", "Gradient"]
source = "0580/22/M/J/22 Q11"
marks = 5

[[questions]]
id = "w23-41-q03"
topics = ["3"]
subtopics = ["Distance", "Midpoint"]
source = "0580/41/O/N/23 Q3"
marks = 6

[[questions]]
id = "s24-42-q09"
topics = ["4"]
subtopics = ["Angles"]
source = "0580/42/M/J/24 Q9"
marks = 4

[[questions]]
id = "w21-13-q14"
topics = ["4"]
subtopics = ["Circles"]
source = "0580/13/O/N/21 Q14"
marks = 3
"#;

const SAMPLE_MCQ: &str = "student_id,q1,q2,q3,q4,q5,total_score
S001,1,1,0,0,1,3
S002,0,1,1,1,1,4
S003,1,0,0,1,0,2
S004,1,1,1,0,1,4
";

const SAMPLE_ASSIGNMENTS: &str = "student_id,assignment_1,assignment_2,assignment_3,total
S001,72,45,38,155
S002,55,80,64,199
S003,40,35,52,127
S004,90,85,,175
";

const SAMPLE_PARTICIPATION: &str = "student_id,week_1,week_2,week_3,week_4,average
S001,8,7,9,6,7.5
S002,5,6,4,7,5.5
S003,9,9,8,10,9.0
";
