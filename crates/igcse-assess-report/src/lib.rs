//! igcse-assess-report: HTML, CSV and Markdown renderings of a class report.

pub mod export;
pub mod html;
pub mod summary;

use igcse_assess_core::model::natural_cmp;
use igcse_assess_core::report::ClassReport;

pub use export::{write_mastery_csv, write_papers_csv};
pub use html::{generate_html, write_html_report};
pub use summary::{generate_summary, write_summary};

/// Topic ids in syllabus order with their display names.
pub(crate) fn topic_columns(report: &ClassReport) -> Vec<(&str, &str)> {
    let mut topics: Vec<(&str, &str)> = report
        .aggregate
        .per_topic
        .values()
        .map(|t| (t.topic_id.as_str(), t.name.as_str()))
        .collect();
    topics.sort_by(|a, b| natural_cmp(a.0, b.0));
    topics
}
