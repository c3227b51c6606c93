//! HTML report generator.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined: a class
//! summary, a students-by-topics mastery heatmap, the issued practice papers
//! and the raw report JSON.

use anyhow::{Context, Result};
use std::path::Path;

use igcse_assess_core::model::MasteryScore;
use igcse_assess_core::report::ClassReport;
use igcse_assess_core::statistics::TopicStats;

use crate::topic_columns;

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Heatmap cell class for a score.
fn band(score: MasteryScore, threshold: f64) -> &'static str {
    match score.value() {
        None => "na",
        Some(v) if v < threshold => "low",
        Some(v) if v < 0.8 => "mid",
        Some(_) => "high",
    }
}

/// Generate an HTML report from a class report.
pub fn generate_html(report: &ClassReport) -> String {
    let topics = topic_columns(report);
    let threshold = report.settings.weak_threshold;
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>Class mastery report: {} ({})</title>\n",
        html_escape(&report.syllabus.subject),
        html_escape(&report.syllabus.code)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    // Header
    html.push_str("<header>\n");
    html.push_str("<h1>Class mastery report</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">{} {} | {} students | {} topics | weak below {:.0}% | {}</p>\n",
        html_escape(&report.syllabus.subject),
        html_escape(&report.syllabus.code),
        report.students.len(),
        report.syllabus.topic_count,
        threshold * 100.0,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    html.push_str("</header>\n");

    // Topic summary
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Topics</h2>\n");
    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Topic</th><th>Name</th><th>Mean</th><th>Lowest</th><th>Weak</th><th>No evidence</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    let ordered: Vec<&TopicStats> = topics
        .iter()
        .filter_map(|(id, _)| report.aggregate.per_topic.get(*id))
        .collect();
    for stats in &ordered {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}/{}</td><td>{}</td></tr>\n",
            html_escape(&stats.topic_id),
            html_escape(&stats.name),
            percent(stats.mean_mastery),
            percent(stats.min_mastery),
            stats.weak_students,
            stats.known_students,
            stats.indeterminate_students,
        ));
    }
    html.push_str("</tbody></table>\n");

    if !ordered.is_empty() {
        html.push_str(&generate_bar_chart(&ordered, threshold));
    }

    html.push_str("</section>\n");

    // Heatmap
    html.push_str("<section class=\"heatmap\">\n");
    html.push_str("<h2>Mastery heatmap</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"heatmap\">\n<thead><tr>");
    html.push_str("<th onclick=\"sortTable(0)\">Student</th>");
    for (col, (id, name)) in topics.iter().enumerate() {
        html.push_str(&format!(
            "<th onclick=\"sortTable({})\" title=\"{}\">{}</th>",
            col + 1,
            html_escape(name),
            html_escape(id)
        ));
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for outcome in &report.students {
        html.push_str(&format!("<tr><td>{}</td>", html_escape(&outcome.student_id)));
        for (id, _) in &topics {
            let score = outcome.profile.score(id);
            html.push_str(&format!(
                "<td class=\"{}\">{}</td>",
                band(score, threshold),
                score
            ));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    // Papers
    html.push_str("<section class=\"papers\">\n");
    html.push_str("<h2>Practice papers</h2>\n");
    let mut any_paper = false;
    for outcome in &report.students {
        let Some(paper) = &outcome.paper else {
            if let Some(err) = &outcome.error {
                html.push_str(&format!(
                    "<p class=\"shortfall\"><strong>{}</strong>: {}</p>\n",
                    html_escape(&outcome.student_id),
                    html_escape(err)
                ));
            }
            continue;
        };
        any_paper = true;
        html.push_str(&format!(
            "<details>\n<summary>{}: {} questions, {} marks</summary>\n",
            html_escape(&paper.student_id),
            paper.len(),
            paper.total_marks()
        ));
        html.push_str("<ol>\n");
        for item in &paper.items {
            html.push_str(&format!(
                "<li>{} <span class=\"meta\">topics {}{}{}</span></li>\n",
                html_escape(&item.question_id),
                html_escape(&item.covers.join(", ")),
                item.source
                    .as_deref()
                    .map(|s| format!(" | {}", html_escape(s)))
                    .unwrap_or_default(),
                if item.reused { " | repeat" } else { "" }
            ));
        }
        html.push_str("</ol>\n");
        if !paper.uncovered.is_empty() {
            html.push_str(&format!(
                "<p class=\"shortfall\">No questions available for: {}</p>\n",
                html_escape(&paper.uncovered.join(", "))
            ));
        }
        for (weak, substitute) in &paper.substitutions {
            html.push_str(&format!(
                "<p class=\"meta\">Topic {} practised through adjacent topic {}</p>\n",
                html_escape(weak),
                html_escape(substitute)
            ));
        }
        html.push_str("</details>\n");
    }
    if !any_paper {
        html.push_str("<p>No practice papers were issued.</p>\n");
    }
    html.push_str("</section>\n");

    // Data issues
    if !report.data_issues.is_empty() {
        html.push_str("<section class=\"issues\">\n<h2>Data issues</h2>\n<ul>\n");
        for issue in &report.data_issues {
            html.push_str(&format!("<li>{}</li>\n", html_escape(&issue.message)));
        }
        html.push_str("</ul>\n</section>\n");
    }

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Report JSON</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(
        &serde_json::to_string_pretty(report)
            .unwrap_or_default()
            .replace('<', "&lt;")
            .replace('>', "&gt;"),
    );
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    // JavaScript for sorting
    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

fn percent(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.0}%", v * 100.0))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Write an HTML report to a file.
pub fn write_html_report(report: &ClassReport, path: &Path) -> Result<()> {
    let html = generate_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

/// Horizontal bars of mean mastery per topic.
fn generate_bar_chart(topics: &[&TopicStats], threshold: f64) -> String {
    let bar_height = 30;
    let max_width = 400;
    let padding = 10;
    let label_width = 200;

    let total_height = topics.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 60,
        total_height
    );

    for (i, stats) in topics.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let score = stats.mean_mastery.unwrap_or(0.0);
        let width = (score * max_width as f64) as usize;

        let color = if stats.mean_mastery.is_none() {
            "#9ca3af"
        } else if score >= 0.8 {
            "#22c55e"
        } else if score >= threshold {
            "#eab308"
        } else {
            "#ef4444"
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{} {}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            html_escape(&stats.topic_id),
            html_escape(&stats.name)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"4\"/>\n",
            label_width, y, width, bar_height, color
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{}</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            percent(stats.mean_mastery)
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --ink: #1f2933; --muted: #616e7c; --rule: #d9e2ec; --head: #f0f4f8; --high: #c6f6d5; --mid: #fefcbf; --low: #fed7d7; --na: #edf2f7; }
body { font: 15px/1.45 system-ui, sans-serif; color: var(--ink); max-width: 72rem; margin: 0 auto; padding: 1.5rem; }
header h1 { margin-bottom: 0.25rem; }
h2 { border-bottom: 2px solid var(--rule); padding-bottom: 0.25rem; margin-top: 2.5rem; }
.meta { color: var(--muted); }
table { border-collapse: collapse; margin: 0.75rem 0; }
th, td { border: 1px solid var(--rule); padding: 0.35rem 0.7rem; }
thead th { background: var(--head); user-select: none; }
#heatmap th { cursor: pointer; }
#heatmap td { text-align: center; min-width: 3.5rem; }
#heatmap td:first-child { text-align: left; font-weight: 600; }
.high { background: var(--high); }
.mid { background: var(--mid); }
.low, .shortfall { background: var(--low); }
.na { background: var(--na); color: var(--muted); }
.shortfall { padding: 0.25rem 0.5rem; border-radius: 4px; }
details > summary { cursor: pointer; font-weight: 600; margin: 0.5rem 0; }
pre { background: var(--head); padding: 0.75rem; overflow-x: auto; font-size: 0.8rem; }
@media print { details { display: block; } .raw-data, svg { display: none; } }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('heatmap');
  const body = table.tBodies[0];
  const descending = table.getAttribute('data-col') === String(col) && table.getAttribute('data-dir') !== 'desc';
  const value = row => {
    const text = row.cells[col].textContent.trim();
    if (col === 0) return text;
    const n = parseFloat(text);
    return isNaN(n) ? -Infinity : n;
  };
  const sorted = Array.from(body.rows).sort((a, b) => {
    const x = value(a), y = value(b);
    const order = typeof x === 'string' ? x.localeCompare(y, undefined, { numeric: true }) : x - y;
    return descending ? -order : order;
  });
  table.setAttribute('data-col', col);
  table.setAttribute('data-dir', descending ? 'desc' : 'asc');
  for (const row of sorted) body.appendChild(row);
}
"#;
