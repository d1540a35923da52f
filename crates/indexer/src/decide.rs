//! Heuristic routing between semantic search and direct analysis of an
//! embedded report.

use serde::Serialize;

const EXPLORATORY_KEYWORDS: &[&str] = &[
    "pattern",
    "patterns",
    "trend",
    "trends",
    "correlate",
    "correlation",
    "anomaly",
    "anomalies",
    "unusual",
    "outlier",
    "outliers",
    "similar",
    "related",
    "overall",
    "summarize",
    "summary",
    "insight",
    "insights",
];

/// Row count above which direct analysis is assumed too large to inline.
const LARGE_REPORT_ROWS: usize = 200;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    SemanticSearch,
    DirectAnalysis,
}

#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub mode: Mode,
    pub reason: String,
}

/// Decide whether a question about an embedded report should go through
/// semantic search or be answered from the raw rows directly.
pub fn decide_search_or_analyze(question: &str, row_count: usize) -> Decision {
    let lowered = question.to_lowercase();
    if let Some(kw) = EXPLORATORY_KEYWORDS.iter().find(|kw| lowered.contains(**kw)) {
        return Decision {
            mode: Mode::SemanticSearch,
            reason: format!("question is exploratory (mentions \"{kw}\")"),
        };
    }

    if row_count > LARGE_REPORT_ROWS {
        return Decision {
            mode: Mode::SemanticSearch,
            reason: format!("report has {row_count} rows, too large for direct analysis"),
        };
    }

    Decision {
        mode: Mode::DirectAnalysis,
        reason: format!("specific question over a small report ({row_count} rows)"),
    }
}
