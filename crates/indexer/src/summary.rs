//! Compact textual summaries of tabular reports too large to inline.

use serde_json::Value;

const SAMPLE_ROWS: usize = 3;

/// Summarize a row-oriented report: row count, column names, numeric
/// column ranges, and a few sample rows.
pub fn summarize_report(report_type: &str, rows: &[Value]) -> String {
    if rows.is_empty() {
        return format!("Report '{report_type}' returned no rows.");
    }

    let mut out = format!("Report '{report_type}': {} rows.", rows.len());

    if let Some(first) = rows.first().and_then(Value::as_object) {
        let columns: Vec<&str> = first.keys().map(String::as_str).collect();
        out.push_str(&format!(" Columns: {}.", columns.join(", ")));

        for col in &columns {
            if let Some(stats) = numeric_stats(rows, col) {
                out.push_str(&format!(
                    " {col}: min {}, max {}, mean {:.2}.",
                    format_num(stats.min),
                    format_num(stats.max),
                    stats.mean
                ));
            }
        }
    }

    out.push_str("\nSample rows:\n");
    for row in rows.iter().take(SAMPLE_ROWS) {
        out.push_str(&row.to_string());
        out.push('\n');
    }
    if rows.len() > SAMPLE_ROWS {
        out.push_str(&format!("... ({} more rows)", rows.len() - SAMPLE_ROWS));
    }

    out
}

struct NumericStats {
    min: f64,
    max: f64,
    mean: f64,
}

fn numeric_stats(rows: &[Value], column: &str) -> Option<NumericStats> {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|r| r.get(column).and_then(Value::as_f64))
        .collect();
    // Only summarize columns that are numeric in every row.
    if values.len() != rows.len() {
        return None;
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Some(NumericStats { min, max, mean })
}

fn format_num(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{n:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_report() {
        let s = summarize_report("usage", &[]);
        assert!(s.contains("no rows"));
    }

    #[test]
    fn summary_includes_columns_and_numeric_ranges() {
        let rows: Vec<Value> = (1..=10)
            .map(|i| json!({"day": format!("2026-03-{i:02}"), "kwh": i * 10}))
            .collect();
        let s = summarize_report("energy_usage", &rows);
        assert!(s.contains("10 rows"));
        assert!(s.contains("day"));
        assert!(s.contains("kwh: min 10, max 100, mean 55.00"));
    }

    #[test]
    fn mixed_type_column_is_not_summarized_numerically() {
        let rows = vec![json!({"v": 1}), json!({"v": "n/a"})];
        let s = summarize_report("r", &rows);
        assert!(!s.contains("v: min"));
    }

    #[test]
    fn sample_rows_are_truncated() {
        let rows: Vec<Value> = (0..7).map(|i| json!({"n": i})).collect();
        let s = summarize_report("r", &rows);
        assert!(s.contains("(4 more rows)"));
    }
}
