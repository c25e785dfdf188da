//! Plain-text rendering of query results and import summaries

use std::fmt::Write;
use std::path::Path;

use crate::ingest::ImportResult;
use crate::parser::Value;
use crate::query::ResultSet;

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn width(text: &str) -> usize {
    text.chars().count()
}

fn pad(text: &str, to: usize, right_align: bool) -> String {
    let fill = " ".repeat(to.saturating_sub(width(text)));
    if right_align {
        format!("{}{}", fill, text)
    } else {
        format!("{}{}", text, fill)
    }
}

/// Render rows as an aligned table under a title line.
///
/// Numeric columns are right-aligned; nulls render as empty cells.
pub fn render_table(title: &str, rows: &ResultSet) -> String {
    let columns = rows.columns();
    let cells: Vec<Vec<String>> = rows
        .rows()
        .iter()
        .map(|row| row.values().iter().map(cell).collect())
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            cells
                .iter()
                .map(|r| width(&r[idx]))
                .chain(std::iter::once(width(name)))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let numeric: Vec<bool> = (0..columns.len())
        .map(|idx| {
            !rows.is_empty()
                && rows.rows().iter().all(|row| {
                    let value = &row.values()[idx];
                    value.is_null() || value.as_f64().is_some()
                })
        })
        .collect();

    let mut out = String::new();
    let _ = writeln!(out, "{}", title);

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(name, w)| pad(name, *w, false))
        .collect();
    let _ = writeln!(out, "{}", header.join("  ").trim_end());

    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let _ = writeln!(out, "{}", rule.join("  "));

    for row in &cells {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(idx, text)| pad(text, widths[idx], numeric[idx]))
            .collect();
        let _ = writeln!(out, "{}", line.join("  ").trim_end());
    }

    if rows.is_empty() {
        let _ = writeln!(out, "(no rows)");
    }

    out
}

/// One summary line per imported source
pub fn import_summary(results: &[(impl AsRef<Path>, ImportResult)]) -> String {
    let mut out = String::new();
    for (path, result) in results {
        let name = path
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.as_ref().display().to_string());
        let _ = writeln!(out, "  {}: {}", name, result);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_render_table_aligns_columns() {
        let mut rows = ResultSet::new(vec!["title".into(), "employees".into()]);
        rows.push(vec![Value::from("Разработчик"), Value::Integer(12)]);
        rows.push(vec![Value::from("HR"), Value::Integer(3)]);

        let text = render_table("By title", &rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "By title");
        assert_eq!(lines[1], "title        employees");
        assert_eq!(lines[2], "-----------  ---------");
        assert_eq!(lines[3], "Разработчик         12");
        assert_eq!(lines[4], "HR                   3");
    }

    #[test]
    fn test_render_empty_and_null() {
        let rows = ResultSet::new(vec!["name".into()]);
        assert!(render_table("Empty", &rows).ends_with("(no rows)\n"));

        let mut rows = ResultSet::new(vec!["title".into(), "surname".into()]);
        rows.push(vec![Value::from("HR"), Value::Null]);
        let text = render_table("Left", &rows);
        assert_eq!(text.lines().nth(3), Some("HR"));
    }

    #[test]
    fn test_import_summary() {
        let results = vec![(
            PathBuf::from("/data/students.csv"),
            ImportResult {
                inserted: 4,
                skipped: 1,
                ..Default::default()
            },
        )];
        assert_eq!(
            import_summary(&results),
            "  students.csv: 4 inserted, 1 skipped, 0 duplicates\n"
        );
    }
}
