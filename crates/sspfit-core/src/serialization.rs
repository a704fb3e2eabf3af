//! Plain-text output artifacts: spectrum tables and chain summaries.

use crate::domain::{FitError, FitResult};
use crate::sampling::ParameterSummary;
use std::fs;
use std::path::Path;

const COLUMN_WIDTH: usize = 16;
const COLUMN_PRECISION: usize = 6;

pub fn format_fixed_f64(value: f64, width: usize, precision: usize) -> String {
    format!(
        "{value:>width$.precision$}",
        width = width,
        precision = precision
    )
}

/// Fixed-width table with one `#`-prefixed header line. Every column must
/// have the same length.
pub fn render_spectrum_table(header: &[&str], columns: &[&[f64]]) -> FitResult<String> {
    if header.len() != columns.len() {
        return Err(FitError::internal(
            "SYS.OUTPUT_SHAPE",
            format!("{} header names for {} columns", header.len(), columns.len()),
        ));
    }
    let rows = columns.first().map_or(0, |column| column.len());
    if columns.iter().any(|column| column.len() != rows) {
        return Err(FitError::internal(
            "SYS.OUTPUT_SHAPE",
            "spectrum columns differ in length",
        ));
    }

    let mut rendered = format!("# {}\n", header.join(" "));
    for row in 0..rows {
        let line = columns
            .iter()
            .map(|column| format_fixed_f64(column[row], COLUMN_WIDTH, COLUMN_PRECISION))
            .collect::<String>();
        rendered.push_str(&line);
        rendered.push('\n');
    }
    Ok(rendered)
}

pub fn write_spectrum_table(path: &Path, header: &[&str], columns: &[&[f64]]) -> FitResult<()> {
    let rendered = render_spectrum_table(header, columns)?;
    write_text_artifact(path, &rendered)
}

/// `name  p50  +upper  -lower` per parameter.
pub fn render_summary_table(summary: &[ParameterSummary]) -> String {
    let mut rendered = format!(
        "{:<10}{:>14}{:>14}{:>14}\n",
        "param", "median", "+err", "-err"
    );
    for entry in summary {
        rendered.push_str(&format!(
            "{:<10}{}{}{}\n",
            entry.name,
            format_fixed_f64(entry.p50, 14, 5),
            format_fixed_f64(entry.upper_error(), 14, 5),
            format_fixed_f64(entry.lower_error(), 14, 5)
        ));
    }
    rendered
}

pub fn normalize_text_artifact(content: &str) -> String {
    let mut normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    if !normalized.is_empty() && !normalized.ends_with('\n') {
        normalized.push('\n');
    }
    normalized
}

pub fn write_text_artifact(path: &Path, content: &str) -> FitResult<()> {
    fs::write(path, normalize_text_artifact(content)).map_err(|error| {
        FitError::io_system(
            "IO.OUTPUT_WRITE",
            format!("failed to write '{}': {}", path.display(), error),
        )
    })
}
