//! CSV input/output for frames, matrices and plain numeric tables.
//!
//! RULE: only this module touches CSV files. Stages hand it frames and
//! paths; it creates missing output directories on the way.

use crate::{
    error::{AnalysisError, AnalysisResult},
    frame::PriceFrame,
    types::Date,
};
use chrono::NaiveDate;
use csv::{ReaderBuilder, Writer};
use std::path::Path;

/// Load a price table. The first column is the date index; the rest are
/// numeric. Empty cells become NaN. Rows are sorted by date.
pub fn read_frame(path: &Path) -> AnalysisResult<PriceFrame> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(AnalysisError::InsufficientData(format!(
            "{} has no value columns",
            path.display()
        )));
    }
    let columns: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();

    let mut records: Vec<(Date, Vec<f64>)> = Vec::new();
    for result in reader.records() {
        let record = result?;
        let date = parse_date(record.get(0).unwrap_or_default())?;
        let values = columns
            .iter()
            .enumerate()
            .map(|(i, name)| parse_cell(name, record.get(i + 1).unwrap_or_default()))
            .collect::<AnalysisResult<Vec<_>>>()?;
        records.push((date, values));
    }
    records.sort_by_key(|(d, _)| *d);

    let (index, rows) = records.into_iter().unzip();
    let frame = PriceFrame::new(index, columns, rows)?;
    log::debug!("Loaded {} rows x {} columns from {}", frame.len(), frame.width(), path.display());
    Ok(frame)
}

/// Write a frame with a `Date` index column. NaN cells are left empty.
pub fn write_frame(path: &Path, frame: &PriceFrame) -> AnalysisResult<()> {
    let mut writer = open_writer(path)?;
    let mut header = vec!["Date".to_string()];
    header.extend(frame.columns().iter().cloned());
    writer.write_record(&header)?;

    for (date, row) in frame.index().iter().zip(frame.rows()) {
        let mut record = vec![date.format("%Y-%m-%d").to_string()];
        record.extend(row.iter().map(|v| format_cell(*v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a labelled square matrix (row labels in the first column).
pub fn write_matrix(path: &Path, labels: &[String], matrix: &[Vec<f64>]) -> AnalysisResult<()> {
    if matrix.len() != labels.len() {
        return Err(AnalysisError::ShapeMismatch { expected: labels.len(), actual: matrix.len() });
    }
    let mut writer = open_writer(path)?;
    let mut header = vec![String::new()];
    header.extend(labels.iter().cloned());
    writer.write_record(&header)?;

    for (label, row) in labels.iter().zip(matrix) {
        let mut record = vec![label.clone()];
        record.extend(row.iter().map(|v| format_cell(*v)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a plain table with a header row.
pub fn write_rows(path: &Path, header: &[String], rows: &[Vec<f64>]) -> AnalysisResult<()> {
    let mut writer = open_writer(path)?;
    writer.write_record(header)?;
    for row in rows {
        if row.len() != header.len() {
            return Err(AnalysisError::ShapeMismatch { expected: header.len(), actual: row.len() });
        }
        writer.write_record(row.iter().map(|v| format_cell(*v)))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a table of preformatted text cells.
pub fn write_table(path: &Path, header: &[&str], records: &[Vec<String>]) -> AnalysisResult<()> {
    let mut writer = open_writer(path)?;
    writer.write_record(header)?;
    for record in records {
        if record.len() != header.len() {
            return Err(AnalysisError::ShapeMismatch { expected: header.len(), actual: record.len() });
        }
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Create the parent directory of `path` if it does not exist yet.
pub fn ensure_parent_dir(path: &Path) -> AnalysisResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            log::info!("Created directory: {}", parent.display());
        }
    }
    Ok(())
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
pub fn parse_date(raw: &str) -> AnalysisResult<Date> {
    let trimmed = raw.trim();
    let day = trimmed.split(['T', ' ']).next().unwrap_or_default();
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|_| AnalysisError::InvalidDate { value: trimmed.to_string() })
}

fn parse_cell(column: &str, raw: &str) -> AnalysisResult<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(f64::NAN);
    }
    trimmed.parse::<f64>().map_err(|_| AnalysisError::InvalidNumber {
        column: column.to_string(),
        value:  trimmed.to_string(),
    })
}

fn format_cell(value: f64) -> String {
    if value.is_nan() { String::new() } else { value.to_string() }
}

fn open_writer(path: &Path) -> AnalysisResult<Writer<std::fs::File>> {
    ensure_parent_dir(path)?;
    Ok(Writer::from_path(path)?)
}
