//! Date-indexed numeric table shared by every pipeline.
//!
//! RULE: the index is strictly increasing and column labels are unique.
//! Missing cells are NaN; nothing else is allowed to signal "absent".

use crate::{
    error::{AnalysisError, AnalysisResult},
    types::{AssetId, Date},
};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub struct PriceFrame {
    index:   Vec<Date>,
    columns: Vec<AssetId>,
    rows:    Vec<Vec<f64>>,
}

impl PriceFrame {
    pub fn new(index: Vec<Date>, columns: Vec<AssetId>, rows: Vec<Vec<f64>>) -> AnalysisResult<Self> {
        if index.len() != rows.len() {
            return Err(AnalysisError::ShapeMismatch {
                expected: index.len(),
                actual:   rows.len(),
            });
        }
        for row in &rows {
            if row.len() != columns.len() {
                return Err(AnalysisError::ShapeMismatch {
                    expected: columns.len(),
                    actual:   row.len(),
                });
            }
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(AnalysisError::DuplicateColumn { name: name.clone() });
            }
        }
        if let Some(row) = index.windows(2).position(|w| w[0] >= w[1]) {
            return Err(AnalysisError::UnsortedIndex { row: row + 1 });
        }
        Ok(Self { index, columns, rows })
    }

    /// A frame with the given columns and no rows.
    pub fn empty(columns: Vec<AssetId>) -> Self {
        Self { index: Vec::new(), columns, rows: Vec::new() }
    }

    /// One-column frame from unordered (date, value) points.
    /// The last value wins when a date repeats.
    pub fn from_series(name: &str, points: &[(Date, f64)]) -> Self {
        let sorted: BTreeMap<Date, f64> = points.iter().copied().collect();
        Self {
            index:   sorted.keys().copied().collect(),
            columns: vec![name.to_string()],
            rows:    sorted.values().map(|v| vec![*v]).collect(),
        }
    }

    pub fn index(&self) -> &[Date] { &self.index }
    pub fn columns(&self) -> &[AssetId] { &self.columns }
    pub fn rows(&self) -> &[Vec<f64>] { &self.rows }
    pub fn len(&self) -> usize { self.index.len() }
    pub fn is_empty(&self) -> bool { self.index.is_empty() }
    pub fn width(&self) -> usize { self.columns.len() }
    pub fn first_date(&self) -> Option<Date> { self.index.first().copied() }
    pub fn last_date(&self) -> Option<Date> { self.index.last().copied() }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_position(&self, name: &str) -> AnalysisResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| AnalysisError::UnknownColumn { name: name.to_string() })
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let pos = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[pos]).collect())
    }

    /// Column values by position.
    pub fn column_at(&self, pos: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[pos]).collect()
    }

    pub fn head(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self {
            index:   self.index[..n].to_vec(),
            columns: self.columns.clone(),
            rows:    self.rows[..n].to_vec(),
        }
    }

    pub fn select(&self, names: &[&str]) -> AnalysisResult<Self> {
        let positions = names
            .iter()
            .map(|n| self.column_position(n))
            .collect::<AnalysisResult<Vec<_>>>()?;
        Self::new(
            self.index.clone(),
            names.iter().map(|n| n.to_string()).collect(),
            self.rows.iter().map(|r| positions.iter().map(|&p| r[p]).collect()).collect(),
        )
    }

    /// Rename one column in place.
    pub fn rename(mut self, from: &str, to: &str) -> AnalysisResult<Self> {
        let pos = self.column_position(from)?;
        if from != to && self.has_column(to) {
            return Err(AnalysisError::DuplicateColumn { name: to.to_string() });
        }
        self.columns[pos] = to.to_string();
        Ok(self)
    }

    /// Keep only dates present in both frames. Columns of `self` come first.
    pub fn inner_join(&self, other: &PriceFrame) -> AnalysisResult<Self> {
        if let Some(dup) = other.columns.iter().find(|c| self.has_column(c)) {
            return Err(AnalysisError::DuplicateColumn { name: dup.clone() });
        }
        let lookup: HashMap<Date, usize> =
            other.index.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut index = Vec::new();
        let mut rows = Vec::new();
        for (i, date) in self.index.iter().enumerate() {
            if let Some(&j) = lookup.get(date) {
                index.push(*date);
                let mut row = self.rows[i].clone();
                row.extend_from_slice(&other.rows[j]);
                rows.push(row);
            }
        }
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Self::new(index, columns, rows)
    }

    /// Drop every row that holds at least one NaN.
    pub fn drop_na(&self) -> Self {
        let (index, rows) = self
            .index
            .iter()
            .zip(&self.rows)
            .filter(|(_, row)| row.iter().all(|v| !v.is_nan()))
            .map(|(d, r)| (*d, r.clone()))
            .unzip();
        Self { index, columns: self.columns.clone(), rows }
    }

    pub fn missing_counts(&self) -> Vec<(AssetId, usize)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(c, name)| {
                (name.clone(), self.rows.iter().filter(|r| r[c].is_nan()).count())
            })
            .collect()
    }

    /// Propagate the last observed value forward over NaN cells.
    pub fn fill_forward(&self) -> Self {
        let mut rows = self.rows.clone();
        for c in 0..self.width() {
            let mut last = f64::NAN;
            for row in rows.iter_mut() {
                if row[c].is_nan() {
                    row[c] = last;
                } else {
                    last = row[c];
                }
            }
        }
        Self { index: self.index.clone(), columns: self.columns.clone(), rows }
    }

    /// Propagate the next observed value backward over NaN cells.
    pub fn fill_backward(&self) -> Self {
        let mut rows = self.rows.clone();
        for c in 0..self.width() {
            let mut next = f64::NAN;
            for row in rows.iter_mut().rev() {
                if row[c].is_nan() {
                    row[c] = next;
                } else {
                    next = row[c];
                }
            }
        }
        Self { index: self.index.clone(), columns: self.columns.clone(), rows }
    }

    /// Simple returns x_t / x_{t-1} - 1. The first row and any row with a
    /// non-finite value are dropped.
    pub fn pct_change(&self) -> Self {
        let mut index = Vec::new();
        let mut rows = Vec::new();
        for t in 1..self.len() {
            let row: Vec<f64> = self.rows[t]
                .iter()
                .zip(&self.rows[t - 1])
                .map(|(cur, prev)| cur / prev - 1.0)
                .collect();
            if row.iter().all(|v| v.is_finite()) {
                index.push(self.index[t]);
                rows.push(row);
            }
        }
        Self { index, columns: self.columns.clone(), rows }
    }

    /// Divide each column by its maximum.
    pub fn normalize_by_max(&self) -> Self {
        let maxima: Vec<f64> = (0..self.width())
            .map(|c| {
                self.rows
                    .iter()
                    .map(|r| r[c])
                    .filter(|v| !v.is_nan())
                    .fold(f64::NEG_INFINITY, f64::max)
            })
            .collect();
        self.map_columns(|c, v| v / maxima[c])
    }

    /// Scale each column to [0, 1]. A constant column maps to 0.
    pub fn normalize_min_max(&self) -> Self {
        let bounds: Vec<(f64, f64)> = (0..self.width())
            .map(|c| {
                self.rows
                    .iter()
                    .map(|r| r[c])
                    .filter(|v| !v.is_nan())
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
            })
            .collect();
        self.map_columns(|c, v| {
            let (lo, hi) = bounds[c];
            if hi > lo { (v - lo) / (hi - lo) } else { 0.0 }
        })
    }

    /// Inclusive date range.
    pub fn slice_dates(&self, start: Date, end: Date) -> Self {
        let (index, rows) = self
            .index
            .iter()
            .zip(&self.rows)
            .filter(|(d, _)| **d >= start && **d <= end)
            .map(|(d, r)| (*d, r.clone()))
            .unzip();
        Self { index, columns: self.columns.clone(), rows }
    }

    /// True when every cell is finite.
    pub fn is_finite(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(|v| v.is_finite()))
    }

    fn map_columns(&self, f: impl Fn(usize, f64) -> f64) -> Self {
        let rows = self
            .rows
            .iter()
            .map(|r| r.iter().enumerate().map(|(c, v)| f(c, *v)).collect())
            .collect();
        Self { index: self.index.clone(), columns: self.columns.clone(), rows }
    }
}
