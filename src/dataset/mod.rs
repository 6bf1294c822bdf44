//! Scoring dataset preflight.
//!
//! The generators filter the dataset themselves (the injected
//! `isin(...)` expressions). This module applies the same filter on our side
//! before generating, so the operator learns up front which configured
//! identifiers have no row and will produce no page.

use std::{fs, io, path::Path};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot read dataset {path}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("dataset has no header row")]
    Empty,

    #[error("dataset has no `{0}` column")]
    MissingColumn(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    /// Matching data rows, in dataset order.
    pub rows: Vec<String>,
    /// Total data rows seen.
    pub total: usize,
    /// Configured identifiers with no matching row, in configured order.
    pub missing: Vec<u64>,
}

/// Keeps the rows of `csv` whose `key_column` is one of `ids`.
pub fn filter_rows(csv: &str, key_column: &str, ids: &[u64]) -> Result<Filtered, DatasetError> {
    let mut lines = csv.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or(DatasetError::Empty)?;
    let key_idx = split_record(header.trim_start_matches('\u{feff}'))
        .iter()
        .position(|h| h.trim() == key_column)
        .ok_or_else(|| DatasetError::MissingColumn(key_column.to_string()))?;

    let mut rows = Vec::new();
    let mut found = vec![false; ids.len()];
    let mut total = 0;
    for line in lines {
        total += 1;
        let fields = split_record(line);
        let Some(key) = fields.get(key_idx).and_then(|f| parse_id(f)) else {
            continue;
        };
        if let Some(pos) = ids.iter().position(|id| *id == key) {
            found[pos] = true;
            rows.push(line.to_string());
        }
    }

    let missing = ids
        .iter()
        .zip(&found)
        .filter(|(_, hit)| !**hit)
        .map(|(id, _)| *id)
        .collect();
    Ok(Filtered {
        rows,
        total,
        missing,
    })
}

pub fn preflight(path: &Path, key_column: &str, ids: &[u64]) -> Result<Filtered, DatasetError> {
    let text = fs::read_to_string(path).map_err(|e| DatasetError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    filter_rows(&text, key_column, ids)
}

/// Identifiers may have been written by pandas as floats (`1000940025.0`).
fn parse_id(field: &str) -> Option<u64> {
    let field = field.trim();
    if let Ok(id) = field.parse::<u64>() {
        return Some(id);
    }
    let float = field.parse::<f64>().ok()?;
    (float.fract() == 0.0 && float >= 0.0 && float < u64::MAX as f64).then_some(float as u64)
}

/// Splits one CSV record, honoring double-quoted fields. Records spanning
/// several lines are not supported.
fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            c => field.push(c),
        }
    }
    fields.push(field);
    fields
}
