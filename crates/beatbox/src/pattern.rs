//! Text patterns for the command line
//!
//! `row:col,col;row:col` where `row` is either a grid row index or a sample
//! name, e.g. `kick:0,4;snare:2,6;2:1,3,5,7`.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("malformed pattern entry {0:?} (expected row:col,col)")]
    Malformed(String),

    #[error("invalid column {col:?} in entry {entry:?}")]
    BadColumn { entry: String, col: String },

    #[error("no sample named {0:?}")]
    UnknownSample(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowRef {
    Index(usize),
    Name(String),
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRef::Index(i) => write!(f, "{i}"),
            RowRef::Name(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternLine {
    pub row: RowRef,
    pub cols: Vec<usize>,
}

pub fn parse_pattern(text: &str) -> Result<Vec<PatternLine>, PatternError> {
    text.split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_entry)
        .collect()
}

fn parse_entry(entry: &str) -> Result<PatternLine, PatternError> {
    let (row, cols) = entry
        .split_once(':')
        .ok_or_else(|| PatternError::Malformed(entry.to_string()))?;

    let row = row.trim();
    if row.is_empty() {
        return Err(PatternError::Malformed(entry.to_string()));
    }
    let row = match row.parse::<usize>() {
        Ok(index) => RowRef::Index(index),
        Err(_) => RowRef::Name(row.to_string()),
    };

    let cols = cols
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(|c| {
            c.parse().map_err(|_| PatternError::BadColumn {
                entry: entry.to_string(),
                col: c.to_string(),
            })
        })
        .collect::<Result<Vec<usize>, _>>()?;

    Ok(PatternLine { row, cols })
}
