use serde_json::Value;

use crate::error::{DataError, Result};

/// A single table cell. Maps one-to-one onto the SQLite storage classes the
/// cache tables use (NULL, INTEGER, REAL, TEXT).
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Coerce a raw JSON value into a typed cell. Numeric-looking strings
    /// become numbers here, at the boundary, so nothing downstream has to
    /// re-inspect them.
    pub fn from_json(value: &Value) -> Cell {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Int(*b as i64),
            Value::Number(n) => n
                .as_i64()
                .map(Cell::Int)
                .or_else(|| n.as_f64().map(Cell::Float))
                .unwrap_or(Cell::Null),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Cell::Null
                } else if let Ok(i) = trimmed.parse::<i64>() {
                    Cell::Int(i)
                } else if let Ok(f) = trimmed.parse::<f64>() {
                    Cell::Float(f)
                } else {
                    Cell::Text(s.clone())
                }
            }
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Int(i) => Some(*i),
            Cell::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

/// An ordered column table.
///
/// Used at exactly two seams: normalizing the fundamentals payload (header
/// promotion, column-wise merge) and the generic cache-table read/write
/// contract. Everything else in the crate works with typed rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Frame {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(DataError::Malformed(format!(
                "row width {} does not match {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Build a frame from a provider response whose first row carries the
    /// column names. This is the single normalization step for the
    /// fundamentals payload.
    pub fn from_header_rows(raw: &[Vec<Value>]) -> Result<Frame> {
        let Some((header, body)) = raw.split_first() else {
            return Ok(Frame::default());
        };
        let columns = header
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        let mut frame = Frame::new(columns);
        for row in body {
            frame.push_row(row.iter().map(Cell::from_json).collect())?;
        }
        Ok(frame)
    }

    /// Outer-merge `other` into `self` keyed on `key`. Columns whose name
    /// already exists are dropped, first writer wins. Rows of `other` with
    /// no matching key are appended with nulls in the pre-existing columns.
    pub fn merge_on(&mut self, other: &Frame, key: &str) -> Result<()> {
        if self.columns.is_empty() {
            *self = other.clone();
            return Ok(());
        }
        let self_key = self
            .column_index(key)
            .ok_or_else(|| DataError::MissingColumn(key.to_string()))?;
        let other_key = other
            .column_index(key)
            .ok_or_else(|| DataError::MissingColumn(key.to_string()))?;

        let incoming: Vec<usize> = (0..other.columns.len())
            .filter(|&i| i != other_key && !self.has_column(&other.columns[i]))
            .collect();

        let old_width = self.columns.len();
        for &i in &incoming {
            self.columns.push(other.columns[i].clone());
        }
        for row in &mut self.rows {
            row.resize(old_width + incoming.len(), Cell::Null);
        }

        for other_row in &other.rows {
            let key_cell = &other_row[other_key];
            match self.rows.iter_mut().find(|r| &r[self_key] == key_cell) {
                Some(row) => {
                    for (offset, &i) in incoming.iter().enumerate() {
                        row[old_width + offset] = other_row[i].clone();
                    }
                }
                None => {
                    let mut row = vec![Cell::Null; self.columns.len()];
                    row[self_key] = key_cell.clone();
                    for (offset, &i) in incoming.iter().enumerate() {
                        row[old_width + offset] = other_row[i].clone();
                    }
                    self.rows.push(row);
                }
            }
        }
        Ok(())
    }
}
