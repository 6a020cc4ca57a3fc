//! Lenient CSV tables.
//!
//! The first record is the header row. Every later record is zipped with the
//! headers by position: missing fields read as `""`, extra fields are dropped,
//! blank lines are skipped and a record that cannot be read is skipped with a
//! warning.

use std::collections::HashMap;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, Trim};
use tracing::{debug, warn};

use super::ChartError;

/// A parsed data file: header names plus one mapping per data row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

/// One data row keyed by header name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: HashMap<String, String>,
}

impl Row {
    /// Field text, or `""` when the row has no such column.
    pub fn get(&self, column: &str) -> &str {
        self.fields.get(column).map(String::as_str).unwrap_or("")
    }

    /// Field parsed as a number. Empty or unparseable text reads as `0`.
    pub fn number(&self, column: &str) -> f64 {
        parse_number(self.get(column))
    }

    /// The first non-empty field among `columns`, or `""`.
    pub fn first_text(&self, columns: &[&str]) -> &str {
        columns
            .iter()
            .map(|c| self.get(c))
            .find(|v| !v.is_empty())
            .unwrap_or("")
    }

    /// [`Row::first_text`] parsed as a number.
    pub fn first_number(&self, columns: &[&str]) -> f64 {
        parse_number(self.first_text(columns))
    }
}

fn parse_number(text: &str) -> f64 {
    text.parse::<f64>().unwrap_or(0.0)
}

impl Table {
    /// Parse delimited text. Never fails; bad records are skipped.
    pub fn parse(text: &str, delimiter: u8) -> Self {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let headers: Vec<String> = match reader.byte_headers() {
            Ok(record) => record_strings(record),
            Err(e) => {
                warn!(error = %e, "unreadable header row");
                return Self::default();
            }
        };

        let mut rows = Vec::new();
        let mut record = ByteRecord::new();
        loop {
            match reader.read_byte_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable row");
                    continue;
                }
            }
            let values = record_strings(&record);
            let mut fields = HashMap::with_capacity(headers.len());
            for (i, header) in headers.iter().enumerate() {
                let value = values.get(i).cloned().unwrap_or_default();
                fields.insert(header.clone(), value);
            }
            rows.push(Row { fields });
        }

        Self { headers, rows }
    }

    /// Read and parse the file at `path`.
    pub fn read(path: &Path, delimiter: u8) -> Result<Self, ChartError> {
        let bytes = std::fs::read(path).map_err(|source| ChartError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&String::from_utf8_lossy(&bytes), delimiter);
        debug!(path = %path.display(), rows = table.rows.len(), "loaded data file");
        Ok(table)
    }

    /// Like [`Table::read`], but a missing file is an empty table.
    pub fn read_or_empty(path: &Path, delimiter: u8) -> Result<Self, ChartError> {
        match Self::read(path, delimiter) {
            Err(ChartError::Read { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                warn!(path = %path.display(), "data file not found");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All values of `column` in row order.
    pub fn column(&self, column: &str) -> Vec<f64> {
        self.rows.iter().map(|r| r.number(column)).collect()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }
}

fn record_strings(record: &ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|field| String::from_utf8_lossy(field).into_owned())
        .collect()
}
