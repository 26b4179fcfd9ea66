//! Record chunks and the chunked file reader.
//!
//! Files are streamed in fixed-size batches of decoded records. A
//! [`Projection`] maps each batch onto the reconciled column list: it is built
//! once per file from that file's header, its effective rename map, and the
//! global target columns, then applied to every record.

use std::{io::Read, path::{Path, PathBuf}};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use indexmap::IndexMap;
use serde::Serialize;

use crate::{io_utils, sniffer::Dialect};

/// A batch of rows sharing one column layout. `None` marks a value the source
/// file did not have.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl Chunk {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn column_values(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).and_then(|value| value.as_deref()))
                .collect(),
        )
    }

    /// Appends a column holding the same value in every row.
    pub fn push_constant_column(&mut self, name: &str, value: &str) {
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Some(value.to_string()));
        }
    }

    pub fn extend(&mut self, other: Chunk) {
        self.rows.extend(other.rows);
    }
}

/// Column names for a file without a header row.
pub fn generate_field_names(count: usize) -> Vec<String> {
    (0..count).map(|idx| format!("field_{idx}")).collect()
}

/// Streams one file in batches of decoded, header-width records.
pub struct ChunkReader {
    path: PathBuf,
    reader: csv::Reader<Box<dyn Read>>,
    encoding: &'static Encoding,
    headers: Vec<String>,
    pending: Option<Vec<String>>,
    record: csv::ByteRecord,
    rows_read: usize,
    first_data_line: usize,
}

impl ChunkReader {
    pub fn open(path: &Path, dialect: &Dialect, encoding: &'static Encoding) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader_from_path(path, dialect)?;
        let mut record = csv::ByteRecord::new();
        let (headers, pending) = if dialect.has_header {
            let headers = io_utils::reader_headers(&mut reader, encoding)
                .with_context(|| format!("Reading header of {path:?}"))?;
            (headers, None)
        } else if reader
            .read_byte_record(&mut record)
            .with_context(|| format!("Reading first row of {path:?}"))?
        {
            let first = io_utils::decode_record(&record, encoding)
                .with_context(|| format!("Decoding first row of {path:?}"))?;
            (generate_field_names(first.len()), Some(first))
        } else {
            (Vec::new(), None)
        };
        let first_data_line = dialect.skip_rows + usize::from(dialect.has_header) + 1;
        Ok(Self {
            path: path.to_path_buf(),
            reader,
            encoding,
            headers,
            pending,
            record,
            rows_read: 0,
            first_data_line,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    fn fit_to_header(&self, mut row: Vec<String>) -> Vec<String> {
        row.resize(self.headers.len(), String::new());
        row
    }

    /// Reads up to `limit` rows; an empty batch means the file is exhausted.
    pub fn next_batch(&mut self, limit: usize) -> Result<Vec<Vec<String>>> {
        let mut batch = Vec::with_capacity(limit.min(4096));
        if limit == 0 {
            return Ok(batch);
        }
        if let Some(first) = self.pending.take() {
            batch.push(self.fit_to_header(first));
            self.rows_read += 1;
        }
        while batch.len() < limit {
            let line = self.first_data_line + self.rows_read;
            let more = self
                .reader
                .read_byte_record(&mut self.record)
                .with_context(|| format!("Reading row {line} in {:?}", self.path))?;
            if !more {
                break;
            }
            let decoded = io_utils::decode_record(&self.record, self.encoding)
                .with_context(|| format!("Decoding row {line} in {:?}", self.path))?;
            batch.push(self.fit_to_header(decoded));
            self.rows_read += 1;
        }
        Ok(batch)
    }
}

/// Maps a file's raw records onto the reconciled target columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    columns: Vec<String>,
    sources: Vec<Option<usize>>,
}

impl Projection {
    /// Renames `headers` through `rename`, then locates every target column.
    /// Columns missing from the file project to `None`; unselected ones are dropped.
    pub fn new(headers: &[String], rename: &IndexMap<String, String>, target: &[String]) -> Self {
        let renamed = headers
            .iter()
            .map(|header| rename.get(header).unwrap_or(header))
            .collect::<Vec<_>>();
        let sources = target
            .iter()
            .map(|column| renamed.iter().position(|name| *name == column))
            .collect();
        Self {
            columns: target.to_vec(),
            sources,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn missing_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .zip(&self.sources)
            .filter(|(_, source)| source.is_none())
            .map(|(column, _)| column.as_str())
    }

    pub fn apply(&self, rows: Vec<Vec<String>>) -> Chunk {
        let rows = rows
            .into_iter()
            .map(|mut row| {
                self.sources
                    .iter()
                    .map(|source| source.and_then(|idx| row.get_mut(idx).map(std::mem::take)))
                    .collect()
            })
            .collect();
        Chunk {
            columns: self.columns.clone(),
            rows,
        }
    }
}
