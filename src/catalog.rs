//! Column catalog across many input files.
//!
//! [`ColumnCatalog::build`] reads a small preview of every file with the shared
//! dialect and records each file's header exactly as read. From those lists it
//! derives the union and intersection of column names, a file × column
//! position matrix, and the canonical column order (see [`crate::order`]).
//! The catalog is immutable once built; rebuild it when inputs change.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::{debug, info};
use serde::Serialize;

use crate::{
    chunk::ChunkReader,
    error::StackError,
    io_utils,
    order::{self, ColumnRank},
    sniffer::Dialect,
};

/// Column names managed by the combiner itself when tagging output rows.
pub const FILENAME_COLUMN: &str = "filename";
pub const FILEPATH_COLUMN: &str = "filepath";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileColumns {
    pub path: PathBuf,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCatalog {
    files: Vec<FileColumns>,
    columns_all: Vec<String>,
    columns_common: Vec<String>,
    columns_unique: Vec<String>,
    /// `positions[file][column]`, columns in canonical order.
    positions: Vec<Vec<Option<usize>>>,
    ranks: Vec<ColumnRank>,
    is_all_equal: bool,
}

/// Reads the header of one file, previewing at most `preview_rows` records.
pub fn read_file_columns(
    path: &Path,
    dialect: &Dialect,
    encoding: &'static Encoding,
    preview_rows: usize,
) -> Result<Vec<String>> {
    let mut reader = ChunkReader::open(path, dialect, encoding)?;
    reader.next_batch(preview_rows)?;
    Ok(reader.headers().to_vec())
}

impl ColumnCatalog {
    /// Scans every file. `reserved` names are left out of the per-file lists
    /// because the combiner appends them itself.
    pub fn build(
        paths: &[PathBuf],
        dialect: &Dialect,
        encoding: &'static Encoding,
        preview_rows: usize,
        reserved: &[&str],
    ) -> Result<Self> {
        if paths.is_empty() {
            return Err(StackError::EmptyInput.into());
        }
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            info!("Scanning columns of {}", io_utils::file_name(path));
            let columns = read_file_columns(path, dialect, encoding, preview_rows)
                .with_context(|| format!("Scanning columns of {path:?}"))?
                .into_iter()
                .filter(|column| !reserved.contains(&column.as_str()))
                .collect::<Vec<_>>();
            debug!("Columns of {:?}: {:?}", path, columns);
            files.push(FileColumns {
                path: path.clone(),
                columns,
            });
        }
        Ok(Self::from_file_columns(files))
    }

    /// Builds the catalog from already captured column lists.
    pub fn from_file_columns(files: Vec<FileColumns>) -> Self {
        let mut seen = HashSet::new();
        let mut encountered = Vec::new();
        for file in &files {
            for column in &file.columns {
                if seen.insert(column.as_str()) {
                    encountered.push(column.clone());
                }
            }
        }

        let raw_positions = position_matrix(&files, &encountered);
        let ranks = order::rank_columns(&encountered, &raw_positions);
        let columns_all = ranks.iter().map(|rank| rank.name.clone()).collect::<Vec<_>>();
        let positions = position_matrix(&files, &columns_all);

        let (columns_common, columns_unique): (Vec<_>, Vec<_>) = columns_all
            .iter()
            .enumerate()
            .partition(|(idx, _)| positions.iter().all(|file| file[*idx].is_some()));
        let columns_common = columns_common.into_iter().map(|(_, c)| c.clone()).collect();
        let columns_unique = columns_unique.into_iter().map(|(_, c)| c.clone()).collect();

        let is_all_equal = match files.split_first() {
            Some((first, rest)) => {
                let baseline = first.columns.iter().collect::<HashSet<_>>();
                rest.iter()
                    .all(|file| file.columns.iter().collect::<HashSet<_>>() == baseline)
            }
            None => true,
        };

        Self {
            files,
            columns_all,
            columns_common,
            columns_unique,
            positions,
            ranks,
            is_all_equal,
        }
    }

    pub fn files(&self) -> &[FileColumns] {
        &self.files
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|file| file.path.as_path())
    }

    pub fn file_columns(&self, path: &Path) -> Option<&[String]> {
        self.files
            .iter()
            .find(|file| file.path == path)
            .map(|file| file.columns.as_slice())
    }

    /// Every column seen in any file, in canonical order.
    pub fn columns_all(&self) -> &[String] {
        &self.columns_all
    }

    /// Columns present in every file, in canonical order.
    pub fn columns_common(&self) -> &[String] {
        &self.columns_common
    }

    /// Columns missing from at least one file, in canonical order.
    pub fn columns_unique(&self) -> &[String] {
        &self.columns_unique
    }

    pub fn ranks(&self) -> &[ColumnRank] {
        &self.ranks
    }

    pub fn is_all_equal(&self) -> bool {
        self.is_all_equal
    }

    fn column_idx(&self, column: &str) -> Option<usize> {
        self.columns_all.iter().position(|c| c == column)
    }

    fn file_idx(&self, path: &Path) -> Option<usize> {
        self.files.iter().position(|file| file.path == path)
    }

    /// Position of `column` within the header of `path`.
    pub fn position(&self, path: &Path, column: &str) -> Option<usize> {
        let file = self.file_idx(path)?;
        let col = self.column_idx(column)?;
        self.positions[file][col]
    }

    pub fn is_present(&self, path: &Path, column: &str) -> bool {
        self.position(path, column).is_some()
    }

    pub fn files_with_column(&self, column: &str) -> Vec<&Path> {
        let Some(col) = self.column_idx(column) else {
            return Vec::new();
        };
        self.files
            .iter()
            .zip(&self.positions)
            .filter(|(_, row)| row[col].is_some())
            .map(|(file, _)| file.path.as_path())
            .collect()
    }

    /// File × column presence table restricted to `columns`, for display.
    pub fn presence_table(&self, columns: &[String]) -> (Vec<String>, Vec<Vec<String>>) {
        self.table_for(columns, |position| position.is_some().to_string())
    }

    /// File × column position table restricted to `columns`, blank when absent.
    pub fn position_table(&self, columns: &[String]) -> (Vec<String>, Vec<Vec<String>>) {
        self.table_for(columns, |position| {
            position.map(|p| p.to_string()).unwrap_or_default()
        })
    }

    fn table_for<F>(&self, columns: &[String], render: F) -> (Vec<String>, Vec<Vec<String>>)
    where
        F: Fn(Option<usize>) -> String,
    {
        let mut headers = vec![FILENAME_COLUMN.to_string()];
        headers.extend(columns.iter().cloned());
        let rows = self
            .files
            .iter()
            .zip(&self.positions)
            .map(|(file, positions)| {
                let mut row = vec![io_utils::file_name(&file.path)];
                row.extend(columns.iter().map(|column| {
                    render(self.column_idx(column).and_then(|idx| positions[idx]))
                }));
                row
            })
            .collect();
        (headers, rows)
    }
}

fn position_matrix(files: &[FileColumns], columns: &[String]) -> Vec<Vec<Option<usize>>> {
    files
        .iter()
        .map(|file| {
            columns
                .iter()
                .map(|column| file.columns.iter().position(|c| c == column))
                .collect()
        })
        .collect()
}
