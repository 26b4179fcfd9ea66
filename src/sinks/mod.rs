//! Output destinations for reconciled chunks.
//!
//! Every sink receives chunks that already carry the final column layout. The
//! first chunk fixes that layout; a sink that never sees a chunk falls back to
//! the layout it was created with so that empty inputs still produce a header.

pub mod csv;
pub mod memory;
pub mod parquet;
pub mod sql;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::{chunk::Chunk, error::StackError};

pub use self::{
    csv::CsvSink,
    memory::{CombinedTable, MemorySink},
    parquet::ParquetSink,
    sql::{DuckDbSink, IfExists},
};

pub trait ChunkSink {
    fn write_chunk(&mut self, chunk: &Chunk, source: &Path) -> Result<()>;
    fn finish(&mut self) -> Result<SinkResult>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkResult {
    pub files_written: Vec<PathBuf>,
    pub rows_written: u64,
}

impl SinkResult {
    pub fn merge(&mut self, other: SinkResult) {
        self.files_written.extend(other.files_written);
        self.rows_written += other.rows_written;
    }
}

/// Tracks the column layout a sink has committed to.
#[derive(Debug, Clone)]
pub(crate) struct Layout {
    fallback: Vec<String>,
    committed: Option<Vec<String>>,
}

impl Layout {
    pub(crate) fn new(fallback: Vec<String>) -> Self {
        Self {
            fallback,
            committed: None,
        }
    }

    pub(crate) fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    /// Commits to the chunk's layout on first use, then rejects any other layout.
    pub(crate) fn check(&mut self, chunk: &Chunk, source: &Path) -> Result<(), StackError> {
        match &self.committed {
            Some(expected) if *expected != chunk.columns => Err(StackError::ChunkLayoutChanged {
                path: source.to_path_buf(),
                expected: expected.clone(),
                found: chunk.columns.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                self.committed = Some(chunk.columns.clone());
                Ok(())
            }
        }
    }

    pub(crate) fn columns(&self) -> &[String] {
        self.committed.as_deref().unwrap_or(&self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_commits_to_first_chunk() {
        let mut layout = Layout::new(vec!["a".to_string()]);
        assert_eq!(layout.columns(), ["a"]);
        let first = Chunk::new(vec!["a".to_string(), "b".to_string()]);
        layout.check(&first, Path::new("x.csv")).expect("first chunk");
        assert_eq!(layout.columns(), ["a", "b"]);

        let other = Chunk::new(vec!["b".to_string()]);
        let err = layout.check(&other, Path::new("y.csv")).unwrap_err();
        assert!(matches!(err, StackError::ChunkLayoutChanged { ref path, .. } if path == Path::new("y.csv")));
    }
}
