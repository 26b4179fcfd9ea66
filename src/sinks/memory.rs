use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use super::{ChunkSink, Layout, SinkResult};
use crate::{chunk::Chunk, table};

/// Combined rows held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CombinedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl CombinedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_values(&self, name: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.columns.iter().position(|column| column == name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).and_then(|value| value.as_deref()))
                .collect(),
        )
    }

    pub fn render(&self) -> String {
        table::render_optional_table(&self.columns, &self.rows)
    }
}

pub struct MemorySink {
    layout: Layout,
    rows: Vec<Vec<Option<String>>>,
}

impl MemorySink {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            layout: Layout::new(columns),
            rows: Vec::new(),
        }
    }

    pub fn into_table(self) -> CombinedTable {
        CombinedTable {
            columns: self.layout.columns().to_vec(),
            rows: self.rows,
        }
    }
}

impl ChunkSink for MemorySink {
    fn write_chunk(&mut self, chunk: &Chunk, source: &Path) -> Result<()> {
        self.layout.check(chunk, source)?;
        self.rows.extend(chunk.rows.iter().cloned());
        Ok(())
    }

    fn finish(&mut self) -> Result<SinkResult> {
        Ok(SinkResult {
            files_written: Vec::new(),
            rows_written: self.rows.len() as u64,
        })
    }
}
