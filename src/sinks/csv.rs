use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::debug;

use super::{ChunkSink, Layout, SinkResult};
use crate::{chunk::Chunk, io_utils};

/// Delimited text output; missing values are written as empty fields.
pub struct CsvSink {
    path: PathBuf,
    writer: ::csv::Writer<Box<dyn Write>>,
    layout: Layout,
    rows_written: u64,
}

impl CsvSink {
    pub fn create(path: &Path, delimiter: u8, columns: Vec<String>) -> Result<Self> {
        let writer = io_utils::open_csv_writer(path, delimiter)?;
        debug!("Opened CSV output {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            layout: Layout::new(columns),
            rows_written: 0,
        })
    }

    fn write_header(&mut self) -> Result<()> {
        self.writer
            .write_record(self.layout.columns())
            .with_context(|| format!("Writing header to {:?}", self.path))
    }
}

impl ChunkSink for CsvSink {
    fn write_chunk(&mut self, chunk: &Chunk, source: &Path) -> Result<()> {
        let first = !self.layout.is_committed();
        self.layout.check(chunk, source)?;
        if first {
            self.write_header()?;
        }
        for row in &chunk.rows {
            self.writer
                .write_record(row.iter().map(|value| value.as_deref().unwrap_or("")))
                .with_context(|| format!("Writing rows from {source:?} to {:?}", self.path))?;
        }
        self.rows_written += chunk.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<SinkResult> {
        if !self.layout.is_committed() {
            self.write_header()?;
        }
        self.writer
            .flush()
            .with_context(|| format!("Flushing {:?}", self.path))?;
        Ok(SinkResult {
            files_written: vec![self.path.clone()],
            rows_written: self.rows_written,
        })
    }
}
