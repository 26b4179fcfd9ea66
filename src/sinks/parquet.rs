use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result, anyhow};
use arrow::{
    array::{ArrayRef, RecordBatch, StringArray},
    datatypes::{DataType, Field, Schema, SchemaRef},
};
use parquet::{
    arrow::ArrowWriter,
    basic::Compression,
    file::properties::WriterProperties,
};

use super::{ChunkSink, Layout, SinkResult};
use crate::{chunk::Chunk, io_utils};

/// Parquet output with every column stored as nullable UTF-8.
pub struct ParquetSink {
    path: PathBuf,
    layout: Layout,
    writer: Option<ArrowWriter<BufWriter<File>>>,
    schema: Option<SchemaRef>,
    rows_written: u64,
}

pub fn string_schema(columns: &[String]) -> SchemaRef {
    Arc::new(Schema::new(
        columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ))
}

impl ParquetSink {
    pub fn create(path: &Path, columns: Vec<String>) -> Result<Self> {
        io_utils::ensure_parent_dir(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            layout: Layout::new(columns),
            writer: None,
            schema: None,
            rows_written: 0,
        })
    }

    fn open_writer(&mut self) -> Result<()> {
        let schema = string_schema(self.layout.columns());
        let file = File::create(&self.path)
            .with_context(|| format!("Creating output file {:?}", self.path))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let writer = ArrowWriter::try_new(BufWriter::new(file), Arc::clone(&schema), Some(props))
            .with_context(|| format!("Starting parquet writer for {:?}", self.path))?;
        self.writer = Some(writer);
        self.schema = Some(schema);
        Ok(())
    }

    fn to_batch(&self, chunk: &Chunk) -> Result<RecordBatch> {
        let schema = self
            .schema
            .clone()
            .ok_or_else(|| anyhow!("Parquet writer for {:?} is not open", self.path))?;
        let arrays = (0..chunk.columns.len())
            .map(|idx| {
                let values = chunk
                    .rows
                    .iter()
                    .map(|row| row.get(idx).and_then(|value| value.as_deref()))
                    .collect::<Vec<_>>();
                Arc::new(StringArray::from(values)) as ArrayRef
            })
            .collect::<Vec<_>>();
        Ok(RecordBatch::try_new(schema, arrays)?)
    }
}

impl ChunkSink for ParquetSink {
    fn write_chunk(&mut self, chunk: &Chunk, source: &Path) -> Result<()> {
        self.layout.check(chunk, source)?;
        if self.writer.is_none() {
            self.open_writer()?;
        }
        if chunk.is_empty() {
            return Ok(());
        }
        let batch = self.to_batch(chunk)?;
        self.writer
            .as_mut()
            .ok_or_else(|| anyhow!("Parquet writer for {:?} already closed", self.path))?
            .write(&batch)
            .with_context(|| format!("Writing rows from {source:?} to {:?}", self.path))?;
        self.rows_written += chunk.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<SinkResult> {
        if self.writer.is_none() {
            self.open_writer()?;
        }
        if let Some(writer) = self.writer.take() {
            writer
                .close()
                .with_context(|| format!("Closing parquet file {:?}", self.path))?;
        }
        Ok(SinkResult {
            files_written: vec![self.path.clone()],
            rows_written: self.rows_written,
        })
    }
}
