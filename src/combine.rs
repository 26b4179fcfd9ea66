//! Streaming combiner.
//!
//! A [`Combiner`] is built eagerly: it resolves the shared dialect (sniffing
//! only the properties the caller left open), scans every file into a
//! [`ColumnCatalog`] and derives the [`ReconciliationPlan`]. Nothing is streamed
//! until one of the output methods runs. Each output method then reads every
//! file chunk by chunk, projects the chunk onto the target columns, runs the
//! optional user transform, appends the source tag columns and hands the chunk
//! to a single sink.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};

use crate::{
    catalog::{ColumnCatalog, FILENAME_COLUMN, FILEPATH_COLUMN},
    chunk::{Chunk, ChunkReader},
    error::StackError,
    io_utils,
    plan::{ColumnSelection, ReconciliationPlan, RenameMap},
    sinks::{
        ChunkSink, CombinedTable, CsvSink, DuckDbSink, IfExists, MemorySink, ParquetSink,
        SinkResult,
    },
    sniffer::{self, Dialect, SniffOptions, SniffedFiles},
};

pub const DEFAULT_PREVIEW_ROWS: usize = 5;
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;
pub const DEFAULT_ALIGN_PREFIX: &str = "stack-";

/// Receives progress messages while files are scanned and streamed.
pub trait ProgressReporter {
    fn report(&self, message: &str, status: &str);
}

/// Called on every chunk after projection and before the tag columns are added.
pub type ChunkTransform = Box<dyn FnMut(&mut Chunk) -> Result<()>>;

#[derive(Debug, Clone)]
pub struct CombineOptions {
    pub delimiter: Option<u8>,
    pub has_header: Option<bool>,
    pub skip_rows: Option<usize>,
    pub encoding: &'static Encoding,
    pub preview_rows: usize,
    pub sniff: SniffOptions,
    pub selection: ColumnSelection,
    pub rename: RenameMap,
    pub add_filename: bool,
    pub add_filepath: bool,
    pub chunk_size: usize,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            has_header: None,
            skip_rows: None,
            encoding: UTF_8,
            preview_rows: DEFAULT_PREVIEW_ROWS,
            sniff: SniffOptions::default(),
            selection: ColumnSelection::All,
            rename: RenameMap::new(),
            add_filename: true,
            add_filepath: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl CombineOptions {
    /// Checks that need no file access.
    pub fn validate(&self) -> Result<(), StackError> {
        self.selection.validate()?;
        let tags = self.tag_columns();
        let selected = match &self.selection {
            ColumnSelection::Explicit(columns) => columns.as_slice(),
            _ => &[],
        };
        let reserved = selected
            .iter()
            .chain(self.rename.values())
            .find(|column| tags.contains(&column.as_str()));
        match reserved {
            Some(column) => Err(StackError::ReservedColumn {
                column: column.clone(),
            }),
            None => Ok(()),
        }
    }

    /// The dialect, when the caller fixed every part of it.
    pub fn supplied_dialect(&self) -> Option<Dialect> {
        Some(Dialect {
            delimiter: self.delimiter?,
            has_header: self.has_header?,
            skip_rows: self.skip_rows?,
        })
    }

    /// Tag columns appended to every chunk, in output order.
    pub fn tag_columns(&self) -> Vec<&'static str> {
        let mut tags = Vec::with_capacity(2);
        if self.add_filepath {
            tags.push(FILEPATH_COLUMN);
        }
        if self.add_filename {
            tags.push(FILENAME_COLUMN);
        }
        tags
    }

    /// Sniffer settings with the caller's known values fixed in place.
    fn sniff_options(&self) -> SniffOptions {
        SniffOptions {
            encoding: self.encoding,
            delimiter: self.delimiter.or(self.sniff.delimiter),
            skip_rows: self.skip_rows.or(self.sniff.skip_rows),
            ..self.sniff.clone()
        }
    }
}

pub struct Combiner {
    files: Vec<PathBuf>,
    options: CombineOptions,
    dialect: Dialect,
    sniffed: Option<SniffedFiles>,
    catalog: ColumnCatalog,
    plan: ReconciliationPlan,
    transform: Option<ChunkTransform>,
    progress: Option<Box<dyn ProgressReporter>>,
}

impl Combiner {
    pub fn new(files: Vec<PathBuf>, options: CombineOptions) -> Result<Self> {
        if files.is_empty() {
            return Err(StackError::EmptyInput.into());
        }
        options.validate()?;

        let (dialect, sniffed) = match options.supplied_dialect() {
            Some(dialect) => (dialect, None),
            None => {
                info!("Sniffing CSV settings of {} file(s)", files.len());
                let sniffed = sniffer::sniff_files(&files, &options.sniff_options())?;
                let dialect =
                    sniffed.dialect_with(options.delimiter, options.has_header, options.skip_rows)?;
                (dialect, Some(sniffed))
            }
        };
        debug!("Using dialect {:?}", dialect);

        let catalog = ColumnCatalog::build(
            &files,
            &dialect,
            options.encoding,
            options.preview_rows,
            &options.tag_columns(),
        )?;
        let plan = ReconciliationPlan::build(&catalog, &options.rename, &options.selection)?;
        info!(
            "Reconciled {} file(s) onto {} column(s)",
            files.len(),
            plan.target().len()
        );

        Ok(Self {
            files,
            options,
            dialect,
            sniffed,
            catalog,
            plan,
            transform: None,
            progress: None,
        })
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: FnMut(&mut Chunk) -> Result<()> + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn with_progress<P>(mut self, progress: P) -> Self
    where
        P: ProgressReporter + 'static,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn options(&self) -> &CombineOptions {
        &self.options
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Per-file sniff results, when sniffing was needed.
    pub fn sniffed(&self) -> Option<&SniffedFiles> {
        self.sniffed.as_ref()
    }

    pub fn catalog(&self) -> &ColumnCatalog {
        &self.catalog
    }

    pub fn plan(&self) -> &ReconciliationPlan {
        &self.plan
    }

    pub fn is_all_equal(&self) -> bool {
        self.catalog.is_all_equal()
    }

    /// Columns selected for output, before the tag columns.
    pub fn preview_select(&self) -> &[String] {
        self.plan.target()
    }

    /// File × source column table of effective renames.
    pub fn preview_rename(&self) -> (Vec<String>, Vec<Vec<String>>) {
        self.plan.rename_table()
    }

    /// Full output layout: target columns followed by the tag columns.
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns = self.plan.target().to_vec();
        columns.extend(self.options.tag_columns().into_iter().map(String::from));
        columns
    }

    /// The first `preview_rows` rows of every file, combined.
    pub fn combine_preview(&mut self) -> Result<CombinedTable> {
        let mut sink = MemorySink::new(self.output_columns());
        let limit = self.options.preview_rows;
        self.stream_all(&mut sink, Some(limit))?;
        Ok(sink.into_table())
    }

    /// Every row of every file, held in memory.
    pub fn to_table(&mut self) -> Result<CombinedTable> {
        let mut sink = MemorySink::new(self.output_columns());
        self.stream_all(&mut sink, None)?;
        Ok(sink.into_table())
    }

    pub fn to_csv_combine(&mut self, output: &Path, delimiter: Option<u8>) -> Result<SinkResult> {
        let delimiter =
            io_utils::resolve_output_delimiter(Some(output), delimiter, io_utils::DEFAULT_CSV_DELIMITER);
        let mut sink = CsvSink::create(output, delimiter, self.output_columns())?;
        self.stream_all(&mut sink, None)
    }

    pub fn to_parquet_combine(&mut self, output: &Path) -> Result<SinkResult> {
        let mut sink = ParquetSink::create(output, self.output_columns())?;
        self.stream_all(&mut sink, None)
    }

    pub fn to_sql_combine(
        &mut self,
        database: &Path,
        table: &str,
        if_exists: IfExists,
    ) -> Result<SinkResult> {
        if if_exists == IfExists::Append && !self.options.selection.is_explicit() {
            return Err(StackError::MissingSelection {
                operation: "Appending to an existing table",
            }
            .into());
        }
        let mut sink = DuckDbSink::create(database, table, if_exists, self.output_columns())?;
        self.stream_all(&mut sink, None)
    }

    /// Writes one CSV per input, each reindexed to the shared layout.
    pub fn to_csv_align(
        &mut self,
        output_dir: &Path,
        prefix: &str,
        delimiter: Option<u8>,
    ) -> Result<SinkResult> {
        let delimiter = delimiter.unwrap_or(io_utils::DEFAULT_CSV_DELIMITER);
        let outputs = self.aligned_paths(output_dir, prefix, "csv")?;
        let mut result = SinkResult::default();
        for (idx, output) in outputs.iter().enumerate() {
            let mut sink = CsvSink::create(output, delimiter, self.output_columns())?;
            self.stream_file(idx, &mut sink, None)?;
            result.merge(sink.finish()?);
        }
        Ok(result)
    }

    /// Writes one Parquet file per input, each reindexed to the shared layout.
    pub fn to_parquet_align(&mut self, output_dir: &Path, prefix: &str) -> Result<SinkResult> {
        let outputs = self.aligned_paths(output_dir, prefix, "parquet")?;
        let mut result = SinkResult::default();
        for (idx, output) in outputs.iter().enumerate() {
            let mut sink = ParquetSink::create(output, self.output_columns())?;
            self.stream_file(idx, &mut sink, None)?;
            result.merge(sink.finish()?);
        }
        Ok(result)
    }

    /// One output path per input; two inputs may not map onto the same file.
    fn aligned_paths(
        &self,
        output_dir: &Path,
        prefix: &str,
        extension: &str,
    ) -> Result<Vec<PathBuf>> {
        let mut claimed: HashMap<PathBuf, &Path> = HashMap::with_capacity(self.files.len());
        let mut outputs = Vec::with_capacity(self.files.len());
        for input in &self.files {
            let output = aligned_path(output_dir, prefix, input, extension);
            if let Some(previous) = claimed.insert(output.clone(), input) {
                bail!(
                    "Inputs {previous:?} and {input:?} would both be aligned into {output:?}; rename one of them"
                );
            }
            outputs.push(output);
        }
        Ok(outputs)
    }

    fn stream_all(&mut self, sink: &mut dyn ChunkSink, row_limit: Option<usize>) -> Result<SinkResult> {
        for idx in 0..self.files.len() {
            self.stream_file(idx, sink, row_limit)?;
        }
        sink.finish()
    }

    fn stream_file(
        &mut self,
        idx: usize,
        sink: &mut dyn ChunkSink,
        row_limit: Option<usize>,
    ) -> Result<u64> {
        let path = self.files[idx].clone();
        let name = io_utils::file_name(&path);
        self.report(&format!("processing {name}"), "ok");

        let mut reader = ChunkReader::open(&path, &self.dialect, self.options.encoding)
            .with_context(|| format!("Opening {path:?}"))?;
        let projection = self.plan.projection(&path, reader.headers());
        let missing = projection.missing_columns().collect::<Vec<_>>();
        if !missing.is_empty() {
            debug!("{name} lacks {missing:?}; filling with nulls");
        }

        let chunk_size = self.options.chunk_size.max(1);
        let mut remaining = row_limit;
        let mut rows = 0u64;
        loop {
            let limit = remaining.map_or(chunk_size, |left| left.min(chunk_size));
            if limit == 0 {
                break;
            }
            let batch = reader.next_batch(limit)?;
            if batch.is_empty() {
                break;
            }
            if let Some(left) = remaining.as_mut() {
                *left -= batch.len();
            }
            let mut chunk = projection.apply(batch);
            if let Some(transform) = self.transform.as_mut() {
                transform(&mut chunk).with_context(|| format!("Transforming rows of {path:?}"))?;
            }
            self.tag(&mut chunk, &path, &name);
            rows += chunk.len() as u64;
            sink.write_chunk(&chunk, &path)
                .with_context(|| format!("Writing rows of {path:?}"))?;
        }

        info!("Appended {rows} row(s) from {name}");
        self.report(&format!("appended {rows} row(s) from {name}"), "ok");
        Ok(rows)
    }

    fn tag(&self, chunk: &mut Chunk, path: &Path, name: &str) {
        if self.options.add_filepath {
            chunk.push_constant_column(FILEPATH_COLUMN, &path.to_string_lossy());
        }
        if self.options.add_filename {
            chunk.push_constant_column(FILENAME_COLUMN, name);
        }
    }

    fn report(&self, message: &str, status: &str) {
        if let Some(progress) = &self.progress {
            progress.report(message, status);
        }
    }
}

/// `<dir>/<prefix><input stem>.<extension>`
pub fn aligned_path(output_dir: &Path, prefix: &str, input: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| io_utils::file_name(input));
    output_dir.join(format!("{prefix}{stem}.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_columns_follow_flags() {
        let mut options = CombineOptions::default();
        assert_eq!(options.tag_columns(), vec!["filepath", "filename"]);
        options.add_filepath = false;
        assert_eq!(options.tag_columns(), vec!["filename"]);
        options.add_filename = false;
        assert!(options.tag_columns().is_empty());
    }

    #[test]
    fn dialect_is_supplied_only_when_complete() {
        let mut options = CombineOptions {
            delimiter: Some(b';'),
            has_header: Some(true),
            ..CombineOptions::default()
        };
        assert!(options.supplied_dialect().is_none());
        options.skip_rows = Some(0);
        assert_eq!(
            options.supplied_dialect(),
            Some(Dialect {
                delimiter: b';',
                has_header: true,
                skip_rows: 0,
            })
        );
    }

    #[test]
    fn enabled_tag_names_are_reserved() {
        let options = CombineOptions {
            rename: RenameMap::from([("source".to_string(), "filepath".to_string())]),
            ..CombineOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(StackError::ReservedColumn { column }) if column == "filepath"
        ));

        let options = CombineOptions {
            add_filepath: false,
            ..options
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn aligned_path_uses_prefix_and_stem() {
        let path = aligned_path(Path::new("out"), "stack-", Path::new("data/jan.csv"), "parquet");
        assert_eq!(path, PathBuf::from("out/stack-jan.parquet"));
    }

    #[test]
    fn empty_file_list_fails_before_io() {
        let err = Combiner::new(Vec::new(), CombineOptions::default())
            .err()
            .expect("empty input must fail");
        assert!(matches!(
            err.downcast_ref::<StackError>(),
            Some(StackError::EmptyInput)
        ));
    }
}
