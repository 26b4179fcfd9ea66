pub mod catalog;
pub mod chunk;
pub mod cli;
pub mod combine;
pub mod config;
pub mod error;
pub mod io_utils;
pub mod order;
pub mod plan;
pub mod sinks;
pub mod sniffer;
pub mod table;

use std::{env, path::PathBuf, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use log::{LevelFilter, debug, info};

pub use crate::{
    catalog::ColumnCatalog,
    chunk::Chunk,
    combine::{ChunkTransform, CombineOptions, Combiner, ProgressReporter},
    error::{NamingConflict, StackError},
    plan::{ColumnSelection, ReconciliationPlan, RenameMap},
    sinks::{CombinedTable, IfExists, SinkResult},
    sniffer::{Dialect, SniffOptions, SniffedFiles},
};

use crate::{
    cli::{Cli, Commands, OutputFormat, ReadArgs, ReportFormat, SelectionArgs},
    config::CombineConfig,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_stack", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sniff(args) => handle_sniff(&args),
        Commands::Columns(args) => handle_columns(&args),
        Commands::Preview(args) => handle_preview(&args),
        Commands::Combine(args) => handle_combine(&args),
    }
}

fn handle_sniff(args: &cli::SniffArgs) -> Result<()> {
    let files = expand_inputs(&args.inputs)?;
    let config = CombineConfig {
        sniff_lines: args.sniff_lines,
        delimiters: args.delimiters.clone(),
        encoding: args.input_encoding.clone(),
        ..CombineConfig::default()
    };
    let options = config.into_options()?;
    let sniffed = sniffer::sniff_files(&files, &options.sniff)?;

    let headers = ["file", "delimiter", "consistent", "skip_rows", "has_header", "certainty"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = sniffed
        .results()
        .iter()
        .map(|result| {
            vec![
                io_utils::file_name(&result.path),
                printable_delimiter(result.delimiter),
                result.delimiter_is_consistent.to_string(),
                result.skip_rows.to_string(),
                result.has_header.to_string(),
                result.certainty.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);

    let dialect = sniffed.dialect()?;
    println!(
        "Agreed dialect: delimiter '{}', has_header {}, skip_rows {}",
        printable_delimiter(dialect.delimiter),
        dialect.has_header,
        dialect.skip_rows
    );
    Ok(())
}

fn handle_columns(args: &cli::ColumnsArgs) -> Result<()> {
    let combiner = build_combiner(&args.read, None, None)?;
    let catalog = combiner.catalog();
    match args.format {
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(catalog).context("Serializing column catalog")?;
            println!("{json}");
        }
        ReportFormat::Table => {
            println!("All files have equal columns: {}", catalog.is_all_equal());
            println!("All columns: {}", catalog.columns_all().join(", "));
            println!("Common columns: {}", catalog.columns_common().join(", "));
            println!("Unique columns: {}", catalog.columns_unique().join(", "));
            println!();
            let (headers, rows) = catalog.presence_table(catalog.columns_all());
            table::print_table(&headers, &rows);
        }
    }
    Ok(())
}

fn handle_preview(args: &cli::PreviewArgs) -> Result<()> {
    let mut combiner = build_combiner(&args.read, Some(&args.selection), None)?;
    println!("Selected columns: {}", combiner.preview_select().join(", "));
    if !combiner.options().rename.is_empty() {
        println!();
        let (headers, rows) = combiner.preview_rename();
        table::print_table(&headers, &rows);
    }
    println!();
    let preview = combiner.combine_preview()?;
    print!("{}", preview.render());
    Ok(())
}

fn handle_combine(args: &cli::CombineArgs) -> Result<()> {
    let mut combiner = build_combiner(&args.read, Some(&args.selection), args.chunk_size)?;

    let result = match (&args.align_dir, &args.output) {
        (Some(dir), _) => {
            let format = args.format.unwrap_or(OutputFormat::Csv);
            info!("Writing aligned {:?} copies into {:?}", format, dir);
            match format {
                OutputFormat::Csv => {
                    combiner.to_csv_align(dir, &args.align_prefix, args.output_delimiter)?
                }
                OutputFormat::Parquet => combiner.to_parquet_align(dir, &args.align_prefix)?,
                OutputFormat::Duckdb => bail!("Aligned copies can be written as csv or parquet only"),
            }
        }
        (None, Some(output)) => {
            let format = args
                .format
                .unwrap_or_else(|| OutputFormat::from_path(output));
            info!("Combining {} file(s) into {:?}", combiner.files().len(), output);
            match format {
                OutputFormat::Csv => combiner.to_csv_combine(output, args.output_delimiter)?,
                OutputFormat::Parquet => combiner.to_parquet_combine(output)?,
                OutputFormat::Duckdb => {
                    combiner.to_sql_combine(output, &args.table, args.if_exists)?
                }
            }
        }
        (None, None) => bail!("Either --output or --align-dir is required"),
    };

    info!(
        "Wrote {} row(s) across {} output file(s)",
        result.rows_written,
        result.files_written.len()
    );
    Ok(())
}

fn build_combiner(
    read: &ReadArgs,
    selection: Option<&SelectionArgs>,
    chunk_size: Option<usize>,
) -> Result<Combiner> {
    let files = expand_inputs(&read.inputs)?;
    let mut config = match &read.config {
        Some(path) => CombineConfig::load(path)?,
        None => CombineConfig::default(),
    };
    config.merge(read.config_overrides());
    if let Some(selection) = selection {
        selection.apply_to(&mut config);
    }
    if chunk_size.is_some() {
        config.chunk_size = chunk_size;
    }
    debug!("Effective configuration: {:?}", config);
    let options = config.into_options()?;
    Combiner::new(files, options)
}

/// Expands glob patterns; matches of each pattern are sorted, plain paths kept as given.
fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for pattern in patterns {
        if !pattern.contains(['*', '?', '[']) {
            files.push(PathBuf::from(pattern));
            continue;
        }
        let mut matches = glob::glob(pattern)
            .with_context(|| format!("Invalid glob pattern '{pattern}'"))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Expanding '{pattern}'"))?;
        if matches.is_empty() {
            return Err(anyhow!("No files match '{pattern}'"));
        }
        matches.sort();
        files.extend(matches);
    }
    Ok(files)
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
