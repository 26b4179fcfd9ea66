use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::{combine::DEFAULT_ALIGN_PREFIX, config::CombineConfig, sinks::IfExists};

#[derive(Debug, Parser)]
#[command(author, version, about = "Stack CSV files with mismatched columns", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect delimiter, header and banner rows of each input and check they agree
    Sniff(SniffArgs),
    /// Report which columns appear in which input files
    Columns(ColumnsArgs),
    /// Show the reconciled columns, renames and the first rows of the combined output
    Preview(PreviewArgs),
    /// Stream every input into one combined output or aligned per-file copies
    Combine(CombineArgs),
}

#[derive(Debug, Args)]
pub struct SniffArgs {
    /// Input CSV files or glob patterns
    #[arg(short = 'i', long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<String>,
    /// Number of leading lines sampled per file
    #[arg(long = "sniff-lines")]
    pub sniff_lines: Option<usize>,
    /// Candidate delimiters as one string, e.g. ",;|"
    #[arg(long)]
    pub delimiters: Option<String>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

/// Input selection and dialect flags shared by every reading command.
#[derive(Debug, Args)]
pub struct ReadArgs {
    /// Input CSV files or glob patterns
    #[arg(short = 'i', long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<String>,
    /// CSV delimiter character (sniffed when omitted)
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Whether the first row after skipped rows is a header (sniffed when omitted)
    #[arg(long = "has-header", action = clap::ArgAction::Set)]
    pub has_header: Option<bool>,
    /// Leading rows to ignore in every file (sniffed when omitted)
    #[arg(long = "skip-rows")]
    pub skip_rows: Option<usize>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Number of leading lines sampled when sniffing
    #[arg(long = "sniff-lines")]
    pub sniff_lines: Option<usize>,
    /// Candidate delimiters considered when sniffing, e.g. ",;|"
    #[arg(long)]
    pub delimiters: Option<String>,
    /// Rows read per file while cataloguing columns and previewing
    #[arg(long = "preview-rows")]
    pub preview_rows: Option<usize>,
    /// YAML file with combine settings; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct SelectionArgs {
    /// Output only these columns, in this order (comma separated, repeatable)
    #[arg(
        short = 'C',
        long = "columns",
        value_delimiter = ',',
        action = clap::ArgAction::Append,
        conflicts_with = "common"
    )]
    pub columns: Vec<String>,
    /// Output only the columns present in every file
    #[arg(long)]
    pub common: bool,
    /// Rename a column before selection, as `old=new` (repeatable)
    #[arg(long = "rename", value_parser = parse_rename, action = clap::ArgAction::Append)]
    pub renames: Vec<(String, String)>,
    /// Do not append the source file name column
    #[arg(long = "no-filename")]
    pub no_filename: bool,
    /// Do not append the source file path column
    #[arg(long = "no-filepath")]
    pub no_filepath: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
#[value(rename_all = "kebab-case")]
pub enum ReportFormat {
    #[default]
    Table,
    Json,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    #[command(flatten)]
    pub read: ReadArgs,
    /// Report layout
    #[arg(long, default_value = "table")]
    pub format: ReportFormat,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub read: ReadArgs,
    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum OutputFormat {
    Csv,
    Parquet,
    Duckdb,
}

impl OutputFormat {
    /// Guesses the format from an output file extension, defaulting to CSV.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("parquet") | Some("pq") => OutputFormat::Parquet,
            Some("duckdb") | Some("db") => OutputFormat::Duckdb,
            _ => OutputFormat::Csv,
        }
    }
}

#[derive(Debug, Args)]
pub struct CombineArgs {
    #[command(flatten)]
    pub read: ReadArgs,
    #[command(flatten)]
    pub selection: SelectionArgs,
    /// Combined output file (CSV, Parquet or DuckDB database)
    #[arg(short = 'o', long = "output", required_unless_present = "align_dir")]
    pub output: Option<PathBuf>,
    /// Output format (guessed from the output extension when omitted)
    #[arg(long)]
    pub format: Option<OutputFormat>,
    /// Table to write when the output is a DuckDB database
    #[arg(long, default_value = "combined")]
    pub table: String,
    /// What to do when the DuckDB table already exists
    #[arg(long = "if-exists", default_value = "fail")]
    pub if_exists: IfExists,
    /// Write one aligned copy per input into this directory instead of one combined file
    #[arg(long = "align-dir", conflicts_with = "output")]
    pub align_dir: Option<PathBuf>,
    /// File name prefix for aligned copies
    #[arg(long = "align-prefix", default_value = DEFAULT_ALIGN_PREFIX)]
    pub align_prefix: String,
    /// Rows per streamed chunk
    #[arg(long = "chunk-size")]
    pub chunk_size: Option<usize>,
    /// Delimiter for CSV output (defaults to ',' or by output extension)
    #[arg(long = "output-delimiter", value_parser = parse_delimiter)]
    pub output_delimiter: Option<u8>,
}

impl ReadArgs {
    /// The flags that were given, as config overrides.
    pub fn config_overrides(&self) -> CombineConfig {
        CombineConfig {
            sep: self.delimiter.map(|d| (d as char).to_string()),
            has_header: self.has_header,
            skip_rows: self.skip_rows,
            preview_rows: self.preview_rows,
            sniff_lines: self.sniff_lines,
            delimiters: self.delimiters.clone(),
            encoding: self.input_encoding.clone(),
            ..CombineConfig::default()
        }
    }
}

impl SelectionArgs {
    pub fn apply_to(&self, config: &mut CombineConfig) {
        let columns = self
            .columns
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(|c| c.to_string())
            .collect::<Vec<_>>();
        let mut overrides = CombineConfig {
            columns_select: (!columns.is_empty()).then_some(columns),
            columns_select_common: self.common,
            columns_rename: self.renames.iter().cloned().collect(),
            ..CombineConfig::default()
        };
        if self.no_filename {
            overrides.add_filename = Some(false);
        }
        if self.no_filepath {
            overrides.add_filepath = Some(false);
        }
        config.merge(overrides);
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

pub fn parse_rename(value: &str) -> Result<(String, String), String> {
    let (old, new) = value
        .split_once('=')
        .ok_or_else(|| format!("Rename '{value}' must look like old=new"))?;
    let (old, new) = (old.trim(), new.trim());
    if old.is_empty() || new.is_empty() {
        return Err(format!("Rename '{value}' needs both an old and a new name"));
    }
    Ok((old.to_string(), new.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_literal_delimiters() {
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert_eq!(parse_delimiter("semicolon"), Ok(b';'));
        assert_eq!(parse_delimiter(":"), Ok(b':'));
        assert!(parse_delimiter("::").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn parses_rename_pairs() {
        assert_eq!(
            parse_rename("sales = revenue"),
            Ok(("sales".to_string(), "revenue".to_string()))
        );
        assert!(parse_rename("sales").is_err());
        assert!(parse_rename("=revenue").is_err());
    }

    #[test]
    fn output_format_follows_extension() {
        assert_eq!(OutputFormat::from_path(Path::new("out.parquet")), OutputFormat::Parquet);
        assert_eq!(OutputFormat::from_path(Path::new("out.DuckDB")), OutputFormat::Duckdb);
        assert_eq!(OutputFormat::from_path(Path::new("out.tsv")), OutputFormat::Csv);
    }

    #[test]
    fn command_line_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
