//! I/O utilities for reading and writing delimited text.
//!
//! Every file touched by csv-stack flows through this module:
//!
//! - **Encoding**: input decoding via `encoding_rs`, defaulting to UTF-8.
//! - **Sampling**: line counting and raw line sampling for the sniffer.
//! - **Reader construction**: CSV readers that skip leading banner lines before
//!   handing the stream to the `csv` parser.
//! - **Writer construction**: buffered CSV writers that create missing parent
//!   directories.

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;

use crate::sniffer::Dialect;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const COUNT_BUFFER_SIZE: usize = 64 * 1024;

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>, fallback: u8) -> u8 {
    if let Some(delim) = provided {
        return delim;
    }
    if let Some(path) = path {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("tsv") => return DEFAULT_TSV_DELIMITER,
            Some(ext) if ext.eq_ignore_ascii_case("csv") => return DEFAULT_CSV_DELIMITER,
            _ => {}
        }
    }
    fallback
}

/// Counts the lines in a file, including a final line without a terminator.
pub fn count_lines(path: &Path) -> Result<usize> {
    let mut file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut buffer = vec![0u8; COUNT_BUFFER_SIZE];
    let mut lines = 0usize;
    let mut last = None;
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("Counting lines in {path:?}"))?;
        if read == 0 {
            break;
        }
        lines += buffer[..read].iter().filter(|byte| **byte == b'\n').count();
        last = Some(buffer[read - 1]);
    }
    if matches!(last, Some(byte) if byte != b'\n') {
        lines += 1;
    }
    Ok(lines)
}

/// Reads up to `limit` decoded lines with trailing whitespace removed.
pub fn read_lines(path: &Path, limit: usize, encoding: &'static Encoding) -> Result<Vec<String>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .build(file);
    let mut lines = Vec::with_capacity(limit);
    for line in BufReader::new(decoder).lines().take(limit) {
        let line = line.with_context(|| format!("Reading line {} of {path:?}", lines.len() + 1))?;
        lines.push(line.trim_end().to_string());
    }
    Ok(lines)
}

/// Consumes up to `count` raw lines and returns how many were skipped.
pub fn skip_lines<R: BufRead>(reader: &mut R, count: usize) -> io::Result<usize> {
    let mut scratch = Vec::new();
    for skipped in 0..count {
        scratch.clear();
        if reader.read_until(b'\n', &mut scratch)? == 0 {
            return Ok(skipped);
        }
    }
    Ok(count)
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8, has_headers: bool) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, dialect: &Dialect) -> Result<csv::Reader<Box<dyn Read>>> {
    let mut reader =
        BufReader::new(File::open(path).with_context(|| format!("Opening input file {path:?}"))?);
    skip_lines(&mut reader, dialect.skip_rows)
        .with_context(|| format!("Skipping {} leading row(s) of {path:?}", dialect.skip_rows))?;
    let boxed: Box<dyn Read> = Box::new(reader);
    Ok(open_csv_reader(boxed, dialect.delimiter, dialect.has_header))
}

pub fn open_csv_writer(path: &Path, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    ensure_parent_dir(path)?;
    let writer: Box<dyn Write> = Box::new(BufWriter::new(
        File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
    ));
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Creating output directory {parent:?}"))?;
    }
    Ok(())
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}

/// Final path component, used for the `filename` tag column and output names.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
