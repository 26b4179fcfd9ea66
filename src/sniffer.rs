//! CSV dialect sniffing.
//!
//! A [`CsvSniffer`] samples the first lines of one file and infers the field
//! delimiter, the number of leading banner rows to skip, and whether a header
//! row is present. [`sniff_files`] runs the sniffer over a list of files and
//! insists that every file agrees on each property, since the combiner reads
//! all inputs with a single dialect.
//!
//! Delimiters are detected line by line. Lines that do not use any candidate
//! delimiter vote "unknown"; the most common known vote wins. When the votes
//! disagree, the disagreement is assumed to come from leading banner rows, so
//! everything up to the last disagreeing line is skipped.
//!
//! A delimiter or skip count the caller already knows is fixed in
//! [`SniffOptions`]; the remaining properties are inferred against it.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{error::StackError, io_utils, printable_delimiter};

pub const DEFAULT_SAMPLE_LINES: usize = 10;
pub const DEFAULT_CANDIDATE_DELIMITERS: &str = ",;\t|";

/// Tie-break order when a line contains several candidate delimiters.
const PREFERRED_DELIMITERS: &[u8] = b",\t; :";

/// How to parse every input file: field separator, header flag, banner rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialect {
    pub delimiter: u8,
    pub has_header: bool,
    pub skip_rows: usize,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: io_utils::DEFAULT_CSV_DELIMITER,
            has_header: true,
            skip_rows: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SniffOptions {
    pub sample_lines: usize,
    pub candidates: Vec<u8>,
    pub encoding: &'static Encoding,
    /// Known delimiter. Votes, banner rows and the header are judged against it.
    pub delimiter: Option<u8>,
    /// Known banner row count. The header is judged on the rows after it.
    pub skip_rows: Option<usize>,
}

impl Default for SniffOptions {
    fn default() -> Self {
        Self {
            sample_lines: DEFAULT_SAMPLE_LINES,
            candidates: DEFAULT_CANDIDATE_DELIMITERS.as_bytes().to_vec(),
            encoding: UTF_8,
            delimiter: None,
            skip_rows: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    High,
    Probable,
}

impl fmt::Display for Certainty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Certainty::High => f.write_str("high"),
            Certainty::Probable => f.write_str("probable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SniffResult {
    pub path: PathBuf,
    pub delimiter: u8,
    pub delimiter_is_consistent: bool,
    pub has_header: bool,
    pub skip_rows: usize,
    pub certainty: Certainty,
}

impl Dialect {
    pub fn apply(&mut self, value: PropertyValue) {
        match value {
            PropertyValue::Delimiter(d) => self.delimiter = d,
            PropertyValue::SkipRows(n) => self.skip_rows = n,
            PropertyValue::HasHeader(h) => self.has_header = h,
        }
    }
}

impl SniffResult {
    pub fn dialect(&self) -> Dialect {
        Dialect {
            delimiter: self.delimiter,
            has_header: self.has_header,
            skip_rows: self.skip_rows,
        }
    }
}

/// Single-file sniffer holding the sampled lines, their delimiter votes and
/// the layout derived from them.
#[derive(Debug, Clone)]
pub struct CsvSniffer {
    path: PathBuf,
    lines: Vec<String>,
    votes: Vec<Option<u8>>,
    delimiter: u8,
    delimiter_is_consistent: bool,
    skip_rows: usize,
}

impl CsvSniffer {
    pub fn open(path: &Path, options: &SniffOptions) -> Result<Self> {
        let total = io_utils::count_lines(path)?;
        let sample = options.sample_lines.min(total);
        let lines = io_utils::read_lines(path, sample, options.encoding)?;
        Ok(Self::from_lines(path, lines, options)?)
    }

    pub fn from_lines(
        path: &Path,
        lines: Vec<String>,
        options: &SniffOptions,
    ) -> Result<Self, StackError> {
        let candidates = match options.delimiter {
            Some(delimiter) => vec![delimiter],
            None => options.candidates.clone(),
        };
        let votes = lines
            .iter()
            .map(|line| detect_line_delimiter(line, &candidates))
            .collect::<Vec<_>>();
        debug!(
            "Delimiter votes for {:?}: {:?}",
            path,
            votes
                .iter()
                .map(|vote| vote.map(printable_delimiter))
                .collect::<Vec<_>>()
        );

        let (delimiter, delimiter_is_consistent) = match options.delimiter {
            // No line holding the known delimiter means a single-column file.
            Some(delimiter) => (
                delimiter,
                votes.iter().all(Option::is_some) || votes.iter().all(Option::is_none),
            ),
            None => {
                let delimiter =
                    majority_vote(&votes).ok_or_else(|| StackError::DelimiterNotFound {
                        path: path.to_path_buf(),
                        candidates: candidates
                            .iter()
                            .map(|c| format!("'{}'", printable_delimiter(*c)))
                            .collect::<Vec<_>>()
                            .join(" "),
                    })?;
                (delimiter, votes.iter().all(|vote| *vote == Some(delimiter)))
            }
        };

        let skip_rows = match options.skip_rows {
            Some(skip_rows) => skip_rows,
            None if delimiter_is_consistent => 0,
            None => votes
                .iter()
                .rposition(|vote| *vote != Some(delimiter))
                .map(|idx| idx + 1)
                .ok_or_else(|| StackError::SkipRowsInvariant {
                    path: path.to_path_buf(),
                })?,
        };

        Ok(Self {
            path: path.to_path_buf(),
            lines,
            votes,
            delimiter,
            delimiter_is_consistent,
            skip_rows,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line_votes(&self) -> &[Option<u8>] {
        &self.votes
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Whether every sampled line voted for the chosen delimiter.
    pub fn delimiter_is_consistent(&self) -> bool {
        self.delimiter_is_consistent
    }

    pub fn skip_rows(&self) -> usize {
        self.skip_rows
    }

    /// Sampled rows after the skipped banner, split on the chosen delimiter.
    fn data_rows(&self) -> Vec<Vec<&str>> {
        let separator = self.delimiter as char;
        self.lines
            .iter()
            .skip(self.skip_rows)
            .map(|line| line.split(separator).collect())
            .collect()
    }

    pub fn has_header(&self) -> bool {
        header_present(&self.data_rows())
    }

    pub fn certainty(&self) -> Certainty {
        certainty_of(&self.data_rows())
    }

    pub fn result(&self) -> SniffResult {
        let rows = self.data_rows();
        SniffResult {
            path: self.path.clone(),
            delimiter: self.delimiter,
            delimiter_is_consistent: self.delimiter_is_consistent,
            has_header: header_present(&rows),
            skip_rows: self.skip_rows,
            certainty: certainty_of(&rows),
        }
    }
}

/// Headers are assumed present unless every sampled row holds a number.
fn header_present(rows: &[Vec<&str>]) -> bool {
    !rows
        .iter()
        .all(|row| row.iter().any(|field| is_number(field)))
}

fn certainty_of(rows: &[Vec<&str>]) -> Certainty {
    if rows.windows(2).all(|pair| pair[0].len() == pair[1].len()) {
        Certainty::High
    } else {
        Certainty::Probable
    }
}

/// Most common known vote; ties go to the delimiter seen first.
fn majority_vote(votes: &[Option<u8>]) -> Option<u8> {
    let mut tally: Vec<(u8, usize)> = Vec::new();
    for vote in votes.iter().flatten() {
        match tally.iter_mut().find(|(delim, _)| delim == vote) {
            Some((_, count)) => *count += 1,
            None => tally.push((*vote, 1)),
        }
    }
    let mut best: Option<(u8, usize)> = None;
    for (delim, count) in tally {
        if best.is_none_or(|(_, top)| count > top) {
            best = Some((delim, count));
        }
    }
    best.map(|(delim, _)| delim)
}

fn is_number(field: &str) -> bool {
    field.trim().parse::<f64>().is_ok()
}

/// Guesses the delimiter of a single line, restricted to `candidates`.
///
/// A candidate that directly follows a closing quote is taken first. Otherwise
/// candidates are counted outside quoted sections; a single hit wins, several
/// hits fall back to the preferred order, then to the highest count.
pub fn detect_line_delimiter(line: &str, candidates: &[u8]) -> Option<u8> {
    let mut counts = vec![0usize; candidates.len()];
    let mut after_quote = vec![0usize; candidates.len()];
    let mut in_quotes = false;
    let mut just_closed = false;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
            just_closed = !in_quotes;
            continue;
        }
        if !in_quotes && let Some(idx) = candidates.iter().position(|c| *c == byte) {
            counts[idx] += 1;
            if just_closed {
                after_quote[idx] += 1;
            }
        }
        just_closed = false;
    }

    if let Some(idx) = pick_max(&after_quote) {
        return Some(candidates[idx]);
    }

    let present = candidates
        .iter()
        .zip(&counts)
        .filter(|(_, count)| **count > 0)
        .map(|(c, _)| *c)
        .collect::<Vec<_>>();
    match present.as_slice() {
        [] => None,
        [only] => Some(*only),
        _ => PREFERRED_DELIMITERS
            .iter()
            .copied()
            .find(|preferred| present.contains(preferred))
            .or_else(|| pick_max(&counts).map(|idx| candidates[idx])),
    }
}

fn pick_max(counts: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, count) in counts.iter().enumerate() {
        if *count > 0 && best.is_none_or(|(_, top)| *count > top) {
            best = Some((idx, *count));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Properties that every input file must agree on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffProperty {
    Delimiter,
    SkipRows,
    HasHeader,
}

impl SniffProperty {
    pub const ALL: [SniffProperty; 3] = [
        SniffProperty::Delimiter,
        SniffProperty::SkipRows,
        SniffProperty::HasHeader,
    ];

    fn value_of(self, result: &SniffResult) -> PropertyValue {
        match self {
            SniffProperty::Delimiter => PropertyValue::Delimiter(result.delimiter),
            SniffProperty::SkipRows => PropertyValue::SkipRows(result.skip_rows),
            SniffProperty::HasHeader => PropertyValue::HasHeader(result.has_header),
        }
    }
}

impl fmt::Display for SniffProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SniffProperty::Delimiter => f.write_str("delimiters"),
            SniffProperty::SkipRows => f.write_str("skip rows"),
            SniffProperty::HasHeader => f.write_str("header setting"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyValue {
    Delimiter(u8),
    SkipRows(usize),
    HasHeader(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Delimiter(d) => write!(f, "'{}'", printable_delimiter(*d)),
            PropertyValue::SkipRows(n) => write!(f, "{n}"),
            PropertyValue::HasHeader(h) => write!(f, "{h}"),
        }
    }
}

/// Sniff results for a list of files that share one dialect.
#[derive(Debug, Clone)]
pub struct SniffedFiles {
    results: Vec<SniffResult>,
}

impl SniffedFiles {
    pub fn results(&self) -> &[SniffResult] {
        &self.results
    }

    /// The value every file agrees on, or an error naming the disagreeing files.
    pub fn consistent(&self, property: SniffProperty) -> Result<PropertyValue, StackError> {
        let first = self
            .results
            .first()
            .map(|result| property.value_of(result))
            .ok_or(StackError::EmptyInput)?;
        if self
            .results
            .iter()
            .all(|result| property.value_of(result) == first)
        {
            return Ok(first);
        }
        let details = self
            .results
            .iter()
            .map(|result| {
                format!(
                    "{}={}",
                    io_utils::file_name(&result.path),
                    property.value_of(result)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        Err(StackError::InconsistentFormat { property, details })
    }

    pub fn dialect(&self) -> Result<Dialect, StackError> {
        self.dialect_with(None, None, None)
    }

    /// Agreed dialect where caller-supplied values replace the sniffed ones.
    /// Overridden properties are not checked for consistency.
    pub fn dialect_with(
        &self,
        delimiter: Option<u8>,
        has_header: Option<bool>,
        skip_rows: Option<usize>,
    ) -> Result<Dialect, StackError> {
        let mut dialect = Dialect::default();
        for property in SniffProperty::ALL {
            let supplied = match property {
                SniffProperty::Delimiter => delimiter.map(PropertyValue::Delimiter),
                SniffProperty::SkipRows => skip_rows.map(PropertyValue::SkipRows),
                SniffProperty::HasHeader => has_header.map(PropertyValue::HasHeader),
            };
            let value = match supplied {
                Some(value) => value,
                None => self.consistent(property)?,
            };
            dialect.apply(value);
        }
        Ok(dialect)
    }
}

pub fn sniff_file(path: &Path, options: &SniffOptions) -> Result<SniffResult> {
    let sniffer = CsvSniffer::open(path, options)?;
    Ok(sniffer.result())
}

pub fn sniff_files(paths: &[PathBuf], options: &SniffOptions) -> Result<SniffedFiles> {
    if paths.is_empty() {
        return Err(StackError::EmptyInput.into());
    }
    let results = paths
        .iter()
        .map(|path| {
            sniff_file(path, options).with_context(|| format!("Sniffing CSV settings of {path:?}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SniffedFiles { results })
}
