//! Error taxonomy for sniffing, reconciliation, and combining.
//!
//! Fatal conditions are [`StackError`] variants, usually wrapped in an
//! `anyhow::Error` carrying file-level context. Rename collisions are not
//! fatal: they surface as [`NamingConflict`] records on the reconciliation plan.

use std::{fmt, path::PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::sniffer::SniffProperty;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("At least one input file must be provided")]
    EmptyInput,
    #[error(
        "Could not determine a delimiter for {path:?}; no sampled line uses one of {candidates}"
    )]
    DelimiterNotFound { path: PathBuf, candidates: String },
    #[error("Inconsistent {property} detected ({details}). Make sure all files have the same format")]
    InconsistentFormat {
        property: SniffProperty,
        details: String,
    },
    #[error("Duplicate entries in column selection: '{column}'")]
    DuplicateColumnSelection { column: String },
    #[error("Column '{column}' is reserved for source tagging; disable the tag or pick another name")]
    ReservedColumn { column: String },
    #[error("{operation} requires an explicit column selection")]
    MissingSelection { operation: &'static str },
    #[error("Delimiters in {path:?} disagree but no sampled line differs from the chosen one")]
    SkipRowsInvariant { path: PathBuf },
    #[error("Chunk from {path:?} has columns {found:?}, expected {expected:?}")]
    ChunkLayoutChanged {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
    #[error("Table '{table}' already exists")]
    TableExists { table: String },
}

/// Rename entries dropped for one file because they would collapse two of its
/// columns onto the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamingConflict {
    pub path: PathBuf,
    pub dropped: Vec<(String, String)>,
}

impl fmt::Display for NamingConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs = self
            .dropped
            .iter()
            .map(|(old, new)| format!("'{old}' -> '{new}'"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "Renaming in {:?} would create duplicate column names; ignoring {pairs}",
            self.path
        )
    }
}
