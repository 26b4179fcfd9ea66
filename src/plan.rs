//! Rename/select planning.
//!
//! The plan pairs a per-file rename map with a single target column list. Each
//! file's map is the caller's rename map minus entries that would make two of
//! that file's columns share a name, and minus entries for columns the file does
//! not have. The target list comes from the caller's selection (explicit, common,
//! or all columns), passed through the rename map and de-duplicated.

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use indexmap::IndexMap;
use itertools::Itertools;
use log::warn;
use serde::Serialize;

use crate::{
    catalog::ColumnCatalog,
    chunk::Projection,
    error::{NamingConflict, StackError},
    io_utils,
};

pub type RenameMap = IndexMap<String, String>;

/// Which columns end up in the combined output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum ColumnSelection {
    #[default]
    All,
    Common,
    Explicit(Vec<String>),
}

impl ColumnSelection {
    pub fn explicit<I, S>(columns: I) -> Result<Self, StackError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selection = ColumnSelection::Explicit(columns.into_iter().map(Into::into).collect());
        selection.validate()?;
        Ok(selection)
    }

    /// Rejects an explicit list naming the same column twice.
    pub fn validate(&self) -> Result<(), StackError> {
        if let ColumnSelection::Explicit(columns) = self
            && let Some(column) = columns.iter().duplicates().next()
        {
            return Err(StackError::DuplicateColumnSelection {
                column: column.clone(),
            });
        }
        Ok(())
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, ColumnSelection::Explicit(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRename {
    pub path: PathBuf,
    pub mapping: RenameMap,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    renames: Vec<FileRename>,
    target: Vec<String>,
    conflicts: Vec<NamingConflict>,
}

impl ReconciliationPlan {
    pub fn build(
        catalog: &ColumnCatalog,
        rename: &RenameMap,
        selection: &ColumnSelection,
    ) -> Result<Self, StackError> {
        selection.validate()?;
        let mut renames = Vec::with_capacity(catalog.files().len());
        let mut conflicts = Vec::new();
        for file in catalog.files() {
            let (mapping, dropped) = safe_renames(&file.columns, rename);
            if !dropped.is_empty() {
                let conflict = NamingConflict {
                    path: file.path.clone(),
                    dropped,
                };
                warn!("{conflict}");
                conflicts.push(conflict);
            }
            renames.push(FileRename {
                path: file.path.clone(),
                mapping,
            });
        }
        let target = target_columns(catalog, rename, selection);
        Ok(Self {
            renames,
            target,
            conflicts,
        })
    }

    /// Columns every chunk is reindexed to, in output order.
    pub fn target(&self) -> &[String] {
        &self.target
    }

    pub fn renames(&self) -> &[FileRename] {
        &self.renames
    }

    pub fn rename_for(&self, path: &Path) -> Option<&RenameMap> {
        self.renames
            .iter()
            .find(|file| file.path == path)
            .map(|file| &file.mapping)
    }

    pub fn conflicts(&self) -> &[NamingConflict] {
        &self.conflicts
    }

    /// Projection for a file whose header is `headers`.
    pub fn projection(&self, path: &Path, headers: &[String]) -> Projection {
        let empty = RenameMap::new();
        let rename = self.rename_for(path).unwrap_or(&empty);
        Projection::new(headers, rename, &self.target)
    }

    /// File × renamed-column table showing each file's new names, for display.
    pub fn rename_table(&self) -> (Vec<String>, Vec<Vec<String>>) {
        let sources = self
            .renames
            .iter()
            .flat_map(|file| file.mapping.keys())
            .unique()
            .cloned()
            .collect::<Vec<_>>();
        let mut headers = vec!["filename".to_string()];
        headers.extend(sources.iter().cloned());
        let rows = self
            .renames
            .iter()
            .map(|file| {
                let mut row = vec![io_utils::file_name(&file.path)];
                row.extend(
                    sources
                        .iter()
                        .map(|source| file.mapping.get(source).cloned().unwrap_or_default()),
                );
                row
            })
            .collect();
        (headers, rows)
    }
}

/// Applies `rename` to one file's columns, dropping entries that would collide.
///
/// Returns the effective mapping, limited to columns the file has, and the
/// dropped `(old, new)` pairs. Dropping an entry restores the original name,
/// which can expose a new collision, so the check repeats until stable.
pub fn safe_renames(columns: &[String], rename: &RenameMap) -> (RenameMap, Vec<(String, String)>) {
    let present = columns.iter().map(String::as_str).collect::<HashSet<_>>();
    let mut mapping = rename
        .iter()
        .filter(|(old, _)| present.contains(old.as_str()))
        .map(|(old, new)| (old.clone(), new.clone()))
        .collect::<RenameMap>();
    let mut dropped = Vec::new();

    loop {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for column in columns {
            let name = mapping.get(column).unwrap_or(column);
            *counts.entry(name.as_str()).or_insert(0) += 1;
        }
        let offending = mapping
            .iter()
            .filter(|(old, new)| old != new && counts.get(new.as_str()).copied().unwrap_or(0) > 1)
            .map(|(old, new)| (old.clone(), new.clone()))
            .collect::<Vec<_>>();
        if offending.is_empty() {
            break;
        }
        for (old, new) in offending {
            mapping.shift_remove(&old);
            dropped.push((old, new));
        }
    }

    (mapping, dropped)
}

/// The single target column list shared by every file.
pub fn target_columns(
    catalog: &ColumnCatalog,
    rename: &RenameMap,
    selection: &ColumnSelection,
) -> Vec<String> {
    let start: &[String] = match selection {
        ColumnSelection::Explicit(columns) => columns,
        ColumnSelection::Common => catalog.columns_common(),
        ColumnSelection::All => catalog.columns_all(),
    };
    start
        .iter()
        .map(|column| rename.get(column).unwrap_or(column).clone())
        .unique()
        .collect()
}
