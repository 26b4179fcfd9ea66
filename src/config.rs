//! YAML configuration for combine runs.
//!
//! Every key is optional. Values given on the command line are layered on top
//! of the file with [`CombineConfig::merge`] before the result is turned into
//! [`CombineOptions`].

use std::{fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    cli::parse_delimiter,
    combine::CombineOptions,
    io_utils,
    plan::{ColumnSelection, RenameMap},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CombineConfig {
    pub sep: Option<String>,
    pub has_header: Option<bool>,
    pub skip_rows: Option<usize>,
    pub preview_rows: Option<usize>,
    pub sniff_lines: Option<usize>,
    pub delimiters: Option<String>,
    pub columns_select: Option<Vec<String>>,
    pub columns_select_common: bool,
    pub columns_rename: RenameMap,
    pub add_filename: Option<bool>,
    pub add_filepath: Option<bool>,
    pub chunk_size: Option<usize>,
    pub encoding: Option<String>,
}

impl CombineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader).with_context(|| format!("Parsing config YAML {path:?}"))
    }

    pub fn from_yaml_str(input: &str) -> Result<Self> {
        serde_yaml::from_str(input).context("Parsing config YAML")
    }

    /// Layers `overrides` on top of `self`. Set values win; rename entries are
    /// added to the existing map; a selection in `overrides` replaces ours.
    pub fn merge(&mut self, overrides: CombineConfig) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.sep, overrides.sep);
        take(&mut self.has_header, overrides.has_header);
        take(&mut self.skip_rows, overrides.skip_rows);
        take(&mut self.preview_rows, overrides.preview_rows);
        take(&mut self.sniff_lines, overrides.sniff_lines);
        take(&mut self.delimiters, overrides.delimiters);
        take(&mut self.add_filename, overrides.add_filename);
        take(&mut self.add_filepath, overrides.add_filepath);
        take(&mut self.chunk_size, overrides.chunk_size);
        take(&mut self.encoding, overrides.encoding);
        if overrides.columns_select.is_some() || overrides.columns_select_common {
            self.columns_select = overrides.columns_select;
            self.columns_select_common = overrides.columns_select_common;
        }
        self.columns_rename.extend(overrides.columns_rename);
    }

    pub fn selection(&self) -> Result<ColumnSelection> {
        match (&self.columns_select, self.columns_select_common) {
            (Some(_), true) => {
                bail!("columns_select and columns_select_common cannot be used together")
            }
            (Some(columns), false) => Ok(ColumnSelection::explicit(columns.iter().cloned())?),
            (None, true) => Ok(ColumnSelection::Common),
            (None, false) => Ok(ColumnSelection::All),
        }
    }

    pub fn into_options(self) -> Result<CombineOptions> {
        let mut options = CombineOptions::default();
        options.selection = self.selection()?;
        if let Some(sep) = &self.sep {
            options.delimiter = Some(parse_delimiter(sep).map_err(|err| anyhow!("sep: {err}"))?);
        }
        options.has_header = self.has_header;
        options.skip_rows = self.skip_rows;
        options.encoding = io_utils::resolve_encoding(self.encoding.as_deref())?;
        options.sniff.encoding = options.encoding;
        if let Some(rows) = self.preview_rows {
            options.preview_rows = rows;
        }
        if let Some(lines) = self.sniff_lines {
            options.sniff.sample_lines = lines;
        }
        if let Some(candidates) = &self.delimiters {
            options.sniff.candidates = parse_candidates(candidates)?;
        }
        options.rename = self.columns_rename;
        if let Some(add) = self.add_filename {
            options.add_filename = add;
        }
        if let Some(add) = self.add_filepath {
            options.add_filepath = add;
        }
        if let Some(size) = self.chunk_size {
            if size == 0 {
                bail!("chunk_size must be greater than zero");
            }
            options.chunk_size = size;
        }
        Ok(options)
    }
}

/// Candidate delimiters given as one string, e.g. `",;|"`.
pub fn parse_candidates(value: &str) -> Result<Vec<u8>> {
    if value.is_empty() {
        bail!("At least one candidate delimiter is required");
    }
    if !value.is_ascii() {
        bail!("Candidate delimiters must be ASCII, got {value:?}");
    }
    Ok(value.bytes().unique().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_keys_map_onto_options() {
        let config = CombineConfig::from_yaml_str(
            r#"
sep: ";"
has_header: true
skip_rows: 2
columns_select: [date, sales]
columns_rename:
  revenue: sales
add_filepath: false
chunk_size: 500
"#,
        )
        .expect("parse config");
        let options = config.into_options().expect("options");
        assert_eq!(options.delimiter, Some(b';'));
        assert_eq!(options.skip_rows, Some(2));
        assert_eq!(
            options.selection,
            ColumnSelection::Explicit(vec!["date".into(), "sales".into()])
        );
        assert_eq!(options.rename.get("revenue").map(String::as_str), Some("sales"));
        assert!(options.add_filename);
        assert!(!options.add_filepath);
        assert_eq!(options.chunk_size, 500);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(CombineConfig::from_yaml_str("seperator: ','").is_err());
    }

    #[test]
    fn select_and_common_conflict() {
        let config = CombineConfig {
            columns_select: Some(vec!["date".into()]),
            columns_select_common: true,
            ..CombineConfig::default()
        };
        assert!(config.into_options().is_err());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut config = CombineConfig {
            sep: Some(",".into()),
            columns_select_common: true,
            ..CombineConfig::default()
        };
        config.merge(CombineConfig {
            sep: Some("tab".into()),
            columns_select: Some(vec!["date".into()]),
            ..CombineConfig::default()
        });
        assert_eq!(config.sep.as_deref(), Some("tab"));
        assert!(!config.columns_select_common);
        let options = config.into_options().expect("options");
        assert_eq!(options.delimiter, Some(b'\t'));
    }

    #[test]
    fn candidate_string_is_split_into_bytes() {
        assert_eq!(parse_candidates(",;").unwrap(), vec![b',', b';']);
        assert!(parse_candidates("").is_err());
    }
}
