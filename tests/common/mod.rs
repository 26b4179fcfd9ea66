#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const MONTHS: [&str; 3] = ["jan", "feb", "mar"];

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Three monthly sales files with identical `date,sales,cost,profit` columns.
    pub fn write_clean(&self) -> Vec<PathBuf> {
        MONTHS
            .iter()
            .enumerate()
            .map(|(idx, month)| {
                self.write(
                    &format!("sales-clean-{month}.csv"),
                    &sales_csv(idx + 1, b',', false),
                )
            })
            .collect()
    }

    /// Like [`write_clean`](Self::write_clean), but March carries an extra `profit2` column.
    pub fn write_colmismatch(&self) -> Vec<PathBuf> {
        MONTHS
            .iter()
            .enumerate()
            .map(|(idx, month)| {
                self.write(
                    &format!("sales-colmismatch-{month}.csv"),
                    &sales_csv(idx + 1, b',', *month == "mar"),
                )
            })
            .collect()
    }
}

/// Ten rows of sales data for `month` (1-based).
pub fn sales_csv(month: usize, delimiter: u8, with_profit2: bool) -> String {
    let sep = delimiter as char;
    let mut out = format!("date{sep}sales{sep}cost{sep}profit");
    if with_profit2 {
        out.push_str(&format!("{sep}profit2"));
    }
    out.push('\n');
    for day in 1..=10 {
        out.push_str(&format!("2011-{month:02}-{day:02}{sep}200{sep}-80{sep}120"));
        if with_profit2 {
            out.push_str(&format!("{sep}240"));
        }
        out.push('\n');
    }
    out
}

pub fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
