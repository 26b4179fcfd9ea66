use std::{
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use clap::ValueEnum;
use duckdb::{Connection, ToSql, params};
use log::info;
use pg_escape::quote_identifier;
use serde::Deserialize;

use super::{ChunkSink, Layout, SinkResult};
use crate::{chunk::Chunk, error::StackError, io_utils};

/// What to do when the destination table already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[value(rename_all = "kebab-case")]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    #[default]
    Fail,
    Replace,
    Append,
}

impl fmt::Display for IfExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IfExists::Fail => f.write_str("fail"),
            IfExists::Replace => f.write_str("replace"),
            IfExists::Append => f.write_str("append"),
        }
    }
}

/// Bulk loads chunks into a DuckDB table whose columns are all `VARCHAR`.
pub struct DuckDbSink {
    path: PathBuf,
    table: String,
    if_exists: IfExists,
    layout: Layout,
    conn: Option<Connection>,
    table_ready: bool,
    rows_written: u64,
}

impl DuckDbSink {
    pub fn create(
        path: &Path,
        table: &str,
        if_exists: IfExists,
        columns: Vec<String>,
    ) -> Result<Self> {
        io_utils::ensure_parent_dir(path)?;
        let conn = Connection::open(path)
            .with_context(|| format!("Opening DuckDB database {path:?}"))?;
        Ok(Self {
            path: path.to_path_buf(),
            table: table.to_string(),
            if_exists,
            layout: Layout::new(columns),
            conn: Some(conn),
            table_ready: false,
            rows_written: 0,
        })
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| anyhow!("Connection to {:?} already closed", self.path))
    }

    fn table_exists(&self) -> Result<bool> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
            params![self.table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn prepare_table(&mut self) -> Result<()> {
        let exists = self.table_exists()?;
        let quoted = quote_identifier(&self.table);
        match (self.if_exists, exists) {
            (IfExists::Fail, true) => {
                return Err(StackError::TableExists {
                    table: self.table.clone(),
                }
                .into());
            }
            (IfExists::Append, true) => {}
            (IfExists::Replace, true) => {
                info!("Replacing table {} in {:?}", self.table, self.path);
                self.conn()?
                    .execute(&format!("DROP TABLE {quoted}"), [])?;
                self.create_table()?;
            }
            (_, false) => self.create_table()?,
        }
        self.table_ready = true;
        Ok(())
    }

    fn create_table(&self) -> Result<()> {
        let columns = self
            .layout
            .columns()
            .iter()
            .map(|column| format!("{} VARCHAR", quote_identifier(column)))
            .collect::<Vec<_>>();
        let sql = format!(
            "CREATE TABLE {} ({})",
            quote_identifier(&self.table),
            columns.join(", ")
        );
        self.conn()?
            .execute(&sql, [])
            .with_context(|| format!("Creating table {} in {:?}", self.table, self.path))?;
        Ok(())
    }
}

impl ChunkSink for DuckDbSink {
    fn write_chunk(&mut self, chunk: &Chunk, source: &Path) -> Result<()> {
        self.layout.check(chunk, source)?;
        if !self.table_ready {
            self.prepare_table()?;
        }
        {
            let conn = self.conn()?;
            let mut appender = conn.appender(&self.table)?;
            for row in &chunk.rows {
                let values = row.iter().map(|value| value as &dyn ToSql).collect::<Vec<_>>();
                appender
                    .append_row(values.as_slice())
                    .with_context(|| format!("Loading rows from {source:?} into {}", self.table))?;
            }
            appender.flush()?;
        }
        self.rows_written += chunk.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> Result<SinkResult> {
        if !self.table_ready {
            self.prepare_table()?;
        }
        self.conn
            .take()
            .ok_or_else(|| anyhow!("Connection to {:?} already closed", self.path))?
            .close()
            .map_err(|e| anyhow!("Failed to close connection: {:?}", e.1))?;
        Ok(SinkResult {
            files_written: vec![self.path.clone()],
            rows_written: self.rows_written,
        })
    }
}
