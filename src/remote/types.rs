//! Types shared by the runner CLI and the query endpoint.

use crate::migration::MigrationDirection;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Error types for calls that leave the process.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0} is not installed or not on PATH")]
    MissingTool(String),

    #[error("Query endpoint returned {status}: {body}")]
    QueryRejected { status: u16, body: String },

    #[error("Unexpected query result: {0}")]
    MalformedResult(String),

    #[error("Could not read migration status: {0}")]
    MalformedStatus(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Received {status} status from {url}: {body}")]
    RequestRejected {
        url: String,
        status: u16,
        body: String,
    },
}

/// Whether the runner has a record of a step in one of its status columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    NotPresent,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Present => write!(f, "Present"),
            Presence::NotPresent => write!(f, "Not Present"),
        }
    }
}

/// One step as the runner reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatusRow {
    pub id: u32,
    pub name: String,
    /// Files for the step are present in the project the runner was given.
    pub source: Presence,
    /// The step is recorded as applied in the database.
    pub database: Presence,
}

impl RemoteStatusRow {
    /// Folder-style key, `{id}_{name}`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.id, self.name)
    }

    pub fn is_applied(&self) -> bool {
        self.database == Presence::Present
    }
}

/// Parsed `migrate status` output, ascending by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusTable {
    pub rows: Vec<RemoteStatusRow>,
}

impl StatusTable {
    pub fn row(&self, id: u32) -> Option<&RemoteStatusRow> {
        self.rows
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|idx| &self.rows[idx])
    }

    /// Render the whole table.
    pub fn render(&self) -> String {
        render_rows(self.rows.iter())
    }
}

/// Render a header plus the given rows, column-aligned.
pub fn render_rows<'a>(rows: impl Iterator<Item = &'a RemoteStatusRow> + Clone) -> String {
    let name_width = rows
        .clone()
        .map(|r| r.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = format!(
        "{:<10}{:<name_width$}  {:<16}{}\n",
        "VERSION", "NAME", "SOURCE STATUS", "DATABASE STATUS"
    );
    for row in rows {
        out.push_str(&format!(
            "{:<10}{:<name_width$}  {:<16}{}\n",
            row.id,
            row.name,
            row.source.to_string(),
            row.database
        ));
    }
    out
}

/// The external migration runner.
///
/// Every operation returns the runner's exit code; 0 means success and there
/// is no partial success.
#[async_trait]
pub trait MigrationRunner: Send + Sync {
    /// Current status of every step the runner knows about.
    async fn status(&self) -> Result<StatusTable, RemoteError>;

    /// Run (or preview, with `dry_run`) a single step.
    async fn apply_step(
        &self,
        id: u32,
        direction: MigrationDirection,
        dry_run: bool,
    ) -> Result<i32, RemoteError>;

    /// Record a step as applied without executing it.
    async fn mark_applied(&self, id: u32) -> Result<i32, RemoteError>;

    /// Revert the newest `count` applied steps in one call.
    async fn revert_down(&self, count: u32, dry_run: bool) -> Result<i32, RemoteError>;

    async fn metadata_apply(&self) -> Result<i32, RemoteError>;

    async fn metadata_reload(&self) -> Result<i32, RemoteError>;
}

/// The database's SQL endpoint.
#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Run a statement and return every result row, header row included.
    /// Statements without a result set return no rows.
    async fn run_sql(&self, sql: &str, read_only: bool) -> Result<Vec<Vec<String>>, RemoteError>;
}

/// Drop the header row after checking its first column name.
pub fn strip_header(
    mut rows: Vec<Vec<String>>,
    expected_first_column: &str,
) -> Result<Vec<Vec<String>>, RemoteError> {
    if rows.is_empty() {
        return Err(RemoteError::MalformedResult(format!(
            "expected a header row starting with '{}', got an empty result",
            expected_first_column
        )));
    }

    let header = rows.remove(0);
    match header.first() {
        Some(first) if first == expected_first_column => Ok(rows),
        other => Err(RemoteError::MalformedResult(format!(
            "expected header '{}', got {:?}",
            expected_first_column, other
        ))),
    }
}
