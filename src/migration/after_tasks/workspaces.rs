//! After-task for migration 25: move user sequences onto the workspace server.
//!
//! Sequences used to live in `sequencing.user_sequence`. Each one becomes two
//! files in its workspace: `{name}.seq` holding the definition and
//! `{name}.seq.json` holding the generated JSON.
//!
//! Re-running after a partial failure uploads the same filenames again; the
//! workspace server is assumed to overwrite existing files on `PUT`.

use crate::migration::types::{AfterTask, MigrationError};
use crate::remote::{strip_header, RemoteError, SqlClient};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Url};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Migration id this task belongs to.
pub const WORKSPACES_MIGRATION_ID: u32 = 25;

pub const USER_SEQUENCES_SQL: &str =
    "SELECT id, name, workspace_id, definition, seq_json FROM sequencing.user_sequence ORDER BY id;";

/// A row of `sequencing.user_sequence`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub id: u32,
    pub name: String,
    pub workspace_id: u32,
    pub definition: String,
    pub seq_json: String,
}

/// Storage the sequences are moved into.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Where the store lives, for operator messages.
    fn endpoint(&self) -> &str;

    async fn health(&self) -> Result<(), RemoteError>;

    async fn put_file(
        &self,
        workspace_id: u32,
        filename: &str,
        contents: String,
    ) -> Result<(), RemoteError>;
}

/// Workspace server reached over HTTP with admin headers.
pub struct HttpWorkspaceStore {
    http: Client,
    endpoint: String,
    admin_secret: String,
}

impl HttpWorkspaceStore {
    pub fn new(endpoint: &str, admin_secret: &str) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            admin_secret: admin_secret.to_string(),
        }
    }

    /// `{endpoint}/ws/{workspace}/{filename}?type=file`, with the filename
    /// percent-encoded as a single path segment.
    fn file_url(&self, workspace_id: u32, filename: &str) -> Result<Url, RemoteError> {
        let invalid =
            |reason: String| RemoteError::InvalidUrl(format!("{}: {}", self.endpoint, reason));

        let mut url = Url::parse(&self.endpoint).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot hold a path".to_string()))?
            .pop_if_empty()
            .push("ws")
            .push(&workspace_id.to_string())
            .push(filename);
        url.query_pairs_mut().append_pair("type", "file");
        Ok(url)
    }
}

#[async_trait]
impl WorkspaceStore for HttpWorkspaceStore {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn health(&self) -> Result<(), RemoteError> {
        let url = format!("{}/health", self.endpoint);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::RequestRejected {
                url,
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn put_file(
        &self,
        workspace_id: u32,
        filename: &str,
        contents: String,
    ) -> Result<(), RemoteError> {
        let url = self.file_url(workspace_id, filename)?;
        let form = Form::new().part("file", Part::text(contents).file_name(filename.to_string()));

        // No JWT here, so impersonate the legacy admin user.
        let resp = self
            .http
            .put(url.clone())
            .header("x-hasura-admin-secret", &self.admin_secret)
            .header("x-hasura-role", "aerie_admin")
            .header("x-hasura-user-id", "Aerie Legacy")
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RemoteError::RequestRejected {
                url: url.to_string(),
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

/// Give every record a filename stem unique within its workspace.
///
/// Records are visited in the given order (ascending id). The first record
/// keeps its name; later clashes become `{name}_{id}`, then
/// `{name}_{id}_{counter}` counting from 1.
pub fn assign_unique_names(records: &[SequenceRecord]) -> Vec<String> {
    let mut claimed: HashMap<u32, HashSet<String>> = HashMap::new();

    records
        .iter()
        .map(|record| {
            let names = claimed.entry(record.workspace_id).or_default();

            let with_id = format!("{}_{}", record.name, record.id);
            let unique = if !names.contains(&record.name) {
                record.name.clone()
            } else if !names.contains(&with_id) {
                with_id
            } else {
                let mut counter = 1u32;
                while names.contains(&format!("{}_{}", with_id, counter)) {
                    counter += 1;
                }
                format!("{}_{}", with_id, counter)
            };

            names.insert(unique.clone());
            unique
        })
        .collect()
}

/// Parse the result rows of [`USER_SEQUENCES_SQL`].
pub fn parse_sequence_rows(rows: Vec<Vec<String>>) -> Result<Vec<SequenceRecord>, RemoteError> {
    rows.into_iter()
        .map(|row| {
            let malformed =
                || RemoteError::MalformedResult(format!("invalid user_sequence row {:?}", row));
            match row.as_slice() {
                [id, name, workspace_id, definition, seq_json] => Ok(SequenceRecord {
                    id: id.parse().map_err(|_| malformed())?,
                    name: name.clone(),
                    workspace_id: workspace_id.parse().map_err(|_| malformed())?,
                    definition: definition.clone(),
                    seq_json: seq_json.clone(),
                }),
                _ => Err(malformed()),
            }
        })
        .collect()
}

/// Moves user sequences from the database into workspace files.
pub struct WorkspaceSequenceMigration {
    sql: Arc<dyn SqlClient>,
    store: Arc<dyn WorkspaceStore>,
}

impl WorkspaceSequenceMigration {
    pub fn new(sql: Arc<dyn SqlClient>, store: Arc<dyn WorkspaceStore>) -> Self {
        Self { sql, store }
    }

    fn aborted(reason: impl Into<String>) -> MigrationError {
        MigrationError::AfterTaskAborted {
            id: WORKSPACES_MIGRATION_ID,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl AfterTask for WorkspaceSequenceMigration {
    fn description(&self) -> &str {
        "Move user sequences onto the workspace server"
    }

    async fn run(&self) -> Result<(), MigrationError> {
        println!("This migration will move your user sequences onto the Workspace Server.");
        println!("As a prerequisite, the Workspace Server must be up and accessible.");
        println!(
            "Connecting to the Workspace Server using URL: {}",
            self.store.endpoint()
        );

        self.store
            .health()
            .await
            .map_err(|e| Self::aborted(format!("could not reach the Workspace Server: {}", e)))?;

        let rows = strip_header(self.sql.run_sql(USER_SEQUENCES_SQL, true).await?, "id")?;
        let records = parse_sequence_rows(rows)?;
        let names = assign_unique_names(&records);

        for (record, unique) in records.into_iter().zip(names) {
            let seq_filename = format!("{}.seq", unique);
            self.store
                .put_file(record.workspace_id, &seq_filename, record.definition)
                .await
                .map_err(|e| Self::aborted(format!("uploading sequence {}: {}", record.id, e)))?;

            let json_filename = format!("{}.seq.json", unique);
            self.store
                .put_file(record.workspace_id, &json_filename, record.seq_json)
                .await
                .map_err(|e| {
                    Self::aborted(format!("uploading seq JSON for sequence {}: {}", record.id, e))
                })?;

            info!(
                sequence = record.id,
                workspace = record.workspace_id,
                file = %unique,
                "Uploaded sequence"
            );
        }

        println!("Successfully applied workspace file migration\n");
        Ok(())
    }
}
