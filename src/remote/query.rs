//! `run_sql` calls against the GraphQL engine's query endpoint.

use super::types::{RemoteError, SqlClient};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Serialize)]
struct RunSqlRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    args: RunSqlArgs<'a>,
}

#[derive(Debug, Serialize)]
struct RunSqlArgs<'a> {
    source: &'a str,
    sql: &'a str,
    read_only: bool,
}

#[derive(Debug, Deserialize)]
struct RunSqlResponse {
    #[serde(default)]
    result: Option<Vec<Vec<Value>>>,
}

/// SQL client that posts `run_sql` requests with the admin secret.
pub struct HasuraQueryClient {
    http: Client,
    endpoint: String,
    admin_secret: String,
    source: String,
}

impl HasuraQueryClient {
    pub fn new(endpoint: &str, admin_secret: &str, source: &str) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.to_string(),
            admin_secret: admin_secret.to_string(),
            source: source.to_string(),
        }
    }

    fn query_url(&self) -> String {
        format!("{}/v2/query", self.endpoint)
    }
}

#[async_trait]
impl SqlClient for HasuraQueryClient {
    async fn run_sql(&self, sql: &str, read_only: bool) -> Result<Vec<Vec<String>>, RemoteError> {
        debug!(read_only, sql, "Running SQL");

        let body = RunSqlRequest {
            kind: "run_sql",
            args: RunSqlArgs {
                source: &self.source,
                sql,
                read_only,
            },
        };

        let resp = self
            .http
            .post(self.query_url())
            .header("x-hasura-admin-secret", &self.admin_secret)
            .header("x-hasura-role", "admin")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(RemoteError::QueryRejected {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: RunSqlResponse = serde_json::from_str(&text)?;
        Ok(parsed
            .result
            .unwrap_or_default()
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect())
    }
}

/// The endpoint renders every cell as text; null becomes empty.
fn cell_to_string(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
