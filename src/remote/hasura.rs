//! The `hasura` CLI as a [`MigrationRunner`].

use super::status_table::parse_status_table;
use super::types::{MigrationRunner, RemoteError, StatusTable};
use crate::migration::MigrationDirection;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Name of the CLI binary looked up on PATH.
pub const HASURA_PROGRAM: &str = "hasura";

/// Everything needed to point the CLI at one venue.
#[derive(Debug, Clone)]
pub struct HasuraProfile {
    /// Directory containing `config.yaml` and `migrations/`.
    pub project_dir: PathBuf,
    pub database_name: String,
    pub endpoint: String,
    pub admin_secret: String,
    pub env_file: Option<PathBuf>,
}

/// Runs steps by shelling out to the `hasura` CLI.
pub struct HasuraCli {
    program: String,
    profile: HasuraProfile,
}

impl HasuraCli {
    pub fn new(profile: HasuraProfile) -> Self {
        Self {
            program: HASURA_PROGRAM.to_string(),
            profile,
        }
    }

    /// Fail early when the CLI cannot be started at all.
    pub async fn check_installed(&self) -> Result<(), RemoteError> {
        let code = self.run(self.command_args(&["version"], &[]), false).await?;
        if code != 0 {
            warn!(code, "'{} version' exited with a non-zero status", self.program);
        }
        Ok(())
    }

    /// Flags every invocation carries.
    fn common_flags(&self) -> Vec<String> {
        let mut flags = vec![
            "--skip-update-check".to_string(),
            "--project".to_string(),
            self.profile.project_dir.to_string_lossy().to_string(),
        ];
        if let Some(env_file) = &self.profile.env_file {
            flags.push("--envfile".to_string());
            flags.push(env_file.to_string_lossy().to_string());
        }
        flags
    }

    fn connection_flags(&self, with_database: bool) -> Vec<String> {
        let mut flags = Vec::new();
        if with_database {
            flags.push("--database-name".to_string());
            flags.push(self.profile.database_name.clone());
        }
        flags.extend([
            "--endpoint".to_string(),
            self.profile.endpoint.clone(),
            "--admin-secret".to_string(),
            self.profile.admin_secret.clone(),
        ]);
        flags
    }

    fn command_args(&self, subcommand: &[&str], flags: &[String]) -> Vec<String> {
        let mut args: Vec<String> = subcommand.iter().map(|s| s.to_string()).collect();
        args.extend(flags.iter().cloned());
        args.extend(self.common_flags());
        args
    }

    fn migrate_args(&self, subcommand: &str, flags: &[String]) -> Vec<String> {
        let mut all_flags = flags.to_vec();
        all_flags.extend(self.connection_flags(true));
        self.command_args(&["migrate", subcommand], &all_flags)
    }

    fn metadata_args(&self, subcommand: &str) -> Vec<String> {
        self.command_args(&["metadata", subcommand], &self.connection_flags(false))
    }

    /// Run with inherited stdout/stderr (or silenced) and return the exit code.
    async fn run(&self, args: Vec<String>, quiet: bool) -> Result<i32, RemoteError> {
        debug!(program = %self.program, subcommand = ?args.first(), "Invoking runner");

        let mut command = Command::new(&self.program);
        command.args(&args).stdin(Stdio::null());
        if quiet {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }

        let status = command.status().await.map_err(|e| self.spawn_error(e))?;
        // Killed by a signal counts as failure.
        Ok(status.code().unwrap_or(-1))
    }

    /// Run and capture stdout.
    async fn capture(&self, args: Vec<String>) -> Result<String, RemoteError> {
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(RemoteError::MalformedStatus(format!(
                "'{} {}' exited with {}: {}",
                self.program,
                args.iter().take(2).cloned().collect::<Vec<_>>().join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn spawn_error(&self, e: std::io::Error) -> RemoteError {
        if e.kind() == std::io::ErrorKind::NotFound {
            RemoteError::MissingTool(self.program.clone())
        } else {
            RemoteError::IoError(e)
        }
    }
}

fn preview_flags(dry_run: bool) -> Vec<String> {
    if dry_run {
        vec![
            "--dry-run".to_string(),
            "--log-level".to_string(),
            "WARN".to_string(),
        ]
    } else {
        Vec::new()
    }
}

#[async_trait]
impl MigrationRunner for HasuraCli {
    async fn status(&self) -> Result<StatusTable, RemoteError> {
        let output = self.capture(self.migrate_args("status", &[])).await?;
        parse_status_table(&output)
    }

    async fn apply_step(
        &self,
        id: u32,
        direction: MigrationDirection,
        dry_run: bool,
    ) -> Result<i32, RemoteError> {
        let mut flags = vec![
            "--version".to_string(),
            id.to_string(),
            "--type".to_string(),
            direction.runner_type().to_string(),
        ];
        flags.extend(preview_flags(dry_run));
        self.run(self.migrate_args("apply", &flags), false).await
    }

    async fn mark_applied(&self, id: u32) -> Result<i32, RemoteError> {
        let flags = vec![
            "--skip-execution".to_string(),
            "--version".to_string(),
            id.to_string(),
        ];
        self.run(self.migrate_args("apply", &flags), true).await
    }

    async fn revert_down(&self, count: u32, dry_run: bool) -> Result<i32, RemoteError> {
        let mut flags = vec!["--down".to_string(), count.to_string()];
        flags.extend(preview_flags(dry_run));
        self.run(self.migrate_args("apply", &flags), false).await
    }

    async fn metadata_apply(&self) -> Result<i32, RemoteError> {
        self.run(self.metadata_args("apply"), false).await
    }

    async fn metadata_reload(&self) -> Result<i32, RemoteError> {
        self.run(self.metadata_args("reload"), false).await
    }
}
