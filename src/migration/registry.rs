//! Registry of after-tasks and the pending/done gate around them.

use super::types::{AfterTask, MigrationDirection, MigrationError, SchemaState};
use crate::remote::{strip_header, RemoteError, SqlClient};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// First migration id whose rows carry `pause_after`/`after_done`.
pub const AFTER_TASKS_INTRODUCED_AT: u32 = 25;

/// Maps migration ids to after-tasks and tracks their completion in
/// `migrations.schema_migrations`.
pub struct AfterTaskRegistry {
    sql: Arc<dyn SqlClient>,
    tasks: BTreeMap<u32, Arc<dyn AfterTask>>,
}

impl AfterTaskRegistry {
    /// Create a registry with no tasks.
    pub fn new(sql: Arc<dyn SqlClient>) -> Self {
        Self {
            sql,
            tasks: BTreeMap::new(),
        }
    }

    /// Register the task for a migration id, replacing any previous one.
    pub fn register(&mut self, migration_id: u32, task: Arc<dyn AfterTask>) {
        if self.tasks.insert(migration_id, task).is_some() {
            warn!(migration_id, "Replacing previously registered after-task");
        }
    }

    /// Ids that have a task registered.
    pub fn registered_ids(&self) -> Vec<u32> {
        self.tasks.keys().copied().collect()
    }

    /// True if the migration asked to pause after itself and the task has
    /// not completed yet.
    pub async fn has_pending_after(&self, migration_id: u32) -> Result<bool, MigrationError> {
        if migration_id < AFTER_TASKS_INTRODUCED_AT {
            return Ok(false);
        }

        let sql = format!(
            "SELECT pause_after, after_done FROM migrations.schema_migrations WHERE migration_id = {};",
            migration_id
        );
        let rows = strip_header(self.sql.run_sql(&sql, true).await?, "pause_after")?;

        let Some(row) = rows.first() else {
            warn!(migration_id, "No schema_migrations row for migration");
            return Ok(false);
        };

        match row.as_slice() {
            [pause_after, after_done] => Ok(pause_after == "t" && after_done == "f"),
            _ => Err(RemoteError::MalformedResult(format!(
                "expected (pause_after, after_done), got {:?}",
                row
            ))
            .into()),
        }
    }

    /// The current version, if its after-task is still pending.
    pub async fn pending_version(
        &self,
        state: &SchemaState,
    ) -> Result<Option<u32>, MigrationError> {
        let Some(version) = state.current_version else {
            return Ok(None);
        };
        Ok(self.has_pending_after(version).await?.then_some(version))
    }

    /// Run the pending after-task for a migration, if there is one.
    ///
    /// Returns `Ok(true)` when there is nothing left to do, `Ok(false)` when
    /// the task failed or no task is registered for the id. Completion is
    /// only recorded after the task succeeded.
    pub async fn apply(
        &self,
        migration_id: u32,
        direction: MigrationDirection,
    ) -> Result<bool, MigrationError> {
        if direction == MigrationDirection::Down {
            return Ok(true);
        }

        if !self.has_pending_after(migration_id).await? {
            return Ok(true);
        }

        let Some(task) = self.tasks.get(&migration_id) else {
            error!(migration_id, "No after-task registered for migration");
            println!(
                "Error: Migration {} does not have an after procedure in this version of the tool.\n\
                 Check for an updated version.",
                migration_id
            );
            return Ok(false);
        };

        info!(migration_id, task = task.description(), "Running after-task");
        if let Err(e) = task.run().await {
            error!(migration_id, error = %e, "After-task failed");
            println!("Error: 'After' steps unsuccessfully applied: {}", e);
            return Ok(false);
        }

        self.mark_done(migration_id).await?;
        info!(migration_id, "After-task completed");
        Ok(true)
    }

    /// Record the after-task for a migration as done.
    pub async fn mark_done(&self, migration_id: u32) -> Result<(), MigrationError> {
        let sql = format!(
            "UPDATE migrations.schema_migrations SET after_done = true WHERE migration_id = {};",
            migration_id
        );
        self.sql.run_sql(&sql, false).await?;
        Ok(())
    }
}
