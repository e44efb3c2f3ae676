//! Migration engine for a venue database.
//!
//! # Overview
//!
//! - `reconcile` reads the applied ids from the database, rejects gaps, and
//!   syncs the runner's bookkeeping to them
//! - `filter` narrows the local catalog to the steps that can move in the
//!   requested direction
//! - `AfterTaskRegistry` gates progress on one-time side effects tied to
//!   specific migrations
//! - `MigrationExecutor` drives the steps interactively or in bulk and
//!   always finalizes the runner's metadata afterwards
//!
//! # Usage
//!
//! ```ignore
//! let state = reconcile(sql.as_ref(), runner.as_ref()).await?;
//! let after_tasks = Arc::new(create_after_registry(sql, store));
//! let executor = MigrationExecutor::new(runner, after_tasks);
//! let outcome = executor.run_bulk(&catalog, &state, MigrationDirection::Up).await?;
//! ```

pub mod after_tasks;
mod executor;
mod filter;
mod prompt;
mod reconcile;
mod registry;
mod types;

pub use executor::MigrationExecutor;
pub use filter::{available_steps, desync_policy, is_actionable, AvailableSteps, Desync};
pub use prompt::{ask_step, OperatorPrompt, StdinPrompt, StepAnswer};
pub use reconcile::{fetch_applied_ids, reconcile, validate_contiguous, APPLIED_IDS_SQL};
pub use registry::{AfterTaskRegistry, AFTER_TASKS_INTRODUCED_AT};
pub use types::{
    AfterTask, MigrationDirection, MigrationError, RunOutcome, SchemaState,
    EXIT_AFTER_TASK_FAILED, EXIT_FAILURE,
};

use after_tasks::workspaces::{WorkspaceSequenceMigration, WorkspaceStore, WORKSPACES_MIGRATION_ID};
use crate::remote::SqlClient;
use std::sync::Arc;

/// Create the after-task registry with every known task.
pub fn create_after_registry(
    sql: Arc<dyn SqlClient>,
    workspace_store: Arc<dyn WorkspaceStore>,
) -> AfterTaskRegistry {
    let mut registry = AfterTaskRegistry::new(sql.clone());

    registry.register(
        WORKSPACES_MIGRATION_ID,
        Arc::new(WorkspaceSequenceMigration::new(sql, workspace_store)),
    );

    registry
}
