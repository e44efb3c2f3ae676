//! Types for the migration engine.

use crate::catalog::{CatalogError, MigrationStep};
use crate::remote::RemoteError;
use async_trait::async_trait;
use thiserror::Error;

/// Exit status for an after-task that could not be completed.
pub const EXIT_AFTER_TASK_FAILED: u8 = 2;

/// Exit status for every other failure.
pub const EXIT_FAILURE: u8 = 1;

/// Error types for migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(
        "Gap detected in applied migrations.\n\tLast migration: {last_good}\tNext migration: {next}\n\t\
         To resolve, manually revert all migrations following {last_good}, then run this tool again."
    )]
    Consistency { last_good: i64, next: u32 },

    #[error(
        "Migration {key} exists on the server but not on this machine. \
         Synchronize files and try again."
    )]
    Desync { id: u32, key: String },

    #[error("Runner failed with exit code {code} while {action}")]
    RunnerFailure { action: String, code: i32 },

    #[error("Incomplete 'after' task for migration {0}, cannot proceed.")]
    AfterTaskFailure(u32),

    #[error("After-task for migration {id} failed: {reason}")]
    AfterTaskAborted { id: u32, reason: String },
}

impl MigrationError {
    /// Process exit status this error should end the run with.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrationError::AfterTaskFailure(_) => EXIT_AFTER_TASK_FAILED,
            _ => EXIT_FAILURE,
        }
    }
}

/// Direction of migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Apply steps, newest last.
    Up,
    /// Revert steps, newest first.
    Down,
}

impl MigrationDirection {
    /// Value of the runner's `--type` flag.
    pub fn runner_type(&self) -> &'static str {
        match self {
            MigrationDirection::Up => "up",
            MigrationDirection::Down => "down",
        }
    }

    /// Operator-facing verb.
    pub fn verb(&self) -> &'static str {
        match self {
            MigrationDirection::Up => "Apply",
            MigrationDirection::Down => "Revert",
        }
    }

    /// Order to walk ascending steps in: oldest first when applying,
    /// newest first when reverting.
    pub fn walk<'a>(&self, steps: &'a [MigrationStep]) -> Vec<&'a MigrationStep> {
        match self {
            MigrationDirection::Up => steps.iter().collect(),
            MigrationDirection::Down => steps.iter().rev().collect(),
        }
    }
}

/// Schema state as read from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaState {
    /// Applied ids, ascending and contiguous from 0.
    pub applied_ids: Vec<u32>,
    /// Highest applied id, `None` on an empty database.
    pub current_version: Option<u32>,
}

/// How a driven run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every available step ran (or there was nothing to do).
    Completed,
    /// The operator declined a step.
    Stopped,
    /// The operator quit.
    Quit,
    /// The runner exited non-zero.
    RunnerFailed,
    /// An after-task is still pending.
    AfterTaskFailed,
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Completed | RunOutcome::Stopped | RunOutcome::Quit => 0,
            RunOutcome::RunnerFailed => EXIT_FAILURE,
            RunOutcome::AfterTaskFailed => EXIT_AFTER_TASK_FAILED,
        }
    }
}

/// A one-time side effect tied to a migration id.
///
/// Runs after the step's SQL has been applied. Either the whole task
/// succeeds or it reports failure; the engine records completion only on
/// success so a failed task is offered again on the next run.
#[async_trait]
pub trait AfterTask: Send + Sync {
    /// Human-readable description of what the task does.
    fn description(&self) -> &str;

    async fn run(&self) -> Result<(), MigrationError>;
}
