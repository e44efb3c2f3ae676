//! Migration executor for driving steps through the runner.

use super::filter::available_steps;
use super::prompt::{ask_step, OperatorPrompt, StepAnswer};
use super::registry::AfterTaskRegistry;
use super::types::{MigrationDirection, MigrationError, RunOutcome, SchemaState};
use crate::catalog::{MigrationStep, StepCatalog};
use crate::remote::MigrationRunner;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Whether a run should keep going after a step.
enum StepFlow {
    Continue,
    Halt(RunOutcome),
}

/// Executor for running migrations.
///
/// Both modes end with [`MigrationExecutor::finalize`], exactly once, on
/// every path out of the run including errors.
pub struct MigrationExecutor {
    runner: Arc<dyn MigrationRunner>,
    after_tasks: Arc<AfterTaskRegistry>,
}

impl MigrationExecutor {
    /// Create a new executor.
    pub fn new(runner: Arc<dyn MigrationRunner>, after_tasks: Arc<AfterTaskRegistry>) -> Self {
        Self {
            runner,
            after_tasks,
        }
    }

    /// Settle a pending after-task on the current version before any step
    /// runs.
    ///
    /// Returns `Some(RunOutcome::AfterTaskFailed)` when the task is still
    /// pending afterwards. Reverting never runs after-tasks.
    pub async fn resolve_pending(
        &self,
        state: &SchemaState,
        direction: MigrationDirection,
    ) -> Result<Option<RunOutcome>, MigrationError> {
        if direction == MigrationDirection::Down {
            return Ok(None);
        }
        let Some(version) = state.current_version else {
            return Ok(None);
        };

        if self.after_tasks.apply(version, direction).await? {
            return Ok(None);
        }

        error!(version, "After-task for current version is still pending");
        println!("Error: {}", MigrationError::AfterTaskFailure(version));
        Ok(Some(RunOutcome::AfterTaskFailed))
    }

    /// Offer each available step to the operator in turn.
    ///
    /// Declining a step stops the run; quitting ends it. After the last step
    /// the operator is asked to acknowledge before control returns.
    pub async fn run_interactive(
        &self,
        catalog: &StepCatalog,
        direction: MigrationDirection,
        prompt: &mut dyn OperatorPrompt,
    ) -> Result<RunOutcome, MigrationError> {
        let result = self.interactive_steps(catalog, direction, prompt).await;
        self.finalize().await;

        let outcome = result?;
        if outcome == RunOutcome::Completed {
            prompt.acknowledge("Press Enter to continue...").await?;
        }
        Ok(outcome)
    }

    /// Run every available step without asking.
    ///
    /// Reverting is a single jump down from the current version instead of
    /// a walk over the filtered steps.
    pub async fn run_bulk(
        &self,
        catalog: &StepCatalog,
        state: &SchemaState,
        direction: MigrationDirection,
    ) -> Result<RunOutcome, MigrationError> {
        let result = match direction {
            MigrationDirection::Up => self.bulk_apply(catalog).await,
            MigrationDirection::Down => self.bulk_revert(state).await,
        };
        self.finalize().await;
        result
    }

    async fn interactive_steps(
        &self,
        catalog: &StepCatalog,
        direction: MigrationDirection,
        prompt: &mut dyn OperatorPrompt,
    ) -> Result<RunOutcome, MigrationError> {
        let table = self.runner.status().await?;
        let available = available_steps(catalog, &table, direction)?;

        if available.steps.is_empty() {
            println!("\nNO MIGRATION STEPS AVAILABLE\n");
        } else {
            println!("\nMIGRATION STEPS AVAILABLE:\n{}", available.report);
        }

        for step in direction.walk(&available.steps) {
            println!("CURRENT STEP:\n");
            self.preview(step, direction).await?;
            println!();

            let question = format!("{} {}? (y/n/quit): ", direction.verb(), step.key());
            match ask_step(prompt, &question).await? {
                StepAnswer::Quit => {
                    info!(step = %step.key(), "Operator quit");
                    return Ok(RunOutcome::Quit);
                }
                StepAnswer::No => {
                    info!(step = %step.key(), "Operator declined step");
                    return Ok(RunOutcome::Stopped);
                }
                StepAnswer::Yes => {
                    if let StepFlow::Halt(outcome) = self.execute_step(step, direction).await? {
                        return Ok(outcome);
                    }
                }
            }
        }

        Ok(RunOutcome::Completed)
    }

    async fn bulk_apply(&self, catalog: &StepCatalog) -> Result<RunOutcome, MigrationError> {
        let table = self.runner.status().await?;
        let available = available_steps(catalog, &table, MigrationDirection::Up)?;

        for step in MigrationDirection::Up.walk(&available.steps) {
            self.preview(step, MigrationDirection::Up).await?;
            if let StepFlow::Halt(outcome) =
                self.execute_step(step, MigrationDirection::Up).await?
            {
                return Ok(outcome);
            }
        }

        Ok(RunOutcome::Completed)
    }

    async fn bulk_revert(&self, state: &SchemaState) -> Result<RunOutcome, MigrationError> {
        // Migration 0 is the baseline and stays in place.
        let count = match state.current_version {
            Some(version) if version > 0 => version,
            _ => {
                info!("Nothing above the baseline to revert");
                return Ok(RunOutcome::Completed);
            }
        };

        let preview = self.runner.revert_down(count, true).await?;
        if preview != 0 {
            warn!(code = preview, "Dry run of bulk revert exited non-zero");
        }

        info!(count, "Reverting migrations");
        let code = self.runner.revert_down(count, false).await?;
        if code != 0 {
            error!(code, count, "Bulk revert failed");
            return Ok(RunOutcome::RunnerFailed);
        }

        Ok(RunOutcome::Completed)
    }

    async fn preview(
        &self,
        step: &MigrationStep,
        direction: MigrationDirection,
    ) -> Result<(), MigrationError> {
        let code = self.runner.apply_step(step.id, direction, true).await?;
        if code != 0 {
            warn!(step = %step.key(), code, "Dry run exited non-zero");
        }
        Ok(())
    }

    /// Run one step and, when applying, its after-task.
    async fn execute_step(
        &self,
        step: &MigrationStep,
        direction: MigrationDirection,
    ) -> Result<StepFlow, MigrationError> {
        info!(step = %step.key(), direction = direction.runner_type(), "Running migration step");
        println!(
            "{}...",
            match direction {
                MigrationDirection::Up => "Applying",
                MigrationDirection::Down => "Reverting",
            }
        );

        let code = self.runner.apply_step(step.id, direction, false).await?;
        println!();
        if code != 0 {
            error!(step = %step.key(), code, "Migration step failed");
            return Ok(StepFlow::Halt(RunOutcome::RunnerFailed));
        }

        if direction == MigrationDirection::Up && !self.after_tasks.apply(step.id, direction).await? {
            println!("Error: {}", MigrationError::AfterTaskFailure(step.id));
            return Ok(StepFlow::Halt(RunOutcome::AfterTaskFailed));
        }

        Ok(StepFlow::Continue)
    }

    /// Push metadata, reload it, and print the fresh status table.
    ///
    /// Failures here are logged and never change how the run ended.
    pub async fn finalize(&self) {
        match self.runner.metadata_apply().await {
            Ok(0) => {}
            Ok(code) => error!(code, "metadata apply exited non-zero"),
            Err(e) => error!(error = %e, "metadata apply failed"),
        }

        match self.runner.metadata_reload().await {
            Ok(0) => {}
            Ok(code) => error!(code, "metadata reload exited non-zero"),
            Err(e) => error!(error = %e, "metadata reload failed"),
        }

        match self.runner.status().await {
            Ok(table) => {
                println!("\n###############\nDatabase Status\n###############");
                println!("{}", table.render());
            }
            Err(e) => error!(error = %e, "Could not fetch final migration status"),
        }
    }
}
