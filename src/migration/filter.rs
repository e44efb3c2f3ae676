//! Narrow the local catalog to steps that can be acted on right now.

use super::types::{MigrationDirection, MigrationError};
use crate::catalog::{MigrationStep, StepCatalog};
use crate::remote::{render_rows, Presence, RemoteStatusRow, StatusTable};
use tracing::warn;

/// Steps that may be applied (or reverted), plus a table for the operator.
#[derive(Debug, Clone)]
pub struct AvailableSteps {
    /// Ascending by id.
    pub steps: Vec<MigrationStep>,
    /// Header and one line per available step.
    pub report: String,
}

/// Ways the venue and this machine can disagree about a step's existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Desync {
    /// The runner reports the step's files as absent from the project.
    SourceMissing,
    /// The runner lists a step the local migrations directory lacks.
    UnknownLocally,
}

/// Which status rows are fatal.
///
/// | source      | database    | local folder | result          |
/// |-------------|-------------|--------------|-----------------|
/// | Not Present | any         | any          | `SourceMissing` |
/// | Present     | any         | missing      | `UnknownLocally`|
/// | Present     | any         | present      | ok              |
///
/// A missing `down.sql` for an applied step is not a desync; the step is
/// simply not revertible.
pub fn desync_policy(row: &RemoteStatusRow, local: Option<&MigrationStep>) -> Option<Desync> {
    match (row.source, local) {
        (Presence::NotPresent, _) => Some(Desync::SourceMissing),
        (Presence::Present, None) => Some(Desync::UnknownLocally),
        (Presence::Present, Some(_)) => None,
    }
}

/// Whether `step` can move in `direction` given its status row.
pub fn is_actionable(
    step: &MigrationStep,
    row: &RemoteStatusRow,
    direction: MigrationDirection,
) -> bool {
    match direction {
        MigrationDirection::Up => step.has_forward_file && !row.is_applied(),
        MigrationDirection::Down => step.has_reverse_file && row.is_applied(),
    }
}

/// Filter `catalog` down to the steps available in `direction`.
///
/// Fails with [`MigrationError::Desync`] on the first row the policy table
/// marks fatal. Catalog steps the runner does not list at all are skipped.
pub fn available_steps(
    catalog: &StepCatalog,
    table: &StatusTable,
    direction: MigrationDirection,
) -> Result<AvailableSteps, MigrationError> {
    let mut kept_rows: Vec<&RemoteStatusRow> = Vec::new();
    let mut steps = Vec::new();

    for row in &table.rows {
        let local = catalog.get(row.id);

        if let Some(kind) = desync_policy(row, local) {
            warn!(id = row.id, kind = ?kind, "Local migrations out of sync with server");
            return Err(MigrationError::Desync {
                id: row.id,
                key: row.key(),
            });
        }

        if let Some(step) = local {
            if is_actionable(step, row, direction) {
                kept_rows.push(row);
                steps.push(step.clone());
            }
        }
    }

    for step in catalog.steps() {
        if table.row(step.id).is_none() {
            warn!(step = %step.key(), "Runner does not list local migration; skipping");
        }
    }

    Ok(AvailableSteps {
        steps,
        report: render_rows(kept_rows.into_iter()),
    })
}
