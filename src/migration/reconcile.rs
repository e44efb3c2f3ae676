//! Derive the schema version the database is really on.
//!
//! The runner keeps its own bookkeeping of applied steps, which can drift
//! from the `migrations.schema_migrations` table. The table is ground truth:
//! it is read, checked for gaps, and the runner is brought in line with it.

use super::types::{MigrationError, SchemaState};
use crate::remote::{strip_header, MigrationRunner, RemoteError, SqlClient};
use tracing::{debug, info};

pub const APPLIED_IDS_SQL: &str = "SELECT migration_id FROM migrations.schema_migrations;";

/// Read the applied ids from the database, ascending.
pub async fn fetch_applied_ids(sql: &dyn SqlClient) -> Result<Vec<u32>, MigrationError> {
    let rows = sql.run_sql(APPLIED_IDS_SQL, true).await?;
    let rows = strip_header(rows, "migration_id")?;

    let mut ids = rows
        .iter()
        .map(|row| {
            row.first()
                .and_then(|cell| cell.trim().parse::<u32>().ok())
                .ok_or_else(|| {
                    RemoteError::MalformedResult(format!("invalid migration id row {:?}", row))
                })
        })
        .collect::<Result<Vec<u32>, RemoteError>>()?;

    ids.sort_unstable();
    Ok(ids)
}

/// Check that ascending `ids` are exactly `0..n`.
pub fn validate_contiguous(ids: &[u32]) -> Result<(), MigrationError> {
    let mut prev: i64 = -1;
    for &id in ids {
        if i64::from(id) != prev + 1 {
            return Err(MigrationError::Consistency {
                last_good: prev,
                next: id,
            });
        }
        prev = i64::from(id);
    }
    Ok(())
}

/// Validate the applied sequence and sync the runner's bookkeeping to it.
///
/// Nothing is marked unless the whole sequence is valid. Ids the runner
/// already reports as applied are left alone, so a second call against a
/// synchronized venue makes no mutating calls.
pub async fn reconcile(
    sql: &dyn SqlClient,
    runner: &dyn MigrationRunner,
) -> Result<SchemaState, MigrationError> {
    let applied_ids = fetch_applied_ids(sql).await?;
    validate_contiguous(&applied_ids)?;

    let table = runner.status().await?;

    let mut marked = 0usize;
    for &id in &applied_ids {
        if table.row(id).is_some_and(|row| row.is_applied()) {
            continue;
        }

        debug!(id, "Marking migration as applied in runner bookkeeping");
        let code = runner.mark_applied(id).await?;
        if code != 0 {
            return Err(MigrationError::RunnerFailure {
                action: format!("marking migration {} as applied", id),
                code,
            });
        }
        marked += 1;
    }

    let current_version = applied_ids.last().copied();
    info!(
        current_version = ?current_version,
        applied = applied_ids.len(),
        marked,
        "Reconciled schema state"
    );

    Ok(SchemaState {
        applied_ids,
        current_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_sequences_are_accepted() {
        assert!(validate_contiguous(&[]).is_ok());
        assert!(validate_contiguous(&[0]).is_ok());
        assert!(validate_contiguous(&[0, 1, 2, 3]).is_ok());
    }

    #[test]
    fn test_gap_is_rejected_with_both_ids() {
        match validate_contiguous(&[0, 1, 3]) {
            Err(MigrationError::Consistency { last_good, next }) => {
                assert_eq!(last_good, 1);
                assert_eq!(next, 3);
            }
            other => panic!("expected consistency error, got {:?}", other),
        }
    }

    #[test]
    fn test_sequence_not_starting_at_zero() {
        match validate_contiguous(&[1, 2]) {
            Err(MigrationError::Consistency { last_good, next }) => {
                assert_eq!(last_good, -1);
                assert_eq!(next, 1);
            }
            other => panic!("expected consistency error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicates_and_large_gaps() {
        assert!(validate_contiguous(&[0, 1, 1, 2]).is_err());
        assert!(validate_contiguous(&[0, 1000]).is_err());
    }
}
