mod common;

use common::{create_test_dir, status_row, write_catalog};
use venue_migrate::{
    available_steps, MigrationDirection, MigrationError, Presence, StatusTable, StepCatalog,
};

fn table(applied_through: u32, ids: &[(u32, &str)]) -> StatusTable {
    StatusTable {
        rows: ids
            .iter()
            .map(|(id, name)| {
                let database = if *id <= applied_through {
                    Presence::Present
                } else {
                    Presence::NotPresent
                };
                status_row(*id, name, Presence::Present, database)
            })
            .collect(),
    }
}

const STEPS: &[(u32, &str)] = &[(0, "init"), (1, "tags"), (2, "plans"), (3, "workspaces")];

#[test]
fn test_only_unapplied_steps_are_offered() {
    let temp_dir = create_test_dir();
    write_catalog(
        temp_dir.path(),
        &[
            (0, "init", true, true),
            (1, "tags", true, true),
            (2, "plans", true, true),
            (3, "workspaces", true, true),
        ],
    );
    let catalog = StepCatalog::discover(temp_dir.path()).expect("Should discover");

    let available =
        available_steps(&catalog, &table(2, STEPS), MigrationDirection::Up).expect("Should filter");

    let ids: Vec<u32> = available.steps.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![3]);
    assert!(available.report.contains("VERSION"));
    assert!(available.report.contains("workspaces"));
    assert!(!available.report.contains("plans"));
}

#[test]
fn test_revert_candidates_are_ascending() {
    let temp_dir = create_test_dir();
    write_catalog(
        temp_dir.path(),
        &[
            (0, "init", true, false),
            (1, "tags", true, true),
            (2, "plans", true, true),
            (3, "workspaces", true, true),
        ],
    );
    let catalog = StepCatalog::discover(temp_dir.path()).expect("Should discover");

    let available = available_steps(&catalog, &table(2, STEPS), MigrationDirection::Down)
        .expect("Should filter");

    // Step 0 has no down.sql; step 3 is not applied.
    let ids: Vec<u32> = available.steps.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 2]);

    let walked: Vec<u32> = MigrationDirection::Down
        .walk(&available.steps)
        .iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(walked, vec![2, 1]);
}

#[test]
fn test_step_without_script_is_never_offered() {
    let temp_dir = create_test_dir();
    write_catalog(
        temp_dir.path(),
        &[
            (0, "init", true, true),
            (1, "tags", true, true),
            (2, "plans", false, true),
            (3, "workspaces", true, true),
        ],
    );
    let catalog = StepCatalog::discover(temp_dir.path()).expect("Should discover");

    let up = available_steps(&catalog, &table(0, STEPS), MigrationDirection::Up).unwrap();
    let ids: Vec<u32> = up.steps.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn test_step_missing_from_source_is_desync() {
    let temp_dir = create_test_dir();
    write_catalog(
        temp_dir.path(),
        &[(0, "init", true, true), (1, "tags", true, true)],
    );
    let catalog = StepCatalog::discover(temp_dir.path()).expect("Should discover");

    let mut status = table(1, &[(0, "init"), (1, "tags")]);
    status
        .rows
        .push(status_row(2, "plans", Presence::NotPresent, Presence::Present));

    match available_steps(&catalog, &status, MigrationDirection::Up) {
        Err(MigrationError::Desync { id, key }) => {
            assert_eq!(id, 2);
            assert_eq!(key, "2_plans");
        }
        other => panic!("Expected desync, got {:?}", other),
    }
}

#[test]
fn test_step_unknown_locally_is_desync() {
    let temp_dir = create_test_dir();
    write_catalog(temp_dir.path(), &[(0, "init", true, true)]);
    let catalog = StepCatalog::discover(temp_dir.path()).expect("Should discover");

    let result = available_steps(
        &catalog,
        &table(0, &[(0, "init"), (1, "tags")]),
        MigrationDirection::Down,
    );
    assert!(matches!(result, Err(MigrationError::Desync { id: 1, .. })));
}

#[test]
fn test_nothing_available_yields_empty_list() {
    let temp_dir = create_test_dir();
    write_catalog(
        temp_dir.path(),
        &[(0, "init", true, true), (1, "tags", true, true)],
    );
    let catalog = StepCatalog::discover(temp_dir.path()).expect("Should discover");

    let available = available_steps(
        &catalog,
        &table(1, &[(0, "init"), (1, "tags")]),
        MigrationDirection::Up,
    )
    .unwrap();
    assert!(available.steps.is_empty());
}
