//! Shared test helpers: in-memory stand-ins for the runner, the SQL endpoint,
//! the workspace server and the operator.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;
use venue_migrate::migration::after_tasks::workspaces::WorkspaceStore;
use venue_migrate::{
    AfterTask, MigrationDirection, MigrationError, MigrationRunner, OperatorPrompt, Presence,
    RemoteError, RemoteStatusRow, SqlClient, StatusTable,
};

/// Create a temporary directory for testing
pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Lay out step folders under `root`: `(id, name, has_up, has_down)`.
pub fn write_catalog(root: &Path, steps: &[(u32, &str, bool, bool)]) {
    for (id, name, up, down) in steps {
        let folder = root.join(format!("{}_{}", id, name));
        fs::create_dir_all(&folder).expect("Failed to create step folder");
        if *up {
            fs::write(folder.join("up.sql"), format!("-- apply {}\n", name)).unwrap();
        }
        if *down {
            fs::write(folder.join("down.sql"), format!("-- revert {}\n", name)).unwrap();
        }
    }
}

pub fn status_row(id: u32, name: &str, source: Presence, database: Presence) -> RemoteStatusRow {
    RemoteStatusRow {
        id,
        name: name.to_string(),
        source,
        database,
    }
}

/// Runner that keeps its status table in memory and logs every call.
///
/// Successful non-dry `apply_step` and `mark_applied` calls update the
/// table the way the real runner would.
#[derive(Default)]
pub struct FakeRunner {
    table: Mutex<BTreeMap<u32, RemoteStatusRow>>,
    calls: Mutex<Vec<String>>,
    step_exit_codes: Mutex<HashMap<u32, i32>>,
    revert_exit_code: Mutex<i32>,
}

impl FakeRunner {
    pub fn new(rows: Vec<RemoteStatusRow>) -> Self {
        let runner = Self::default();
        {
            let mut table = runner.table.lock().unwrap();
            for row in rows {
                table.insert(row.id, row);
            }
        }
        runner
    }

    /// Steps that exist everywhere; `applied` of them recorded as applied.
    pub fn synced(names: &[(u32, &str)], applied: &[u32]) -> Self {
        Self::new(
            names
                .iter()
                .map(|(id, name)| {
                    let database = if applied.contains(id) {
                        Presence::Present
                    } else {
                        Presence::NotPresent
                    };
                    status_row(*id, name, Presence::Present, database)
                })
                .collect(),
        )
    }

    pub fn fail_step(&self, id: u32, code: i32) {
        self.step_exit_codes.lock().unwrap().insert(id, code);
    }

    pub fn fail_revert(&self, code: i32) {
        *self.revert_exit_code.lock().unwrap() = code;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn is_applied(&self, id: u32) -> bool {
        self.table
            .lock()
            .unwrap()
            .get(&id)
            .is_some_and(|row| row.database == Presence::Present)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MigrationRunner for FakeRunner {
    async fn status(&self) -> Result<StatusTable, RemoteError> {
        self.record("status".to_string());
        Ok(StatusTable {
            rows: self.table.lock().unwrap().values().cloned().collect(),
        })
    }

    async fn apply_step(
        &self,
        id: u32,
        direction: MigrationDirection,
        dry_run: bool,
    ) -> Result<i32, RemoteError> {
        if dry_run {
            self.record(format!("preview {} {}", direction.runner_type(), id));
            return Ok(0);
        }

        self.record(format!("apply {} {}", direction.runner_type(), id));
        let code = self.step_exit_codes.lock().unwrap().get(&id).copied().unwrap_or(0);
        if code == 0 {
            if let Some(row) = self.table.lock().unwrap().get_mut(&id) {
                row.database = match direction {
                    MigrationDirection::Up => Presence::Present,
                    MigrationDirection::Down => Presence::NotPresent,
                };
            }
        }
        Ok(code)
    }

    async fn mark_applied(&self, id: u32) -> Result<i32, RemoteError> {
        self.record(format!("mark {}", id));
        let mut table = self.table.lock().unwrap();
        let row = table.entry(id).or_insert_with(|| {
            status_row(id, &format!("step{}", id), Presence::Present, Presence::NotPresent)
        });
        row.database = Presence::Present;
        Ok(0)
    }

    async fn revert_down(&self, count: u32, dry_run: bool) -> Result<i32, RemoteError> {
        if dry_run {
            self.record(format!("preview down {}", count));
            return Ok(0);
        }
        self.record(format!("down {}", count));
        Ok(*self.revert_exit_code.lock().unwrap())
    }

    async fn metadata_apply(&self) -> Result<i32, RemoteError> {
        self.record("metadata apply".to_string());
        Ok(0)
    }

    async fn metadata_reload(&self) -> Result<i32, RemoteError> {
        self.record("metadata reload".to_string());
        Ok(0)
    }
}

/// SQL endpoint backed by an in-memory `schema_migrations` table.
#[derive(Default)]
pub struct FakeSql {
    applied: Mutex<Vec<u32>>,
    /// `migration_id -> (pause_after, after_done)`
    flags: Mutex<HashMap<u32, (bool, bool)>>,
    sequences: Mutex<Vec<Vec<String>>>,
    statements: Mutex<Vec<String>>,
}

impl FakeSql {
    pub fn with_applied(ids: &[u32]) -> Self {
        let sql = Self::default();
        *sql.applied.lock().unwrap() = ids.to_vec();
        sql
    }

    pub fn pause_after(&self, id: u32) {
        self.flags.lock().unwrap().insert(id, (true, false));
    }

    pub fn after_done(&self, id: u32) -> bool {
        self.flags
            .lock()
            .unwrap()
            .get(&id)
            .is_some_and(|(_, done)| *done)
    }

    /// Add a `sequencing.user_sequence` row.
    pub fn add_sequence(&self, id: u32, name: &str, workspace_id: u32, definition: &str, json: &str) {
        self.sequences.lock().unwrap().push(vec![
            id.to_string(),
            name.to_string(),
            workspace_id.to_string(),
            definition.to_string(),
            json.to_string(),
        ]);
    }

    pub fn updates(&self) -> Vec<String> {
        self.statements
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.starts_with("UPDATE"))
            .cloned()
            .collect()
    }
}

fn trailing_id(sql: &str) -> Option<u32> {
    sql.trim_end_matches(';')
        .rsplit('=')
        .next()
        .and_then(|id| id.trim().parse().ok())
}

fn cells(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[async_trait]
impl SqlClient for FakeSql {
    async fn run_sql(&self, sql: &str, _read_only: bool) -> Result<Vec<Vec<String>>, RemoteError> {
        self.statements.lock().unwrap().push(sql.to_string());

        if sql.starts_with("SELECT migration_id") {
            let mut rows = vec![cells(&["migration_id"])];
            rows.extend(self.applied.lock().unwrap().iter().map(|id| vec![id.to_string()]));
            return Ok(rows);
        }

        if sql.starts_with("SELECT pause_after") {
            let mut rows = vec![cells(&["pause_after", "after_done"])];
            let flags = trailing_id(sql).and_then(|id| self.flags.lock().unwrap().get(&id).copied());
            if let Some((pause, done)) = flags {
                let flag = |b: bool| if b { "t" } else { "f" };
                rows.push(cells(&[flag(pause), flag(done)]));
            }
            return Ok(rows);
        }

        if sql.starts_with("SELECT id, name, workspace_id") {
            let mut rows = vec![cells(&["id", "name", "workspace_id", "definition", "seq_json"])];
            rows.extend(self.sequences.lock().unwrap().iter().cloned());
            return Ok(rows);
        }

        if sql.starts_with("UPDATE") && sql.contains("after_done = true") {
            if let Some(id) = trailing_id(sql) {
                if let Some(entry) = self.flags.lock().unwrap().get_mut(&id) {
                    entry.1 = true;
                }
            }
            return Ok(Vec::new());
        }

        Err(RemoteError::QueryRejected {
            status: 400,
            body: format!("unexpected statement: {}", sql),
        })
    }
}

/// Operator that answers from a script; an exhausted script reads as
/// closed input.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
    pub questions: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            questions: Vec::new(),
        }
    }
}

#[async_trait]
impl OperatorPrompt for ScriptedPrompt {
    async fn ask(&mut self, question: &str) -> Result<Option<String>, MigrationError> {
        self.questions.push(question.to_string());
        Ok(self.answers.pop_front())
    }
}

/// Workspace server that keeps uploads in memory.
#[derive(Default)]
pub struct FakeStore {
    pub unhealthy: bool,
    /// Filename whose upload is rejected.
    pub reject: Option<String>,
    uploads: Mutex<Vec<(u32, String, String)>>,
}

impl FakeStore {
    pub fn unhealthy() -> Self {
        Self {
            unhealthy: true,
            ..Default::default()
        }
    }

    pub fn rejecting(filename: &str) -> Self {
        Self {
            reject: Some(filename.to_string()),
            ..Default::default()
        }
    }

    pub fn uploads(&self) -> Vec<(u32, String, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.uploads().into_iter().map(|(_, name, _)| name).collect()
    }
}

#[async_trait]
impl WorkspaceStore for FakeStore {
    fn endpoint(&self) -> &str {
        "http://localhost:28000"
    }

    async fn health(&self) -> Result<(), RemoteError> {
        if self.unhealthy {
            return Err(RemoteError::RequestRejected {
                url: "http://localhost:28000/health".to_string(),
                status: 503,
                body: String::new(),
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
        if self.reject.as_deref() == Some(filename) {
            return Err(RemoteError::RequestRejected {
                url: format!("http://localhost:28000/ws/{}/{}?type=file", workspace_id, filename),
                status: 500,
                body: "disk full".to_string(),
            });
        }
        self.uploads
            .lock()
            .unwrap()
            .push((workspace_id, filename.to_string(), contents));
        Ok(())
    }
}

/// After-task that succeeds or fails on demand and counts its runs.
pub struct ProbeTask {
    pub succeed: bool,
    pub runs: AtomicUsize,
}

impl ProbeTask {
    pub fn new(succeed: bool) -> Self {
        Self {
            succeed,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AfterTask for ProbeTask {
    fn description(&self) -> &str {
        "probe"
    }

    async fn run(&self) -> Result<(), MigrationError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.succeed {
            Ok(())
        } else {
            Err(MigrationError::AfterTaskAborted {
                id: 0,
                reason: "probe failure".to_string(),
            })
        }
    }
}
