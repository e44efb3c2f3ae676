//! Local migration steps, discovered from the migrations directory.
//!
//! Each step lives in its own folder named `{id}_{name}` holding an `up.sql`
//! and usually a `down.sql`.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

/// Script that applies a step.
pub const FORWARD_FILE: &str = "up.sql";

/// Script that reverts a step.
pub const REVERSE_FILE: &str = "down.sql";

static STEP_FOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)_(.+)$").expect("step folder pattern is valid"));

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Migrations directory not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("No database migrations found in {}", .0.display())]
    Empty(PathBuf),

    #[error("Migration id {id} is used by both '{first}' and '{second}'")]
    DuplicateId {
        id: u32,
        first: String,
        second: String,
    },
}

/// A single local migration step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub id: u32,
    pub name: String,
    pub path: PathBuf,
    pub has_forward_file: bool,
    pub has_reverse_file: bool,
}

impl MigrationStep {
    /// Folder name and display key, `{id}_{name}`.
    pub fn key(&self) -> String {
        format!("{}_{}", self.id, self.name)
    }
}

/// Every step found on disk, ascending by id.
#[derive(Debug, Clone)]
pub struct StepCatalog {
    root: PathBuf,
    steps: Vec<MigrationStep>,
}

impl StepCatalog {
    /// Scan `root` for step folders.
    ///
    /// Folders that don't look like `{id}_{name}` are ignored. An empty
    /// catalog is an error since there is nothing to reconcile against.
    pub fn discover(root: &Path) -> Result<Self, CatalogError> {
        if !root.is_dir() {
            return Err(CatalogError::NotFound(root.to_path_buf()));
        }

        let mut by_id: BTreeMap<u32, MigrationStep> = BTreeMap::new();

        for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| {
                e.into_io_error().unwrap_or_else(|| {
                    std::io::Error::other("filesystem loop in migrations directory")
                })
            })?;

            if !entry.file_type().is_dir() {
                continue;
            }

            let folder = entry.file_name().to_string_lossy().to_string();
            let Some(step) = parse_step_folder(&folder, entry.path()) else {
                debug!(folder = %folder, "Skipping folder that is not a migration step");
                continue;
            };

            if let Some(existing) = by_id.get(&step.id) {
                return Err(CatalogError::DuplicateId {
                    id: step.id,
                    first: existing.key(),
                    second: step.key(),
                });
            }
            by_id.insert(step.id, step);
        }

        if by_id.is_empty() {
            return Err(CatalogError::Empty(root.to_path_buf()));
        }

        Ok(Self {
            root: root.to_path_buf(),
            steps: by_id.into_values().collect(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    pub fn get(&self, id: u32) -> Option<&MigrationStep> {
        self.steps
            .binary_search_by_key(&id, |s| s.id)
            .ok()
            .map(|idx| &self.steps[idx])
    }
}

fn parse_step_folder(folder: &str, path: &Path) -> Option<MigrationStep> {
    let caps = STEP_FOLDER.captures(folder)?;
    let id = caps[1].parse().ok()?;

    Some(MigrationStep {
        id,
        name: caps[2].to_string(),
        path: path.to_path_buf(),
        has_forward_file: path.join(FORWARD_FILE).is_file(),
        has_reverse_file: path.join(REVERSE_FILE).is_file(),
    })
}
