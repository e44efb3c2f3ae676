use crate::remote::HasuraProfile;
use crate::utils::{derive_workspace_endpoint, sanitize_endpoint};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

pub const ENDPOINT_VAR: &str = "HASURA_GRAPHQL_ENDPOINT";
pub const ADMIN_SECRET_VAR: &str = "HASURA_GRAPHQL_ADMIN_SECRET";
pub const WORKSPACE_ENDPOINT_VAR: &str = "WORKSPACE_SERVER_ENDPOINT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to load envfile: {0}")]
    EnvFileError(#[from] dotenvy::Error),

    #[error("Specified envfile does not exist: {}", .0.display())]
    EnvFileNotFound(PathBuf),

    #[error(
        "{what} must be defined by either environment variables or in a config.yaml located in {}.",
        .folder.display()
    )]
    MissingCredentials { what: String, folder: PathBuf },
}

/// What the operator passed on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub hasura_path: PathBuf,
    pub env_path: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub admin_secret: Option<String>,
    pub database_name: String,
}

/// Fully resolved settings for one venue.
#[derive(Debug, Clone)]
pub struct VenueConfig {
    pub hasura_path: PathBuf,
    pub env_path: Option<PathBuf>,
    pub endpoint: String,
    pub admin_secret: String,
    pub database_name: String,
    pub workspace_endpoint: String,
}

impl VenueConfig {
    /// Folder holding one sub-folder per migration step.
    pub fn migrations_dir(&self) -> PathBuf {
        self.hasura_path.join("migrations").join(&self.database_name)
    }

    pub fn hasura_profile(&self) -> HasuraProfile {
        HasuraProfile {
            project_dir: self.hasura_path.clone(),
            database_name: self.database_name.clone(),
            endpoint: self.endpoint.clone(),
            admin_secret: self.admin_secret.clone(),
            env_file: self.env_path.clone(),
        }
    }
}

/// Load the envfile (if any) into the process environment, then resolve.
pub async fn load_venue_config(overrides: ConnectionOverrides) -> Result<VenueConfig, ConfigError> {
    if let Some(env_path) = &overrides.env_path {
        if !env_path.is_file() {
            return Err(ConfigError::EnvFileNotFound(env_path.clone()));
        }
        // Variables already set in the environment win over the file.
        dotenvy::from_path(env_path)?;
    }

    resolve_config(overrides, |key| std::env::var(key).ok()).await
}

/// Resolve endpoint and admin secret: flags, then `env`, then config.yaml.
pub async fn resolve_config<F>(
    overrides: ConnectionOverrides,
    env: F,
) -> Result<VenueConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |value: Option<String>| value.filter(|v| !v.trim().is_empty());

    let mut endpoint = non_empty(overrides.endpoint.clone()).or_else(|| non_empty(env(ENDPOINT_VAR)));
    let mut admin_secret =
        non_empty(overrides.admin_secret.clone()).or_else(|| non_empty(env(ADMIN_SECRET_VAR)));

    if endpoint.is_none() || admin_secret.is_none() {
        let (file_endpoint, file_secret) =
            read_config_file(&overrides.hasura_path, endpoint.is_none(), admin_secret.is_none())
                .await?;
        endpoint = endpoint.or(file_endpoint);
        admin_secret = admin_secret.or(file_secret);
    }

    let (endpoint, admin_secret) = match (endpoint, admin_secret) {
        (Some(e), Some(s)) => (sanitize_endpoint(&e), s),
        (e, s) => {
            return Err(ConfigError::MissingCredentials {
                what: missing_names(e.is_none(), s.is_none()),
                folder: overrides.hasura_path.clone(),
            })
        }
    };

    let workspace_endpoint = non_empty(env(WORKSPACE_ENDPOINT_VAR))
        .map(|e| sanitize_endpoint(&e))
        .unwrap_or_else(|| derive_workspace_endpoint(&endpoint));

    let hasura_path = overrides
        .hasura_path
        .canonicalize()
        .unwrap_or_else(|_| overrides.hasura_path.clone());
    let env_path = overrides
        .env_path
        .map(|p| p.canonicalize().unwrap_or(p));

    Ok(VenueConfig {
        hasura_path,
        env_path,
        endpoint,
        admin_secret,
        database_name: overrides.database_name,
        workspace_endpoint,
    })
}

/// Pull `endpoint:` and `admin_secret:` out of the project's config file.
///
/// Only the values asked for are read. A missing config file is an error,
/// since something was still unresolved when this was called.
pub async fn read_config_file(
    folder: &Path,
    want_endpoint: bool,
    want_secret: bool,
) -> Result<(Option<String>, Option<String>), ConfigError> {
    let candidates = [folder.join("config.yaml"), folder.join("config.yml")];
    let Some(path) = candidates.iter().find(|p| p.is_file()) else {
        return Err(ConfigError::MissingCredentials {
            what: missing_names(want_endpoint, want_secret),
            folder: folder.to_path_buf(),
        });
    };

    let content = fs::read_to_string(path).await?;

    let mut endpoint = None;
    let mut admin_secret = None;
    for line in content.lines().map(str::trim) {
        if want_endpoint && endpoint.is_none() {
            if let Some(value) = line.strip_prefix("endpoint:") {
                endpoint = Some(value.trim().to_string()).filter(|v| !v.is_empty());
                continue;
            }
        }
        if want_secret && admin_secret.is_none() {
            if let Some(value) = line.strip_prefix("admin_secret:") {
                admin_secret = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
        }
    }

    Ok((endpoint, admin_secret))
}

fn missing_names(endpoint: bool, secret: bool) -> String {
    match (endpoint, secret) {
        (true, true) => format!("{} and {}", ENDPOINT_VAR, ADMIN_SECRET_VAR),
        (true, false) => ENDPOINT_VAR.to_string(),
        _ => ADMIN_SECRET_VAR.to_string(),
    }
}
