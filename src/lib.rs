pub mod catalog;
pub mod config;
pub mod migration;
pub mod remote;
pub mod utils;

// Re-export commonly used types
pub use catalog::{CatalogError, MigrationStep, StepCatalog};
pub use config::{load_venue_config, ConfigError, ConnectionOverrides, VenueConfig};
pub use migration::{
    available_steps, create_after_registry, reconcile, AfterTask, AfterTaskRegistry,
    AvailableSteps, MigrationDirection, MigrationError, MigrationExecutor, OperatorPrompt,
    RunOutcome, SchemaState, StdinPrompt,
};
pub use remote::{
    HasuraCli, HasuraProfile, HasuraQueryClient, MigrationRunner, Presence, RemoteError,
    RemoteStatusRow, SqlClient, StatusTable,
};
