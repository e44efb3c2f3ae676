use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use venue_migrate::config::{ADMIN_SECRET_VAR, ENDPOINT_VAR};
use venue_migrate::migration::after_tasks::workspaces::HttpWorkspaceStore;
use venue_migrate::utils::{DEFAULT_DATABASE_NAME, DEFAULT_HASURA_PATH};
use venue_migrate::{
    create_after_registry, load_venue_config, reconcile, AfterTaskRegistry, ConnectionOverrides,
    HasuraCli, HasuraQueryClient, MigrationDirection, MigrationError, MigrationExecutor,
    MigrationRunner, SchemaState, SqlClient, StdinPrompt, StepCatalog, VenueConfig,
};

/// Migrate the database of a venue.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Get the current migration status of the database
    Status(ConnectionArgs),

    /// Migrate the database
    Migrate(MigrateArgs),
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Directory containing the config.yaml and migrations folder for the venue
    #[arg(short = 'p', long, default_value = DEFAULT_HASURA_PATH)]
    hasura_path: PathBuf,

    /// Envfile to load envvars from
    #[arg(short = 'e', long)]
    env_path: Option<PathBuf>,

    /// HTTP(S) endpoint for the venue's Hasura instance
    #[arg(long, env = ENDPOINT_VAR)]
    endpoint: Option<String>,

    /// Admin secret for the venue's Hasura instance
    #[arg(long, env = ADMIN_SECRET_VAR, hide_env_values = true)]
    admin_secret: Option<String>,

    /// Name Hasura uses for the venue database
    #[arg(long, default_value = DEFAULT_DATABASE_NAME)]
    database_name: String,
}

#[derive(Args, Debug)]
struct MigrateArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Apply migration steps to the database
    #[arg(short = 'a', long, conflicts_with = "revert", required_unless_present = "revert")]
    apply: bool,

    /// Revert migration steps from the database
    #[arg(short = 'r', long)]
    revert: bool,

    /// Apply[revert] ALL unapplied[applied] migration steps without asking
    #[arg(long)]
    all: bool,
}

impl From<ConnectionArgs> for ConnectionOverrides {
    fn from(args: ConnectionArgs) -> Self {
        Self {
            hasura_path: args.hasura_path,
            env_path: args.env_path,
            endpoint: args.endpoint,
            admin_secret: args.admin_secret,
            database_name: args.database_name,
        }
    }
}

/// Collaborators for one venue, built once at startup.
struct Venue {
    config: VenueConfig,
    runner: Arc<dyn MigrationRunner>,
    after_tasks: Arc<AfterTaskRegistry>,
    state: SchemaState,
}

async fn connect(args: ConnectionArgs) -> anyhow::Result<Venue> {
    let config = load_venue_config(args.into())
        .await
        .context("Could not determine how to reach the venue")?;

    let cli = HasuraCli::new(config.hasura_profile());
    cli.check_installed().await?;
    let runner: Arc<dyn MigrationRunner> = Arc::new(cli);

    let sql: Arc<dyn SqlClient> = Arc::new(HasuraQueryClient::new(
        &config.endpoint,
        &config.admin_secret,
        &config.database_name,
    ));

    let store = Arc::new(HttpWorkspaceStore::new(
        &config.workspace_endpoint,
        &config.admin_secret,
    ));
    let after_tasks = Arc::new(create_after_registry(sql.clone(), store));

    let state = reconcile(sql.as_ref(), runner.as_ref()).await?;

    Ok(Venue {
        config,
        runner,
        after_tasks,
        state,
    })
}

async fn status(args: ConnectionArgs) -> anyhow::Result<u8> {
    let venue = connect(args).await?;

    println!(
        "\n###############################\
         \nDATABASE MIGRATION STATUS\
         \n###############################\
         \n\nDisplaying status of database at {}",
        venue.config.endpoint
    );

    let table = venue.runner.status().await.map_err(MigrationError::from)?;
    println!("\nMIGRATION STATUS:\n{}", table.render());

    if let Some(version) = venue.after_tasks.pending_version(&venue.state).await? {
        println!("Current version {} has pending tasks to run!", version);
    }

    Ok(0)
}

async fn migrate(args: MigrateArgs) -> anyhow::Result<u8> {
    let direction = if args.revert {
        MigrationDirection::Down
    } else {
        MigrationDirection::Up
    };
    let venue = connect(args.connection).await?;

    let executor = MigrationExecutor::new(venue.runner.clone(), venue.after_tasks.clone());

    // A pending after-task on the current version blocks everything else.
    if let Some(outcome) = executor.resolve_pending(&venue.state, direction).await? {
        return Ok(outcome.exit_code());
    }

    println!(
        "\n###############################\
         \nDATABASE MIGRATION HELPER\
         \n###############################\
         \n\nMigrating database at {}",
        venue.config.endpoint
    );

    let catalog = StepCatalog::discover(&venue.config.migrations_dir())?;
    info!(
        steps = catalog.steps().len(),
        root = %catalog.root().display(),
        "Loaded local migrations"
    );

    let outcome = if args.all {
        executor.run_bulk(&catalog, &venue.state, direction).await?
    } else {
        let mut prompt = StdinPrompt::new();
        executor
            .run_interactive(&catalog, direction, &mut prompt)
            .await?
    };

    info!(outcome = ?outcome, "Migration run finished");
    Ok(outcome.exit_code())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Status(args) => status(args).await,
        Command::Migrate(args) => migrate(args).await,
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            println!("Error: {:#}", e);
            let code = e
                .downcast_ref::<MigrationError>()
                .map(MigrationError::exit_code)
                .unwrap_or(venue_migrate::migration::EXIT_FAILURE);
            ExitCode::from(code)
        }
    }
}
